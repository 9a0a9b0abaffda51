//! Event timestamps of many captures, one row each.

use std::io;

use serde::Serialize;
use tracing::{info, warn};

use crate::capture::FrameSource;
use crate::classify::{HandshakeStep, StationIdentity};
use crate::error::Result;
use crate::timestamp::{EventRecord, EventTimestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub capture: String,
    pub record: EventRecord,
}

/// The columns written for every capture.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    capture: &'a str,
    probe_request: Option<f64>,
    time_to_probe_response: Option<f64>,
    time_to_authentication_request: Option<f64>,
    time_to_authentication_response: Option<f64>,
    time_to_association_request: Option<f64>,
    time_to_association_response: Option<f64>,
    authentication_nonce: Option<f64>,
    supplicant_nonce: Option<f64>,
    group_temporal_key: Option<f64>,
    acknowledgement: Option<f64>,
    handshake_step: HandshakeStep,
}

impl<'a> From<&'a EventRow> for CsvRow<'a> {
    fn from(row: &'a EventRow) -> Self {
        let record = &row.record;
        CsvRow {
            capture: &row.capture,
            probe_request: record.probe_request,
            time_to_probe_response: record.time_to_probe_response(),
            time_to_authentication_request: record.time_to_authentication_request(),
            time_to_authentication_response: record.time_to_authentication_response(),
            time_to_association_request: record.time_to_association_request(),
            time_to_association_response: record.time_to_association_response(),
            authentication_nonce: record.authentication_nonce,
            supplicant_nonce: record.supplicant_nonce,
            group_temporal_key: record.group_temporal_key,
            acknowledgement: record.acknowledgement,
            handshake_step: record.handshake_step,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    rows: Vec<EventRow>,
}

impl EventTable {
    /// Runs a fresh extraction over every source. Sources that can't be
    /// read are logged and left out.
    pub fn extract<S: FrameSource>(sources: &[S], identity: &StationIdentity, last: bool) -> Self {
        let mut rows = Vec::with_capacity(sources.len());
        for source in sources {
            let capture = source.identifier();
            let frames = match source.frames() {
                Ok(frames) => frames,
                Err(e) => {
                    warn!("skipping {}: {}", capture, e);
                    continue;
                }
            };
            let record = EventTimestamp::new(&frames, identity, last).extract();
            info!("{}: handshake at {:?}", capture, record.handshake_step);
            rows.push(EventRow { capture, record });
        }
        EventTable { rows }
    }

    pub fn rows(&self) -> &[EventRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, capture: &str) -> Option<&EventRecord> {
        self.rows.iter().find(|row| row.capture == capture).map(|row| &row.record)
    }

    /// Captures that made it through the whole handshake.
    pub fn completed(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.record.handshake_step == HandshakeStep::Acknowledgement)
            .count()
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            writer.serialize(CsvRow::from(row))?;
        }
        writer.flush()?;
        Ok(())
    }
}
