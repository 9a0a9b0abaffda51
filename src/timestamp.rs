//! Event timestamps of one connection inside one capture.
//!
//! [`EventTimestamp`] walks the capture once per event, strictly in the
//! order of [`Event::ALL`]. Each search resumes right after the frame the
//! previous one found, which is what tells apart handshake frames that look
//! identical on the wire.

use serde::Serialize;
use tracing::debug;

use crate::classify::{Event, HandshakeStep, StationIdentity};
use crate::frame::Frame;
use crate::locate::{find_by, Found, Mode};

/// What one capture yielded. Unset fields were not found in the capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EventRecord {
    pub probe_request: Option<f64>,
    pub probe_response: Option<f64>,
    pub authentication_request: Option<f64>,
    pub authentication_response: Option<f64>,
    pub association_request: Option<f64>,
    pub association_response: Option<f64>,
    pub authentication_nonce: Option<f64>,
    pub supplicant_nonce: Option<f64>,
    pub group_temporal_key: Option<f64>,
    pub acknowledgement: Option<f64>,
    pub handshake_step: HandshakeStep,
}

impl EventRecord {
    pub fn get(&self, event: Event) -> Option<f64> {
        *self.slot(event)
    }

    fn set(&mut self, event: Event, timestamp: f64) {
        *self.slot_mut(event) = Some(timestamp);
    }

    fn slot(&self, event: Event) -> &Option<f64> {
        match event {
            Event::ProbeRequest => &self.probe_request,
            Event::ProbeResponse => &self.probe_response,
            Event::AuthenticationRequest => &self.authentication_request,
            Event::AuthenticationResponse => &self.authentication_response,
            Event::AssociationRequest => &self.association_request,
            Event::AssociationResponse => &self.association_response,
            Event::AuthenticationNonce => &self.authentication_nonce,
            Event::SupplicantNonce => &self.supplicant_nonce,
            Event::GroupTemporalKey => &self.group_temporal_key,
            Event::Acknowledgement => &self.acknowledgement,
        }
    }

    fn slot_mut(&mut self, event: Event) -> &mut Option<f64> {
        match event {
            Event::ProbeRequest => &mut self.probe_request,
            Event::ProbeResponse => &mut self.probe_response,
            Event::AuthenticationRequest => &mut self.authentication_request,
            Event::AuthenticationResponse => &mut self.authentication_response,
            Event::AssociationRequest => &mut self.association_request,
            Event::AssociationResponse => &mut self.association_response,
            Event::AuthenticationNonce => &mut self.authentication_nonce,
            Event::SupplicantNonce => &mut self.supplicant_nonce,
            Event::GroupTemporalKey => &mut self.group_temporal_key,
            Event::Acknowledgement => &mut self.acknowledgement,
        }
    }

    /// Seconds from the probe request to `event`.
    pub fn since_probe(&self, event: Event) -> Option<f64> {
        Some(self.get(event)? - self.probe_request?)
    }

    pub fn time_to_probe_response(&self) -> Option<f64> {
        self.since_probe(Event::ProbeResponse)
    }

    pub fn time_to_authentication_request(&self) -> Option<f64> {
        self.since_probe(Event::AuthenticationRequest)
    }

    pub fn time_to_authentication_response(&self) -> Option<f64> {
        self.since_probe(Event::AuthenticationResponse)
    }

    pub fn time_to_association_request(&self) -> Option<f64> {
        self.since_probe(Event::AssociationRequest)
    }

    pub fn time_to_association_response(&self) -> Option<f64> {
        self.since_probe(Event::AssociationResponse)
    }

    /// Were all the management frames (probe through association) found?
    pub fn all_matched(&self) -> bool {
        Event::ALL
            .iter()
            .filter(|event| event.handshake_step().is_none())
            .all(|&event| self.get(event).is_some())
    }
}

/// Event timestamp extractor for one capture.
#[derive(Debug)]
pub struct EventTimestamp<'a> {
    frames: &'a [Frame],
    identity: &'a StationIdentity,
    last: bool,
    cursor: usize,
    step: HandshakeStep,
    /// how many events of `Event::ALL` have been looked up
    resolved: usize,
    found: [Option<usize>; Event::ALL.len()],
    scans: usize,
}

impl<'a> EventTimestamp<'a> {
    /// `last` picks the final retry of each management frame before any
    /// later step starts instead of the first one.
    pub fn new(frames: &'a [Frame], identity: &'a StationIdentity, last: bool) -> Self {
        EventTimestamp {
            frames,
            identity,
            last,
            cursor: 0,
            step: HandshakeStep::NotStarted,
            resolved: 0,
            found: [None; Event::ALL.len()],
            scans: 0,
        }
    }

    pub fn identity(&self) -> &StationIdentity {
        self.identity
    }

    pub fn last(&self) -> bool {
        self.last
    }

    /// Index the next search starts from.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn handshake_step(&self) -> HandshakeStep {
        self.step
    }

    /// Number of passes over the capture so far.
    pub fn scan_count(&self) -> usize {
        self.scans
    }

    /// The frame for `event`, looking up every earlier event first.
    /// Each event is searched for at most once.
    pub fn lookup(&mut self, event: Event) -> Option<&'a Frame> {
        while self.resolved <= event.position() {
            let next = Event::ALL[self.resolved];
            self.resolve(next);
            self.resolved += 1;
        }
        let frames = self.frames;
        self.found[event.position()].map(|index| &frames[index])
    }

    /// Index of the frame found for `event` (record numbers in wireshark
    /// are this plus one).
    pub fn index(&mut self, event: Event) -> Option<usize> {
        self.lookup(event)?;
        self.found[event.position()]
    }

    pub fn timestamp(&mut self, event: Event) -> Option<f64> {
        self.lookup(event).map(|frame| frame.timestamp)
    }

    /// Looks up every event and collects the timestamps.
    pub fn extract(&mut self) -> EventRecord {
        self.lookup(Event::Acknowledgement);
        let mut record = EventRecord {
            handshake_step: self.step,
            ..EventRecord::default()
        };
        for event in Event::ALL {
            if let Some(index) = self.found[event.position()] {
                record.set(event, self.frames[index].timestamp);
            }
        }
        record
    }

    fn scan_by<P>(&mut self, start: usize, end: usize, mode: Mode, predicate: P) -> Option<Found<'a>>
    where
        P: FnMut(&Frame) -> bool,
    {
        self.scans += 1;
        let frames = self.frames;
        find_by(&frames[..end], start, mode, predicate)
    }

    fn resolve(&mut self, event: Event) {
        debug!("looking for the {} from frame {}", event, self.cursor);
        let identity = self.identity;
        let len = self.frames.len();
        let found = if event.handshake_step().is_some() {
            // tagged EAPOL-Key frames win over bare signature matches
            let tagged = self.scan_by(self.cursor, len, Mode::First, |frame| {
                event.matches_key_message(frame, identity)
            });
            match tagged {
                Some(tagged) => Some(tagged),
                None => self.scan_by(self.cursor, len, Mode::First, |frame| event.matches(frame, identity)),
            }
        } else {
            let first = self.scan_by(self.cursor, len, Mode::First, |frame| event.matches(frame, identity));
            match first {
                Some(first) if self.last => {
                    // retries only count until any later step shows up
                    let position = event.position();
                    let end = self
                        .scan_by(first.index + 1, len, Mode::First, |frame| {
                            Event::ALL
                                .iter()
                                .skip(position + 1)
                                .any(|later| later.matches(frame, identity))
                        })
                        .map_or(len, |f| f.index);
                    self.scan_by(first.index, end, Mode::Last, |frame| event.matches(frame, identity))
                }
                other => other,
            }
        };

        match found {
            Some(found) => {
                debug!("found the {} at frame {}: {}", event, found.index, found.frame);
                self.found[event.position()] = Some(found.index);
                self.cursor = found.index + 1;
                if let Some(step) = event.handshake_step() {
                    self.step = self.step.max(step);
                }
            }
            None => debug!("no {} after frame {}", event, self.cursor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameType, KeyMessage, MacAddr, Subtype};

    fn identity() -> StationIdentity {
        StationIdentity::new(
            MacAddr::new([2, 0, 0, 0, 0, 1]),
            MacAddr::new([2, 0, 0, 0, 0, 0xaa]),
            "alpaca",
        )
    }

    fn frame(event: Event, id: &StationIdentity, timestamp: f64) -> Frame {
        let criteria = event.criteria(id);
        Frame {
            sender: Some(criteria.sender),
            receiver: criteria.receiver,
            frame_type: Some(criteria.frame_type),
            subtype: Some(criteria.subtype),
            timestamp,
            ..Frame::default()
        }
    }

    fn broadcast_probe(id: &StationIdentity, timestamp: f64) -> Frame {
        Frame {
            receiver: Some(MacAddr::BROADCAST),
            info: Some(id.ssid.clone()),
            ..frame(Event::ProbeRequest, id, timestamp)
        }
    }

    /// One frame per event, one second apart, with an unrelated frame
    /// between each pair.
    fn full_exchange(id: &StationIdentity) -> Vec<Frame> {
        let mut frames = Vec::new();
        for (i, event) in Event::ALL.iter().enumerate() {
            frames.push(frame(*event, id, i as f64));
            frames.push(Frame::undecoded(i as f64 + 0.5));
        }
        frames
    }

    #[test]
    fn new_timestamper_has_not_started() {
        let id = identity();
        let timestamper = EventTimestamp::new(&[], &id, true);
        assert_eq!(timestamper.handshake_step(), HandshakeStep::NotStarted);
        assert_eq!(timestamper.cursor(), 0);
        assert_eq!(timestamper.scan_count(), 0);
        assert!(timestamper.last());
        assert_eq!(timestamper.identity(), &id);
    }

    #[test]
    fn full_exchange_in_order() {
        let id = identity();
        let frames = full_exchange(&id);
        let mut timestamper = EventTimestamp::new(&frames, &id, true);
        let record = timestamper.extract();

        for (i, event) in Event::ALL.iter().enumerate() {
            assert_eq!(record.get(*event), Some(i as f64), "{}", event);
        }
        assert_eq!(record.handshake_step, HandshakeStep::Acknowledgement);
        assert_eq!(record.time_to_probe_response(), Some(1.0));
        assert_eq!(record.time_to_authentication_request(), Some(2.0));
        assert_eq!(record.time_to_authentication_response(), Some(3.0));
        assert_eq!(record.time_to_association_request(), Some(4.0));
        assert_eq!(record.time_to_association_response(), Some(5.0));
        assert!(record.all_matched());
    }

    #[test]
    fn indices_strictly_increase() {
        let id = identity();
        let frames = full_exchange(&id);
        let mut timestamper = EventTimestamp::new(&frames, &id, false);
        let indices: Vec<usize> = Event::ALL.iter().filter_map(|&e| timestamper.index(e)).collect();
        assert_eq!(indices.len(), Event::ALL.len());
        assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(timestamper.cursor(), indices[indices.len() - 1] + 1);
    }

    #[test]
    fn last_probe_request_before_the_response() {
        let id = identity();
        let frames = vec![
            broadcast_probe(&id, 0.0),
            broadcast_probe(&id, 3.0),
            frame(Event::ProbeResponse, &id, 5.0),
        ];
        let mut timestamper = EventTimestamp::new(&frames, &id, true);
        assert_eq!(timestamper.timestamp(Event::ProbeRequest), Some(3.0));
        assert_eq!(timestamper.timestamp(Event::ProbeResponse), Some(5.0));

        let mut first = EventTimestamp::new(&frames, &id, false);
        assert_eq!(first.timestamp(Event::ProbeRequest), Some(0.0));
    }

    #[test]
    fn later_probes_do_not_swallow_the_exchange() {
        let id = identity();
        let mut frames = full_exchange(&id);
        frames.push(broadcast_probe(&id, 100.0));
        let mut timestamper = EventTimestamp::new(&frames, &id, true);
        let record = timestamper.extract();
        assert_eq!(record.probe_request, Some(0.0));
        assert_eq!(record.acknowledgement, Some(9.0));
    }

    #[test]
    fn later_probes_with_a_missing_response() {
        let id = identity();
        let mut frames = full_exchange(&id);
        frames.retain(|frame| !Event::ProbeResponse.matches(frame, &id));
        frames.push(broadcast_probe(&id, 100.0));

        let mut timestamper = EventTimestamp::new(&frames, &id, true);
        let record = timestamper.extract();
        assert_eq!(record.probe_request, Some(0.0));
        assert_eq!(record.probe_response, None);
        assert_eq!(record.authentication_request, Some(2.0));
        assert_eq!(record.association_response, Some(5.0));
        assert_eq!(record.acknowledgement, Some(9.0));
        assert_eq!(record.handshake_step, HandshakeStep::Acknowledgement);

        let mut first = EventTimestamp::new(&frames, &id, false);
        assert_eq!(first.extract(), record);
    }

    #[test]
    fn empty_capture() {
        let id = identity();
        let mut timestamper = EventTimestamp::new(&[], &id, true);
        let record = timestamper.extract();
        assert_eq!(record, EventRecord::default());
        assert_eq!(record.handshake_step, HandshakeStep::NotStarted);
        assert!(!record.all_matched());
    }

    #[test]
    fn identical_handshake_frames_are_told_apart_by_order() {
        let id = identity();
        let frames = vec![
            frame(Event::ProbeRequest, &id, 0.0),
            frame(Event::AuthenticationNonce, &id, 1.0),
            frame(Event::SupplicantNonce, &id, 2.0),
            frame(Event::GroupTemporalKey, &id, 3.0),
            frame(Event::Acknowledgement, &id, 4.0),
        ];
        let mut timestamper = EventTimestamp::new(&frames, &id, true);
        assert_eq!(timestamper.index(Event::AuthenticationNonce), Some(1));
        assert_eq!(timestamper.cursor(), 2);
        assert_eq!(timestamper.handshake_step(), HandshakeStep::AuthenticationNonce);
        assert_eq!(timestamper.index(Event::SupplicantNonce), Some(2));
        assert_eq!(timestamper.index(Event::GroupTemporalKey), Some(3));
        assert_eq!(timestamper.index(Event::Acknowledgement), Some(4));
        assert_eq!(timestamper.handshake_step(), HandshakeStep::Acknowledgement);
    }

    #[test]
    fn nonce_frame_is_not_reused_for_the_group_key() {
        let id = identity();
        let frames = vec![
            frame(Event::ProbeRequest, &id, 0.0),
            frame(Event::AuthenticationNonce, &id, 1.0),
            frame(Event::SupplicantNonce, &id, 2.0),
        ];
        let mut timestamper = EventTimestamp::new(&frames, &id, true);
        let record = timestamper.extract();
        assert_eq!(record.authentication_nonce, Some(1.0));
        assert_eq!(record.supplicant_nonce, Some(2.0));
        assert_eq!(record.group_temporal_key, None);
        assert_eq!(record.acknowledgement, None);
        assert_eq!(record.handshake_step, HandshakeStep::SupplicantNonce);
    }

    #[test]
    fn probe_only_capture() {
        let id = identity();
        let frames = vec![frame(Event::ProbeRequest, &id, 0.0), frame(Event::ProbeResponse, &id, 0.25)];
        let mut timestamper = EventTimestamp::new(&frames, &id, true);
        let record = timestamper.extract();
        assert_eq!(record.probe_request, Some(0.0));
        assert_eq!(record.probe_response, Some(0.25));
        assert_eq!(record.handshake_step, HandshakeStep::NotStarted);
        for event in &Event::ALL[6..] {
            assert_eq!(record.get(*event), None);
        }
        assert_eq!(record.time_to_association_request(), None);
        assert!(!record.all_matched());
    }

    #[test]
    fn lookups_are_cached() {
        let id = identity();
        let frames = full_exchange(&id);
        let mut timestamper = EventTimestamp::new(&frames, &id, true);

        let first = timestamper.lookup(Event::AssociationRequest).map(|f| f.timestamp);
        let scans = timestamper.scan_count();
        assert!(scans > 0);
        let again = timestamper.lookup(Event::AssociationRequest).map(|f| f.timestamp);
        assert_eq!(first, again);
        assert_eq!(timestamper.scan_count(), scans);

        // earlier events were resolved on the way
        assert_eq!(timestamper.timestamp(Event::ProbeResponse), Some(1.0));
        assert_eq!(timestamper.scan_count(), scans);

        let record = timestamper.extract();
        let scans = timestamper.scan_count();
        assert_eq!(timestamper.extract(), record);
        assert_eq!(timestamper.scan_count(), scans);
    }

    #[test]
    fn missing_step_leaves_cursor_alone() {
        let id = identity();
        let frames = vec![frame(Event::ProbeRequest, &id, 0.0), frame(Event::AssociationRequest, &id, 1.0)];
        let mut timestamper = EventTimestamp::new(&frames, &id, false);
        assert_eq!(timestamper.index(Event::ProbeResponse), None);
        assert_eq!(timestamper.cursor(), 1);
        assert_eq!(timestamper.index(Event::AssociationRequest), Some(1));
        assert_eq!(timestamper.cursor(), 2);
    }

    #[test]
    fn derived_offsets_need_both_ends() {
        let record = EventRecord {
            association_request: Some(4.0),
            ..EventRecord::default()
        };
        assert_eq!(record.time_to_association_request(), None);

        let record = EventRecord {
            probe_request: Some(1.5),
            association_request: Some(4.0),
            ..EventRecord::default()
        };
        assert_eq!(record.time_to_association_request(), Some(2.5));
        assert_eq!(record.time_to_association_response(), None);
    }

    #[test]
    fn eapol_tagged_handshake() {
        let id = identity();
        let frames = vec![
            frame(Event::AssociationResponse, &id, 0.0),
            // the retransmitted message 1 must not be taken for message 3
            eapol(id.access_point, id.client, KeyMessage::One, 1.0),
            eapol(id.client, id.access_point, KeyMessage::Two, 2.0),
            eapol(id.access_point, id.client, KeyMessage::One, 3.0),
            eapol(id.access_point, id.client, KeyMessage::Three, 4.0),
            eapol(id.client, id.access_point, KeyMessage::Four, 5.0),
        ];
        let mut timestamper = EventTimestamp::new(&frames, &id, true);
        let record = timestamper.extract();
        assert_eq!(record.association_response, Some(0.0));
        assert_eq!(record.authentication_nonce, Some(1.0));
        assert_eq!(record.supplicant_nonce, Some(2.0));
        assert_eq!(record.group_temporal_key, Some(4.0));
        assert_eq!(record.acknowledgement, Some(5.0));
        assert_eq!(record.handshake_step, HandshakeStep::Acknowledgement);
    }

    fn eapol(sender: MacAddr, receiver: MacAddr, message: KeyMessage, timestamp: f64) -> Frame {
        Frame {
            sender: Some(sender),
            receiver: Some(receiver),
            frame_type: Some(FrameType::Data),
            subtype: Some(Subtype(8)),
            key_message: Some(message),
            timestamp,
            ..Frame::default()
        }
    }

    #[test]
    fn tagged_handshake_frames_beat_control_frames() {
        let id = identity();
        let frames = vec![
            frame(Event::AuthenticationNonce, &id, 0.5),
            eapol(id.access_point, id.client, KeyMessage::One, 1.0),
            frame(Event::SupplicantNonce, &id, 1.5),
            eapol(id.client, id.access_point, KeyMessage::Two, 2.0),
            eapol(id.access_point, id.client, KeyMessage::Three, 3.0),
            eapol(id.client, id.access_point, KeyMessage::Four, 4.0),
        ];
        let record = EventTimestamp::new(&frames, &id, true).extract();
        assert_eq!(record.authentication_nonce, Some(1.0));
        assert_eq!(record.supplicant_nonce, Some(2.0));
        assert_eq!(record.group_temporal_key, Some(3.0));
        assert_eq!(record.acknowledgement, Some(4.0));
        assert_eq!(record.handshake_step, HandshakeStep::Acknowledgement);
    }

    #[test]
    fn untagged_steps_fall_back_to_signatures() {
        let id = identity();
        let frames = vec![
            eapol(id.access_point, id.client, KeyMessage::One, 1.0),
            frame(Event::SupplicantNonce, &id, 2.0),
            frame(Event::GroupTemporalKey, &id, 3.0),
            frame(Event::Acknowledgement, &id, 4.0),
        ];
        let mut timestamper = EventTimestamp::new(&frames, &id, false);
        let record = timestamper.extract();
        assert_eq!(record.authentication_nonce, Some(1.0));
        assert_eq!(record.supplicant_nonce, Some(2.0));
        assert_eq!(record.group_temporal_key, Some(3.0));
        assert_eq!(record.acknowledgement, Some(4.0));
    }

    #[test]
    fn independent_captures() {
        let id = identity();
        let complete = full_exchange(&id);
        let partial = vec![frame(Event::ProbeRequest, &id, 42.0)];

        let mut one = EventTimestamp::new(&complete, &id, true);
        let mut two = EventTimestamp::new(&partial, &id, true);
        let first = one.extract();
        let second = two.extract();

        assert_eq!(first.handshake_step, HandshakeStep::Acknowledgement);
        assert_eq!(second.handshake_step, HandshakeStep::NotStarted);
        assert_eq!(second.probe_request, Some(42.0));
        assert_eq!(second.probe_response, None);
        assert_eq!(first.probe_request, Some(0.0));
    }
}
