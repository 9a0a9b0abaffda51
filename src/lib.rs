//! Timestamps of the steps a WiFi client goes through to join a network
//! (probe, authentication, association and the 4-way handshake), pulled out
//! of 802.11 packet captures.
//!
//! ```no_run
//! use alpaca::{CaptureFile, EventTimestamp, FrameSource, StationIdentity};
//!
//! # fn main() -> alpaca::Result<()> {
//! let identity = StationIdentity::parse("02:00:00:00:00:01", "02:00:00:00:00:aa", "alpaca")?;
//! let frames = CaptureFile::open("~/captures/join.pcap")?.frames()?;
//! let record = EventTimestamp::new(&frames, &identity, true).extract();
//! println!("{:?}", record.time_to_association_response());
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod classify;
pub mod collect;
pub mod error;
pub mod frame;
pub mod ieee80211;
pub mod locate;
pub mod radiotap;
pub mod table;
pub mod timestamp;

pub use crate::capture::{CaptureFile, FrameSource, MemoryCapture};
pub use crate::classify::{Event, HandshakeStep, StationIdentity};
pub use crate::error::{Error, Result};
pub use crate::frame::{Frame, FrameType, MacAddr, Subtype};
pub use crate::locate::{Found, Mode};
pub use crate::table::{EventRow, EventTable};
pub use crate::timestamp::{EventRecord, EventTimestamp};
