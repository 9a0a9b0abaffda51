//! Decoded 802.11 frame records.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;
use crate::radiotap::{Dbm, Mhz};

/// MAC address (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&data[..6]);
            Some(Self(bytes))
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    /// Accepts `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Configuration(format!("invalid MAC address: {:?}", s));
        let parts: Vec<&str> = s.trim().split(|c: char| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

/// Frame type (2 bits of the frame control field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Management = 0,
    Control = 1,
    Data = 2,
    Extension = 3,
}

impl From<u8> for FrameType {
    fn from(val: u8) -> Self {
        match val & 0x03 {
            0 => FrameType::Management,
            1 => FrameType::Control,
            2 => FrameType::Data,
            _ => FrameType::Extension,
        }
    }
}

/// Raw 4-bit subtype code. Its meaning depends on the frame type, so the
/// classifier always compares it together with a [`FrameType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subtype(pub u8);

impl Subtype {
    pub const ASSOCIATION_REQUEST: Subtype = Subtype(0);
    pub const ASSOCIATION_RESPONSE: Subtype = Subtype(1);
    pub const REASSOCIATION_REQUEST: Subtype = Subtype(2);
    pub const REASSOCIATION_RESPONSE: Subtype = Subtype(3);
    pub const PROBE_REQUEST: Subtype = Subtype(4);
    pub const PROBE_RESPONSE: Subtype = Subtype(5);
    pub const BEACON: Subtype = Subtype(8);
    pub const ATIM: Subtype = Subtype(9);
    pub const DISASSOCIATION: Subtype = Subtype(10);
    pub const AUTHENTICATION: Subtype = Subtype(11);
    pub const DEAUTHENTICATION: Subtype = Subtype(12);
}

/// Which of the four EAPOL-Key messages a data frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum KeyMessage {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
}

impl KeyMessage {
    pub fn number(self) -> u8 {
        self as u8
    }
}

/// One captured 802.11 unit.
///
/// Everything but the timestamp is optional: a record that could not be
/// decoded still takes up its index in the capture and simply never matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Transmitter address (addr2)
    pub sender: Option<MacAddr>,
    /// Receiver address (addr1)
    pub receiver: Option<MacAddr>,
    pub frame_type: Option<FrameType>,
    pub subtype: Option<Subtype>,
    /// SSID element of probe requests, probe responses and beacons
    pub info: Option<String>,
    /// EAPOL-Key message number of an unprotected 802.1X data frame
    pub key_message: Option<KeyMessage>,
    pub signal: Option<Dbm>,
    pub frequency: Option<Mhz>,
    /// Capture time in seconds since the epoch
    pub timestamp: f64,
}

impl Frame {
    /// A record whose 802.11 header could not be decoded.
    pub fn undecoded(timestamp: f64) -> Self {
        Frame {
            timestamp,
            ..Frame::default()
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field<T: fmt::Display>(f: &mut fmt::Formatter<'_>, value: Option<T>) -> fmt::Result {
            match value {
                Some(value) => write!(f, " {}", value),
                None => write!(f, " ?"),
            }
        }
        write!(f, "{:.6}", self.timestamp)?;
        field(f, self.sender)?;
        write!(f, " ->")?;
        field(f, self.receiver)?;
        match (self.frame_type, self.subtype) {
            (Some(frame_type), Some(subtype)) => write!(f, " {:?}/{}", frame_type, subtype.0)?,
            _ => write!(f, " undecoded")?,
        }
        if let Some(info) = &self.info {
            write!(f, " SSID={}", info)?;
        }
        if let Some(message) = self.key_message {
            write!(f, " EAPOL {}/4", message.number())?;
        }
        field(f, self.signal)?;
        field(f, self.frequency)
    }
}
