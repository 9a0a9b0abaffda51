//! 802.11 header decoding down to the fields the classifier compares.

use std::io::Cursor;

use bitflags::bitflags;
use byteorder::{ReadBytesExt, BE};

use crate::frame::{Frame, FrameType, KeyMessage, MacAddr, Subtype};

const HEADER_LEN: usize = 24;
const ADDR4_LEN: usize = 6;
const QOS_LEN: usize = 2;
/// timestamp, beacon interval, capability info
const PROBE_RESPONSE_FIXED_LEN: usize = 12;
const SSID_ELEMENT: u8 = 0;
const LLC_SNAP_EAPOL: [u8; 8] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e];
const EAPOL_KEY: u8 = 3;

bitflags! {
    struct FrameFlags : u8 {
        const TO_DS = 0x01;
        const FROM_DS = 0x02;
        const PROTECTED = 0x40;
    }
}

bitflags! {
    struct KeyInfo : u16 {
        const INSTALL = 0x0040;
        const ACK = 0x0080;
        const MIC = 0x0100;
        const SECURE = 0x0200;
    }
}

impl KeyInfo {
    fn message(&self) -> Option<KeyMessage> {
        let relevant = *self & (KeyInfo::INSTALL | KeyInfo::ACK | KeyInfo::MIC | KeyInfo::SECURE);
        if relevant == KeyInfo::ACK {
            Some(KeyMessage::One)
        } else if relevant == KeyInfo::MIC {
            Some(KeyMessage::Two)
        } else if relevant == KeyInfo::all() {
            Some(KeyMessage::Three)
        } else if relevant == KeyInfo::MIC | KeyInfo::SECURE {
            Some(KeyMessage::Four)
        } else {
            None
        }
    }
}

/// Decodes one 802.11 frame (no radiotap header, no FCS).
///
/// Returns `None` when even the frame control field is missing. Short
/// frames keep whatever fields could be read: a CTS has no transmitter
/// address and comes back with `sender` unset.
pub fn decode(data: &[u8], timestamp: f64) -> Option<Frame> {
    if data.len() < 2 {
        return None;
    }
    let fc0 = data[0];
    let flags = FrameFlags::from_bits_truncate(data[1]);
    let frame_type = FrameType::from((fc0 >> 2) & 0x03);
    let subtype = Subtype((fc0 >> 4) & 0x0f);

    let mut frame = Frame {
        frame_type: Some(frame_type),
        subtype: Some(subtype),
        receiver: data.get(4..10).and_then(MacAddr::from_slice),
        sender: data.get(10..16).and_then(MacAddr::from_slice),
        timestamp,
        ..Frame::default()
    };

    match frame_type {
        FrameType::Management => {
            let elements = match subtype {
                Subtype::PROBE_REQUEST => data.get(HEADER_LEN..),
                Subtype::PROBE_RESPONSE | Subtype::BEACON => {
                    data.get(HEADER_LEN + PROBE_RESPONSE_FIXED_LEN..)
                }
                _ => None,
            };
            frame.info = elements.and_then(ssid);
        }
        FrameType::Data if !flags.contains(FrameFlags::PROTECTED) => {
            let mut offset = HEADER_LEN;
            if flags.contains(FrameFlags::TO_DS | FrameFlags::FROM_DS) {
                offset += ADDR4_LEN;
            }
            // QoS subtypes have bit 3 set
            if subtype.0 & 0x08 != 0 {
                offset += QOS_LEN;
            }
            frame.key_message = data.get(offset..).and_then(key_message);
        }
        _ => {}
    }
    Some(frame)
}

/// First SSID element of a run of tagged parameters.
fn ssid(mut elements: &[u8]) -> Option<String> {
    while elements.len() >= 2 {
        let id = elements[0];
        let len = elements[1] as usize;
        let value = elements.get(2..2 + len)?;
        if id == SSID_ELEMENT {
            return Some(String::from_utf8_lossy(value).into_owned());
        }
        elements = &elements[2 + len..];
    }
    None
}

/// EAPOL-Key message number behind an LLC/SNAP header.
fn key_message(body: &[u8]) -> Option<KeyMessage> {
    if body.get(..LLC_SNAP_EAPOL.len())? != &LLC_SNAP_EAPOL[..] {
        return None;
    }
    let mut cur = Cursor::new(&body[LLC_SNAP_EAPOL.len()..]);
    let _version = cur.read_u8().ok()?;
    if cur.read_u8().ok()? != EAPOL_KEY {
        return None;
    }
    let _length = cur.read_u16::<BE>().ok()?;
    let _descriptor = cur.read_u8().ok()?;
    let info = KeyInfo::from_bits_truncate(cur.read_u16::<BE>().ok()?);
    info.message()
}
