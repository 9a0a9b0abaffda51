//! Radiotap pseudo-header in front of every frame of a monitor-mode capture.
//!
//! Only the fields the frame model carries are kept (flags, TSFT, channel,
//! antenna signal, antenna). Everything else is skipped using its alignment
//! and size so the offsets of later fields stay correct.

use std::fmt;
use std::fmt::{Display, Formatter};
use std::io;
use std::io::{Cursor, Seek, SeekFrom};

use bitflags::bitflags;
use byteorder::{ReadBytesExt, LE};
use thiserror::Error;

bitflags! {
    struct Fields : u32 {
        const TSFT = 1 << 0;
        const FLAGS = 1 << 1;
        const RATE = 1 << 2;
        const CHANNEL = 1 << 3;
        const FHSS = 1 << 4;
        const ANTENNA_SIGNAL = 1 << 5;
        const ANTENNA_NOISE = 1 << 6;
        const LOCK_QUALITY = 1 << 7;
        const TX_ATTENUATION = 1 << 8;
        const DB_TX_ATTENUATION = 1 << 9;
        const DBM_TX_POWER = 1 << 10;
        const ANTENNA = 1 << 11;
        const DB_ANTENNA_SIGNAL = 1 << 12;
        const DB_ANTENNA_NOISE = 1 << 13;
        const RX_FLAGS = 1 << 14;
        const TX_FLAGS = 1 << 15;
        const RTS_RETRIES = 1 << 16;
        const DATA_RETRIES = 1 << 17;
        const XCHANNEL = 1 << 18;
        const MCS = 1 << 19;
        const AMPDU = 1 << 20;
        const VHT = 1 << 21;
        const TIMESTAMP = 1 << 22;
        const HE = 1 << 23;
        const HE_MU = 1 << 24;
        const HE_MU_OTHER_USER = 1 << 25;
        const ZERO_LENGTH_PSDU = 1 << 26;
        const L_SIG = 1 << 27;
        const MORE_PRESENT = 1 << 31;
    }
}

bitflags! {
    pub struct Flags : u8 {
        const SHORT_PREAMBLE = 0x02;
        const WEP = 0x04;
        const FRAGMENTATION = 0x08;
        const FCS_AT_END = 0x10;
        const FCS_FAIL = 0x40;
    }
}

bitflags! {
    pub struct ChannelFlags : u16 {
        const CCK = 0x0020;
        const OFDM = 0x0040;
        const SPECTRUM_2GHZ = 0x0080;
        const SPECTRUM_5GHZ = 0x0100;
        const CCK_OFDM = 0x0400;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mhz(pub u16);

impl Display for Mhz {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} Mhz", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Dbm(pub i8);

impl Display for Dbm {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}dBm", self.0)
    }
}

impl Fields {
    /// (alignment, size) of a single-bit data field.
    fn info(&self) -> (u64, u64) {
        match *self {
            Fields::TSFT => (8, 8),
            Fields::FLAGS => (1, 1),
            Fields::RATE => (1, 1),
            Fields::CHANNEL => (2, 4),
            Fields::FHSS => (1, 2),
            Fields::ANTENNA_SIGNAL => (1, 1),
            Fields::ANTENNA_NOISE => (1, 1),
            Fields::LOCK_QUALITY => (2, 2),
            Fields::TX_ATTENUATION => (2, 2),
            Fields::DB_TX_ATTENUATION => (2, 2),
            Fields::DBM_TX_POWER => (1, 1),
            Fields::ANTENNA => (1, 1),
            Fields::DB_ANTENNA_SIGNAL => (1, 1),
            Fields::DB_ANTENNA_NOISE => (1, 1),
            Fields::RX_FLAGS => (2, 2),
            Fields::TX_FLAGS => (2, 2),
            Fields::RTS_RETRIES => (1, 1),
            Fields::DATA_RETRIES => (1, 1),
            Fields::XCHANNEL => (4, 8),
            Fields::MCS => (1, 3),
            Fields::AMPDU => (4, 8),
            Fields::VHT => (2, 12),
            Fields::TIMESTAMP => (8, 12),
            Fields::HE => (2, 12),
            Fields::HE_MU => (2, 12),
            Fields::HE_MU_OTHER_USER => (2, 6),
            Fields::ZERO_LENGTH_PSDU => (1, 1),
            Fields::L_SIG => (2, 4),
            _ => unreachable!(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported radiotap version {0}")]
    InvalidVersion(u8),
    #[error("radiotap header claims {claimed} bytes but only {available} were captured")]
    InvalidLength { claimed: usize, available: usize },
    #[error("truncated radiotap header: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct Radiotap {
    length: usize,
    tsft: Option<u64>,
    flags: Option<Flags>,
    channel: Option<(Mhz, ChannelFlags)>,
    antenna: Option<u8>,
    signal: Option<Dbm>,
}

trait Align: Seek {
    fn align(&mut self, amount: u64) -> io::Result<()> {
        let p = self.stream_position()?;
        let new_p = align_up_to(p, amount);
        if p != new_p {
            self.seek(SeekFrom::Start(new_p))?;
        }
        Ok(())
    }
}

impl<T> Align for T where T: Seek {}

fn align_up_to(x: u64, a: u64) -> u64 {
    if x % a != 0 {
        x + a - (x % a)
    } else {
        x
    }
}

impl Radiotap {
    pub fn parse(header: &[u8]) -> Result<Radiotap> {
        let mut cur = Cursor::new(header);

        let version = cur.read_u8()?;
        if version != 0 {
            return Err(Error::InvalidVersion(version));
        }

        cur.read_u8()?;

        let length = cur.read_u16::<LE>()? as usize;
        if header.len() < length {
            return Err(Error::InvalidLength {
                claimed: length,
                available: header.len(),
            });
        }
        let mut cur = Cursor::new(&header[..length]);
        cur.seek(SeekFrom::Start(4))?;

        let present = Fields::from_bits_truncate(cur.read_u32::<LE>()?);

        // extended bitmaps only describe fields that follow the first namespace
        let mut more = present.contains(Fields::MORE_PRESENT);
        while more {
            more = cur.read_u32::<LE>()? & Fields::MORE_PRESENT.bits() != 0;
        }

        let mut tsft = None;
        let mut flags = None;
        let mut channel = None;
        let mut signal = None;
        let mut antenna = None;

        for i in 0..31 {
            let field = Fields::from_bits_truncate(1 << i);
            if field.is_empty() || !present.intersects(field) {
                continue;
            }
            let (align, size) = field.info();
            cur.align(align)?;
            match field {
                Fields::TSFT => {
                    tsft = Some(cur.read_u64::<LE>()?);
                }
                Fields::FLAGS => {
                    flags = Some(Flags::from_bits_truncate(cur.read_u8()?));
                }
                Fields::CHANNEL => {
                    channel = Some((
                        Mhz(cur.read_u16::<LE>()?),
                        ChannelFlags::from_bits_truncate(cur.read_u16::<LE>()?),
                    ));
                }
                Fields::ANTENNA_SIGNAL => {
                    signal = Some(Dbm(cur.read_i8()?));
                }
                Fields::ANTENNA => {
                    antenna = Some(cur.read_u8()?);
                }
                _ => {
                    cur.seek(SeekFrom::Current(size as i64))?;
                }
            }
        }

        Ok(Radiotap {
            length,
            tsft,
            flags,
            channel,
            antenna,
            signal,
        })
    }

    /// Length of the whole pseudo-header; the 802.11 frame starts here.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn tsft(&self) -> Option<u64> {
        self.tsft
    }

    fn has_flag(&self, flag: Flags) -> bool {
        self.flags.map_or(false, |flags| flags.contains(flag))
    }

    /// The captured frame ends with its 4-byte FCS.
    pub fn fcs_at_end(&self) -> bool {
        self.has_flag(Flags::FCS_AT_END)
    }

    pub fn fcs_fail(&self) -> bool {
        self.has_flag(Flags::FCS_FAIL)
    }

    pub fn short_preamble(&self) -> Option<bool> {
        self.flags.map(|flags| flags.intersects(Flags::SHORT_PREAMBLE))
    }

    pub fn signal_strength(&self) -> Option<Dbm> {
        self.signal
    }

    pub fn frequency(&self) -> Option<Mhz> {
        self.channel.map(|(f, _)| f)
    }

    pub fn channel_flags(&self) -> Option<ChannelFlags> {
        self.channel.map(|(_, flags)| flags)
    }

    pub fn antenna(&self) -> Option<u8> {
        self.antenna
    }
}
