//! Capture sources: where the frame sequence of one capture comes from.

use std::path::{Path, PathBuf};

use pcap::Linktype;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::ieee80211;
use crate::radiotap::Radiotap;

const LINKTYPE_IEEE802_11: Linktype = Linktype(105);
const LINKTYPE_IEEE802_11_RADIOTAP: Linktype = Linktype(127);
const FCS_LEN: usize = 4;

/// Anything that can hand over the complete, ordered frames of a capture.
pub trait FrameSource {
    /// Name the capture is reported under.
    fn identifier(&self) -> String;

    fn frames(&self) -> Result<Vec<Frame>>;
}

/// A capture file on disk, read with libpcap.
///
/// Record `n` of the file (1-indexed, as wireshark numbers them) becomes
/// frame `n - 1`.
#[derive(Debug, Clone)]
pub struct CaptureFile {
    path: PathBuf,
}

impl CaptureFile {
    /// Fails with a configuration error unless `path` (after expanding a
    /// leading `~/`) is an existing file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_user(path.as_ref());
        debug!("capture path: {}", path.display());
        if !path.is_file() {
            return Err(Error::Configuration(format!("{} is not a file", path.display())));
        }
        Ok(CaptureFile { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for CaptureFile {
    fn identifier(&self) -> String {
        self.path.display().to_string()
    }

    fn frames(&self) -> Result<Vec<Frame>> {
        let mut capture = pcap::Capture::from_file(&self.path)?;
        let linktype = capture.get_datalink();
        let radiotap = if linktype == LINKTYPE_IEEE802_11_RADIOTAP {
            true
        } else if linktype == LINKTYPE_IEEE802_11 {
            false
        } else {
            return Err(Error::Configuration(format!(
                "{} has link type {}, expected 802.11 frames",
                self.path.display(),
                linktype.0
            )));
        };

        let mut frames = Vec::new();
        loop {
            let packet = match capture.next_packet() {
                Ok(packet) => packet,
                Err(pcap::Error::NoMorePackets) => break,
                Err(e) => return Err(e.into()),
            };
            let timestamp = packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 / 1e6;
            frames.push(decode_record(packet.data, radiotap, timestamp));
        }
        info!("read {} frames from {}", frames.len(), self.path.display());
        Ok(frames)
    }
}

/// Frames that are already in memory, mostly for tests and for callers
/// with their own capture reader.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapture {
    pub name: String,
    pub frames: Vec<Frame>,
}

impl MemoryCapture {
    pub fn new(name: impl Into<String>, frames: Vec<Frame>) -> Self {
        MemoryCapture {
            name: name.into(),
            frames,
        }
    }
}

impl FrameSource for MemoryCapture {
    fn identifier(&self) -> String {
        self.name.clone()
    }

    fn frames(&self) -> Result<Vec<Frame>> {
        Ok(self.frames.clone())
    }
}

/// Turns one capture record into a frame. Records that don't decode become
/// frames with nothing but a timestamp so the indices stay aligned.
pub fn decode_record(data: &[u8], radiotap: bool, timestamp: f64) -> Frame {
    let (mut body, radio) = if radiotap {
        match Radiotap::parse(data) {
            Ok(radio) => (data.get(radio.len()..).unwrap_or(&[]), Some(radio)),
            Err(e) => {
                debug!("bad radiotap header at {:.6}: {}", timestamp, e);
                return Frame::undecoded(timestamp);
            }
        }
    } else {
        (data, None)
    };

    if radio.as_ref().map_or(false, Radiotap::fcs_at_end) && body.len() >= FCS_LEN {
        body = &body[..body.len() - FCS_LEN];
    }

    let mut frame = ieee80211::decode(body, timestamp).unwrap_or_else(|| Frame::undecoded(timestamp));
    if let Some(radio) = radio {
        frame.signal = radio.signal_strength();
        frame.frequency = radio.frequency();
    }
    frame
}

fn expand_user(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    use byteorder::{WriteBytesExt, LE};
    use tempfile::TempDir;

    use crate::frame::{FrameType, MacAddr, Subtype};
    use crate::radiotap::{Dbm, Mhz};

    /// Writes a classic microsecond pcap file.
    fn write_pcap(path: &Path, linktype: u32, records: &[(u32, u32, Vec<u8>)]) {
        let mut out = Vec::new();
        out.write_u32::<LE>(0xa1b2_c3d4).unwrap();
        out.write_u16::<LE>(2).unwrap();
        out.write_u16::<LE>(4).unwrap();
        out.write_i32::<LE>(0).unwrap();
        out.write_u32::<LE>(0).unwrap();
        out.write_u32::<LE>(65535).unwrap();
        out.write_u32::<LE>(linktype).unwrap();
        for (sec, usec, data) in records {
            out.write_u32::<LE>(*sec).unwrap();
            out.write_u32::<LE>(*usec).unwrap();
            out.write_u32::<LE>(data.len() as u32).unwrap();
            out.write_u32::<LE>(data.len() as u32).unwrap();
            out.extend_from_slice(data);
        }
        File::create(path).unwrap().write_all(&out).unwrap();
    }

    const CLIENT: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    const AP: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0xaa];

    fn authentication(addr1: [u8; 6], addr2: [u8; 6]) -> Vec<u8> {
        let mut bytes = vec![0xb0, 0x00, 0x3a, 0x01];
        bytes.extend_from_slice(&addr1);
        bytes.extend_from_slice(&addr2);
        bytes.extend_from_slice(&AP);
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        bytes
    }

    /// The 18-byte radiotap header from a b/g capture (FCS at end, -85dBm,
    /// 2412 Mhz) in front of `frame` and a dummy FCS.
    fn with_radiotap(frame: &[u8]) -> Vec<u8> {
        let mut bytes = hex::decode("000012002e480000120b6c09a000ab030000").unwrap();
        bytes.extend_from_slice(frame);
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        bytes
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        match CaptureFile::open(dir.path().join("nope.pcap")) {
            Err(Error::Configuration(message)) => assert!(message.contains("nope.pcap")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn directory_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(CaptureFile::open(dir.path()), Err(Error::Configuration(_))));
    }

    #[test]
    fn reads_radiotap_capture() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.pcap");
        write_pcap(
            &path,
            127,
            &[
                (100, 250_000, with_radiotap(&authentication(AP, CLIENT))),
                (100, 500_000, vec![0x00, 0x00, 0x08]),
                (101, 0, with_radiotap(&authentication(CLIENT, AP))),
            ],
        );

        let capture = CaptureFile::open(&path).unwrap();
        assert_eq!(capture.identifier(), path.display().to_string());
        let frames = capture.frames().unwrap();
        assert_eq!(frames.len(), 3);

        assert_eq!(frames[0].timestamp, 100.25);
        assert_eq!(frames[0].sender, Some(MacAddr::new(CLIENT)));
        assert_eq!(frames[0].receiver, Some(MacAddr::new(AP)));
        assert_eq!(frames[0].frame_type, Some(FrameType::Management));
        assert_eq!(frames[0].subtype, Some(Subtype::AUTHENTICATION));
        assert_eq!(frames[0].signal, Some(Dbm(-85)));
        assert_eq!(frames[0].frequency, Some(Mhz(2412)));

        assert_eq!(frames[1], Frame::undecoded(100.5));

        assert_eq!(frames[2].timestamp, 101.0);
        assert_eq!(frames[2].sender, Some(MacAddr::new(AP)));
    }

    #[test]
    fn reads_plain_80211_capture() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.pcap");
        write_pcap(&path, 105, &[(7, 0, authentication(AP, CLIENT))]);

        let frames = CaptureFile::open(&path).unwrap().frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sender, Some(MacAddr::new(CLIENT)));
        assert_eq!(frames[0].signal, None);
    }

    #[test]
    fn rejects_ethernet_capture() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ethernet.pcap");
        write_pcap(&path, 1, &[]);

        let capture = CaptureFile::open(&path).unwrap();
        assert!(matches!(capture.frames(), Err(Error::Configuration(_))));
    }

    #[test]
    fn fcs_is_stripped_before_decoding() {
        let mut probe = vec![0x40, 0x00, 0x00, 0x00];
        probe.extend_from_slice(&[0xff; 6]);
        probe.extend_from_slice(&CLIENT);
        probe.extend_from_slice(&[0xff; 6]);
        probe.extend_from_slice(&[0x00, 0x00]);
        probe.extend_from_slice(&[0x00, 0x03, b'a', b'b', b'c']);

        let frame = decode_record(&with_radiotap(&probe), true, 0.0);
        assert_eq!(frame.info.as_deref(), Some("abc"));
    }

    #[test]
    fn memory_capture() {
        let capture = MemoryCapture::new("memory", vec![Frame::undecoded(1.0)]);
        assert_eq!(capture.identifier(), "memory");
        assert_eq!(capture.frames().unwrap(), vec![Frame::undecoded(1.0)]);
    }

    #[test]
    fn tilde_expansion() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_user(Path::new("~/captures/a.pcap")), PathBuf::from(home).join("captures/a.pcap"));
        }
        assert_eq!(expand_user(Path::new("/tmp/a.pcap")), PathBuf::from("/tmp/a.pcap"));
    }
}
