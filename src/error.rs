use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Something about the setup is wrong: bad identifiers, missing files.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("capture info error: {0}")]
    CaptureInfo(String),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
