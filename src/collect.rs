//! Picking capture files by time and merging them into one.
//!
//! Packet times come from `capinfos`, merging is done by `mergecap`; both
//! ship with wireshark and have to be on the `PATH`.

use std::cell::OnceCell;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

pub const INFO_COMMAND: &str = "capinfos -ae";
pub const MERGE_COMMAND: &str = "mergecap";

lazy_static! {
    static ref FIRST_TIME: Regex =
        Regex::new(r"(?m)^(?:First|Earliest) packet time:\s+(?P<time>.+?)\s*$").unwrap();
    static ref LAST_TIME: Regex =
        Regex::new(r"(?m)^(?:Last|Latest) packet time:\s+(?P<time>.+?)\s*$").unwrap();
}

/// Parses a user-supplied date-time: `2018-06-04 13:00:00[.123]`,
/// `2018-06-04T13:00:00` or a bare date (midnight).
pub fn parse_time(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(time);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::Configuration(format!("un-parseable time: {:?}", text)))
}

/// First and last packet times of one capture file.
#[derive(Debug)]
pub struct CaptureInfo {
    path: PathBuf,
    command: String,
    output: OnceCell<String>,
}

impl CaptureInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_command(path, INFO_COMMAND)
    }

    pub fn with_command(path: impl Into<PathBuf>, command: &str) -> Self {
        CaptureInfo {
            path: path.into(),
            command: command.to_string(),
            output: OnceCell::new(),
        }
    }

    /// Uses already captured `capinfos` output instead of running it.
    pub fn from_output(path: impl Into<PathBuf>, output: impl Into<String>) -> Self {
        CaptureInfo {
            path: path.into(),
            command: INFO_COMMAND.to_string(),
            output: OnceCell::from(output.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Output of the info command, run at most once.
    pub fn output(&self) -> Result<&str> {
        if let Some(output) = self.output.get() {
            return Ok(output.as_str());
        }
        let mut words = self.command.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| Error::Configuration("empty capture info command".into()))?;
        debug!("running: {} {}", self.command, self.path.display());
        let outcome = Command::new(program).args(words).arg(&self.path).output()?;
        if !outcome.status.success() {
            return Err(Error::Command {
                command: format!("{} {}", self.command, self.path.display()),
                stderr: String::from_utf8_lossy(&outcome.stderr).trim().to_string(),
            });
        }
        let output = String::from_utf8_lossy(&outcome.stdout).into_owned();
        debug!("{}", output);
        Ok(self.output.get_or_init(|| output).as_str())
    }

    pub fn first(&self) -> Result<NaiveDateTime> {
        self.time(&FIRST_TIME, "first")
    }

    pub fn last(&self) -> Result<NaiveDateTime> {
        self.time(&LAST_TIME, "last")
    }

    fn time(&self, regex: &Regex, which: &str) -> Result<NaiveDateTime> {
        let output = self.output()?;
        let text = regex
            .captures(output)
            .and_then(|captures| captures.name("time"))
            .map(|time| time.as_str())
            .ok_or_else(|| {
                Error::CaptureInfo(format!("no {} packet time for {}", which, self.path.display()))
            })?;
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").map_err(|e| {
            Error::CaptureInfo(format!("bad {} packet time {:?} for {}: {}", which, text, self.path.display(), e))
        })
    }

    /// Does the capture lie inside `[start, end]`? Open ends always pass.
    pub fn within(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Result<bool> {
        if let Some(start) = start {
            if self.first()? < start {
                return Ok(false);
            }
        }
        if let Some(end) = end {
            if self.last()? > end {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Capture files in a directory that match a glob and a time span.
#[derive(Debug, Clone)]
pub struct FileFilterer {
    path: PathBuf,
    glob: String,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

impl FileFilterer {
    pub fn new(
        path: impl Into<PathBuf>,
        glob: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "source directory doesn't exist: {}",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "source isn't a directory: {}",
                path.display()
            )));
        }
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(Error::Configuration(format!("start {} is after end {}", start, end)));
            }
        }
        Ok(FileFilterer {
            path,
            glob: glob.to_string(),
            start,
            end,
        })
    }

    /// Every file in the directory matching the glob, sorted by name.
    pub fn all_files(&self) -> Result<Vec<CaptureInfo>> {
        let pattern = self.path.join(&self.glob);
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|e| Error::Configuration(format!("bad glob {:?}: {}", self.glob, e)))?;
        let mut files = Vec::new();
        for path in paths {
            let path = path.map_err(|e| Error::Io(e.into()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files.into_iter().map(CaptureInfo::new).collect())
    }

    /// Files whose packets all fall inside the time span.
    pub fn file_names(&self) -> Result<Vec<PathBuf>> {
        self.select(self.all_files()?)
    }

    pub fn select(&self, captures: Vec<CaptureInfo>) -> Result<Vec<PathBuf>> {
        let mut selected = Vec::new();
        for capture in captures {
            if capture.within(self.start, self.end)? {
                selected.push(capture.path);
            } else {
                debug!("outside the time span: {}", capture.path.display());
            }
        }
        info!("{} capture files selected from {}", selected.len(), self.path.display());
        Ok(selected)
    }
}

/// Merges capture files into one with `mergecap`.
#[derive(Debug, Clone)]
pub struct Merger {
    files: Vec<PathBuf>,
    target: PathBuf,
}

impl Merger {
    /// Creates the target's parent directory if it is missing.
    pub fn new(files: Vec<PathBuf>, target: impl Into<PathBuf>) -> Result<Self> {
        if files.is_empty() {
            return Err(Error::Configuration("no capture files to merge".into()));
        }
        let target = target.into();
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Merger { files, target })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn arguments(&self) -> Vec<OsString> {
        let mut arguments = vec![OsString::from("-w"), self.target.clone().into_os_string()];
        arguments.extend(self.files.iter().map(|file| file.clone().into_os_string()));
        arguments
    }

    /// `mergecap -w <target> <files...>`
    pub fn command(&self) -> Command {
        let mut command = Command::new(MERGE_COMMAND);
        command.args(self.arguments());
        command
    }

    pub fn run(&self) -> Result<()> {
        debug!("running: {} {:?}", MERGE_COMMAND, self.arguments());
        let outcome = self.command().output()?;
        if !outcome.status.success() {
            let stderr = String::from_utf8_lossy(&outcome.stderr).trim().to_string();
            error!("{} failed: {}", MERGE_COMMAND, stderr);
            return Err(Error::Command {
                command: MERGE_COMMAND.to_string(),
                stderr,
            });
        }
        info!("merged {} files into {}", self.files.len(), self.target.display());
        Ok(())
    }
}
