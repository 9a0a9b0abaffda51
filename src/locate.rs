//! Resumable forward scans over a capture.
//!
//! Every search starts at an explicit index into the frame slice and the
//! returned index is absolute, so a caller resumes at `index + 1` and can
//! never rewind past an event it already found.

use crate::classify::{matches, Criteria, Event, StationIdentity};
use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Stop at the first matching frame.
    First,
    /// Scan to the end and keep the last matching frame.
    Last,
}

impl Mode {
    pub fn from_last(last: bool) -> Self {
        if last {
            Mode::Last
        } else {
            Mode::First
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Found<'a> {
    pub index: usize,
    pub frame: &'a Frame,
}

/// Scans `frames[start..]` for frames accepted by `predicate`.
pub fn find_by<'a, P>(frames: &'a [Frame], start: usize, mode: Mode, mut predicate: P) -> Option<Found<'a>>
where
    P: FnMut(&Frame) -> bool,
{
    let mut candidates = frames
        .iter()
        .enumerate()
        .skip(start)
        .filter(|&(_, frame)| predicate(frame));
    let (index, frame) = match mode {
        Mode::First => candidates.next()?,
        Mode::Last => candidates.last()?,
    };
    Some(Found { index, frame })
}

pub fn find<'a>(frames: &'a [Frame], start: usize, criteria: &Criteria, mode: Mode) -> Option<Found<'a>> {
    find_by(frames, start, mode, |frame| matches(frame, criteria))
}

pub fn find_event<'a>(
    frames: &'a [Frame],
    start: usize,
    event: Event,
    identity: &StationIdentity,
    mode: Mode,
) -> Option<Found<'a>> {
    find_by(frames, start, mode, |frame| event.matches(frame, identity))
}
