//! Partial-failure accounting for `CreateTimeSeries` responses.
//!
//! When the backend accepts a call but rejects some of its points it answers
//! with a message of the form
//!
//! ```text
//! One or more TimeSeries could not be written: <cause>: timeSeries[0-16,25-44]; <cause>: timeSeries[45]
//! ```
//!
//! Each `;`-separated segment names one cause and the request indices it
//! rejected. Anything that does not match this shape exactly, including a
//! single malformed range, is treated as a loss of the entire request.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{TransportError, UploadError};

const PARTIAL_FAILURE_PREFIX: &str = "One or more TimeSeries could not be written:";

static SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?s)(?P<description>.+): timeSeries\[(?P<ranges>[^\]]*)\]$")
        .expect("segment pattern is valid")
});

/// An inclusive range of request indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// One cause in a partial-failure message and the indices it rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSegment {
    pub description: String,
    /// The ranges exactly as the backend wrote them.
    pub raw_ranges: String,
    pub ranges: Vec<IndexRange>,
}

impl RejectedSegment {
    /// Points this segment rejected. Indices repeated across segments count
    /// once per segment.
    pub fn points(&self) -> usize {
        self.ranges.iter().map(IndexRange::len).sum()
    }
}

impl From<RejectedSegment> for UploadError {
    fn from(segment: RejectedSegment) -> Self {
        let points = segment.points();
        UploadError::PartialFailure {
            description: segment.description,
            ranges: segment.raw_ranges,
            points,
        }
    }
}

/// Work out how many of `request_size` series a transport result dropped.
///
/// - no error: `(0, [])`
/// - a well-formed partial failure: the summed segment counts, one error per
///   segment
/// - anything else: `(request_size, [err])`
pub fn parse(request_size: usize, err: Option<&TransportError>) -> (usize, Vec<UploadError>) {
    let Some(err) = err else {
        return (0, Vec::new());
    };

    match parse_partial_failure(err.message(), request_size) {
        Some(segments) => {
            let dropped = segments.iter().map(RejectedSegment::points).sum();
            debug!(
                request_size,
                dropped,
                segments = segments.len(),
                "partial failure parsed"
            );
            (dropped, segments.into_iter().map(UploadError::from).collect())
        }
        None => (request_size, vec![UploadError::Transport(err.clone())]),
    }
}

/// Parse every segment of a partial-failure message.
///
/// Returns `None` unless the whole message is well formed and every index
/// falls inside the request.
pub fn parse_partial_failure(message: &str, request_size: usize) -> Option<Vec<RejectedSegment>> {
    let body = message.trim().strip_prefix(PARTIAL_FAILURE_PREFIX)?.trim();
    if body.is_empty() {
        return None;
    }
    // A description containing "; " splits into a segment without ranges,
    // so the whole message falls back to a full drop.
    body.split("; ")
        .map(|segment| parse_segment(segment.trim(), request_size))
        .collect()
}

fn parse_segment(segment: &str, request_size: usize) -> Option<RejectedSegment> {
    let caps = SEGMENT_RE.captures(segment)?;
    let description = caps.name("description")?.as_str().trim().to_string();
    let raw_ranges = caps.name("ranges")?.as_str();
    let ranges = raw_ranges
        .split(',')
        .map(|range| parse_range(range, request_size))
        .collect::<Option<Vec<_>>>()?;

    Some(RejectedSegment {
        description,
        raw_ranges: raw_ranges.to_string(),
        ranges,
    })
}

fn parse_range(text: &str, request_size: usize) -> Option<IndexRange> {
    let (start, end) = match text.split_once('-') {
        Some((start, end)) => (parse_index(start)?, parse_index(end)?),
        None => {
            let index = parse_index(text)?;
            (index, index)
        }
    };
    if start > end || end >= request_size {
        return None;
    }
    Some(IndexRange { start, end })
}

fn parse_index(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
