//! Splitting series into requests with no repeated identity.
//!
//! The backend rejects a request containing two series with the same
//! signature ("Duplicate TimeSeries encountered. Only one point can be
//! written per TimeSeries per request."), but separate requests may repeat
//! one. Given
//!
//! ```text
//! a/b/c, a/b/c, x/y/z, a/b/c, x/y/z, p/y/z, d/y/z
//! ```
//!
//! [`combine`] produces
//!
//! ```text
//! [a/b/c, x/y/z, p/y/z, d/y/z]
//! [a/b/c, x/y/z]
//! [a/b/c]
//! ```
//!
//! so the number of requests is the highest multiplicity of any one
//! signature, not the number of duplicates.

use std::collections::HashSet;

use tsexport_core::{ProjectName, TimeSeries, UploadRequest};

/// Partition `series` into duplicate-free requests for `name`.
///
/// Each round keeps the first occurrence of every signature, in input order,
/// and defers the rest to the next round. Empty input yields no requests.
pub fn combine(name: &ProjectName, series: Vec<TimeSeries>) -> Vec<UploadRequest> {
    let mut requests = Vec::new();
    let mut remaining = series;

    while !remaining.is_empty() {
        let mut seen = HashSet::with_capacity(remaining.len());
        let (unique, repeated): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|ts| seen.insert(ts.signature()));

        requests.push(UploadRequest::new(name.clone(), unique));
        remaining = repeated;
    }

    requests
}
