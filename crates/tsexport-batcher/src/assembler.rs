//! Cuts an unbounded stream of series into capacity-sized windows.

use tsexport_core::TimeSeries;

/// Buffers series until `capacity` is reached.
///
/// Never holds more than `capacity` series and never emits an empty batch.
#[derive(Debug)]
pub struct RequestAssembler {
    capacity: usize,
    buffer: Vec<TimeSeries>,
}

impl RequestAssembler {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "assembler capacity must be at least 1");
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Append one series, returning a full batch once capacity is reached.
    pub fn add(&mut self, series: TimeSeries) -> Option<Vec<TimeSeries>> {
        self.buffer.push(series);
        self.flush(false)
    }

    /// Take the buffered series.
    ///
    /// Without `force` only a full buffer is emitted; with it, any non-empty
    /// remainder is.
    pub fn flush(&mut self, force: bool) -> Option<Vec<TimeSeries>> {
        if self.buffer.is_empty() || (!force && self.buffer.len() < self.capacity) {
            return None;
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        Some(batch)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
