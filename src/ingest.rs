//! Bounded, seekable window over the container bytes received so far.
//!
//! The input port delivers the container strictly in order and in bounded chunks, but the
//! container parser wants to seek around as if the whole file were present. `IngestWindow`
//! bridges the two:
//! - bytes are only ever appended (`push`), never rewritten
//! - the read cursor may be moved anywhere inside what has been written (`seek`)
//! - reads that would run past the write cursor fail with `Starved` instead of returning
//!   partial or stale data
//!
//! There is no implicit compaction; bytes stay addressable until `clear`.

use thiserror::Error;

/// Failures reported by [`IngestWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("ingest window full: {requested} bytes requested, {free} free")]
    OutOfSpace { requested: usize, free: usize },

    #[error("ingest window starved: {requested} bytes requested, {available} available")]
    Starved { requested: usize, available: usize },

    #[error("cannot seek to {offset}: only {written} bytes written")]
    InvalidSeek { offset: u64, written: usize },
}

/// Append-only byte window with a movable read cursor.
///
/// Invariant: `read <= write <= capacity`, where `write == bytes.len()`.
#[derive(Debug)]
pub struct IngestWindow {
    bytes: Vec<u8>,
    capacity: usize,
    read: usize,
}

impl IngestWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
            read: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offset of the write cursor (total bytes written since the last `clear`).
    pub fn written(&self) -> usize {
        self.bytes.len()
    }

    /// Offset of the read cursor.
    pub fn position(&self) -> usize {
        self.read
    }

    pub fn available(&self) -> usize {
        self.bytes.len() - self.read
    }

    pub fn free(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    /// Append `data` at the write cursor. All-or-nothing.
    pub fn push(&mut self, data: &[u8]) -> Result<(), WindowError> {
        if data.len() > self.free() {
            return Err(WindowError::OutOfSpace {
                requested: data.len(),
                free: self.free(),
            });
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Copy `dst.len()` bytes starting at the read cursor. The cursor does not move.
    pub fn read(&self, dst: &mut [u8]) -> Result<(), WindowError> {
        let n = dst.len();
        if self.available() < n {
            return Err(WindowError::Starved {
                requested: n,
                available: self.available(),
            });
        }
        dst.copy_from_slice(&self.bytes[self.read..self.read + n]);
        Ok(())
    }

    /// Move the read cursor forward by `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<(), WindowError> {
        if self.available() < n {
            return Err(WindowError::Starved {
                requested: n,
                available: self.available(),
            });
        }
        self.read += n;
        Ok(())
    }

    /// Reposition the read cursor to an absolute offset inside the written region.
    pub fn seek(&mut self, offset: u64) -> Result<(), WindowError> {
        match usize::try_from(offset) {
            Ok(pos) if pos <= self.bytes.len() => {
                self.read = pos;
                Ok(())
            }
            _ => Err(WindowError::InvalidSeek {
                offset,
                written: self.bytes.len(),
            }),
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.read = 0;
    }
}
