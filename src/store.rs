use std::collections::VecDeque;

/// Pending bytes for one output port, delivered as a FIFO of chunks.
///
/// Each [`stage`](Self::stage) call queues exactly one chunk; a chunk always goes out in one
/// buffer. The delivered flag turns on when the queue empties after having held something
/// and stays on until [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct OutputStore {
    bytes: Vec<u8>,
    // Start of the front chunk within `bytes`.
    cursor: usize,
    chunks: VecDeque<usize>,
    held_any: bool,
    delivered: bool,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `bytes` as one chunk. Empty input is ignored.
    pub fn stage(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.bytes.extend_from_slice(bytes);
        self.chunks.push_back(bytes.len());
        self.held_any = true;
        self.delivered = false;
    }

    pub fn front_chunk(&self) -> Option<&[u8]> {
        let len = *self.chunks.front()?;
        self.bytes.get(self.cursor..self.cursor + len)
    }

    /// Drop the front chunk, returning its length.
    pub fn pop_chunk(&mut self) -> Option<usize> {
        let len = self.chunks.pop_front()?;
        self.cursor += len;
        if self.chunks.is_empty() {
            self.bytes.clear();
            self.cursor = 0;
            self.delivered = self.held_any;
        }
        Some(len)
    }

    pub fn is_drained(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes still waiting to be delivered.
    pub fn available(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    pub fn queued_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn metadata_delivered(&self) -> bool {
        self.delivered
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.cursor = 0;
        self.chunks.clear();
        self.held_any = false;
        self.delivered = false;
    }
}
