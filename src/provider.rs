// src/provider.rs

//! The virtual file the container parser reads from.
//!
//! Container parsers are written against a conventional file: open it, seek anywhere, read
//! exact amounts, close it. [`FileProvider`] is that contract, and it is the *only* surface a
//! [`crate::parser::ContainerParser`] touches.
//!
//! [`StreamProvider`] implements it over an [`IngestWindow`]:
//! - seeks are accepted optimistically, even past the bytes received so far
//! - every read first absorbs whatever input arrived since the last call
//! - a read that cannot be satisfied yet answers [`ReadStatus::RetryLater`] without consuming
//!   anything, so a parse attempt fails softly and can be repeated later

use std::io;

use tracing::{trace, warn};
use uuid::Uuid;

use crate::{Error, Result};
use crate::ingest::IngestWindow;

/// Handle returned by [`FileProvider::open`]. Identifies the demuxer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(Uuid);

impl FileHandle {
    pub fn new(session: Uuid) -> Self {
        Self(session)
    }

    pub fn session(&self) -> Uuid {
        self.0
    }
}

/// Outcome of a [`FileProvider::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The buffer was filled completely.
    Ok,
    /// Not enough bytes yet; nothing was consumed.
    RetryLater,
    /// End-of-stream was flagged and no bytes remain.
    End,
}

/// File-like operations a container parser needs.
pub trait FileProvider {
    fn open(&mut self, name: &str) -> FileHandle;

    fn seek(&mut self, handle: FileHandle, pos: u64) -> io::Result<()>;

    /// Fill `buf` completely, or report why not.
    fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> ReadStatus;

    /// Returns the number of bytes written.
    fn write(&mut self, handle: FileHandle, buf: &[u8]) -> io::Result<usize>;

    fn close(&mut self, handle: FileHandle) -> io::Result<()>;
}

/// Where newly arrived input bytes come from.
///
/// The demuxer implements this over its port manager so that a parser blocked on a read can
/// pick up input that arrived while it was running.
pub trait InputSource {
    /// Move any pending input into `window`.
    fn absorb(&mut self, window: &mut IngestWindow) -> Result<()>;

    /// Whether the input port has signalled end-of-stream.
    fn is_eos(&self) -> bool;
}

/// [`FileProvider`] backed by an [`IngestWindow`].
pub struct StreamProvider<'a> {
    handle: FileHandle,
    window: &'a mut IngestWindow,
    input: &'a mut dyn InputSource,
    // Seek target not yet inside the written region.
    pending_seek: Option<u64>,
    // First failure to absorb input; every later read reports `End`.
    absorb_error: Option<Error>,
}

impl<'a> StreamProvider<'a> {
    pub fn new(session: Uuid, window: &'a mut IngestWindow, input: &'a mut dyn InputSource) -> Self {
        Self {
            handle: FileHandle::new(session),
            window,
            input,
            pending_seek: None,
            absorb_error: None,
        }
    }

    /// The input failure that cut reads short, if any.
    pub fn take_error(&mut self) -> Option<Error> {
        self.absorb_error.take()
    }

    /// Put the read cursor back at the start of the stream.
    pub fn rewind(&mut self) {
        self.pending_seek = None;
        // Offset 0 is always inside the written region.
        let _ = self.window.seek(0);
    }

    pub fn window(&self) -> &IngestWindow {
        &*self.window
    }

    fn owns(&self, handle: FileHandle) -> bool {
        if handle != self.handle {
            warn!(session = %handle.session(), "parser used a foreign file handle");
            return false;
        }
        true
    }
}

impl FileProvider for StreamProvider<'_> {
    fn open(&mut self, name: &str) -> FileHandle {
        trace!(name, "open");
        self.handle
    }

    fn seek(&mut self, handle: FileHandle, pos: u64) -> io::Result<()> {
        trace!(pos, "seek");
        if !self.owns(handle) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "unknown file handle"));
        }

        // A position past the write cursor cannot be honoured yet; keep it until a read
        // finds enough bytes behind it.
        match self.window.seek(pos) {
            Ok(()) => self.pending_seek = None,
            Err(_) => {
                trace!(pos, written = self.window.written(), "seek beyond received bytes");
                self.pending_seek = Some(pos);
            }
        }
        Ok(())
    }

    fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> ReadStatus {
        if !self.owns(handle) || self.absorb_error.is_some() {
            return ReadStatus::End;
        }

        if let Err(err) = self.input.absorb(&mut *self.window) {
            warn!(error = %err, "failed to absorb input while reading");
            self.absorb_error = Some(err);
            return ReadStatus::End;
        }

        if let Some(pos) = self.pending_seek {
            if self.window.seek(pos).is_err() {
                if self.input.is_eos() {
                    trace!(pos, "seek target beyond end of stream");
                    return ReadStatus::End;
                }
                return ReadStatus::RetryLater;
            }
            self.pending_seek = None;
        }

        if self.input.is_eos() && self.window.available() == 0 {
            trace!("out of compressed data");
            return ReadStatus::End;
        }

        if buf.is_empty() {
            return ReadStatus::Ok;
        }

        if self.window.read(buf).is_err() {
            trace!(
                requested = buf.len(),
                available = self.window.available(),
                "read starved"
            );
            return ReadStatus::RetryLater;
        }

        // `read` succeeded, so advancing by the same amount cannot starve.
        let _ = self.window.advance(buf.len());
        trace!(size = buf.len(), "read");
        ReadStatus::Ok
    }

    fn write(&mut self, _handle: FileHandle, _buf: &[u8]) -> io::Result<usize> {
        trace!("write ignored");
        Ok(0)
    }

    fn close(&mut self, _handle: FileHandle) -> io::Result<()> {
        trace!("close");
        Ok(())
    }
}
