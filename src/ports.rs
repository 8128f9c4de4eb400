//! Port vocabulary shared by the demuxer and the pipeline's port manager.
//!
//! The demuxer has one input port (the container byte stream) and two output ports (audio and
//! video elementary streams). Buffers are owned by the port manager; the demuxer only borrows
//! the header at the front of a port's queue, fills it, and hands it back via
//! [`PortManager::release_header`].

use std::fmt;

use serde::Serialize;

use crate::{Error, Result};

/// One of the demuxer's three ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortIndex {
    Input = 0,
    Audio = 1,
    Video = 2,
}

/// The two output ports, in delivery order.
pub const OUTPUT_PORTS: [PortIndex; 2] = [PortIndex::Audio, PortIndex::Video];

/// All ports, in index order.
pub const ALL_PORTS: [PortIndex; 3] = [PortIndex::Input, PortIndex::Audio, PortIndex::Video];

impl PortIndex {
    pub fn as_usize(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for PortIndex {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Input),
            1 => Ok(Self::Audio),
            2 => Ok(Self::Video),
            other => Err(Error::BadPortIndex(other)),
        }
    }
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Input => "input",
            Self::Audio => "audio",
            Self::Video => "video",
        };
        write!(f, "{name}({})", *self as u32)
    }
}

/// Target of a port command: a single port or every port at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelector {
    All,
    One(PortIndex),
}

impl PortSelector {
    /// Commands touching the input port reset the whole parsing session.
    pub fn includes_input(self) -> bool {
        matches!(self, Self::All | Self::One(PortIndex::Input))
    }

    pub fn ports(self) -> Vec<PortIndex> {
        match self {
            Self::All => ALL_PORTS.to_vec(),
            Self::One(port) => vec![port],
        }
    }
}

impl From<PortIndex> for PortSelector {
    fn from(port: PortIndex) -> Self {
        Self::One(port)
    }
}

/// Audio coding types understood by downstream decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCoding {
    Unused,
    AutoDetect,
    Mp3,
    Aac,
    Amr,
}

/// Video coding types understood by downstream decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCoding {
    Unused,
    AutoDetect,
    Avc,
    Hevc,
    Mpeg4,
}

/// The format carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "domain", content = "coding")]
pub enum PortFormat {
    /// The compressed container stream on the input port.
    Container,
    Audio(AudioCoding),
    Video(VideoCoding),
}

impl PortFormat {
    /// Whether this is one of the "nothing resolved yet" sentinels.
    pub fn is_unset(self) -> bool {
        matches!(
            self,
            Self::Audio(AudioCoding::Unused | AudioCoding::AutoDetect)
                | Self::Video(VideoCoding::Unused | VideoCoding::AutoDetect)
        )
    }

    pub fn is_auto_detect(self) -> bool {
        matches!(
            self,
            Self::Audio(AudioCoding::AutoDetect) | Self::Video(VideoCoding::AutoDetect)
        )
    }

    /// The explicit "unused" sentinel for the given output port.
    pub fn unused_for(port: PortIndex) -> Self {
        match port {
            PortIndex::Input => Self::Container,
            PortIndex::Audio => Self::Audio(AudioCoding::Unused),
            PortIndex::Video => Self::Video(VideoCoding::Unused),
        }
    }
}

/// The subset of a port definition the demuxer reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortDefinition {
    /// Nominal size of each buffer on this port.
    pub buffer_size: usize,
    pub format: PortFormat,
}

impl PortDefinition {
    pub fn container(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            format: PortFormat::Container,
        }
    }

    pub fn audio(buffer_size: usize, coding: AudioCoding) -> Self {
        Self {
            buffer_size,
            format: PortFormat::Audio(coding),
        }
    }

    pub fn video(buffer_size: usize, coding: VideoCoding) -> Self {
        Self {
            buffer_size,
            format: PortFormat::Video(coding),
        }
    }
}

/// The demuxer's own view of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    pub enabled: bool,
    pub auto_detect: bool,
    pub format: PortFormat,
    /// Set once end-of-stream has been tagged on a buffer released from this port.
    pub eos_propagated: bool,
}

impl PortDescriptor {
    pub fn new(port: PortIndex) -> Self {
        Self {
            enabled: true,
            auto_detect: false,
            format: PortFormat::unused_for(port),
            eos_propagated: false,
        }
    }

    /// Forget everything learned from the current stream.
    pub fn reset(&mut self, port: PortIndex) {
        self.auto_detect = false;
        self.format = PortFormat::unused_for(port);
        self.eos_propagated = false;
    }
}

/// The port definition field a settings-changed notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsField {
    PortDefinition,
}

/// Notifications issued to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// The stream's format has been identified on some output port.
    PortFormatDetected,
    /// Downstream must renegotiate `field` on `port`.
    PortSettingsChanged { port: PortIndex, field: SettingsField },
    /// An auto-detect port could not be resolved. Fatal for the filter.
    FormatNotDetected { port: PortIndex },
}

impl Event {
    /// The error an event reports, if it is an error event.
    pub fn as_error(&self) -> Option<Error> {
        match self {
            Self::FormatNotDetected { port } => Some(Error::FormatNotDetected(*port)),
            _ => None,
        }
    }
}

/// A caller-owned media buffer passed by reference between pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferHeader {
    data: Vec<u8>,
    offset: usize,
    filled_len: usize,
    eos: bool,
}

impl BufferHeader {
    /// An empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            offset: 0,
            filled_len: 0,
            eos: false,
        }
    }

    /// A buffer pre-filled with `payload`.
    pub fn with_payload(payload: &[u8], eos: bool) -> Self {
        Self {
            data: payload.to_vec(),
            offset: 0,
            filled_len: payload.len(),
            eos,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.filled_len]
    }

    pub fn filled_len(&self) -> usize {
        self.filled_len
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn free_space(&self) -> usize {
        self.data.len() - self.offset - self.filled_len
    }

    /// Copy as much of `bytes` as fits after the filled region. Returns the number copied.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free_space());
        let start = self.offset + self.filled_len;
        self.data[start..start + n].copy_from_slice(&bytes[..n]);
        self.filled_len += n;
        n
    }

    pub fn is_eos(&self) -> bool {
        self.eos
    }

    pub fn set_eos(&mut self, eos: bool) {
        self.eos = eos;
    }
}

/// The buffer/port bookkeeping the demuxer consumes from its host pipeline.
///
/// Implementations own buffer headers and port enablement; the demuxer never keeps a header
/// across calls, it always re-acquires the front header of a port.
pub trait PortManager {
    /// The header currently held on `port`, if one is available.
    fn header(&mut self, port: PortIndex) -> Option<&mut BufferHeader>;

    /// Hand the held header on `port` back to the pipeline. A no-op when none is held.
    fn release_header(&mut self, port: PortIndex) -> Result<()>;

    fn is_port_enabled(&self, port: PortIndex) -> bool;

    fn update_port_disabled(&mut self, port: PortIndex, disabled: bool);

    /// Whether end-of-stream has been seen on the input port.
    fn is_eos(&self) -> bool;

    fn update_eos(&mut self, eos: bool);

    fn port_definition(&self, port: PortIndex) -> Result<PortDefinition>;

    fn set_port_definition(&mut self, port: PortIndex, definition: PortDefinition) -> Result<()>;

    fn issue_event(&mut self, event: Event);
}
