//! The container-parser seam.
//!
//! The demuxer does not care how the container is parsed, only that a parser can be built
//! against a [`FileProvider`] and then answer a handful of questions about its tracks. The
//! built-in implementation is [`IsoBmffParser`]; pipelines may plug in their own.

use serde::Serialize;
use thiserror::Error;

use crate::ports::AudioCoding;
use crate::provider::FileProvider;

pub mod esds;
pub mod isobmff;

pub use isobmff::IsoBmffParser;

pub type TrackId = u32;

/// Track type tags as they appear in the container's handler box.
pub mod tags {
    pub const AUDIO: &str = "soun";
    pub const VIDEO: &str = "vide";
    pub const HINT: &str = "hint";
    pub const CONTROL: &str = "cntl";
    pub const OBJECT_DESCRIPTOR: &str = "odsm";
    pub const SCENE: &str = "sdsm";
}

/// Why a parser could not be built, or could not answer a query.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The provider asked to retry later: more bytes are needed.
    #[error("container incomplete: more input needed")]
    Incomplete,

    #[error("unexpected end of stream")]
    EndOfStream,

    #[error("malformed container at offset {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    #[error("no movie box found before end of container")]
    MissingMovie,

    #[error("unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("track {0} is not an audio track")]
    NotAudio(TrackId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

/// Audio codecs a container may carry, as far as this demuxer distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    Mp3,
    Aac,
    /// AAC carried in a QuickTime-style sound description.
    AacFromMov,
    AmrNb,
    AmrWb,
    Unknown,
}

impl AudioCodec {
    /// The pipeline coding type downstream decoders negotiate on.
    pub fn coding(self) -> AudioCoding {
        match self {
            Self::Mp3 => AudioCoding::Mp3,
            Self::Aac | Self::AacFromMov => AudioCoding::Aac,
            Self::AmrNb | Self::AmrWb => AudioCoding::Amr,
            Self::Unknown => AudioCoding::Unused,
        }
    }
}

/// What the parser knows about one audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackInfo {
    pub codec: AudioCodec,
    /// Media time units per second.
    pub time_scale: u32,
    /// Track duration in `time_scale` units.
    pub duration: u64,
    /// Average bitrate in bits per second, 0 when unknown.
    pub avg_bitrate: u32,
    /// Decoder-initialization bytes (e.g. an AAC AudioSpecificConfig). May be empty.
    pub decoder_config: Vec<u8>,
}

impl AudioTrackInfo {
    pub fn duration_ms(&self) -> u64 {
        if self.time_scale == 0 {
            return 0;
        }
        self.duration.saturating_mul(1000) / u64::from(self.time_scale)
    }
}

/// A container parser driven through a [`FileProvider`].
///
/// `open` may read, seek, and fail as often as it likes; a failure is never assumed to be
/// permanent, because "malformed" and "not enough bytes yet" look the same from here. Once
/// `open` succeeds, the queries below must not need the provider again.
pub trait ContainerParser: Sized {
    fn open(provider: &mut dyn FileProvider, name: &str) -> Result<Self, ParseError>;

    /// Track ids, in container order.
    fn track_ids(&self) -> Vec<TrackId>;

    /// The track's raw type tag (see [`tags`]).
    fn track_type_tag(&self, track: TrackId) -> Option<&str>;

    fn audio_track_info(&self, track: TrackId) -> Result<AudioTrackInfo, ParseError>;

    /// Release the parser. Dropping has the same effect; this exists for parsers that want to
    /// log or flush on teardown.
    fn close(self) {}
}
