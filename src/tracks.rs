//! Track classification and codec-metadata extraction.
//!
//! Runs once per successful parser initialization.

use serde::Serialize;
use tracing::{debug, error};

use crate::parser::{AudioCodec, ContainerParser, TrackId, tags};
use crate::ports::AudioCoding;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Audio,
    Video,
    Hint,
    Control,
    ObjectDescriptor,
    Scene,
    Unknown,
}

impl TrackType {
    /// Exact, case-sensitive match on the handler tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            tags::AUDIO => Self::Audio,
            tags::VIDEO => Self::Video,
            tags::HINT => Self::Hint,
            tags::CONTROL => Self::Control,
            tags::OBJECT_DESCRIPTOR => Self::ObjectDescriptor,
            tags::SCENE => Self::Scene,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackDescriptor {
    pub id: TrackId,
    pub kind: TrackType,
    /// Set for audio tracks only.
    pub audio_codec: Option<AudioCodec>,
}

/// What one extraction pass found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub tracks: Vec<TrackDescriptor>,
    /// Coding of the last audio track seen, if any.
    pub audio_coding: Option<AudioCoding>,
    /// Non-empty decoder configurations, one per audio track, in track order.
    pub audio_configs: Vec<Vec<u8>>,
}

/// Classify every track and collect audio decoder configuration.
///
/// Nothing is returned unless every track could be described.
pub fn extract<P: ContainerParser>(parser: &P) -> Result<Extraction> {
    let mut extraction = Extraction::default();

    for id in parser.track_ids() {
        let kind = parser
            .track_type_tag(id)
            .map_or(TrackType::Unknown, TrackType::from_tag);

        let mut descriptor = TrackDescriptor {
            id,
            kind,
            audio_codec: None,
        };

        if kind == TrackType::Audio {
            let info = parser.audio_track_info(id).map_err(|e| {
                error!(track = id, error = %e, "audio track metadata query failed");
                Error::resources(format!("audio track {id} metadata: {e}"))
            })?;

            debug!(
                track = id,
                codec = ?info.codec,
                config_len = info.decoder_config.len(),
                "audio track"
            );
            if !info.decoder_config.is_empty() {
                extraction.audio_configs.push(info.decoder_config);
            }
            extraction.audio_coding = Some(info.codec.coding());
            descriptor.audio_codec = Some(info.codec);
        } else {
            // Video codings are left as configured.
            debug!(track = id, kind = ?kind, "track");
        }

        extraction.tracks.push(descriptor);
    }

    Ok(extraction)
}
