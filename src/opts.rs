use std::path::PathBuf;

/// Options that control a demuxer session.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI is responsible for mapping user input into this type so that:
/// - the library remains reusable outside of a CLI context
/// - other frontends (pipelines, tests) can construct options programmatically
///
/// The parse-attempt budget and the ingest window sizing are fixed properties of the demuxer
/// and deliberately not configurable here.
#[derive(Debug, Clone)]
pub struct DemuxerOpts {
    /// Name handed to the container parser when it opens the virtual file.
    ///
    /// Purely informational: no filesystem path is ever resolved from it.
    pub stream_name: String,

    /// Scratch-file mirroring of the input stream.
    pub staging: StagingOpts,
}

impl Default for DemuxerOpts {
    fn default() -> Self {
        Self {
            stream_name: "mp4demux".to_string(),
            staging: StagingOpts::default(),
        }
    }
}

/// Where and whether to mirror input bytes into a transient staging file.
#[derive(Debug, Clone)]
pub struct StagingOpts {
    pub enabled: bool,

    /// Directory for the scratch file. `None` uses the platform temp directory.
    pub dir: Option<PathBuf>,

    /// File name prefix; a random suffix is appended.
    pub prefix: String,
}

impl Default for StagingOpts {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            prefix: "mp4demux-".to_string(),
        }
    }
}
