use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::{Parser, ValueEnum};

use mp4demux::demuxer::WINDOW_MULTIPLIER;
use mp4demux::logging;
use mp4demux::ports::{AudioCoding, OUTPUT_PORTS, PortDefinition, VideoCoding};
use mp4demux::{DemuxerOpts, MemoryPorts, Mp4Demuxer, Processor, SessionReport, StagingOpts};

fn main() -> Result<()> {
    logging::init();
    let params = Params::parse();

    ensure!(params.chunk_size > 0, "chunk size must be positive");
    ensure!(
        params.chunk_size <= params.input_buffer_size * WINDOW_MULTIPLIER,
        "chunk size {} exceeds the ingest window ({} x input buffer size {})",
        params.chunk_size,
        WINDOW_MULTIPLIER,
        params.input_buffer_size
    );

    let data = std::fs::read(&params.input)
        .with_context(|| format!("failed to read '{}'", params.input.display()))?;

    let ports = MemoryPorts::new(
        PortDefinition::container(params.input_buffer_size),
        PortDefinition::audio(params.output_buffer_size, params.audio.into()),
        PortDefinition::video(
            params.output_buffer_size,
            if params.video_auto_detect {
                VideoCoding::AutoDetect
            } else {
                VideoCoding::Unused
            },
        ),
    );

    let opts = DemuxerOpts {
        stream_name: params
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DemuxerOpts::default().stream_name),
        staging: StagingOpts {
            enabled: !params.no_staging,
            dir: params.staging_dir.clone(),
            ..Default::default()
        },
    };

    let mut demuxer = Mp4Demuxer::new(ports, opts);
    demuxer.allocate_resources()?;
    demuxer.prepare_to_transfer()?;

    let outcome = feed(&mut demuxer, &data, params.chunk_size, params.output_buffer_size);

    SessionReport::collect(&demuxer).write_json(io::stdout().lock())?;

    demuxer.stop_and_return()?;
    demuxer.deallocate_resources()?;
    outcome
}

/// Push `data` through the demuxer in `chunk_size` pieces, then drain what it queued.
fn feed(
    demuxer: &mut Mp4Demuxer<MemoryPorts>,
    data: &[u8],
    chunk_size: usize,
    output_buffer_size: usize,
) -> Result<()> {
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![data]
    } else {
        data.chunks(chunk_size).collect()
    };
    let last = chunks.len() - 1;

    for (i, chunk) in chunks.into_iter().enumerate() {
        demuxer.ports_mut().push_input(chunk, i == last);
        top_up_outputs(demuxer, output_buffer_size);
        demuxer.buffers_ready()?;
    }

    // Chunks queued on the final call still need buffers, and so does end-of-stream.
    top_up_outputs(demuxer, output_buffer_size);
    demuxer.buffers_ready()?;
    Ok(())
}

/// Make sure each output port has a buffer for every pending chunk, plus one.
fn top_up_outputs(demuxer: &mut Mp4Demuxer<MemoryPorts>, output_buffer_size: usize) {
    for port in OUTPUT_PORTS {
        let wanted = demuxer.pending_chunks(port) + 1;
        while demuxer.ports().held(port) < wanted {
            demuxer.ports_mut().offer_output(port, output_buffer_size);
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AudioArg {
    Auto,
    Unused,
    Mp3,
    Aac,
    Amr,
}

impl From<AudioArg> for AudioCoding {
    fn from(arg: AudioArg) -> Self {
        match arg {
            AudioArg::Auto => AudioCoding::AutoDetect,
            AudioArg::Unused => AudioCoding::Unused,
            AudioArg::Mp3 => AudioCoding::Mp3,
            AudioArg::Aac => AudioCoding::Aac,
            AudioArg::Amr => AudioCoding::Amr,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mp4demux-cli")]
#[command(about = "Feed an MP4 file through the streaming demuxer and report what it found")]
struct Params {
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Size of each input buffer pushed into the demuxer.
    #[arg(short = 'c', long = "chunk-size", default_value_t = 4096)]
    pub chunk_size: usize,

    /// Nominal input port buffer size; the ingest window is four times this.
    #[arg(long = "input-buffer-size", default_value_t = 64 * 1024)]
    pub input_buffer_size: usize,

    #[arg(long = "output-buffer-size", default_value_t = 4096)]
    pub output_buffer_size: usize,

    /// Coding configured on the audio port before the stream starts.
    #[arg(short = 'a', long = "audio", value_enum, default_value_t = AudioArg::Auto)]
    pub audio: AudioArg,

    #[arg(long = "video-auto-detect", default_value_t = false)]
    pub video_auto_detect: bool,

    #[arg(long = "no-staging", default_value_t = false)]
    pub no_staging: bool,

    #[arg(long = "staging-dir")]
    pub staging_dir: Option<PathBuf>,
}
