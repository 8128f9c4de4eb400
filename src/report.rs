use std::io::Write;

use serde::Serialize;

use crate::Result;
use crate::demuxer::Mp4Demuxer;
use crate::lifecycle::ParserState;
use crate::memory_ports::MemoryPorts;
use crate::parser::ContainerParser;
use crate::ports::{Event, OUTPUT_PORTS, PortFormat, PortIndex};
use crate::tracks::TrackDescriptor;

/// A serializable summary of one demuxing session.
///
/// Example output:
/// ```json
/// {
///   "parser_state": "initialized",
///   "failed_attempts": 2,
///   "tracks": [{ "id": 1, "kind": "audio", "audio_codec": "aac" }],
///   "ports": [{ "port": "audio", "format": { "domain": "audio", "coding": "aac" }, ... }],
///   "events": [{ "event": "port_format_detected" }]
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub parser_state: ParserState,
    pub failed_attempts: u32,
    pub tracks: Vec<TrackDescriptor>,
    pub ports: Vec<PortReport>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortReport {
    pub port: PortIndex,
    pub format: PortFormat,
    pub auto_detect: bool,
    pub metadata_delivered: bool,
    /// Filled length of every buffer released on this port, in release order.
    pub delivered_chunks: Vec<usize>,
    pub eos: bool,
}

impl SessionReport {
    /// Snapshot a demuxer driven through [`MemoryPorts`].
    pub fn collect<P: ContainerParser>(demuxer: &Mp4Demuxer<MemoryPorts, P>) -> Self {
        let ports = demuxer.ports();
        let port_reports = OUTPUT_PORTS
            .iter()
            .map(|&port| {
                let descriptor = demuxer.descriptor(port);
                let released = ports.released(port);
                PortReport {
                    port,
                    format: descriptor.format,
                    auto_detect: descriptor.auto_detect,
                    metadata_delivered: demuxer.metadata_delivered(port),
                    delivered_chunks: released.iter().map(|h| h.filled_len()).collect(),
                    eos: released.iter().any(|h| h.is_eos()),
                }
            })
            .collect();

        Self {
            parser_state: demuxer.parser_state(),
            failed_attempts: demuxer.failed_attempts(),
            tracks: demuxer.tracks().to_vec(),
            ports: port_reports,
            events: ports.events().to_vec(),
        }
    }

    /// Write the report as pretty-printed JSON followed by a newline.
    pub fn write_json<W: Write>(&self, mut w: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut w, self)?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }
}
