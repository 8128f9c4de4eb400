//! `mp4demux`: a streaming MP4 demuxer stage for media pipelines.
//!
//! This crate provides:
//! - A bounded, seekable ingest window over the container bytes received so far
//! - A virtual-file adapter that lets a conventional container parser run over that window
//! - A parser lifecycle that retries until enough of the container has arrived
//! - Track classification and codec detection, with decoder configuration delivered on the
//!   audio output port
//! - A built-in ISO-BMFF (MP4/M4A/MOV) metadata parser
//!
//! The demuxer is driven by a scheduler through the [`Processor`] trait and talks to its host
//! pipeline through [`PortManager`]. Everything runs synchronously on the caller's thread.

// High-level API (most consumers should start here).
pub mod demuxer;
pub mod opts;
pub mod processor;

// Pipeline-facing vocabulary and an in-process port manager.
pub mod memory_ports;
pub mod ports;

// Container access: ingest window, virtual file, parser.
pub mod ingest;
pub mod lifecycle;
pub mod parser;
pub mod provider;

// Per-session state.
pub mod staging;
pub mod store;
pub mod tracks;

// Session summaries.
pub mod report;

// Logging configuration.
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use demuxer::Mp4Demuxer;
pub use error::{Error, Result};
pub use memory_ports::MemoryPorts;
pub use opts::{DemuxerOpts, StagingOpts};
pub use parser::{ContainerParser, IsoBmffParser};
pub use ports::{PortIndex, PortManager, PortSelector};
pub use processor::Processor;
pub use report::SessionReport;
