// src/demuxer.rs

//! The MP4 demuxer filter stage.
//!
//! [`Mp4Demuxer`] ties the pieces together and exposes them to the scheduler through
//! [`Processor`]:
//! - input buffers are absorbed into the [`IngestWindow`] (and mirrored to the staging file)
//! - the container parser is (re)tried on every `buffers_ready` until it succeeds or its
//!   attempt budget runs out
//! - on success, tracks are classified, codec configuration is queued per output port, and
//!   auto-detect ports are told what was found
//! - queued chunks are delivered into output buffers, with end-of-stream tagged once a port's
//!   queue has drained

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::ingest::IngestWindow;
use crate::lifecycle::{Attempt, ParserLifecycle, ParserState};
use crate::opts::DemuxerOpts;
use crate::parser::{ContainerParser, IsoBmffParser};
use crate::ports::{
    Event, OUTPUT_PORTS, PortDescriptor, PortFormat, PortIndex, PortManager, PortSelector,
    SettingsField,
};
use crate::processor::Processor;
use crate::provider::{InputSource, StreamProvider};
use crate::staging::StagingFile;
use crate::store::OutputStore;
use crate::tracks::{self, TrackDescriptor};
use crate::{Error, Result};

/// Ingest window capacity, in multiples of the input port's buffer size.
pub const WINDOW_MULTIPLIER: usize = 4;

/// Streaming MP4 demuxer driven by a pipeline scheduler.
///
/// `M` is the host pipeline's port manager. `P` is the container parser, defaulting to the
/// built-in ISO-BMFF parser; use [`Mp4Demuxer::with_parser`] to plug in another one.
pub struct Mp4Demuxer<M: PortManager, P: ContainerParser = IsoBmffParser> {
    id: Uuid,
    opts: DemuxerOpts,
    ports: M,
    window: Option<IngestWindow>,
    // Indexed by output port: audio, then video.
    stores: [OutputStore; 2],
    staging: StagingFile,
    lifecycle: ParserLifecycle<P>,
    descriptors: [PortDescriptor; 3],
    tracks: Vec<TrackDescriptor>,
    // Why the last extraction pass was abandoned; cleared by an input reset.
    extraction_failure: Option<String>,
}

impl<M: PortManager> Mp4Demuxer<M, IsoBmffParser> {
    /// Create a demuxer using the built-in ISO-BMFF parser.
    pub fn new(ports: M, opts: DemuxerOpts) -> Self {
        Self::with_parser(ports, opts)
    }
}

impl<M: PortManager, P: ContainerParser> Mp4Demuxer<M, P> {
    /// Create a demuxer using a custom container parser.
    pub fn with_parser(ports: M, opts: DemuxerOpts) -> Self {
        let staging = StagingFile::new(opts.staging.clone());
        let id = Uuid::new_v4();
        debug!(demuxer = %id, stream = %opts.stream_name, "created demuxer");
        Self {
            id,
            opts,
            ports,
            window: None,
            stores: [OutputStore::new(), OutputStore::new()],
            staging,
            lifecycle: ParserLifecycle::new(),
            descriptors: [
                PortDescriptor::new(PortIndex::Input),
                PortDescriptor::new(PortIndex::Audio),
                PortDescriptor::new(PortIndex::Video),
            ],
            tracks: Vec::new(),
            extraction_failure: None,
        }
    }

    /// Session id; also the handle the parser sees on its virtual file.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ports(&self) -> &M {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut M {
        &mut self.ports
    }

    pub fn parser_state(&self) -> ParserState {
        self.lifecycle.state()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.lifecycle.failed_attempts()
    }

    pub fn has_parser(&self) -> bool {
        self.lifecycle.parser().is_some()
    }

    pub fn parser(&self) -> Option<&P> {
        self.lifecycle.parser()
    }

    pub fn descriptor(&self, port: PortIndex) -> &PortDescriptor {
        &self.descriptors[port.as_usize()]
    }

    /// Whether every codec-configuration chunk queued for `port` has been delivered.
    ///
    /// Always `false` for the input port.
    pub fn metadata_delivered(&self, port: PortIndex) -> bool {
        store_index(port).is_some_and(|i| self.stores[i].metadata_delivered())
    }

    /// Chunks still waiting for an output buffer on `port`.
    pub fn pending_chunks(&self, port: PortIndex) -> usize {
        store_index(port).map_or(0, |i| self.stores[i].queued_chunks())
    }

    /// Tracks found by the last successful parse.
    pub fn tracks(&self) -> &[TrackDescriptor] {
        &self.tracks
    }

    /// Container bytes received but not yet read by the parser.
    pub fn ingest_available(&self) -> usize {
        self.window.as_ref().map_or(0, IngestWindow::available)
    }

    pub fn staging_path(&self) -> Option<&std::path::Path> {
        self.staging.path()
    }

    fn try_initialize(&mut self) -> Result<bool> {
        if let Some(reason) = &self.extraction_failure {
            return Err(Error::resources(reason.clone()));
        }

        let (attempt, absorb_error) = {
            let window = self.window.as_mut().ok_or(Error::NotReady)?;
            let mut feed = InputFeed {
                ports: &mut self.ports,
                staging: &mut self.staging,
            };
            feed.pump(Some(&mut *window))?;

            let mut provider = StreamProvider::new(self.id, window, &mut feed);
            let attempt = self.lifecycle.attempt(&mut provider, &self.opts.stream_name);
            (attempt, provider.take_error())
        };

        if attempt == Attempt::Initialized {
            self.on_parser_initialized()?;
        }
        if let Some(err) = absorb_error {
            return Err(err);
        }

        match attempt {
            Attempt::AlreadyInitialized | Attempt::Initialized => Ok(true),
            Attempt::RetryLater { attempts } => {
                trace!(demuxer = %self.id, attempts, "waiting for more container data");
                Ok(false)
            }
            Attempt::GaveUp { attempts } => Err(Error::StreamCorruptFatal { attempts }),
        }
    }

    fn on_parser_initialized(&mut self) -> Result<()> {
        let Some(parser) = self.lifecycle.parser() else {
            return Ok(());
        };
        let extraction = match tracks::extract(parser) {
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(demuxer = %self.id, error = %err, "abandoning metadata extraction");
                self.lifecycle.abandon();
                self.extraction_failure = Some(format!("metadata extraction failed: {err}"));
                return Err(err);
            }
        };

        let [audio_store, _] = &mut self.stores;
        for config in &extraction.audio_configs {
            audio_store.stage(config);
        }
        self.tracks = extraction.tracks;

        if let Some(coding) = extraction.audio_coding {
            let format = PortFormat::Audio(coding);
            self.descriptors[PortIndex::Audio.as_usize()].format = format;
            if !format.is_unset() {
                let mut definition = self.ports.port_definition(PortIndex::Audio)?;
                definition.format = format;
                self.ports.set_port_definition(PortIndex::Audio, definition)?;
            }
        }

        debug!(
            demuxer = %self.id,
            tracks = self.tracks.len(),
            audio = ?self.descriptors[PortIndex::Audio.as_usize()].format,
            "container metadata extracted"
        );
        self.send_auto_detect_events();
        Ok(())
    }

    fn send_auto_detect_events(&mut self) {
        for port in OUTPUT_PORTS {
            let descriptor = self.descriptors[port.as_usize()];
            if !descriptor.auto_detect {
                continue;
            }
            if descriptor.format.is_unset() {
                warn!(demuxer = %self.id, %port, "format not detected");
                self.descriptors[port.as_usize()].format = PortFormat::unused_for(port);
                self.ports.issue_event(Event::FormatNotDetected { port });
            } else {
                debug!(demuxer = %self.id, %port, format = ?descriptor.format, "format detected");
                self.ports.issue_event(Event::PortFormatDetected);
                self.ports.issue_event(Event::PortSettingsChanged {
                    port,
                    field: SettingsField::PortDefinition,
                });
            }
        }
    }

    /// Move queued chunks on `port` into output buffers, one chunk per buffer.
    fn deliver(&mut self, port: PortIndex) -> Result<()> {
        let Some(index) = store_index(port) else {
            return Ok(());
        };
        if !self.ports.is_port_enabled(port) {
            return Ok(());
        }

        loop {
            let store = &mut self.stores[index];
            let Some(chunk) = store.front_chunk() else {
                break;
            };
            let Some(header) = self.ports.header(port) else {
                break;
            };

            let copied = header.append(chunk);
            if copied < chunk.len() {
                warn!(
                    demuxer = %self.id,
                    %port,
                    chunk = chunk.len(),
                    copied,
                    "output buffer too small; chunk truncated"
                );
            }
            store.pop_chunk();
            trace!(demuxer = %self.id, %port, copied, "delivered chunk");
            self.release_output(port)?;
        }

        // Nothing left to carry the end-of-stream flag: send it on an empty buffer.
        if self.stores[index].is_drained()
            && self.ports.is_eos()
            && !self.descriptors[port.as_usize()].eos_propagated
            && self.ports.header(port).is_some()
        {
            self.release_output(port)?;
        }
        Ok(())
    }

    fn release_output(&mut self, port: PortIndex) -> Result<()> {
        let drained = store_index(port).is_none_or(|i| self.stores[i].is_drained());
        let eos = self.ports.is_eos();
        let descriptor = &mut self.descriptors[port.as_usize()];

        let Some(header) = self.ports.header(port) else {
            return Ok(());
        };
        if eos && drained && !descriptor.eos_propagated {
            header.set_eos(true);
            descriptor.eos_propagated = true;
            debug!(demuxer = %self.id, %port, "propagating end of stream");
        }
        self.ports.release_header(port)
    }

    /// Forget the current stream: parser, ingested bytes, queued metadata, port findings.
    fn reset_stream(&mut self) {
        debug!(demuxer = %self.id, "resetting stream parameters");
        for port in OUTPUT_PORTS {
            self.descriptors[port.as_usize()].reset(port);
        }
        self.lifecycle.reset();
        if let Some(window) = self.window.as_mut() {
            window.clear();
        }
        for store in &mut self.stores {
            store.clear();
        }
        self.tracks.clear();
        self.extraction_failure = None;
        self.ports.update_eos(false);
    }

    fn set_enabled(&mut self, ports: PortSelector, enabled: bool) {
        for port in ports.ports() {
            self.descriptors[port.as_usize()].enabled = enabled;
            self.ports.update_port_disabled(port, !enabled);
        }
    }
}

impl<M: PortManager, P: ContainerParser> Processor for Mp4Demuxer<M, P> {
    fn allocate_resources(&mut self) -> Result<()> {
        if self.window.is_some() {
            return Err(Error::IncorrectStateOperation("resources already allocated"));
        }
        let input = self.ports.port_definition(PortIndex::Input)?;
        let capacity = input
            .buffer_size
            .checked_mul(WINDOW_MULTIPLIER)
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                Error::resources(format!("input buffer size {}", input.buffer_size))
            })?;
        debug!(demuxer = %self.id, capacity, "allocating ingest window");
        self.window = Some(IngestWindow::new(capacity));
        Ok(())
    }

    fn deallocate_resources(&mut self) -> Result<()> {
        debug!(demuxer = %self.id, "deallocating resources");
        self.window = None;
        for store in &mut self.stores {
            store.clear();
        }
        self.lifecycle.reset();
        self.tracks.clear();
        self.extraction_failure = None;
        self.staging.close();
        Ok(())
    }

    fn prepare_to_transfer(&mut self) -> Result<()> {
        for port in OUTPUT_PORTS {
            let definition = self.ports.port_definition(port)?;
            let descriptor = &mut self.descriptors[port.as_usize()];
            descriptor.format = definition.format;
            descriptor.auto_detect = definition.format.is_auto_detect();
            debug!(
                demuxer = %self.id,
                %port,
                format = ?definition.format,
                auto_detect = descriptor.auto_detect,
                "prepared port"
            );
        }
        Ok(())
    }

    fn transfer_and_process(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop_and_return(&mut self) -> Result<()> {
        self.port_flush(PortSelector::All)
    }

    fn buffers_ready(&mut self) -> Result<()> {
        trace!(demuxer = %self.id, "buffers ready");
        if !self.try_initialize()? {
            return Ok(());
        }

        // The parser no longer needs input, but upstream must keep flowing.
        InputFeed {
            ports: &mut self.ports,
            staging: &mut self.staging,
        }
        .pump(None)?;

        for port in OUTPUT_PORTS {
            self.deliver(port)?;
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn port_flush(&mut self, ports: PortSelector) -> Result<()> {
        debug!(demuxer = %self.id, ?ports, "flush");
        if ports.includes_input() {
            self.reset_stream();
        }
        for port in ports.ports() {
            self.ports.release_header(port)?;
        }
        Ok(())
    }

    fn port_disable(&mut self, ports: PortSelector) -> Result<()> {
        debug!(demuxer = %self.id, ?ports, "disable");
        for port in ports.ports() {
            self.ports.release_header(port)?;
        }
        if ports.includes_input() {
            self.reset_stream();
        }
        self.set_enabled(ports, false);
        Ok(())
    }

    fn port_enable(&mut self, ports: PortSelector) -> Result<()> {
        debug!(demuxer = %self.id, ?ports, "enable");
        self.set_enabled(ports, true);
        Ok(())
    }
}

fn store_index(port: PortIndex) -> Option<usize> {
    match port {
        PortIndex::Input => None,
        PortIndex::Audio => Some(0),
        PortIndex::Video => Some(1),
    }
}

/// Moves held input buffers into the ingest window and the staging file.
struct InputFeed<'a, M> {
    ports: &'a mut M,
    staging: &'a mut StagingFile,
}

impl<M: PortManager> InputFeed<'_, M> {
    /// Absorb every held input buffer. With a window, a buffer that does not fit stays held
    /// until the window has room; without one, buffers are only mirrored and returned.
    fn pump(&mut self, mut window: Option<&mut IngestWindow>) -> Result<()> {
        while let Some(header) = self.ports.header(PortIndex::Input) {
            let payload = header.payload();
            if let Some(window) = window.as_deref() {
                if payload.len() > window.capacity() {
                    return Err(Error::resources(format!(
                        "input buffer of {} bytes exceeds ingest window of {}",
                        payload.len(),
                        window.capacity()
                    )));
                }
                if payload.len() > window.free() {
                    trace!(size = payload.len(), free = window.free(), "holding input buffer");
                    return Ok(());
                }
            }

            // Mirror first: a buffer held after a failed append must not reach the window twice.
            self.staging.append(payload)?;
            if let Some(window) = window.as_deref_mut() {
                window
                    .push(payload)
                    .map_err(|e| Error::msg(format!("ingest window: {e}")))?;
            }

            let eos = header.is_eos();
            header.set_eos(false);
            if eos {
                debug!("end of stream on input port");
                self.ports.update_eos(true);
            }
            self.ports.release_header(PortIndex::Input)?;
        }
        Ok(())
    }
}

impl<M: PortManager> InputSource for InputFeed<'_, M> {
    fn absorb(&mut self, window: &mut IngestWindow) -> Result<()> {
        self.pump(Some(window))
    }

    fn is_eos(&self) -> bool {
        self.ports.is_eos()
    }
}
