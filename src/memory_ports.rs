//! An in-process [`PortManager`] backed by plain queues.
//!
//! Used by the CLI and the tests to drive a demuxer without a host pipeline: callers queue
//! input buffers and empty output buffers, run the demuxer, then inspect what was released
//! and which events were issued.

use std::collections::VecDeque;

use tracing::debug;

use crate::ports::{BufferHeader, Event, PortDefinition, PortFormat, PortIndex, PortManager};
use crate::{Error, Result};

#[derive(Debug)]
struct PortSlot {
    definition: PortDefinition,
    enabled: bool,
    queue: VecDeque<BufferHeader>,
    released: Vec<BufferHeader>,
}

impl PortSlot {
    fn new(definition: PortDefinition) -> Self {
        Self {
            definition,
            enabled: true,
            queue: VecDeque::new(),
            released: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct MemoryPorts {
    slots: [PortSlot; 3],
    eos: bool,
    events: Vec<Event>,
}

impl MemoryPorts {
    pub fn new(input: PortDefinition, audio: PortDefinition, video: PortDefinition) -> Self {
        Self {
            slots: [PortSlot::new(input), PortSlot::new(audio), PortSlot::new(video)],
            eos: false,
            events: Vec::new(),
        }
    }

    /// Queue an input buffer carrying `bytes`.
    pub fn push_input(&mut self, bytes: &[u8], eos: bool) {
        self.slot_mut(PortIndex::Input)
            .queue
            .push_back(BufferHeader::with_payload(bytes, eos));
    }

    /// Queue an empty buffer of `capacity` bytes on an output port.
    pub fn offer_output(&mut self, port: PortIndex, capacity: usize) {
        self.slot_mut(port)
            .queue
            .push_back(BufferHeader::with_capacity(capacity));
    }

    /// Buffers queued on `port` and not yet released.
    pub fn held(&self, port: PortIndex) -> usize {
        self.slot(port).queue.len()
    }

    pub fn released(&self, port: PortIndex) -> &[BufferHeader] {
        &self.slot(port).released
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn slot(&self, port: PortIndex) -> &PortSlot {
        &self.slots[port.as_usize()]
    }

    fn slot_mut(&mut self, port: PortIndex) -> &mut PortSlot {
        &mut self.slots[port.as_usize()]
    }
}

impl PortManager for MemoryPorts {
    fn header(&mut self, port: PortIndex) -> Option<&mut BufferHeader> {
        self.slot_mut(port).queue.front_mut()
    }

    fn release_header(&mut self, port: PortIndex) -> Result<()> {
        let slot = self.slot_mut(port);
        if let Some(header) = slot.queue.pop_front() {
            slot.released.push(header);
        }
        Ok(())
    }

    fn is_port_enabled(&self, port: PortIndex) -> bool {
        self.slot(port).enabled
    }

    fn update_port_disabled(&mut self, port: PortIndex, disabled: bool) {
        self.slot_mut(port).enabled = !disabled;
    }

    fn is_eos(&self) -> bool {
        self.eos
    }

    fn update_eos(&mut self, eos: bool) {
        self.eos = eos;
    }

    fn port_definition(&self, port: PortIndex) -> Result<PortDefinition> {
        Ok(self.slot(port).definition)
    }

    fn set_port_definition(&mut self, port: PortIndex, definition: PortDefinition) -> Result<()> {
        let matches_port = matches!(
            (port, definition.format),
            (PortIndex::Input, PortFormat::Container)
                | (PortIndex::Audio, PortFormat::Audio(_))
                | (PortIndex::Video, PortFormat::Video(_))
        );
        if !matches_port {
            return Err(Error::msg(format!(
                "format {:?} does not belong on port {port}",
                definition.format
            )));
        }
        self.slot_mut(port).definition = definition;
        Ok(())
    }

    fn issue_event(&mut self, event: Event) {
        debug!(?event, "event");
        self.events.push(event);
    }
}
