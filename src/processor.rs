use crate::Result;
use crate::ports::PortSelector;

/// The scheduler-facing surface of a filter stage.
///
/// The scheduler drives a processor through these calls, one at a time, on its own thread.
/// Every call is synchronous; "not enough data yet" is reported as `Ok(())` and the scheduler
/// simply calls again later, typically via [`buffers_ready`](Self::buffers_ready) once a port
/// has new buffers.
pub trait Processor {
    /// Acquire the stage's working memory. Called once before any data flows.
    fn allocate_resources(&mut self) -> Result<()>;

    fn deallocate_resources(&mut self) -> Result<()>;

    /// Last call before data starts flowing; port formats are final at this point.
    fn prepare_to_transfer(&mut self) -> Result<()>;

    fn transfer_and_process(&mut self) -> Result<()>;

    fn stop_and_return(&mut self) -> Result<()>;

    /// Buffers are available on one or more ports.
    fn buffers_ready(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Return held buffers on the selected ports.
    fn port_flush(&mut self, ports: PortSelector) -> Result<()>;

    fn port_disable(&mut self, ports: PortSelector) -> Result<()>;

    fn port_enable(&mut self, ports: PortSelector) -> Result<()>;
}
