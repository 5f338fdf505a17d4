use crate::printer::PrintJob;
use anyhow::Result;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Edge reported by the shutter button
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// One raw button edge, stamped on receipt with a monotonic instant
#[derive(Clone, Copy, Debug)]
pub struct ButtonEvent {
    pub edge: Edge,
    pub at: Instant,
}

/// Lifecycle of the device as seen by the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// Accepting shutter gestures
    Ready,
    /// Hardware fault: signaling SOS, ignoring input until terminated
    Halted,
    /// Power-off requested, ignoring input
    ShuttingDown,
}

/// Commands for the printer service
pub enum PrinterCommand {
    Print {
        job: PrintJob,
        reply: oneshot::Sender<Result<()>>,
    },
}
