use std::fmt::{self, Display, Formatter};

use serde_derive::Serialize;

/// Lifecycle of one printer's test run.
///
/// `Idle -> Registering -> Ready -> Printing <-> CycleWait`, ending in
/// `Disconnected` (printer unplugged), `Stopped` (shutdown requested)
/// or `Failed` (queue could not be registered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Idle,
    Registering,
    Ready,
    Printing,
    CycleWait,
    Disconnected,
    Stopped,
    Failed,
}

impl DriverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DriverState::Disconnected | DriverState::Stopped | DriverState::Failed)
    }
}

impl Display for DriverState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Idle => "idle",
            DriverState::Registering => "registering",
            DriverState::Ready => "ready",
            DriverState::Printing => "printing",
            DriverState::CycleWait => "waiting for next cycle",
            DriverState::Disconnected => "disconnected",
            DriverState::Stopped => "stopped",
            DriverState::Failed => "failed",
        };
        f.write_str(name)
    }
}
