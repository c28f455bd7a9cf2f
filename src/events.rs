//! Event definitions for the application event loop.
//!
//! Every state change in devrack is applied by the event loop in response to one of
//! these events. Timers and text-generation requests run as background tasks and only
//! ever post events back, so domain state has a single writer.

use crossterm::event::{KeyEvent, MouseEvent};

use crate::output::Severity;
use crate::project::ProjectId;

/// Represents an event in the application's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// Startup lines for a starting project arrived from the generator.
    StartupLines {
        id: ProjectId,
        epoch: u64,
        lines: Vec<String>,
    },
    /// A staggered startup line is due.
    ScheduledLog {
        id: ProjectId,
        epoch: u64,
        text: String,
        severity: Severity,
    },
    /// The start delay elapsed; the project should become Running.
    StartSettled { id: ProjectId, epoch: u64 },
    /// The stop delay elapsed; the project should become Stopped.
    StopSettled { id: ProjectId, epoch: u64 },
    /// The background emitter's period elapsed.
    EmitterTick,
    /// A runtime line arrived for a running project.
    RuntimeLine { id: ProjectId, line: String },
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// A mouse event received from the user.
    Mouse(MouseEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// Ctrl-C or SIGTERM was received.
    Shutdown,
}
