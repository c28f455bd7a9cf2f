//! Data structures for tracking simulated process state.
//!
//! `ProcessStatus` is the lifecycle status of a project and `ProcessState` the runtime
//! record the lifecycle state machine keeps for it.

use chrono::{DateTime, Utc};

/// The current lifecycle status of a simulated process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessStatus {
    /// Not running. Also what an unknown project reads as.
    #[default]
    Stopped,
    /// Startup output is streaming in.
    Starting,
    /// Started and holding its port.
    Running,
    /// Reserved; no transition currently enters it.
    Error,
    /// Termination requested, waiting for the stop delay.
    Stopping,
}

impl ProcessStatus {
    pub fn label(self) -> &'static str {
        match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Error => "error",
            ProcessStatus::Stopping => "stopping",
        }
    }

    /// Whether a start or stop is already in flight or done.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ProcessStatus::Starting | ProcessStatus::Running | ProcessStatus::Stopping
        )
    }
}

/// Runtime state of a single simulated process.
#[derive(Debug, Clone, Default)]
pub struct ProcessState {
    /// Current status.
    pub status: ProcessStatus,
    /// Simulated process id, set on transition to Running.
    pub pid: Option<u32>,
    /// Time the last start was requested.
    pub started_at: Option<DateTime<Utc>>,
    /// Simulated resident memory in MB, set with the pid.
    pub memory_mb: Option<u32>,
    /// Bumped on every start/stop; delayed events carrying an older epoch are stale.
    pub epoch: u64,
}

impl ProcessState {
    /// Uptime since the start request, if the process is running.
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        if self.status != ProcessStatus::Running {
            return None;
        }
        self.started_at.map(|at| now.signed_duration_since(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_stopped() {
        let state = ProcessState::default();
        assert_eq!(state.status, ProcessStatus::Stopped);
        assert!(state.pid.is_none());
        assert!(!state.status.is_active());
    }

    #[test]
    fn uptime_only_while_running() {
        let now = Utc::now();
        let mut state = ProcessState {
            started_at: Some(now - chrono::Duration::seconds(90)),
            status: ProcessStatus::Starting,
            ..ProcessState::default()
        };
        assert!(state.uptime(now).is_none());
        state.status = ProcessStatus::Running;
        assert_eq!(state.uptime(now).map(|d| d.num_seconds()), Some(90));
    }
}
