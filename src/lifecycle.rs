//! Simulated process lifecycle.
//!
//! `Lifecycle` owns one `ProcessState` per project and drives the
//! Stopped -> Starting -> Running -> Stopping -> Stopped cycle. Nothing is spawned:
//! transitions that take time are scheduled as delayed events on the application's
//! event channel and applied when they come back through the event loop.
//!
//! Every start or stop bumps the project's epoch. A delayed event is applied only
//! if it carries the current epoch and the project is still in the state the event
//! expects, so stopping a project mid-start discards its pending startup output
//! and its pending Running transition.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CoordinatorError;
use crate::events::Event;
use crate::generator::{startup_fallback, LogGenerator};
use crate::output::{LogStore, Severity};
use crate::process::{ProcessState, ProcessStatus};
use crate::project::{Project, ProjectId};

/// Range simulated pids are drawn from.
pub const PID_RANGE: std::ops::RangeInclusive<u32> = 1000..=9999;
/// Range simulated memory figures (MB) are drawn from.
pub const MEMORY_RANGE_MB: std::ops::RangeInclusive<u32> = 40..=320;

/// Delays of the simulated transitions.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Gap between consecutive startup lines.
    pub stagger: Duration,
    /// Added after the last startup line before the project counts as running.
    pub start_buffer: Duration,
    /// Time between the termination request and Stopped.
    pub stop_delay: Duration,
    /// Longest wait for generated startup lines before the fallback is used.
    pub generation_wait: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            stagger: Duration::from_millis(200),
            start_buffer: Duration::from_millis(500),
            stop_delay: Duration::from_millis(1000),
            generation_wait: Duration::from_millis(3000),
        }
    }
}

impl Timings {
    /// Delay from the arrival of `lines` startup lines until Running.
    pub fn settle_delay(&self, lines: usize) -> Duration {
        self.line_offset(lines).saturating_add(self.start_buffer)
    }

    /// Offset of the `idx`th startup line from the first.
    pub fn line_offset(&self, idx: usize) -> Duration {
        self.stagger
            .saturating_mul(u32::try_from(idx).unwrap_or(u32::MAX))
    }
}

/// Result of a start request that was accepted by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The project moved to Starting.
    Starting,
    /// Another running project holds the port; nothing changed but the log.
    PortInUse { port: u16, holder: String },
}

/// Per-project status table and transition scheduler.
pub struct Lifecycle {
    states: HashMap<ProjectId, ProcessState>,
    timings: Timings,
    event_tx: mpsc::Sender<Event>,
}

impl Lifecycle {
    pub fn new(timings: Timings, event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            states: HashMap::new(),
            timings,
            event_tx,
        }
    }

    /// Registers a project as Stopped. Existing state is kept.
    pub fn insert(&mut self, id: &ProjectId) {
        self.states.entry(id.clone()).or_default();
    }

    pub fn remove(&mut self, id: &ProjectId) {
        self.states.remove(id);
    }

    pub fn state(&self, id: &ProjectId) -> Option<&ProcessState> {
        self.states.get(id)
    }

    /// Status of a project; unknown projects read as Stopped.
    pub fn status(&self, id: &ProjectId) -> ProcessStatus {
        self.states
            .get(id)
            .map(|state| state.status)
            .unwrap_or_default()
    }

    /// Begins the simulated start of `project`.
    ///
    /// Refuses a project that is already starting, running or stopping. When another
    /// running project in `projects` declares the same port, a single error entry is
    /// logged and the status is left alone.
    pub fn start(
        &mut self,
        project: &Project,
        projects: &[Project],
        logs: &mut LogStore,
        generator: &LogGenerator,
    ) -> Result<StartOutcome, CoordinatorError> {
        let status = self.status(&project.id);
        if status.is_active() {
            return Err(CoordinatorError::AlreadyActive {
                name: project.name.clone(),
                status: status.label(),
            });
        }

        let holder = projects.iter().find(|other| {
            other.id != project.id
                && other.port == project.port
                && self.status(&other.id) == ProcessStatus::Running
        });
        if let Some(holder) = holder {
            info!(project = %project.name, port = project.port, holder = %holder.name, "port conflict");
            logs.append(
                &project.id,
                format!(
                    "Error: port {} is already in use by {}",
                    project.port, holder.name
                ),
                Severity::Error,
            );
            return Ok(StartOutcome::PortInUse {
                port: project.port,
                holder: holder.name.clone(),
            });
        }

        let state = self.states.entry(project.id.clone()).or_default();
        state.epoch += 1;
        state.status = ProcessStatus::Starting;
        state.started_at = Some(Utc::now());
        state.pid = None;
        state.memory_mb = None;
        let epoch = state.epoch;
        info!(project = %project.name, epoch, "starting");

        logs.append(&project.id, project.invocation(), Severity::Info);

        let generator = generator.clone();
        let project = project.clone();
        let tx = self.event_tx.clone();
        let wait = self.timings.generation_wait;
        tokio::spawn(async move {
            let request = generator.request_startup_lines(&project);
            let lines = match tokio::time::timeout(wait, request).await {
                Ok(lines) => lines,
                Err(_) => {
                    warn!(project = %project.name, "startup generation timed out, using fallback");
                    startup_fallback(&project)
                }
            };
            let _ = tx
                .send(Event::StartupLines {
                    id: project.id,
                    epoch,
                    lines,
                })
                .await;
        });
        Ok(StartOutcome::Starting)
    }

    /// Stages generated startup lines and the Running transition.
    pub fn on_startup_lines(&mut self, id: &ProjectId, epoch: u64, lines: Vec<String>) {
        if !self.is_current(id, epoch, ProcessStatus::Starting) {
            debug!(project = %id, epoch, "dropping stale startup lines");
            return;
        }
        let timings = self.timings;
        let settle = timings.settle_delay(lines.len());
        let tx = self.event_tx.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let base = Instant::now();
            for (idx, text) in lines.into_iter().enumerate() {
                tokio::time::sleep(deadline(base, timings.line_offset(idx))).await;
                let sent = tx
                    .send(Event::ScheduledLog {
                        id: id.clone(),
                        epoch,
                        text,
                        severity: Severity::Info,
                    })
                    .await;
                if sent.is_err() {
                    return;
                }
            }
            tokio::time::sleep(deadline(base, settle)).await;
            let _ = tx.send(Event::StartSettled { id, epoch }).await;
        });
    }

    /// Appends a staggered startup line if its start is still in progress.
    pub fn on_scheduled_log(
        &self,
        id: &ProjectId,
        epoch: u64,
        text: String,
        severity: Severity,
        logs: &mut LogStore,
    ) {
        if self.is_current(id, epoch, ProcessStatus::Starting) {
            logs.append(id, text, severity);
        }
    }

    /// Completes a start: Running, with a fresh pid and memory figure.
    pub fn on_start_settled(
        &mut self,
        project: &Project,
        epoch: u64,
        rng: &mut StdRng,
        logs: &mut LogStore,
    ) {
        if !self.is_current(&project.id, epoch, ProcessStatus::Starting) {
            debug!(project = %project.name, epoch, "dropping stale start completion");
            return;
        }
        let Some(state) = self.states.get_mut(&project.id) else {
            return;
        };
        let pid = rng.random_range(PID_RANGE);
        state.status = ProcessStatus::Running;
        state.pid = Some(pid);
        state.memory_mb = Some(rng.random_range(MEMORY_RANGE_MB));
        info!(project = %project.name, pid, "running");
        logs.append(
            &project.id,
            format!(
                "Process started successfully (PID: {}) on http://localhost:{}",
                pid, project.port
            ),
            Severity::Success,
        );
    }

    /// Begins the simulated stop of `project`. Cancels any start in progress.
    pub fn stop(&mut self, project: &Project, logs: &mut LogStore) -> Result<(), CoordinatorError> {
        let state = self.states.entry(project.id.clone()).or_default();
        match state.status {
            ProcessStatus::Stopped | ProcessStatus::Error => {
                return Err(CoordinatorError::NotRunning {
                    name: project.name.clone(),
                });
            }
            ProcessStatus::Stopping => {
                return Err(CoordinatorError::AlreadyActive {
                    name: project.name.clone(),
                    status: ProcessStatus::Stopping.label(),
                });
            }
            ProcessStatus::Starting | ProcessStatus::Running => {}
        }
        state.epoch += 1;
        state.status = ProcessStatus::Stopping;
        let epoch = state.epoch;
        info!(project = %project.name, epoch, "stopping");
        logs.append(&project.id, "Sending SIGTERM to process...", Severity::Info);

        let tx = self.event_tx.clone();
        let id = project.id.clone();
        let delay = self.timings.stop_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::StopSettled { id, epoch }).await;
        });
        Ok(())
    }

    /// Completes a stop: Stopped, with the simulated pid released.
    pub fn on_stop_settled(&mut self, project: &Project, epoch: u64, logs: &mut LogStore) {
        if !self.is_current(&project.id, epoch, ProcessStatus::Stopping) {
            return;
        }
        let Some(state) = self.states.get_mut(&project.id) else {
            return;
        };
        state.status = ProcessStatus::Stopped;
        state.pid = None;
        state.memory_mb = None;
        state.started_at = None;
        info!(project = %project.name, "stopped");
        logs.append(&project.id, "Process terminated.", Severity::Error);
    }

    fn is_current(&self, id: &ProjectId, epoch: u64, expected: ProcessStatus) -> bool {
        self.states
            .get(id)
            .map(|state| state.epoch == epoch && state.status == expected)
            .unwrap_or(false)
    }
}

/// Time left until `base + offset`, zero once it has passed.
fn deadline(base: Instant, offset: Duration) -> Duration {
    offset.saturating_sub(base.elapsed())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;

    use super::*;
    use crate::generator::testing::ScriptedGenerator;
    use crate::generator::GeneratorOptions;
    use crate::project::sample_projects;

    fn setup() -> (Lifecycle, mpsc::Receiver<Event>, LogStore, LogGenerator) {
        let (tx, rx) = mpsc::channel(64);
        let generator = LogGenerator::new(
            Arc::new(ScriptedGenerator::replying("one\ntwo")),
            GeneratorOptions::default(),
        );
        (Lifecycle::new(Timings::default(), tx), rx, LogStore::new(500), generator)
    }

    #[test]
    fn settle_delay_scales_with_line_count() {
        let timings = Timings::default();
        assert_eq!(timings.settle_delay(0), Duration::from_millis(500));
        assert_eq!(timings.settle_delay(5), Duration::from_millis(1500));
    }

    #[test]
    fn settle_delay_saturates_on_huge_stagger() {
        let timings = Timings {
            stagger: Duration::MAX,
            start_buffer: Duration::from_millis(500),
            ..Timings::default()
        };
        assert_eq!(timings.settle_delay(3), Duration::MAX);
        assert_eq!(timings.line_offset(usize::MAX), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generation_falls_back_after_wait() {
        let (tx, mut rx) = mpsc::channel(64);
        let generator = LogGenerator::new(
            Arc::new(ScriptedGenerator::delayed("late reply", Duration::from_secs(60))),
            GeneratorOptions::default(),
        );
        let mut lifecycle = Lifecycle::new(Timings::default(), tx);
        let mut logs = LogStore::new(500);
        let projects = sample_projects();
        let started = Instant::now();
        lifecycle
            .start(&projects[0], &projects, &mut logs, &generator)
            .unwrap();

        match rx.recv().await {
            Some(Event::StartupLines { lines, .. }) => {
                assert_eq!(lines, startup_fallback(&projects[0]));
            }
            other => panic!("unexpected event {:?}", other),
        }
        let bound = Timings::default().generation_wait + Duration::from_millis(10);
        assert!(started.elapsed() <= bound);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_stagger_does_not_overflow_schedule() {
        let (tx, mut rx) = mpsc::channel(64);
        let timings = Timings {
            stagger: Duration::MAX,
            ..Timings::default()
        };
        let mut lifecycle = Lifecycle::new(timings, tx);
        let mut logs = LogStore::new(500);
        let (_, _rx, _, generator) = setup();
        let projects = sample_projects();
        lifecycle
            .start(&projects[0], &projects, &mut logs, &generator)
            .unwrap();
        let Some(Event::StartupLines { id, epoch, lines }) = rx.recv().await else {
            panic!("expected startup lines");
        };
        lifecycle.on_startup_lines(&id, epoch, lines);
        match rx.recv().await {
            Some(Event::ScheduledLog { text, .. }) => assert_eq!(text, "one"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn unknown_project_reads_stopped() {
        let (tx, _rx) = mpsc::channel(1);
        let lifecycle = Lifecycle::new(Timings::default(), tx);
        assert_eq!(lifecycle.status(&ProjectId::from("nope")), ProcessStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn start_echoes_invocation_and_requests_lines() {
        let (mut lifecycle, mut rx, mut logs, generator) = setup();
        let projects = sample_projects();
        let outcome = lifecycle
            .start(&projects[0], &projects, &mut logs, &generator)
            .unwrap();
        assert_eq!(outcome, StartOutcome::Starting);
        assert_eq!(lifecycle.status(&projects[0].id), ProcessStatus::Starting);
        assert_eq!(logs.read(&projects[0].id)[0].text, "cd ./frontend && npm start");

        match rx.recv().await {
            Some(Event::StartupLines { lines, epoch, .. }) => {
                assert_eq!(lines, vec!["one", "two"]);
                assert_eq!(epoch, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_refused() {
        let (mut lifecycle, _rx, mut logs, generator) = setup();
        let projects = sample_projects();
        lifecycle
            .start(&projects[0], &projects, &mut logs, &generator)
            .unwrap();
        let err = lifecycle
            .start(&projects[0], &projects, &mut logs, &generator)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyActive { .. }));
        assert_eq!(logs.len(&projects[0].id), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_is_ignored_after_stop() {
        let (mut lifecycle, _rx, mut logs, generator) = setup();
        let projects = sample_projects();
        let mut rng = StdRng::seed_from_u64(7);
        lifecycle
            .start(&projects[0], &projects, &mut logs, &generator)
            .unwrap();
        lifecycle.stop(&projects[0], &mut logs).unwrap();
        lifecycle.on_scheduled_log(&projects[0].id, 1, "late".into(), Severity::Info, &mut logs);
        lifecycle.on_start_settled(&projects[0], 1, &mut rng, &mut logs);
        assert_eq!(lifecycle.status(&projects[0].id), ProcessStatus::Stopping);
        assert!(logs.iter(&projects[0].id).all(|e| e.text != "late"));
        assert!(lifecycle.state(&projects[0].id).unwrap().pid.is_none());
    }

    #[test]
    fn stop_of_stopped_project_is_refused() {
        let (tx, _rx) = mpsc::channel(1);
        let mut lifecycle = Lifecycle::new(Timings::default(), tx);
        let mut logs = LogStore::new(10);
        let project = sample_projects().remove(0);
        let err = lifecycle.stop(&project, &mut logs).unwrap_err();
        assert!(matches!(err, CoordinatorError::NotRunning { .. }));
        assert_eq!(logs.len(&project.id), 0);
    }
}
