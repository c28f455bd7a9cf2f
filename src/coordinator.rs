//! Orchestration of user actions and background events.
//!
//! The `Coordinator` owns the project collection, the lifecycle table, the log store
//! and the random source. It is the only writer of any of them: user actions call its
//! methods, and events posted by timers and generation tasks are applied through
//! `handle_event` on the event loop.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::emitter::{Activity, Emitter, TickDecision};
use crate::error::CoordinatorError;
use crate::events::Event;
use crate::generator::LogGenerator;
use crate::lifecycle::{Lifecycle, StartOutcome, Timings};
use crate::output::{LogStore, Severity};
use crate::process::{ProcessState, ProcessStatus};
use crate::project::{NewProject, Project, ProjectId};

const RUNTIME_CONTEXT: &str = "either an inbound HTTP request or a completed background task";

/// Tunables handed to the coordinator at construction.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    pub max_lines: usize,
    pub timings: Timings,
    pub emitter: Emitter,
}

pub struct Coordinator {
    projects: Vec<Project>,
    selected: Option<ProjectId>,
    lifecycle: Lifecycle,
    logs: LogStore,
    generator: LogGenerator,
    emitter: Emitter,
    activity: Activity,
    rng: StdRng,
    event_tx: mpsc::Sender<Event>,
}

impl Coordinator {
    /// Creates a coordinator over `projects`, all Stopped, with the first one selected.
    pub fn new(
        projects: Vec<Project>,
        generator: LogGenerator,
        options: CoordinatorOptions,
        rng: StdRng,
        event_tx: mpsc::Sender<Event>,
    ) -> Self {
        let mut lifecycle = Lifecycle::new(options.timings, event_tx.clone());
        for project in &projects {
            lifecycle.insert(&project.id);
        }
        let selected = projects.first().map(|p| p.id.clone());
        Self {
            projects,
            selected,
            lifecycle,
            logs: LogStore::new(options.max_lines),
            generator,
            emitter: options.emitter,
            activity: Activity::Idle,
            rng,
            event_tx,
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| &p.id == id)
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    pub fn state(&self, id: &ProjectId) -> Option<&ProcessState> {
        self.lifecycle.state(id)
    }

    pub fn status(&self, id: &ProjectId) -> ProcessStatus {
        self.lifecycle.status(id)
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn emitter(&self) -> Emitter {
        self.emitter
    }

    pub fn selected_id(&self) -> Option<&ProjectId> {
        self.selected.as_ref()
    }

    pub fn selected_project(&self) -> Option<&Project> {
        self.selected.as_ref().and_then(|id| self.project(id))
    }

    /// Ports currently held by running projects.
    pub fn active_ports(&self) -> BTreeSet<u16> {
        self.projects
            .iter()
            .filter(|p| self.lifecycle.status(&p.id) == ProcessStatus::Running)
            .map(|p| p.port)
            .collect()
    }

    /// Ids of running projects, in collection order.
    pub fn running_ids(&self) -> Vec<ProjectId> {
        self.projects
            .iter()
            .filter(|p| self.lifecycle.status(&p.id) == ProcessStatus::Running)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Adds a project from form data and selects it.
    pub fn add_project(&mut self, data: NewProject) -> ProjectId {
        let project = Project::from_new(data);
        let id = project.id.clone();
        info!(project = %project.name, port = project.port, "project added");
        self.lifecycle.insert(&id);
        self.projects.push(project);
        self.selected = Some(id.clone());
        id
    }

    /// Removes a project unless it is running.
    pub fn delete_project(&mut self, id: &ProjectId) -> Result<Project, CoordinatorError> {
        let idx = self
            .projects
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| CoordinatorError::UnknownProject(id.to_string()))?;
        if self.lifecycle.status(id) == ProcessStatus::Running {
            return Err(CoordinatorError::DeleteWhileRunning {
                name: self.projects[idx].name.clone(),
            });
        }
        let project = self.projects.remove(idx);
        self.lifecycle.remove(id);
        self.logs.remove(id);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        info!(project = %project.name, "project deleted");
        Ok(project)
    }

    pub fn select_project(&mut self, id: &ProjectId) -> Result<(), CoordinatorError> {
        if self.project(id).is_none() {
            return Err(CoordinatorError::UnknownProject(id.to_string()));
        }
        self.selected = Some(id.clone());
        Ok(())
    }

    pub fn start(&mut self, id: &ProjectId) -> Result<StartOutcome, CoordinatorError> {
        let project = self
            .projects
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| CoordinatorError::UnknownProject(id.to_string()))?;
        self.lifecycle
            .start(project, &self.projects, &mut self.logs, &self.generator)
    }

    pub fn stop(&mut self, id: &ProjectId) -> Result<(), CoordinatorError> {
        let project = self
            .projects
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| CoordinatorError::UnknownProject(id.to_string()))?;
        self.lifecycle.stop(project, &mut self.logs)
    }

    /// Starts every project flagged for auto-start. Returns how many began starting.
    pub fn start_auto(&mut self) -> usize {
        let ids: Vec<ProjectId> = self
            .projects
            .iter()
            .filter(|p| p.auto_start)
            .map(|p| p.id.clone())
            .collect();
        ids.iter()
            .filter(|id| matches!(self.start(id), Ok(StartOutcome::Starting)))
            .count()
    }

    /// Runs one background emitter tick.
    pub fn on_emitter_tick(&mut self) -> TickDecision {
        let running = self.running_ids();
        let decision = self.emitter.decide(&running, &mut self.rng);
        self.activity = decision.activity();
        if let TickDecision::Quiet(id) = &decision {
            trace!(project = %id, "emitter tick stayed quiet");
        }
        if let TickDecision::Emit(id) = &decision {
            if let Some(project) = self.project(id).cloned() {
                debug!(project = %project.name, "requesting runtime line");
                let generator = self.generator.clone();
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let line = generator
                        .request_runtime_line(&project, RUNTIME_CONTEXT)
                        .await;
                    let _ = tx
                        .send(Event::RuntimeLine {
                            id: project.id,
                            line,
                        })
                        .await;
                });
            }
        }
        decision
    }

    /// Applies a domain event. Returns `false` for events that belong to the UI.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::StartupLines { id, epoch, lines } => {
                self.lifecycle.on_startup_lines(&id, epoch, lines);
            }
            Event::ScheduledLog {
                id,
                epoch,
                text,
                severity,
            } => {
                self.lifecycle
                    .on_scheduled_log(&id, epoch, text, severity, &mut self.logs);
            }
            Event::StartSettled { id, epoch } => {
                if let Some(project) = self.projects.iter().find(|p| p.id == id) {
                    self.lifecycle
                        .on_start_settled(project, epoch, &mut self.rng, &mut self.logs);
                }
            }
            Event::StopSettled { id, epoch } => {
                if let Some(project) = self.projects.iter().find(|p| p.id == id) {
                    self.lifecycle.on_stop_settled(project, epoch, &mut self.logs);
                }
            }
            Event::EmitterTick => {
                self.on_emitter_tick();
            }
            Event::RuntimeLine { id, line } => {
                if self.lifecycle.status(&id) == ProcessStatus::Running {
                    self.logs.append(&id, line, Severity::Info);
                }
            }
            Event::Key(_) | Event::Mouse(_) | Event::Resize { .. } | Event::Shutdown => {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rand::SeedableRng;
    use tokio::time::Instant;

    use super::*;
    use crate::generator::testing::ScriptedGenerator;
    use crate::generator::GeneratorOptions;
    use crate::lifecycle::PID_RANGE;
    use crate::project::{sample_projects, ProjectKind};

    const STARTUP: &str = "> node server.js\nConnected to database\nListening on 5000";

    fn coordinator_with(
        projects: Vec<Project>,
        backend: ScriptedGenerator,
        probability: f64,
    ) -> (Coordinator, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(256);
        let generator = LogGenerator::new(Arc::new(backend), GeneratorOptions::default());
        let options = CoordinatorOptions {
            max_lines: 500,
            timings: Timings::default(),
            emitter: Emitter::new(Duration::from_secs(2), probability),
        };
        let coordinator = Coordinator::new(
            projects,
            generator,
            options,
            StdRng::seed_from_u64(42),
            tx,
        );
        (coordinator, rx)
    }

    fn coordinator(projects: Vec<Project>) -> (Coordinator, mpsc::Receiver<Event>) {
        coordinator_with(projects, ScriptedGenerator::replying(STARTUP), 0.3)
    }

    // Applies events until `done` holds or nothing arrives for a while.
    async fn run_until(
        coordinator: &mut Coordinator,
        rx: &mut mpsc::Receiver<Event>,
        done: impl Fn(&Coordinator) -> bool,
    ) {
        while !done(coordinator) {
            match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
                Ok(Some(event)) => {
                    coordinator.handle_event(event);
                }
                _ => break,
            }
        }
    }

    async fn settle(coordinator: &mut Coordinator, rx: &mut mpsc::Receiver<Event>) {
        run_until(coordinator, rx, |_| false).await;
    }

    fn node_project(name: &str, port: u16) -> NewProject {
        NewProject {
            name: name.to_string(),
            kind: ProjectKind::Node,
            command: "node server.js".to_string(),
            directory: "./api".to_string(),
            port,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn node_project_starts_then_runs() {
        let (mut coordinator, mut rx) = coordinator(Vec::new());
        let id = coordinator.add_project(node_project("api", 5000));

        let began = Instant::now();
        assert_eq!(coordinator.start(&id).unwrap(), StartOutcome::Starting);
        assert_eq!(coordinator.status(&id), ProcessStatus::Starting);

        run_until(&mut coordinator, &mut rx, |c| {
            c.status(&id) == ProcessStatus::Running
        })
        .await;
        let elapsed = began.elapsed();
        assert_eq!(coordinator.status(&id), ProcessStatus::Running);
        assert!(elapsed >= Timings::default().settle_delay(3));
        assert!(elapsed < Duration::from_secs(3));

        let state = coordinator.state(&id).unwrap();
        assert!(PID_RANGE.contains(&state.pid.unwrap()));
        assert!(state.memory_mb.is_some());

        let texts: Vec<String> = coordinator.logs().iter(&id).map(|e| e.text.clone()).collect();
        assert_eq!(texts[0], "cd ./api && node server.js");
        assert_eq!(&texts[1..4], &["> node server.js", "Connected to database", "Listening on 5000"]);
        assert!(coordinator
            .logs()
            .iter(&id)
            .any(|e| e.severity == Severity::Success));
        assert_eq!(coordinator.active_ports().into_iter().collect::<Vec<_>>(), vec![5000]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_settles_to_stopped_and_clears_pid() {
        let (mut coordinator, mut rx) = coordinator(Vec::new());
        let id = coordinator.add_project(node_project("api", 5000));
        coordinator.start(&id).unwrap();
        run_until(&mut coordinator, &mut rx, |c| {
            c.status(&id) == ProcessStatus::Running
        })
        .await;

        coordinator.stop(&id).unwrap();
        assert_eq!(coordinator.status(&id), ProcessStatus::Stopping);
        settle(&mut coordinator, &mut rx).await;

        assert_eq!(coordinator.status(&id), ProcessStatus::Stopped);
        let state = coordinator.state(&id).unwrap();
        assert!(state.pid.is_none());
        assert!(state.started_at.is_none());
        let last = coordinator.logs().last(&id).unwrap();
        assert_eq!(last.text, "Process terminated.");
        assert_eq!(last.severity, Severity::Error);
        assert!(coordinator.active_ports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn port_conflict_leaves_second_project_untouched() {
        let (mut coordinator, mut rx) = coordinator(Vec::new());
        let first = coordinator.add_project(node_project("web", 3000));
        let second = coordinator.add_project(node_project("docs", 3000));
        coordinator.start(&first).unwrap();
        run_until(&mut coordinator, &mut rx, |c| {
            c.status(&first) == ProcessStatus::Running
        })
        .await;

        let outcome = coordinator.start(&second).unwrap();
        assert_eq!(
            outcome,
            StartOutcome::PortInUse {
                port: 3000,
                holder: "web".to_string()
            }
        );
        settle(&mut coordinator, &mut rx).await;
        assert_eq!(coordinator.status(&second), ProcessStatus::Stopped);
        let entries = coordinator.logs().read(&second);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Error);
        assert!(entries[0].text.contains("3000"));
    }

    #[tokio::test(start_paused = true)]
    async fn same_port_is_free_while_holder_only_starting() {
        let (mut coordinator, _rx) = coordinator(Vec::new());
        let first = coordinator.add_project(node_project("web", 3000));
        let second = coordinator.add_project(node_project("docs", 3000));
        coordinator.start(&first).unwrap();
        assert_eq!(coordinator.start(&second).unwrap(), StartOutcome::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_running_project_is_refused() {
        let (mut coordinator, mut rx) = coordinator(sample_projects());
        let id = coordinator.projects()[1].id.clone();
        coordinator.start(&id).unwrap();
        run_until(&mut coordinator, &mut rx, |c| {
            c.status(&id) == ProcessStatus::Running
        })
        .await;

        let err = coordinator.delete_project(&id).unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::DeleteWhileRunning {
                name: "Backend API".to_string()
            }
        );
        assert!(err.to_string().contains("running"));
        assert_eq!(coordinator.projects().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_clears_selection_and_logs() {
        let (mut coordinator, _rx) = coordinator(sample_projects());
        let id = coordinator.projects()[0].id.clone();
        assert_eq!(coordinator.selected_id(), Some(&id));
        coordinator.start(&id).unwrap();
        coordinator.stop(&id).unwrap();

        let removed = coordinator.delete_project(&id).unwrap();
        assert_eq!(removed.name, "Frontend App");
        assert!(coordinator.selected_project().is_none());
        assert!(coordinator.state(&id).is_none());
        assert_eq!(coordinator.logs().len(&id), 0);
        assert_eq!(coordinator.projects().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_start_discards_pending_output() {
        let (mut coordinator, mut rx) = coordinator(Vec::new());
        let id = coordinator.add_project(node_project("api", 5000));
        coordinator.start(&id).unwrap();
        coordinator.stop(&id).unwrap();
        settle(&mut coordinator, &mut rx).await;

        assert_eq!(coordinator.status(&id), ProcessStatus::Stopped);
        let texts: Vec<String> = coordinator.logs().iter(&id).map(|e| e.text.clone()).collect();
        assert_eq!(
            texts,
            vec![
                "cd ./api && node server.js",
                "Sending SIGTERM to process...",
                "Process terminated."
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn generator_failure_streams_fallback_lines() {
        let (mut coordinator, mut rx) =
            coordinator_with(Vec::new(), ScriptedGenerator::failing(), 0.3);
        let id = coordinator.add_project(node_project("api", 5000));
        coordinator.start(&id).unwrap();
        settle(&mut coordinator, &mut rx).await;
        assert_eq!(coordinator.status(&id), ProcessStatus::Running);
        let texts: Vec<String> = coordinator.logs().iter(&id).map(|e| e.text.clone()).collect();
        assert_eq!(texts[1], "> node server.js");
        assert!(texts.iter().any(|t| t.contains("fallback")));
    }

    #[tokio::test(start_paused = true)]
    async fn emitter_tick_appends_runtime_line_to_running_project() {
        let (mut coordinator, mut rx) =
            coordinator_with(Vec::new(), ScriptedGenerator::replying("GET /health 200"), 1.0);
        assert_eq!(coordinator.on_emitter_tick(), TickDecision::Idle);
        assert_eq!(coordinator.activity(), Activity::Idle);

        let id = coordinator.add_project(node_project("api", 5000));
        coordinator.start(&id).unwrap();
        settle(&mut coordinator, &mut rx).await;
        let before = coordinator.logs().len(&id);

        assert_eq!(coordinator.on_emitter_tick(), TickDecision::Emit(id.clone()));
        assert_eq!(coordinator.activity(), Activity::Running);
        settle(&mut coordinator, &mut rx).await;
        assert_eq!(coordinator.logs().len(&id), before + 1);
        assert_eq!(coordinator.logs().last(&id).unwrap().text, "GET /health 200");
    }

    #[tokio::test(start_paused = true)]
    async fn runtime_line_for_stopped_project_is_dropped() {
        let (mut coordinator, _rx) = coordinator(sample_projects());
        let id = coordinator.projects()[0].id.clone();
        assert!(coordinator.handle_event(Event::RuntimeLine {
            id: id.clone(),
            line: "late".into()
        }));
        assert_eq!(coordinator.logs().len(&id), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn add_selects_and_registers_stopped_state() {
        let (mut coordinator, _rx) = coordinator(sample_projects());
        let id = coordinator.add_project(node_project("worker", 3000));
        assert_eq!(coordinator.selected_project().map(|p| p.name.as_str()), Some("worker"));
        assert_eq!(coordinator.state(&id).unwrap().status, ProcessStatus::Stopped);
        assert_eq!(coordinator.projects().len(), 3);
        assert!(coordinator.select_project(&ProjectId::from("missing")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_start_projects_begin_starting() {
        let mut projects = sample_projects();
        projects[1].auto_start = true;
        let (mut coordinator, _rx) = coordinator(projects);
        assert_eq!(coordinator.start_auto(), 1);
        let id = coordinator.projects()[1].id.clone();
        assert_eq!(coordinator.status(&id), ProcessStatus::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn ui_events_are_not_consumed() {
        let (mut coordinator, _rx) = coordinator(Vec::new());
        assert!(!coordinator.handle_event(Event::Shutdown));
    }
}
