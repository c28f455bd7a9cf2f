//! Application view state and input handling.
//!
//! This module holds the `App` struct, which keeps everything the terminal view needs
//! beyond the domain state owned by the `Coordinator`: input mode, the add-project form,
//! log scrolling and status messages. Key and mouse events are translated into
//! `AppAction`s that the event loop applies to the coordinator.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::coordinator::Coordinator;
use crate::process::ProcessStatus;
use crate::project::{NewProject, Project, ProjectId, ProjectKind};

/// Modes of user input interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Standard navigation mode.
    Normal,
    /// Filling in the add-project form.
    AddForm,
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Exit the application.
    Quit,
    Select(ProjectId),
    Start(ProjectId),
    Stop(ProjectId),
    Delete(ProjectId),
    Add(NewProject),
    /// Copy a project's log to the clipboard.
    CopyLogs(ProjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Option<Duration>,
    level: StatusLevel,
}

/// Fields of the add-project form, in focus order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Kind,
    Command,
    Directory,
    Port,
}

impl FormField {
    pub const ALL: [FormField; 5] = [
        FormField::Name,
        FormField::Kind,
        FormField::Command,
        FormField::Directory,
        FormField::Port,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Name => "Name",
            FormField::Kind => "Type",
            FormField::Command => "Command",
            FormField::Directory => "Directory",
            FormField::Port => "Port",
        }
    }

    fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Result of a key press inside the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    Continue,
    Cancel,
    Submit(NewProject),
}

/// State of the add-project form.
#[derive(Debug, Clone)]
pub struct ProjectForm {
    pub name: String,
    pub kind: ProjectKind,
    pub command: String,
    pub directory: String,
    pub port: String,
    pub focus: FormField,
    /// Validation error from the last submit attempt.
    pub error: Option<String>,
    command_edited: bool,
    port_edited: bool,
}

impl Default for ProjectForm {
    fn default() -> Self {
        let kind = ProjectKind::React;
        Self {
            name: String::new(),
            kind,
            command: kind.default_command().to_string(),
            directory: "./".to_string(),
            port: kind.default_port().to_string(),
            focus: FormField::Name,
            error: None,
            command_edited: false,
            port_edited: false,
        }
    }
}

impl ProjectForm {
    /// Switches the type, refreshing command and port unless the user typed their own.
    pub fn set_kind(&mut self, kind: ProjectKind) {
        self.kind = kind;
        if !self.command_edited {
            self.command = kind.default_command().to_string();
        }
        if !self.port_edited {
            self.port = kind.default_port().to_string();
        }
    }

    pub fn value(&self, field: FormField) -> String {
        match field {
            FormField::Name => self.name.clone(),
            FormField::Kind => self.kind.label().to_string(),
            FormField::Command => self.command.clone(),
            FormField::Directory => self.directory.clone(),
            FormField::Port => self.port.clone(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FormOutcome {
        match key.code {
            KeyCode::Esc => FormOutcome::Cancel,
            KeyCode::Enter => match self.validate() {
                Ok(data) => FormOutcome::Submit(data),
                Err(err) => {
                    self.error = Some(err);
                    FormOutcome::Continue
                }
            },
            KeyCode::Tab | KeyCode::Down => {
                self.focus = self.focus.next();
                FormOutcome::Continue
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = self.focus.prev();
                FormOutcome::Continue
            }
            KeyCode::Left if self.focus == FormField::Kind => {
                self.set_kind(self.kind.prev());
                FormOutcome::Continue
            }
            KeyCode::Right if self.focus == FormField::Kind => {
                self.set_kind(self.kind.next());
                FormOutcome::Continue
            }
            KeyCode::Char(' ') if self.focus == FormField::Kind => {
                self.set_kind(self.kind.next());
                FormOutcome::Continue
            }
            KeyCode::Backspace => {
                if let Some(text) = self.focused_text() {
                    text.pop();
                }
                self.mark_edited();
                FormOutcome::Continue
            }
            KeyCode::Char(c) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    return FormOutcome::Continue;
                }
                if self.focus == FormField::Port && !c.is_ascii_digit() {
                    return FormOutcome::Continue;
                }
                if let Some(text) = self.focused_text() {
                    text.push(c);
                }
                self.mark_edited();
                FormOutcome::Continue
            }
            _ => FormOutcome::Continue,
        }
    }

    /// Checks required fields and the port, producing the data for a new project.
    pub fn validate(&self) -> Result<NewProject, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("name is required".to_string());
        }
        let command = self.command.trim();
        if command.is_empty() {
            return Err("command is required".to_string());
        }
        let port = match self.port.trim().parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => return Err("port must be a number between 1 and 65535".to_string()),
        };
        let directory = match self.directory.trim() {
            "" => "./".to_string(),
            dir => dir.to_string(),
        };
        Ok(NewProject {
            name: name.to_string(),
            kind: self.kind,
            command: command.to_string(),
            directory,
            port,
        })
    }

    /// Soft warning when another project already declares the entered port.
    pub fn port_warning(&self, projects: &[Project]) -> Option<String> {
        let port = self.port.trim().parse::<u16>().ok()?;
        let other = projects.iter().find(|p| p.port == port)?;
        Some(format!("port {} is already used by {}", port, other.name))
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            FormField::Name => Some(&mut self.name),
            FormField::Kind => None,
            FormField::Command => Some(&mut self.command),
            FormField::Directory => Some(&mut self.directory),
            FormField::Port => Some(&mut self.port),
        }
    }

    fn mark_edited(&mut self) {
        match self.focus {
            FormField::Command => self.command_edited = true,
            FormField::Port => self.port_edited = true,
            _ => {}
        }
    }
}

/// The view state container.
#[derive(Debug)]
pub struct App {
    /// Current input mode.
    pub input_mode: InputMode,
    /// The add-project form, live while in `InputMode::AddForm`.
    pub form: ProjectForm,
    /// Whether to use Unicode symbols.
    pub use_symbols: bool,
    /// Flag indicating if the application should exit.
    pub should_quit: bool,
    /// Whether to show the help overlay.
    pub show_help: bool,
    /// Height of the log view area (for scrolling calculations).
    pub log_view_height: usize,
    /// Width of the project list area (for mouse clicks).
    pub process_list_width: u16,
    /// Scroll position of the log view.
    pub scroll: usize,
    /// Whether the log view follows new output.
    pub follow: bool,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(use_symbols: bool) -> Self {
        Self {
            input_mode: InputMode::Normal,
            form: ProjectForm::default(),
            use_symbols,
            should_quit: false,
            show_help: false,
            log_view_height: 0,
            process_list_width: 0,
            scroll: 0,
            follow: true,
            status_message: None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, coordinator: &Coordinator) -> AppAction {
        match self.input_mode {
            InputMode::AddForm => self.handle_form_input(key),
            InputMode::Normal => self.handle_normal_input(key, coordinator),
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent, coordinator: &Coordinator) -> AppAction {
        match mouse.kind {
            MouseEventKind::Down(crossterm::event::MouseButton::Left) => {
                if mouse.column < self.process_list_width {
                    // One border row, then two rows per project.
                    let row = mouse.row.saturating_sub(1) as usize;
                    if let Some(project) = coordinator.projects().get(row / 2) {
                        return self.select(project.id.clone());
                    }
                }
                AppAction::None
            }
            MouseEventKind::ScrollDown => {
                self.scroll_down(3, coordinator);
                AppAction::None
            }
            MouseEventKind::ScrollUp => {
                self.scroll_up(3, coordinator);
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_form_input(&mut self, key: KeyEvent) -> AppAction {
        match self.form.handle_key(key) {
            FormOutcome::Continue => AppAction::None,
            FormOutcome::Cancel => {
                self.close_form();
                AppAction::None
            }
            FormOutcome::Submit(data) => {
                self.close_form();
                AppAction::Add(data)
            }
        }
    }

    fn handle_normal_input(&mut self, key: KeyEvent, coordinator: &Coordinator) -> AppAction {
        let selected = coordinator.selected_id().cloned();
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Up | KeyCode::Char('k') => self.select_relative(coordinator, -1),
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.select_relative(coordinator, 1)
            }
            KeyCode::Char('s') | KeyCode::Enter => selected.map(AppAction::Start).unwrap_or(AppAction::None),
            KeyCode::Char('x') => selected.map(AppAction::Stop).unwrap_or(AppAction::None),
            KeyCode::Char(' ') => match selected {
                Some(id) => match coordinator.status(&id) {
                    ProcessStatus::Stopped | ProcessStatus::Error => AppAction::Start(id),
                    _ => AppAction::Stop(id),
                },
                None => AppAction::None,
            },
            KeyCode::Char('a') | KeyCode::Char('n') => {
                self.open_form();
                AppAction::None
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                selected.map(AppAction::Delete).unwrap_or(AppAction::None)
            }
            KeyCode::Char('y') => selected.map(AppAction::CopyLogs).unwrap_or(AppAction::None),
            KeyCode::Char('f') => {
                self.follow = !self.follow;
                if self.follow {
                    self.ensure_follow(coordinator);
                }
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.show_help = !self.show_help;
                AppAction::None
            }
            KeyCode::Esc => {
                self.show_help = false;
                AppAction::None
            }
            KeyCode::PageUp => {
                self.scroll_up(self.log_view_height.max(1), coordinator);
                AppAction::None
            }
            KeyCode::PageDown => {
                self.scroll_down(self.log_view_height.max(1), coordinator);
                AppAction::None
            }
            KeyCode::Home => {
                self.scroll = 0;
                self.follow = false;
                AppAction::None
            }
            KeyCode::End => {
                self.follow = true;
                self.ensure_follow(coordinator);
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn select_relative(&mut self, coordinator: &Coordinator, delta: isize) -> AppAction {
        let projects = coordinator.projects();
        if projects.is_empty() {
            return AppAction::None;
        }
        let current = coordinator
            .selected_id()
            .and_then(|id| projects.iter().position(|p| &p.id == id));
        let next = match current {
            Some(idx) => (idx as isize + delta).rem_euclid(projects.len() as isize) as usize,
            None => 0,
        };
        self.select(projects[next].id.clone())
    }

    fn select(&mut self, id: ProjectId) -> AppAction {
        self.follow = true;
        self.scroll = 0;
        AppAction::Select(id)
    }

    fn open_form(&mut self) {
        self.form = ProjectForm::default();
        self.input_mode = InputMode::AddForm;
        self.show_help = false;
    }

    fn close_form(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    fn selected_len(coordinator: &Coordinator) -> usize {
        coordinator
            .selected_id()
            .map(|id| coordinator.logs().len(id))
            .unwrap_or(0)
    }

    pub fn scroll_up(&mut self, amount: usize, coordinator: &Coordinator) {
        let view = self.log_view_height.max(1);
        let max_scroll = Self::selected_len(coordinator).saturating_sub(view);
        let current = if self.follow { max_scroll } else { self.scroll };
        self.scroll = current.saturating_sub(amount).min(max_scroll);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, amount: usize, coordinator: &Coordinator) {
        let view = self.log_view_height.max(1);
        let max_scroll = Self::selected_len(coordinator).saturating_sub(view);
        let current = if self.follow { max_scroll } else { self.scroll };
        let next = (current + amount).min(max_scroll);
        self.scroll = next;
        self.follow = next == max_scroll;
    }

    pub fn ensure_follow(&mut self, coordinator: &Coordinator) {
        let view = self.log_view_height.max(1);
        self.scroll = Self::selected_len(coordinator).saturating_sub(view);
    }

    pub fn set_log_view_height(&mut self, height: usize, coordinator: &Coordinator) {
        self.log_view_height = height;
        let max_scroll = Self::selected_len(coordinator).saturating_sub(height.max(1));
        if self.follow {
            self.scroll = max_scroll;
        } else {
            self.scroll = self.scroll.min(max_scroll);
        }
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        if let Some(message) = &self.status_message {
            let still_visible = match message.ttl {
                Some(ttl) => message.at.elapsed() < ttl,
                None => true,
            };
            if still_visible {
                return Some((message.text.as_str(), message.level));
            }
        }
        None
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Info, Some(Duration::from_secs(3)));
    }

    pub fn set_status_warning_for(&mut self, message: impl Into<String>, ttl: Duration) {
        self.set_status_message_with_level(message, StatusLevel::Warning, Some(ttl));
    }

    fn set_status_message_with_level(
        &mut self,
        message: impl Into<String>,
        level: StatusLevel,
        ttl: Option<Duration>,
    ) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl,
            level,
        });
    }
}

/// Formats a duration as `HH:MM:SS`, or `MM:SS` under an hour.
pub fn format_uptime(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
