//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on exit,
//! and drawing the dashboard using `ratatui`.

use std::io::{self, Stdout};

use chrono::Local;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::Terminal;

use crate::app::{format_uptime, App, FormField, InputMode, StatusLevel};
use crate::coordinator::Coordinator;
use crate::emitter::Activity;
use crate::output::{sanitize_text, LogEntry, Severity};
use crate::process::ProcessStatus;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Initializes the terminal for TUI mode.
///
/// Enables raw mode, enters the alternate screen, and creates a `ratatui` Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its previous state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the dashboard for the current coordinator state.
pub fn draw(app: &mut App, coordinator: &Coordinator, terminal: &mut TuiTerminal) -> io::Result<()> {
    let title = window_title(coordinator);
    execute!(terminal.backend_mut(), SetTitle(title))?;
    terminal.draw(|frame| {
        let area = frame.size();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(4)])
            .split(area);
        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
            .split(vertical[0]);
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(6), Constraint::Min(1)])
            .split(main[1]);

        app.process_list_width = main[0].width;
        let border_style = Style::default().fg(Color::DarkGray);

        let selected_id = coordinator.selected_id();
        let mut selected_index = None;
        let mut list_items = Vec::new();
        for (idx, project) in coordinator.projects().iter().enumerate() {
            let is_selected = selected_id == Some(&project.id);
            if is_selected {
                selected_index = Some(idx);
            }
            let status = coordinator.status(&project.id);
            let indent = if is_selected { "▶ " } else { "  " };
            let name_style = if is_selected {
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            let status_span_style = if is_selected {
                status_style(status)
            } else {
                status_style(status).add_modifier(Modifier::DIM)
            };
            let mut text = Text::default();
            text.lines.push(Line::from(vec![
                Span::styled(indent, Style::default().fg(Color::Cyan)),
                Span::styled(
                    format!("[{}] ", status_char(status, app.use_symbols)),
                    status_span_style,
                ),
                Span::styled(project.name.clone(), name_style),
                Span::styled(format!(" :{}", project.port), Style::default().fg(Color::DarkGray)),
            ]));
            let available = (main[0].width as usize).saturating_sub(6);
            text.lines.push(Line::from(vec![
                Span::raw("    "),
                Span::styled(
                    truncate(project.kind.label(), available),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
            list_items.push(ListItem::new(text));
        }
        let list = List::new(list_items).block(
            Block::default()
                .title("Projects")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        let mut state = ListState::default();
        state.select(selected_index);
        frame.render_stateful_widget(list, main[0], &mut state);

        let details = Paragraph::new(detail_lines(coordinator)).block(
            Block::default()
                .title("Details")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        frame.render_widget(details, right[0]);

        let log_block = Block::default()
            .title(log_title(coordinator))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border_style);
        let log_area = log_block.inner(right[1]);
        let log_height = log_area.height as usize;
        app.set_log_view_height(log_height, coordinator);
        let (log_lines, total) = render_log_lines(app, coordinator, log_height, log_area.width as usize);
        frame.render_widget(Paragraph::new(log_lines).block(log_block), right[1]);
        if total == 0 {
            let empty = Paragraph::new("No output yet").style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, log_area);
        }

        let default_help = if app.use_symbols {
            "↑/↓ select | s start | x stop | space toggle | a add | d delete | y copy | f follow | ? help | q quit"
        } else {
            "Up/Down select | s start | x stop | space toggle | a add | d delete | y copy | f follow | ? help | q quit"
        };
        let help_line = match app.status_message() {
            Some((text, StatusLevel::Warning)) => {
                Span::styled(text.to_string(), Style::default().fg(Color::Yellow))
            }
            Some((text, StatusLevel::Info)) => Span::raw(text.to_string()),
            None => Span::styled(default_help, Style::default().fg(Color::DarkGray)),
        };
        let status = Paragraph::new(Text::from(vec![
            status_line(coordinator, app.follow),
            Line::from(help_line),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        frame.render_widget(status, vertical[1]);

        if app.input_mode == InputMode::AddForm {
            let popup_area = centered_rect(60, 50, area);
            let form = Paragraph::new(form_lines(app, coordinator)).block(
                Block::default()
                    .title("Add Project")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded),
            );
            frame.render_widget(Clear, popup_area);
            frame.render_widget(form, popup_area);
        }

        if app.show_help {
            let popup_area = centered_rect(60, 60, area);
            let help_text = [
                "Navigation:",
                "  Up/Down    Select project",
                "  PageUp/Dn  Scroll logs",
                "  Home/End   Scroll to top/bottom",
                "",
                "Actions:",
                "  s / Enter  Start selected",
                "  x          Stop selected",
                "  Space      Toggle start/stop",
                "  a          Add project",
                "  d          Delete selected",
                "  y          Copy logs to clipboard",
                "  f          Toggle auto-follow",
                "",
                "General:",
                "  ?          Toggle this help",
                "  q          Quit",
            ]
            .join("\n");
            let help_block = Paragraph::new(help_text)
                .block(
                    Block::default()
                        .title("Help")
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded),
                )
                .style(Style::default().bg(Color::DarkGray).fg(Color::White));
            frame.render_widget(Clear, popup_area);
            frame.render_widget(help_block, popup_area);
        }
    })?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn window_title(coordinator: &Coordinator) -> String {
    match coordinator.selected_project() {
        Some(project) => format!("devrack · {}", project.name),
        None => "devrack".to_string(),
    }
}

fn log_title(coordinator: &Coordinator) -> String {
    match coordinator.selected_project() {
        Some(project) => format!(
            "Logs - {} ({})",
            project.name,
            coordinator.status(&project.id).label()
        ),
        None => "Logs".to_string(),
    }
}

fn detail_lines(coordinator: &Coordinator) -> Text<'static> {
    let Some(project) = coordinator.selected_project() else {
        return Text::from(Line::from(Span::styled(
            "No project selected",
            Style::default().fg(Color::DarkGray),
        )));
    };
    let label = Style::default().fg(Color::DarkGray);
    let state = coordinator.state(&project.id).cloned().unwrap_or_default();
    let uptime = state
        .uptime(chrono::Utc::now())
        .map(format_uptime)
        .unwrap_or_else(|| "-".to_string());
    let pid = state.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "-".to_string());
    let memory = state
        .memory_mb
        .map(|mb| format!("{} MB", mb))
        .unwrap_or_else(|| "-".to_string());

    Text::from(vec![
        Line::from(vec![
            Span::styled("Status ", label),
            Span::styled(state.status.label().to_string(), status_style(state.status)),
            Span::styled("   PID ", label),
            Span::raw(pid),
            Span::styled("   Uptime ", label),
            Span::raw(uptime),
            Span::styled("   Memory ", label),
            Span::raw(memory),
        ]),
        Line::from(vec![
            Span::styled("Type ", label),
            Span::raw(project.kind.label().to_string()),
            Span::styled("   Port ", label),
            Span::raw(project.port.to_string()),
            Span::styled("   Env ", label),
            Span::raw(project.env.len().to_string()),
        ]),
        Line::from(vec![
            Span::styled("Command ", label),
            Span::raw(project.command.clone()),
        ]),
        Line::from(vec![
            Span::styled("Directory ", label),
            Span::raw(project.directory.clone()),
        ]),
    ])
}

fn status_line(coordinator: &Coordinator, follow: bool) -> Line<'static> {
    let running = coordinator.running_ids().len();
    let ports: Vec<String> = coordinator
        .active_ports()
        .into_iter()
        .map(|port| port.to_string())
        .collect();
    let ports = if ports.is_empty() {
        "none".to_string()
    } else {
        ports.join(", ")
    };
    let (activity, activity_style) = match coordinator.activity() {
        Activity::Running => ("running", Style::default().fg(Color::Green)),
        Activity::Idle => ("idle", Style::default().fg(Color::DarkGray)),
    };
    Line::from(vec![
        Span::raw(format!(
            "{} projects | {} running | emitter ",
            coordinator.projects().len(),
            running
        )),
        Span::styled(activity, activity_style),
        Span::raw(format!(
            " | ports: {} | follow: {}",
            ports,
            if follow { "on" } else { "off" }
        )),
    ])
}

fn form_lines(app: &App, coordinator: &Coordinator) -> Text<'static> {
    let form = &app.form;
    let mut lines = Vec::new();
    for field in FormField::ALL {
        let focused = form.focus == field;
        let marker = if focused { "▶ " } else { "  " };
        let mut value = form.value(field);
        if field == FormField::Kind {
            value = format!("< {} >", value);
        } else if focused {
            value.push(if app.use_symbols { '▌' } else { '|' });
        }
        let value_style = if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::raw(marker),
            Span::styled(format!("{:<10}", field.label()), Style::default().fg(Color::DarkGray)),
            Span::styled(value, value_style),
        ]));
    }
    lines.push(Line::from(""));
    if let Some(warning) = form.port_warning(coordinator.projects()) {
        lines.push(Line::from(Span::styled(
            format!("warning: {}", warning),
            Style::default().fg(Color::Yellow),
        )));
    }
    if let Some(error) = &form.error {
        lines.push(Line::from(Span::styled(
            format!("error: {}", error),
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::from(Span::styled(
        "Tab next field | Left/Right change type | Enter add | Esc cancel",
        Style::default().fg(Color::DarkGray),
    )));
    Text::from(lines)
}

fn render_log_lines(
    app: &App,
    coordinator: &Coordinator,
    height: usize,
    width: usize,
) -> (Text<'static>, usize) {
    if height == 0 {
        return (Text::default(), 0);
    }
    let Some(id) = coordinator.selected_id() else {
        return (Text::default(), 0);
    };
    let total = coordinator.logs().len(id);
    let start = if app.follow {
        total.saturating_sub(height)
    } else {
        app.scroll.min(total.saturating_sub(height))
    };
    let lines: Vec<Line<'static>> = coordinator
        .logs()
        .iter(id)
        .skip(start)
        .take(height)
        .map(|entry| log_line(entry, width))
        .collect();
    (Text::from(lines), total)
}

fn log_line(entry: &LogEntry, width: usize) -> Line<'static> {
    let stamp = entry.at.with_timezone(&Local).format("%H:%M:%S ").to_string();
    let available = width.saturating_sub(stamp.len() + 1);
    let text = truncate(&sanitize_text(&entry.text, true), available);
    Line::from(vec![
        Span::styled(stamp, Style::default().fg(Color::DarkGray)),
        Span::styled(text, severity_style(entry.severity)),
    ])
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Info => Style::default(),
        Severity::Error => Style::default().fg(Color::Red),
        Severity::Success => Style::default().fg(Color::Green),
    }
}

fn status_char(status: ProcessStatus, use_symbols: bool) -> char {
    if use_symbols {
        return match status {
            ProcessStatus::Stopped => '·',
            ProcessStatus::Starting => '↻',
            ProcessStatus::Running => '▲',
            ProcessStatus::Stopping => '▼',
            ProcessStatus::Error => '■',
        };
    }
    match status {
        ProcessStatus::Stopped => '.',
        ProcessStatus::Starting => 'S',
        ProcessStatus::Running => 'R',
        ProcessStatus::Stopping => 'T',
        ProcessStatus::Error => 'X',
    }
}

fn status_style(status: ProcessStatus) -> Style {
    match status {
        ProcessStatus::Stopped => Style::default().fg(Color::DarkGray),
        ProcessStatus::Starting => Style::default().fg(Color::Yellow),
        ProcessStatus::Running => Style::default().fg(Color::Green),
        ProcessStatus::Stopping => Style::default().fg(Color::Yellow),
        ProcessStatus::Error => Style::default().fg(Color::Red),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('~');
    out
}
