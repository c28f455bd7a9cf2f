//! devrack: a terminal dashboard for simulated local development servers.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! loads configuration and the saved project list, and runs the main event loop
//! that applies user input and background events to the coordinator.

mod app;
mod clipboard;
mod config;
mod coordinator;
mod emitter;
mod error;
mod events;
mod generator;
mod lifecycle;
mod output;
mod process;
mod project;
mod store;
mod tui;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{CommandFactory, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::app::{App, AppAction};
use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorOptions};
use crate::emitter::Emitter;
use crate::events::Event;
use crate::generator::{
    GeminiClient, GeneratorOptions, LogGenerator, OfflineGenerator, TextGenerator,
    DEFAULT_ENDPOINT, DEFAULT_MODEL,
};
use crate::lifecycle::{StartOutcome, Timings};
use crate::output::DEFAULT_MAX_LINES;
use crate::project::ProjectId;
use crate::store::{default_data_dir, BlobStore, ProjectStore};

const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_EMITTER_INTERVAL_MS: u64 = 2_000;
const DEFAULT_EMITTER_PROBABILITY: f64 = 0.3;
/// Upper bound for every configured delay.
const MAX_DELAY_MS: u64 = 600_000;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "devrack",
    version,
    about = "Terminal dashboard for simulated development servers",
    styles = help_styles(),
    color = clap::ColorChoice::Always,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to devrack.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore any devrack.toml in the current directory.
    #[arg(long)]
    no_config: bool,
    /// Directory for the saved project list and diagnostic logs.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Max log entries kept per project.
    #[arg(long)]
    max_lines: Option<usize>,
    /// Seed for pids, memory figures and emitter rolls.
    #[arg(long)]
    seed: Option<u64>,
    /// Never call the text-generation service; always use fallback output.
    #[arg(long)]
    offline: bool,
    /// Text-generation model identifier.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show help information.
    Help,
    /// Show version information.
    Version,
    /// Print the saved projects.
    List,
    /// Forget the saved projects so the samples come back.
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config_file(&cli)?;
    let settings = RunSettings::from_cli(&cli, &config);
    let store = ProjectStore::new(BlobStore::new(&settings.data_dir));

    if let Some(command) = &cli.command {
        match command {
            Commands::Help => {
                Cli::command().print_help()?;
                println!();
            }
            Commands::Version => {
                println!("devrack {}", env!("CARGO_PKG_VERSION"));
            }
            Commands::List => {
                for project in store.load()? {
                    println!(
                        "{:<20} {:<8} {:>5}  {}  ({})",
                        project.name,
                        project.kind.label(),
                        project.port,
                        project.command,
                        project.directory
                    );
                }
            }
            Commands::Reset => {
                if store.reset()? {
                    println!("removed saved projects from {}", settings.data_dir.display());
                } else {
                    println!("no saved projects in {}", settings.data_dir.display());
                }
            }
        }
        return Ok(());
    }

    let _log_guard = init_tracing(&settings.data_dir)?;
    info!(data_dir = %settings.data_dir.display(), "devrack starting");

    let projects = store.load()?;
    let generator = build_generator(&settings);
    let rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut coordinator = Coordinator::new(
        projects,
        generator,
        settings.coordinator_options(),
        rng,
        event_tx.clone(),
    );
    let emitter_task = coordinator.emitter().spawn(event_tx.clone());
    let mut app = App::new(settings.use_symbols);

    let auto_started = coordinator.start_auto();
    if auto_started > 0 {
        app.set_status_message(format!("Auto-starting {} project(s)", auto_started));
    }

    let mut terminal = tui::init_terminal()?;
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx.clone());

    let tick_rate = Duration::from_millis(150);
    let mut ticker = tokio::time::interval(tick_rate);
    let mut result = Ok(());

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    Event::Key(key) => {
                        let action = app.handle_key(key, &coordinator);
                        handle_app_action(action, &mut app, &mut coordinator, &store);
                    }
                    Event::Mouse(mouse) => {
                        let action = app.handle_mouse(mouse, &coordinator);
                        handle_app_action(action, &mut app, &mut coordinator, &store);
                    }
                    Event::Resize { .. } => {}
                    Event::Shutdown => {
                        app.should_quit = true;
                    }
                    event => {
                        coordinator.handle_event(event);
                    }
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = tui::draw(&mut app, &coordinator, &mut terminal) {
                    result = Err(err.into());
                    break;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    emitter_task.abort();
    info!("devrack exiting");
    tui::restore_terminal(terminal)?;
    result
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let sent = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => tx.blocking_send(Event::Key(key)),
                Ok(crossterm::event::Event::Mouse(mouse)) => tx.blocking_send(Event::Mouse(mouse)),
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    tx.blocking_send(Event::Resize { width, height })
                }
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        let _ = tx.send(Event::Shutdown).await;
    });
}

fn load_config_file(cli: &Cli) -> Result<Config> {
    if cli.no_config {
        return Ok(Config::default());
    }
    let config_path = cli.config.clone().or_else(default_config_path);
    match config_path {
        Some(path) => config::load_config(&path),
        None => Ok(Config::default()),
    }
}

fn default_config_path() -> Option<PathBuf> {
    let path = Path::new("devrack.toml");
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

fn init_tracing(data_dir: &Path) -> Result<WorkerGuard> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(&log_dir, "devrack.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_env("DEVRACK_LOG").unwrap_or_else(|_| EnvFilter::new("devrack=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logging: {}", err))?;
    Ok(guard)
}

fn build_generator(settings: &RunSettings) -> LogGenerator {
    let backend: Arc<dyn TextGenerator> = if settings.offline {
        info!("offline mode, using fallback output");
        Arc::new(OfflineGenerator)
    } else {
        match std::env::var(&settings.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                match GeminiClient::new(settings.endpoint.clone(), key.trim(), settings.timeout) {
                    Ok(client) => {
                        info!(model = %settings.model, "text generation enabled");
                        Arc::new(client)
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to build text generation client");
                        Arc::new(OfflineGenerator)
                    }
                }
            }
            _ => {
                info!(env = %settings.api_key_env, "no api key set, using fallback output");
                Arc::new(OfflineGenerator)
            }
        }
    };
    LogGenerator::new(backend, settings.generator_options())
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

/// Runtime configuration derived from CLI arguments and the config file.
#[derive(Debug, Clone)]
struct RunSettings {
    max_lines: usize,
    use_symbols: bool,
    data_dir: PathBuf,
    seed: Option<u64>,
    timings: Timings,
    emitter_interval: Duration,
    emitter_probability: f64,
    offline: bool,
    model: String,
    endpoint: String,
    api_key_env: String,
    timeout: Duration,
    startup_max_tokens: u32,
    runtime_max_tokens: u32,
}

impl RunSettings {
    fn from_cli(cli: &Cli, config: &Config) -> Self {
        let defaults = Timings::default();
        let generator_defaults = GeneratorOptions::default();
        let generator = config.generator.clone().unwrap_or_default();
        let ms = |value: Option<u64>, fallback: Duration| {
            value
                .map(|ms| Duration::from_millis(ms.min(MAX_DELAY_MS)))
                .unwrap_or(fallback)
        };
        Self {
            max_lines: cli
                .max_lines
                .or(config.max_lines)
                .unwrap_or(DEFAULT_MAX_LINES)
                .max(1),
            use_symbols: config.symbols.unwrap_or(true),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| config.data_dir.clone())
                .unwrap_or_else(default_data_dir),
            seed: cli.seed.or(config.seed),
            timings: Timings {
                stagger: ms(config.stagger_ms, defaults.stagger),
                start_buffer: ms(config.start_buffer_ms, defaults.start_buffer),
                stop_delay: ms(config.stop_delay_ms, defaults.stop_delay),
                generation_wait: ms(config.generation_wait_ms, defaults.generation_wait),
            },
            emitter_interval: ms(
                config.emitter_interval_ms,
                Duration::from_millis(DEFAULT_EMITTER_INTERVAL_MS),
            ),
            emitter_probability: config
                .emitter_probability
                .filter(|p| p.is_finite())
                .unwrap_or(DEFAULT_EMITTER_PROBABILITY),
            offline: cli.offline,
            model: cli
                .model
                .clone()
                .or(generator.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: generator
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key_env: generator
                .api_key_env
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            timeout: Duration::from_millis(generator.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
            startup_max_tokens: generator
                .startup_max_tokens
                .unwrap_or(generator_defaults.startup_max_tokens),
            runtime_max_tokens: generator
                .runtime_max_tokens
                .unwrap_or(generator_defaults.runtime_max_tokens),
        }
    }

    fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            max_lines: self.max_lines,
            timings: self.timings,
            emitter: Emitter::new(self.emitter_interval, self.emitter_probability),
        }
    }

    fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            model: self.model.clone(),
            startup_max_tokens: self.startup_max_tokens,
            runtime_max_tokens: self.runtime_max_tokens,
        }
    }
}

fn persist(app: &mut App, coordinator: &Coordinator, store: &ProjectStore) {
    if let Err(err) = store.save(coordinator.projects()) {
        error!(error = %err, "failed to save projects");
        app.set_status_warning_for(format!("save failed: {}", err), Duration::from_secs(3));
    }
}

fn handle_app_action(
    action: AppAction,
    app: &mut App,
    coordinator: &mut Coordinator,
    store: &ProjectStore,
) {
    match action {
        AppAction::Quit => {
            app.should_quit = true;
        }
        AppAction::Select(id) => {
            if let Err(err) = coordinator.select_project(&id) {
                app.set_status_warning_for(err.to_string(), Duration::from_secs(3));
            }
        }
        AppAction::Start(id) => {
            let name = project_name(coordinator, &id);
            match coordinator.start(&id) {
                Ok(StartOutcome::Starting) => app.set_status_message(format!("Starting {}", name)),
                Ok(StartOutcome::PortInUse { port, holder }) => app.set_status_warning_for(
                    format!("port {} is already in use by {}", port, holder),
                    Duration::from_secs(3),
                ),
                Err(err) => app.set_status_warning_for(err.to_string(), Duration::from_secs(3)),
            }
        }
        AppAction::Stop(id) => {
            let name = project_name(coordinator, &id);
            match coordinator.stop(&id) {
                Ok(()) => app.set_status_message(format!("Stopping {}", name)),
                Err(err) => app.set_status_warning_for(err.to_string(), Duration::from_secs(3)),
            }
        }
        AppAction::Delete(id) => match coordinator.delete_project(&id) {
            Ok(project) => {
                app.set_status_message(format!("Deleted {}", project.name));
                persist(app, coordinator, store);
            }
            Err(err) => app.set_status_warning_for(err.to_string(), Duration::from_secs(3)),
        },
        AppAction::Add(data) => {
            let name = data.name.clone();
            coordinator.add_project(data);
            app.follow = true;
            app.set_status_message(format!("Added {}", name));
            persist(app, coordinator, store);
        }
        AppAction::CopyLogs(id) => match clipboard::copy_entries(&coordinator.logs().read(&id)) {
            Ok(0) => app.set_status_warning_for("nothing to copy", Duration::from_secs(2)),
            Ok(count) => app.set_status_warning_for(
                format!("copied {} lines to clipboard", count),
                Duration::from_secs(2),
            ),
            Err(err) => app.set_status_warning_for(
                format!("clipboard failed: {}", err),
                Duration::from_secs(3),
            ),
        },
        AppAction::None => {}
    }
}

fn project_name(coordinator: &Coordinator, id: &ProjectId) -> String {
    coordinator
        .project(id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| id.as_str().to_string())
}
