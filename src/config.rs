//! Configuration management for devrack.
//!
//! This module defines the structure of the `devrack.toml` configuration file
//! and provides functionality to load and parse it. Every field is optional;
//! command-line flags take precedence when both are given.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration structure corresponding to `devrack.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Maximum number of log entries kept per project.
    pub max_lines: Option<usize>,
    /// Whether to use Unicode symbols in the TUI (default: true).
    pub symbols: Option<bool>,
    /// Directory holding the saved project list and diagnostic logs.
    pub data_dir: Option<PathBuf>,
    /// Seed for the random source (pids, memory figures, emitter rolls).
    pub seed: Option<u64>,
    /// Delay between streamed startup lines in milliseconds.
    pub stagger_ms: Option<u64>,
    /// Extra delay after the last startup line before Running, in milliseconds.
    pub start_buffer_ms: Option<u64>,
    /// Delay between a stop request and Stopped, in milliseconds.
    pub stop_delay_ms: Option<u64>,
    /// Longest wait for generated startup lines, in milliseconds.
    pub generation_wait_ms: Option<u64>,
    /// Background emitter period in milliseconds.
    pub emitter_interval_ms: Option<u64>,
    /// Probability that an emitter tick produces a runtime line.
    pub emitter_probability: Option<f64>,
    /// Text-generation settings.
    pub generator: Option<GeneratorConfig>,
}

/// The `[generator]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratorConfig {
    /// Model identifier sent with every request.
    pub model: Option<String>,
    /// Base URL of the generative language API.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Output token bound for startup batches.
    pub startup_max_tokens: Option<u32>,
    /// Output token bound for single runtime lines.
    pub runtime_max_tokens: Option<u32>,
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_fields() {
        let raw = r#"
max_lines = 200
symbols = false
data_dir = "/tmp/devrack"
seed = 7
stagger_ms = 100
start_buffer_ms = 250
stop_delay_ms = 600
generation_wait_ms = 1200
emitter_interval_ms = 1500
emitter_probability = 0.5

[generator]
model = "gemini-2.0-flash"
endpoint = "http://localhost:8080/v1beta"
api_key_env = "MY_KEY"
timeout_ms = 5000
startup_max_tokens = 300
runtime_max_tokens = 40
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.max_lines, Some(200));
        assert_eq!(config.symbols, Some(false));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/devrack")));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.stagger_ms, Some(100));
        assert_eq!(config.start_buffer_ms, Some(250));
        assert_eq!(config.stop_delay_ms, Some(600));
        assert_eq!(config.generation_wait_ms, Some(1200));
        assert_eq!(config.emitter_interval_ms, Some(1500));
        assert_eq!(config.emitter_probability, Some(0.5));
        let generator = config.generator.unwrap();
        assert_eq!(generator.model.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(generator.api_key_env.as_deref(), Some("MY_KEY"));
        assert_eq!(generator.timeout_ms, Some(5000));
        assert_eq!(generator.startup_max_tokens, Some(300));
        assert_eq!(generator.runtime_max_tokens, Some(40));
    }

    #[test]
    fn empty_file_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.max_lines.is_none());
        assert!(config.generator.is_none());
    }
}
