//! Simulated log text generation.
//!
//! The dashboard never runs real commands. Startup output and runtime chatter are
//! requested from a text-generation service through the `TextGenerator` trait, then
//! normalized into log lines by `LogGenerator`. Every failure path resolves to fixed
//! fallback text, so callers never see an error from this module.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GenerationError;
use crate::output::sanitize_text;
use crate::project::Project;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const STARTUP_SYSTEM_INSTRUCTION: &str = "You are a terminal emulator. Reply with raw log output only: no markdown, no commentary.";
const RUNTIME_SYSTEM_INSTRUCTION: &str = "You are a terminal emulator. Output one line only: no markdown, no commentary.";

/// A single request to the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: String,
    pub max_output_tokens: u32,
}

pub type GenerateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>>;

/// A text-generation backend.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> GenerateFuture<'a>;
}

/// Backend used when no API key is configured. Every request fails.
#[derive(Debug, Default)]
pub struct OfflineGenerator;

impl TextGenerator for OfflineGenerator {
    fn generate<'a>(&'a self, _request: &'a GenerationRequest) -> GenerateFuture<'a> {
        Box::pin(async { Err(GenerationError::Unavailable) })
    }
}

/// Client for the Google Generative Language `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("devrack/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            model
        )
    }
}

impl TextGenerator for GeminiClient {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> GenerateFuture<'a> {
        Box::pin(async move {
            let body = GenerateContentRequest::from_request(request);
            let response = self
                .client
                .post(self.url(&request.model))
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GenerationError::Status {
                    status: status.as_u16(),
                    body: body.chars().take(200).collect(),
                });
            }
            let payload: GenerateContentResponse = response.json().await?;
            payload.text().ok_or(GenerationError::EmptyResponse)
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &request.system_instruction,
                }],
            },
            generation_config: GenerationConfig {
                max_output_tokens: request.max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    // Concatenate the text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Model and output bounds for the two request shapes.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub model: String,
    pub startup_max_tokens: u32,
    pub runtime_max_tokens: u32,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            startup_max_tokens: 400,
            runtime_max_tokens: 60,
        }
    }
}

/// Turns text-generation responses into log lines.
#[derive(Clone)]
pub struct LogGenerator {
    backend: Arc<dyn TextGenerator>,
    options: GeneratorOptions,
}

impl LogGenerator {
    pub fn new(backend: Arc<dyn TextGenerator>, options: GeneratorOptions) -> Self {
        Self { backend, options }
    }

    /// Requests 5-10 lines of startup output for a project.
    ///
    /// Never fails: errors and empty responses yield the three-line fallback.
    pub async fn request_startup_lines(&self, project: &Project) -> Vec<String> {
        let request = GenerationRequest {
            model: self.options.model.clone(),
            prompt: format!(
                "Generate 5 to 10 lines of realistic terminal output printed while a {} development server initializes after running `{}`. It listens on port {}. Output only the log lines.",
                project.kind.label(),
                project.command,
                project.port
            ),
            system_instruction: STARTUP_SYSTEM_INSTRUCTION.to_string(),
            max_output_tokens: self.options.startup_max_tokens,
        };
        match self.backend.generate(&request).await {
            Ok(text) => {
                let lines = normalize_lines(&text);
                if lines.is_empty() {
                    warn!(project = %project.name, "startup generation returned no usable lines");
                    startup_fallback(project)
                } else {
                    debug!(project = %project.name, lines = lines.len(), "startup lines generated");
                    lines
                }
            }
            Err(err) => {
                warn!(project = %project.name, error = %err, "startup generation failed");
                startup_fallback(project)
            }
        }
    }

    /// Requests a single runtime line, e.g. an inbound request or a finished job.
    ///
    /// Never fails: errors and empty responses yield the keep-alive fallback.
    pub async fn request_runtime_line(&self, project: &Project, context: &str) -> String {
        let request = GenerationRequest {
            model: self.options.model.clone(),
            prompt: format!(
                "Generate one brief log line from a running {} server on port {} representing {}.",
                project.kind.label(),
                project.port,
                context
            ),
            system_instruction: RUNTIME_SYSTEM_INSTRUCTION.to_string(),
            max_output_tokens: self.options.runtime_max_tokens,
        };
        match self.backend.generate(&request).await {
            Ok(text) => match normalize_lines(&text).into_iter().next() {
                Some(line) => line,
                None => runtime_fallback(project),
            },
            Err(err) => {
                debug!(project = %project.name, error = %err, "runtime generation failed");
                runtime_fallback(project)
            }
        }
    }
}

/// Splits generated text into trimmed, non-empty lines, dropping markdown fences.
pub fn normalize_lines(text: &str) -> Vec<String> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"^`{3}[A-Za-z0-9_+-]*$").ok());
    text.lines()
        .map(|line| sanitize_text(line, true).trim().to_string())
        .filter(|line| !line.is_empty())
        .filter(|line| !fence.as_ref().is_some_and(|re| re.is_match(line)))
        .collect()
}

pub fn startup_fallback(project: &Project) -> Vec<String> {
    vec![
        format!("> {}", project.command),
        "Starting development server...".to_string(),
        "[simulated] text generation unavailable, showing fallback output".to_string(),
    ]
}

pub fn runtime_fallback(project: &Project) -> String {
    format!(
        "[keep-alive] {} is still running on port {}",
        project.name, project.port
    )
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedGenerator;
    use super::*;
    use crate::project::sample_projects;

    fn generator(backend: ScriptedGenerator) -> (LogGenerator, Arc<ScriptedGenerator>) {
        let backend = Arc::new(backend);
        let generator = LogGenerator::new(backend.clone(), GeneratorOptions::default());
        (generator, backend)
    }

    #[test]
    fn normalize_drops_blank_lines_and_fences() {
        let text = "```bash\n> vite\n\n  \u{1b}[32mready\u{1b}[0m in 300ms  \n```\n";
        assert_eq!(normalize_lines(text), vec!["> vite", "ready in 300ms"]);
    }

    #[tokio::test]
    async fn startup_lines_are_split_in_order() {
        let (generator, backend) = generator(ScriptedGenerator::replying(
            "> react-scripts start\n\nCompiled successfully!\nLocal: http://localhost:3000\n",
        ));
        let project = sample_projects().remove(0);
        let lines = generator.request_startup_lines(&project).await;
        assert_eq!(
            lines,
            vec![
                "> react-scripts start",
                "Compiled successfully!",
                "Local: http://localhost:3000"
            ]
        );
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("npm start"));
        assert!(requests[0].prompt.contains("3000"));
    }

    #[tokio::test]
    async fn startup_failure_yields_fallback() {
        let (generator, _) = generator(ScriptedGenerator::failing());
        let project = sample_projects().remove(1);
        let lines = generator.request_startup_lines(&project).await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "> npm run dev");
        assert!(lines[2].contains("fallback"));
    }

    #[tokio::test]
    async fn blank_response_yields_fallback() {
        let (generator, _) = generator(ScriptedGenerator::replying("\n   \n```\n"));
        let project = sample_projects().remove(1);
        assert_eq!(
            generator.request_startup_lines(&project).await,
            startup_fallback(&project)
        );
        assert_eq!(
            generator.request_runtime_line(&project, "a request").await,
            runtime_fallback(&project)
        );
    }

    #[tokio::test]
    async fn runtime_line_uses_smaller_bound_and_first_line() {
        let (generator, backend) =
            generator(ScriptedGenerator::replying("  GET /api/users 200 12ms  \nextra"));
        let project = sample_projects().remove(1);
        let line = generator
            .request_runtime_line(&project, "an inbound HTTP request")
            .await;
        assert_eq!(line, "GET /api/users 200 12ms");
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].max_output_tokens, 60);
        assert!(requests[0].system_instruction.contains("one line only"));
    }

    #[tokio::test]
    async fn runtime_failure_yields_keep_alive() {
        let (generator, _) = generator(ScriptedGenerator::failing());
        let project = sample_projects().remove(0);
        let line = generator.request_runtime_line(&project, "a task").await;
        assert!(!line.is_empty());
        assert!(line.contains("keep-alive"));
    }

    #[tokio::test]
    async fn offline_generator_always_fails() {
        let request = GenerationRequest {
            model: DEFAULT_MODEL.to_string(),
            prompt: "x".into(),
            system_instruction: "y".into(),
            max_output_tokens: 1,
        };
        assert!(OfflineGenerator.generate(&request).await.is_err());
    }

    #[test]
    fn request_body_uses_camel_case_wire_names() {
        let request = GenerationRequest {
            model: DEFAULT_MODEL.to_string(),
            prompt: "hello".into(),
            system_instruction: "one line only".into(),
            max_output_tokens: 60,
        };
        let body = serde_json::to_value(GenerateContentRequest::from_request(&request)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "one line only");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 60);
        assert!(body["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"a\n"},{"text":"b"}],"role":"model"}}]}"#;
        let payload: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.text().as_deref(), Some("a\nb"));
        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.text().is_none());
    }
}
