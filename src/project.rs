//! Project definitions.
//!
//! A `Project` describes a command the dashboard pretends to run: where it lives,
//! what it executes and which port it claims. Projects are created from the add form
//! (`NewProject`) or loaded from the project store, and are only ever replaced or removed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared project type. Drives the form defaults and the generation prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectKind {
    React,
    Node,
    Python,
    Vue,
    Next,
    Other,
}

impl ProjectKind {
    /// All kinds in form order.
    pub const ALL: [ProjectKind; 6] = [
        ProjectKind::React,
        ProjectKind::Node,
        ProjectKind::Python,
        ProjectKind::Vue,
        ProjectKind::Next,
        ProjectKind::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProjectKind::React => "React",
            ProjectKind::Node => "Node.js",
            ProjectKind::Python => "Python",
            ProjectKind::Vue => "Vue",
            ProjectKind::Next => "Next.js",
            ProjectKind::Other => "Other",
        }
    }

    /// Command suggested by the add form for this kind.
    pub fn default_command(self) -> &'static str {
        match self {
            ProjectKind::React => "npm start",
            ProjectKind::Node => "npm run dev",
            ProjectKind::Python => "python app.py",
            ProjectKind::Vue => "npm run serve",
            ProjectKind::Next => "npm run dev",
            ProjectKind::Other => "",
        }
    }

    /// Port suggested by the add form for this kind.
    pub fn default_port(self) -> u16 {
        match self {
            ProjectKind::React => 3000,
            ProjectKind::Node => 5000,
            ProjectKind::Python => 8000,
            ProjectKind::Vue => 8080,
            ProjectKind::Next => 3000,
            ProjectKind::Other => 8080,
        }
    }

    /// Next kind in form order, wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Previous kind in form order, wrapping around.
    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// A single environment variable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// A project the dashboard manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Declared type.
    pub kind: ProjectKind,
    /// Shell command string, echoed and described but never executed.
    pub command: String,
    /// Working directory string.
    pub directory: String,
    /// Declared port.
    pub port: u16,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// Start this project when the dashboard launches.
    #[serde(default)]
    pub auto_start: bool,
}

/// User input for a new project, as collected by the add form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub kind: ProjectKind,
    pub command: String,
    pub directory: String,
    pub port: u16,
}

impl Project {
    /// Builds a project from form data with a fresh id, no environment and auto-start off.
    pub fn from_new(data: NewProject) -> Self {
        Self {
            id: ProjectId::generate(),
            name: data.name,
            kind: data.kind,
            command: data.command,
            directory: data.directory,
            port: data.port,
            env: Vec::new(),
            auto_start: false,
        }
    }

    /// The invocation echoed into the log when the project starts.
    pub fn invocation(&self) -> String {
        format!(
            "cd {} && {}",
            shell_words::quote(&self.directory),
            self.command
        )
    }
}

/// Projects used when nothing has been persisted yet.
pub fn sample_projects() -> Vec<Project> {
    vec![
        Project {
            id: ProjectId::from("sample-frontend"),
            name: "Frontend App".to_string(),
            kind: ProjectKind::React,
            command: "npm start".to_string(),
            directory: "./frontend".to_string(),
            port: 3000,
            env: Vec::new(),
            auto_start: false,
        },
        Project {
            id: ProjectId::from("sample-backend"),
            name: "Backend API".to_string(),
            kind: ProjectKind::Node,
            command: "npm run dev".to_string(),
            directory: "./backend".to_string(),
            port: 5000,
            env: vec![EnvVar {
                key: "NODE_ENV".to_string(),
                value: "development".to_string(),
            }],
            auto_start: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_new_applies_defaults() {
        let project = Project::from_new(NewProject {
            name: "api".into(),
            kind: ProjectKind::Node,
            command: "node server.js".into(),
            directory: "./api".into(),
            port: 5000,
        });
        assert!(project.env.is_empty());
        assert!(!project.auto_start);
        assert!(!project.id.as_str().is_empty());
    }

    #[test]
    fn invocation_quotes_directory_with_spaces() {
        let mut project = sample_projects().remove(0);
        assert_eq!(project.invocation(), "cd ./frontend && npm start");
        project.directory = "./my app".into();
        assert_eq!(project.invocation(), "cd './my app' && npm start");
    }

    #[test]
    fn kind_cycles_in_both_directions() {
        assert_eq!(ProjectKind::React.next(), ProjectKind::Node);
        assert_eq!(ProjectKind::Other.next(), ProjectKind::React);
        assert_eq!(ProjectKind::React.prev(), ProjectKind::Other);
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let raw = r#"{"id":"x","name":"web","kind":"Vue","command":"npm run serve","directory":".","port":8080}"#;
        let project: Project = serde_json::from_str(raw).unwrap();
        assert_eq!(project.kind, ProjectKind::Vue);
        assert!(project.env.is_empty());
        assert!(!project.auto_start);
    }
}
