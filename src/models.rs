//! Core data models for the summarization orchestrator.
//!
//! A [`Project`] binds a named source directory to one AI tool and carries
//! the timestamps a run mutates. Its status is never stored: it is derived
//! from `(executed_at, finished_at, result)` by [`Project::status`], so it
//! cannot drift from the persisted fields.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work: a named source directory bound to one AI tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub source: PathBuf,
    /// Id of the [`AiTool`] used to summarize this project's files.
    pub tool: String,
    #[serde(default)]
    pub result: Option<ProjectResult>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Terminal payload of a run: either the processed-file list or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectResult {
    Success {
        processed_files: Vec<String>,
        message: String,
    },
    Error {
        error: String,
    },
}

/// Lifecycle status, computed and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            source: source.into(),
            tool: tool.into(),
            result: None,
            created_at: Utc::now(),
            executed_at: None,
            finished_at: None,
        }
    }

    /// Pure function of the three persisted fields.
    pub fn status(&self) -> ProjectStatus {
        match (&self.executed_at, &self.finished_at, &self.result) {
            (None, _, _) => ProjectStatus::Pending,
            (Some(_), None, _) => ProjectStatus::Processing,
            (Some(_), Some(_), Some(ProjectResult::Error { .. })) => ProjectStatus::Failed,
            (Some(_), Some(_), _) => ProjectStatus::Completed,
        }
    }

    /// Marks the run as started. Clears any previous terminal state so a
    /// re-triggered project restarts its lifecycle from Processing.
    pub fn start_processing(&mut self) {
        self.executed_at = Some(Utc::now());
        self.finished_at = None;
        self.result = None;
    }

    pub fn complete(&mut self, processed_files: Vec<String>, message: String) {
        self.finished_at = Some(Utc::now());
        self.result = Some(ProjectResult::Success {
            processed_files,
            message,
        });
    }

    pub fn fail(&mut self, error: String) {
        self.finished_at = Some(Utc::now());
        self.result = Some(ProjectResult::Error { error });
    }
}

/// A named external HTTP endpoint capable of summarizing text and images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiTool {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Required for execution; checked by the executor factory.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` = active. A disabled tool is never offered for new project
    /// creation but stays resolvable for projects already referencing it.
    #[serde(default)]
    pub disabled_at: Option<DateTime<Utc>>,
}

impl AiTool {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        endpoint_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            endpoint_url,
            created_at: now,
            updated_at: now,
            disabled_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.disabled_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_lifecycle() {
        let mut p = Project::new("p", "/tmp/src", "t1");
        assert_eq!(p.status(), ProjectStatus::Pending);

        p.start_processing();
        assert_eq!(p.status(), ProjectStatus::Processing);

        p.complete(vec!["a.txt".into()], "summarized 1 file(s)".into());
        assert_eq!(p.status(), ProjectStatus::Completed);
    }

    #[test]
    fn error_result_means_failed() {
        let mut p = Project::new("p", "/tmp/src", "t1");
        p.start_processing();
        p.fail("api configuration error: boom".into());
        assert_eq!(p.status(), ProjectStatus::Failed);
    }

    #[test]
    fn finished_without_error_is_completed() {
        // A finished run whose result carries no "error" key is Completed
        // even if the payload is missing entirely.
        let mut p = Project::new("p", "/tmp/src", "t1");
        p.executed_at = Some(Utc::now());
        p.finished_at = Some(Utc::now());
        p.result = None;
        assert_eq!(p.status(), ProjectStatus::Completed);
    }

    #[test]
    fn restart_clears_terminal_state() {
        let mut p = Project::new("p", "/tmp/src", "t1");
        p.start_processing();
        p.fail("file processing error: gone".into());
        p.start_processing();
        assert_eq!(p.status(), ProjectStatus::Processing);
        assert!(p.result.is_none());
        assert!(p.finished_at.is_none());
    }

    #[test]
    fn result_payload_roundtrips_untagged() {
        let success = ProjectResult::Success {
            processed_files: vec!["file.txt".into()],
            message: "summarized 1 file(s)".into(),
        };
        let json = serde_json::to_string(&success).unwrap();
        assert!(json.contains("processed_files"));
        assert_eq!(
            serde_json::from_str::<ProjectResult>(&json).unwrap(),
            success
        );

        let error: ProjectResult = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert_eq!(
            error,
            ProjectResult::Error {
                error: "boom".into()
            }
        );
    }

    #[test]
    fn disabled_tool_is_not_active() {
        let mut tool = AiTool::new("summarizer", None, Some("http://localhost:9999/api".into()));
        assert!(tool.is_active());
        tool.disabled_at = Some(Utc::now());
        assert!(!tool.is_active());
    }
}
