//! Project processing orchestration: the state-machine driver.
//!
//! One [`ProjectProcessor::run`] takes a project from Pending through
//! Processing to a terminal Completed or Failed:
//!
//! ```text
//! Pending ──start_processing──▶ Processing ──┬──▶ Completed
//!                                            └──▶ Failed
//! ```
//!
//! Failure isolation is two-tiered. Errors scoped to a single source file
//! (read failures, per-file endpoint errors) are rendered into the report
//! and never abort the run. Errors in setup (missing project, unresolvable
//! tool, missing endpoint URL) and I/O on the report file itself are
//! run-fatal: the project transitions to Failed with a categorized message
//! and the error is returned to the worker, which logs and swallows it.
//!
//! The Processing transition is persisted before the first AI call, so an
//! observer polling the store sees the run as live even if the host dies
//! uncleanly mid-loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::collect::FileCollector;
use crate::config::{AiConfig, Config};
use crate::error::HarnessError;
use crate::executor::{create_executor, ToolExecutor};
use crate::models::Project;
use crate::report::RunReport;
use crate::store::{ProjectStore, ToolStore};

/// Drives the lifecycle of one project run. Constructed fresh per run by
/// the worker; holds no mutable state of its own.
pub struct ProjectProcessor {
    projects: Arc<ProjectStore>,
    tools: Arc<ToolStore>,
    collector: FileCollector,
    reports_dir: PathBuf,
    ai: AiConfig,
}

impl ProjectProcessor {
    pub fn new(
        projects: Arc<ProjectStore>,
        tools: Arc<ToolStore>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            projects,
            tools,
            collector: FileCollector::new(&config.collector)?,
            reports_dir: config.storage.reports_dir.clone(),
            ai: config.ai.clone(),
        })
    }

    /// Executes one run to a terminal state. A missing project id aborts
    /// with nothing persisted; any other fatal error is recorded on the
    /// project as a Failed transition before being returned.
    pub async fn run(&self, project_id: &str) -> Result<(), HarnessError> {
        let mut project = self.projects.find_by_id(project_id).await?;
        match self.execute(&mut project).await {
            Ok(processed) => {
                let message = format!("summarized {} file(s)", processed.len());
                project.complete(processed, message);
                self.projects.save(&project).await?;
                Ok(())
            }
            Err(err) => {
                project.fail(err.failure_message());
                if let Err(save_err) = self.projects.save(&project).await {
                    tracing::error!(
                        project_id = %project.id,
                        error = %save_err,
                        "failed to persist failed state"
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, project: &mut Project) -> Result<Vec<String>, HarnessError> {
        project.start_processing();
        self.projects.save(project).await?;

        // Setup errors from here to the first file are run-fatal. A disabled
        // tool still resolves; disabling only blocks new selection.
        let tool = self.tools.find_by_id(&project.tool).await?;
        let executor = create_executor(&tool, &self.ai)?;
        let mut report = RunReport::create(&self.reports_dir, project, &tool)?;

        let files = self.collector.collect_files(&project.source)?;
        tracing::debug!(project_id = %project.id, files = files.len(), "collected source files");

        let mut processed = Vec::new();
        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            match self
                .process_file(executor.as_ref(), &report, &path, &file_name)
                .await
            {
                Ok(Some(summary)) => {
                    report.add_summary(&file_name, &summary)?;
                    processed.push(file_name);
                }
                Ok(None) => {
                    tracing::debug!(project_id = %project.id, file = %file_name, "skipped empty file");
                }
                Err(err) if err.is_file_scoped() => {
                    tracing::warn!(
                        project_id = %project.id,
                        file = %file_name,
                        error = %err,
                        "file processing failed, continuing"
                    );
                    report.add_failure(&file_name, &err)?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(processed)
    }

    /// One file through the pipeline. `Ok(None)` means the file was empty
    /// after trimming and was skipped: not an error, not processed.
    async fn process_file(
        &self,
        executor: &dyn ToolExecutor,
        report: &RunReport,
        path: &Path,
        file_name: &str,
    ) -> Result<Option<String>, HarnessError> {
        let content = self.collector.read_content(path)?;
        if content.text.trim().is_empty() {
            return Ok(None);
        }
        report.write_prompt_artifact(file_name, &content.text, &content.images)?;
        let summary = executor.execute(&content.text, &content.images).await?;
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectorConfig, StorageConfig};
    use crate::models::{AiTool, ProjectResult, ProjectStatus};
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        Config {
            storage: StorageConfig {
                dir: tmp.path().join("data"),
                reports_dir: tmp.path().join("reports"),
            },
            collector: CollectorConfig::default(),
            ai: AiConfig::default(),
        }
    }

    fn stores(config: &Config) -> (Arc<ProjectStore>, Arc<ToolStore>) {
        (
            Arc::new(ProjectStore::open(config.projects_path()).unwrap()),
            Arc::new(ToolStore::open(config.tools_path()).unwrap()),
        )
    }

    #[tokio::test]
    async fn missing_project_aborts_with_nothing_persisted() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let (projects, tools) = stores(&config);
        let processor = ProjectProcessor::new(projects.clone(), tools, &config).unwrap();

        let err = processor.run("ghost").await.unwrap_err();
        assert!(matches!(err, HarnessError::NotFound { .. }));
        assert!(projects.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_reaches_failed_with_zero_processed() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let (projects, tools) = stores(&config);

        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("file.txt"), "content").unwrap();

        let project = Project::new("p", &src, "no-such-tool");
        projects.save(&project).await.unwrap();

        let processor = ProjectProcessor::new(projects.clone(), tools, &config).unwrap();
        assert!(processor.run(&project.id).await.is_err());

        let loaded = projects.find_by_id(&project.id).await.unwrap();
        assert_eq!(loaded.status(), ProjectStatus::Failed);
        match loaded.result.unwrap() {
            ProjectResult::Error { error } => assert!(error.contains("not found")),
            other => panic!("expected error payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_files_are_skipped_and_run_completes() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let (projects, tools) = stores(&config);

        // The endpoint is never called: the only file trims to empty.
        let tool = AiTool::new("summarizer", None, Some("http://127.0.0.1:9/api".into()));
        tools.save(&tool).await.unwrap();

        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("blank.txt"), "   \n\t\n").unwrap();

        let project = Project::new("p", &src, tool.id.clone());
        projects.save(&project).await.unwrap();

        let processor = ProjectProcessor::new(projects.clone(), tools, &config).unwrap();
        processor.run(&project.id).await.unwrap();

        let loaded = projects.find_by_id(&project.id).await.unwrap();
        assert_eq!(loaded.status(), ProjectStatus::Completed);
        match loaded.result.unwrap() {
            ProjectResult::Success {
                processed_files, ..
            } => assert!(processed_files.is_empty()),
            other => panic!("expected success payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn per_file_read_failure_does_not_abort_the_run() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let (projects, tools) = stores(&config);

        let tool = AiTool::new("summarizer", None, Some("http://127.0.0.1:9/api".into()));
        tools.save(&tool).await.unwrap();

        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        // Invalid UTF-8: read_to_string fails, scoped to this file.
        std::fs::write(src.join("binary.txt"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let project = Project::new("p", &src, tool.id.clone());
        projects.save(&project).await.unwrap();

        let processor = ProjectProcessor::new(projects.clone(), tools, &config).unwrap();
        processor.run(&project.id).await.unwrap();

        let loaded = projects.find_by_id(&project.id).await.unwrap();
        assert_eq!(loaded.status(), ProjectStatus::Completed);

        let report = std::fs::read_to_string(
            config
                .storage
                .reports_dir
                .join(format!("{}.md", project.id)),
        )
        .unwrap();
        assert!(report.contains("## file: binary.txt"));
        assert!(report.contains("processing failed"));
    }

    #[tokio::test]
    async fn processing_is_visible_before_tool_resolution_fails() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let (projects, tools) = stores(&config);

        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();

        let project = Project::new("p", &src, "no-such-tool");
        projects.save(&project).await.unwrap();

        let processor = ProjectProcessor::new(projects.clone(), tools, &config).unwrap();
        let _ = processor.run(&project.id).await;

        // The failed run still stamped executed_at on its way in.
        let loaded = projects.find_by_id(&project.id).await.unwrap();
        assert!(loaded.executed_at.is_some());
        assert!(loaded.finished_at.is_some());
    }
}
