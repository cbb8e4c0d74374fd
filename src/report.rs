//! Run artifacts: the Markdown report and per-file prompt dumps.
//!
//! One report per project run, recreated from scratch on every run so a
//! re-trigger is idempotent. Sections are appended as the file loop
//! progresses, so a crashed run leaves a readable partial report. Report
//! write failures are fatal to the run (unlike per-file errors, which are
//! rendered *into* the report).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::collect::ExtractedImage;
use crate::error::HarnessError;
use crate::models::{AiTool, Project};

/// The Markdown artifact of one run, plus the prompt-dump directory.
pub struct RunReport {
    path: PathBuf,
    prompts_dir: PathBuf,
    file: File,
}

impl RunReport {
    /// Creates `<reports_dir>/<project_id>.md`, deleting any previous report
    /// and prompt dumps for this project, and writes the title line.
    pub fn create(
        reports_dir: &Path,
        project: &Project,
        tool: &AiTool,
    ) -> Result<Self, HarnessError> {
        let path = reports_dir.join(format!("{}.md", project.id));
        let prompts_dir = reports_dir.join(format!("{}.prompts", project.id));
        let write_err = |p: &Path, e: std::io::Error| HarnessError::FileWrite {
            path: p.to_path_buf(),
            reason: e.to_string(),
        };

        std::fs::create_dir_all(reports_dir).map_err(|e| write_err(reports_dir, e))?;
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| write_err(&path, e))?;
        }
        if prompts_dir.exists() {
            std::fs::remove_dir_all(&prompts_dir).map_err(|e| write_err(&prompts_dir, e))?;
        }
        std::fs::create_dir_all(&prompts_dir).map_err(|e| write_err(&prompts_dir, e))?;

        let mut file = File::create(&path).map_err(|e| write_err(&path, e))?;
        writeln!(file, "# {} — summaries for project {}", tool.name, project.name)
            .map_err(|e| write_err(&path, e))?;

        Ok(Self {
            path,
            prompts_dir,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_summary(&mut self, file_name: &str, summary: &str) -> Result<(), HarnessError> {
        self.append(&format!(
            "\n## file: {}\n\n### result\n\n{}\n",
            file_name, summary
        ))
    }

    /// Inline error notice for a file whose processing failed. The run
    /// continues; only the section records the failure.
    pub fn add_failure(
        &mut self,
        file_name: &str,
        error: &HarnessError,
    ) -> Result<(), HarnessError> {
        self.append(&format!(
            "\n## file: {}\n\n> processing failed: {}\n",
            file_name, error
        ))
    }

    /// Debug artifact: the exact payload sent for one file, as a JSON array
    /// of text and image entries. Write-only; nothing in the core reads it.
    pub fn write_prompt_artifact(
        &self,
        file_name: &str,
        text: &str,
        images: &[ExtractedImage],
    ) -> Result<(), HarnessError> {
        let mut entries = vec![serde_json::json!({ "type": "text", "data": text })];
        for img in images {
            entries.push(serde_json::json!({
                "type": "image",
                "figure": img.figure,
                "data": BASE64.encode(&img.data),
            }));
        }
        let path = self.prompts_dir.join(format!("{}.prompt.json", file_name));
        let json = serde_json::to_string_pretty(&entries).map_err(|e| HarnessError::FileWrite {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| HarnessError::FileWrite {
            path,
            reason: e.to_string(),
        })
    }

    fn append(&mut self, section: &str) -> Result<(), HarnessError> {
        self.file
            .write_all(section.as_bytes())
            .map_err(|e| HarnessError::FileWrite {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}
