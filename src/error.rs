//! Error taxonomy for the summarization core.
//!
//! Every failure the core can produce is one of the variants below, so the
//! per-file vs run-fatal split in the processor is an exhaustive match, not a
//! downcast. [`HarnessError::is_file_scoped`] encodes which kinds may be
//! absorbed into the report at the file boundary; everything else propagates
//! to the run boundary, where the project transitions to Failed and the
//! worker logs and swallows the error. Nothing crosses the worker boundary;
//! the store is the only channel for reporting outcomes.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// A project or tool id did not resolve. Never converted to a default
    /// value; callers must treat "not found" and "zero value" differently.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Reading or parsing a file failed. Per-file this is absorbed into the
    /// report; for the store backing file it is fatal.
    #[error("failed to read {}: {}", .path.display(), .reason)]
    FileRead { path: PathBuf, reason: String },

    /// Writing a file failed. Fatal when the file is the report or a store;
    /// absorbed when scoped to a single source file's artifacts.
    #[error("failed to write {}: {}", .path.display(), .reason)]
    FileWrite { path: PathBuf, reason: String },

    /// The AI endpoint is unreachable, misconfigured, or answered with
    /// something other than a 2xx `{"result": ...}` body.
    #[error("AI tool {tool}: {reason}")]
    ApiConfiguration { tool: String, reason: String },

    /// A store backing path collides with a directory. Always fatal; never
    /// silently worked around.
    #[error("storage path is a directory: {}", .path.display())]
    PathIsDirectory { path: PathBuf },
}

impl HarnessError {
    /// Whether this error may be absorbed at the file boundary of the
    /// processing loop. Position still matters: report-file write errors are
    /// raised outside the per-file scope and stay fatal.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            HarnessError::FileRead { .. }
                | HarnessError::FileWrite { .. }
                | HarnessError::ApiConfiguration { .. }
        )
    }

    /// Categorized message persisted on a Failed project, prefixed by kind
    /// so operators can triage without reading the report.
    pub fn failure_message(&self) -> String {
        match self {
            HarnessError::FileRead { .. } | HarnessError::FileWrite { .. } => {
                format!("file processing error: {}", self)
            }
            HarnessError::ApiConfiguration { .. } => {
                format!("api configuration error: {}", self)
            }
            HarnessError::NotFound { .. } | HarnessError::PathIsDirectory { .. } => {
                self.to_string()
            }
        }
    }
}
