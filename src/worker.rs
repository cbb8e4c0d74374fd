//! Isolated run execution.
//!
//! A [`Worker`] is one triggered run: it owns a [`ProjectProcessor`], runs
//! it on its own tokio task, and reports only through the project store;
//! there is no return channel to the caller. Any processor error is logged
//! with its chain and swallowed; a worker never takes down its host. The
//! structured start/finish events keyed by project id are the only way an
//! external observer can tell "never started" from "finished".
//!
//! [`RunRegistry`] tracks the project ids currently running in this process
//! and gives at-most-one-concurrent-run-per-project. The registry is not
//! durable: a run that was live when the process died leaves its project in
//! Processing, which [`recover_interrupted`] resolves to Failed on the next
//! explicit recovery pass.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::error::HarnessError;
use crate::models::ProjectStatus;
use crate::process::ProjectProcessor;
use crate::store::ProjectStore;

/// Rejection for a project id that already has a live run in this process.
#[derive(Debug, thiserror::Error)]
#[error("project {0} already has a run in progress")]
pub struct RunInProgress(pub String);

/// Process-wide set of running project ids. Populated on spawn, cleared
/// when the claim guard drops with the finished task.
#[derive(Default)]
pub struct RunRegistry {
    running: Mutex<HashSet<String>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, project_id: &str) -> bool {
        self.running.lock().unwrap().contains(project_id)
    }

    fn claim(self: &Arc<Self>, project_id: &str) -> Option<RunClaim> {
        let mut running = self.running.lock().unwrap();
        if !running.insert(project_id.to_string()) {
            return None;
        }
        Some(RunClaim {
            registry: Arc::clone(self),
            project_id: project_id.to_string(),
        })
    }

    fn release(&self, project_id: &str) {
        self.running.lock().unwrap().remove(project_id);
    }
}

/// RAII claim on a project id; releases the registry slot on drop.
struct RunClaim {
    registry: Arc<RunRegistry>,
    project_id: String,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.registry.release(&self.project_id);
    }
}

/// One triggered run. Owns its processor; communicates only via the store.
pub struct Worker {
    project_id: String,
    processor: ProjectProcessor,
}

impl Worker {
    pub fn new(project_id: impl Into<String>, processor: ProjectProcessor) -> Self {
        Self {
            project_id: project_id.into(),
            processor,
        }
    }

    /// Runs to completion. No return value: outcomes live in the store, and
    /// processor errors are logged and swallowed here.
    pub async fn run(self) {
        tracing::info!(project_id = %self.project_id, "worker started");
        match self.processor.run(&self.project_id).await {
            Ok(()) => {
                tracing::info!(project_id = %self.project_id, "worker finished");
            }
            Err(err) => {
                tracing::error!(
                    project_id = %self.project_id,
                    error = %err,
                    "worker finished with failure"
                );
            }
        }
    }

    /// Spawns a worker task for `project_id`, claiming its registry slot
    /// first. Refused when a run for the same project is already live.
    pub fn spawn(
        processor: ProjectProcessor,
        registry: &Arc<RunRegistry>,
        project_id: String,
    ) -> Result<JoinHandle<()>, RunInProgress> {
        let claim = registry
            .claim(&project_id)
            .ok_or_else(|| RunInProgress(project_id.clone()))?;
        let worker = Worker::new(project_id, processor);
        Ok(tokio::spawn(async move {
            worker.run().await;
            drop(claim);
        }))
    }
}

/// Fails every project left in Processing by a run that died with its host.
/// Invoked explicitly (not on every startup) so it cannot race live workers.
pub async fn recover_interrupted(projects: &ProjectStore) -> Result<Vec<String>, HarnessError> {
    let mut recovered = Vec::new();
    for mut project in projects.find_all().await? {
        if project.status() == ProjectStatus::Processing {
            tracing::warn!(project_id = %project.id, "recovering interrupted run");
            project.fail("run interrupted before completion".to_string());
            projects.save(&project).await?;
            recovered.push(project.id);
        }
    }
    Ok(recovered)
}
