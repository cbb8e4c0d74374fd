//! JSON-file-backed persistence for projects and AI tools.
//!
//! Each store is one JSON array file (`projects.json`, `ai_tools.json`).
//! [`JsonStore::save`] is an upsert-by-id followed by a whole-collection
//! rewrite, last-writer-wins. The read-modify-write span is serialized per
//! store through an async mutex, so concurrent workers in one process cannot
//! lose each other's updates; across OS processes the file stays
//! last-writer-wins.
//!
//! Lookups on a missing id return [`HarnessError::NotFound`], never a zero
//! value. A backing path that is a directory is a fatal configuration error
//! ([`HarnessError::PathIsDirectory`]), distinct from transient I/O.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::HarnessError;
use crate::models::{AiTool, Project};

/// A record persistable in a [`JsonStore`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Entity label used in NotFound errors ("project", "ai tool").
    const ENTITY: &'static str;

    fn id(&self) -> &str;
}

impl Record for Project {
    const ENTITY: &'static str = "project";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for AiTool {
    const ENTITY: &'static str = "ai tool";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type ProjectStore = JsonStore<Project>;
pub type ToolStore = JsonStore<AiTool>;

/// Durable id → record mapping over a single JSON array file.
#[derive(Debug)]
pub struct JsonStore<T: Record> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _record: PhantomData<T>,
}

impl<T: Record> JsonStore<T> {
    /// Opens a store at `path`. The file does not have to exist yet; a
    /// missing file reads as the empty collection.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HarnessError> {
        let path = path.into();
        if path.is_dir() {
            return Err(HarnessError::PathIsDirectory { path });
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seeds an empty collection file if none exists. Idempotent.
    pub async fn init(&self) -> Result<(), HarnessError> {
        let _guard = self.write_lock.lock().await;
        if !self.path.exists() {
            self.write_collection(&[])?;
        }
        Ok(())
    }

    pub async fn find_all(&self) -> Result<Vec<T>, HarnessError> {
        self.read_collection()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<T, HarnessError> {
        self.read_collection()?
            .into_iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| HarnessError::NotFound {
                entity: T::ENTITY,
                id: id.to_string(),
            })
    }

    /// Upsert by id: replaces the record with a matching id or appends, then
    /// rewrites the whole backing file.
    pub async fn save(&self, record: &T) -> Result<(), HarnessError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_collection()?;
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(slot) => *slot = record.clone(),
            None => records.push(record.clone()),
        }
        self.write_collection(&records)
    }

    /// Locked read-modify-write over one record. Used by the tool store's
    /// enable/disable; the mutation runs under the same guard as the rewrite.
    async fn update_with(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut T),
    ) -> Result<T, HarnessError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_collection()?;
        let slot = records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| HarnessError::NotFound {
                entity: T::ENTITY,
                id: id.to_string(),
            })?;
        mutate(slot);
        let updated = slot.clone();
        self.write_collection(&records)?;
        Ok(updated)
    }

    fn read_collection(&self) -> Result<Vec<T>, HarnessError> {
        if self.path.is_dir() {
            return Err(HarnessError::PathIsDirectory {
                path: self.path.clone(),
            });
        }
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| HarnessError::FileRead {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| HarnessError::FileRead {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn write_collection(&self, records: &[T]) -> Result<(), HarnessError> {
        if self.path.is_dir() {
            return Err(HarnessError::PathIsDirectory {
                path: self.path.clone(),
            });
        }
        let write_err = |e: std::io::Error| HarnessError::FileWrite {
            path: self.path.clone(),
            reason: e.to_string(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json =
            serde_json::to_string_pretty(records).map_err(|e| HarnessError::FileWrite {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        // Rewrite via a sibling temp file so readers never see a torn file.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

impl JsonStore<AiTool> {
    /// Clears `disabled_at`, making the tool selectable again.
    pub async fn enable(&self, id: &str) -> Result<AiTool, HarnessError> {
        self.update_with(id, |tool| {
            tool.disabled_at = None;
            tool.updated_at = chrono::Utc::now();
        })
        .await
    }

    /// Stamps `disabled_at`. The tool stays resolvable for projects that
    /// already reference it; only new selection is blocked.
    pub async fn disable(&self, id: &str) -> Result<AiTool, HarnessError> {
        self.update_with(id, |tool| {
            tool.disabled_at = Some(chrono::Utc::now());
            tool.updated_at = chrono::Utc::now();
        })
        .await
    }
}
