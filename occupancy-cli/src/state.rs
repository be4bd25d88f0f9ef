use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use occupancy_core::{MemoryStore, Snapshot};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub fn occupancy_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("OCCUPANCY_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".occupancy"))
}

pub fn ensure_occupancy_home() -> Result<PathBuf> {
    let dir = occupancy_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn state_path() -> Result<PathBuf> {
    Ok(ensure_occupancy_home()?.join("state.json"))
}

/// A [`MemoryStore`] loaded from and saved back to a JSON snapshot.
///
/// Holds an exclusive lock on `<path>.lock` until dropped, so two runs never
/// interleave a load and a save.
pub struct FileStore {
    path: PathBuf,
    memory: Arc<MemoryStore>,
    _lock: File,
}

impl FileStore {
    pub fn open_default() -> Result<Self> {
        Self::open(&state_path()?)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let lock_path = path.with_extension("json.lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("open {}", lock_path.display()))?;
        lock.lock_exclusive()
            .with_context(|| format!("lock {}", lock_path.display()))?;

        let snapshot = if path.exists() {
            let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str::<Snapshot>(&s).with_context(|| format!("parse {}", path.display()))?
        } else {
            Snapshot::default()
        };
        debug!(path = %path.display(), rules = snapshot.rules.len(), "state loaded");
        Ok(Self {
            path: path.to_path_buf(),
            memory: Arc::new(MemoryStore::from_snapshot(snapshot)),
            _lock: lock,
        })
    }

    pub fn store(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn shared(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.memory)
    }

    /// Write the snapshot next to the target and rename it into place.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.memory.snapshot()).context("serialize state")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}
