//! Custom display names for devices.
//!
//! The registry only consumes [`NameStore`]; where the names live is up to the
//! application. Two stores ship with the crate: an in-memory map and a JSON
//! file that is rewritten atomically on every change.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::DeviceId;

pub trait NameStore {
    fn name_for(&self, id: &DeviceId) -> Option<String>;
    /// Set or clear (`None`) the custom name of `id`.
    fn set_name(&mut self, id: DeviceId, name: Option<String>) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryNameStore {
    names: HashMap<DeviceId, String>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameStore for MemoryNameStore {
    fn name_for(&self, id: &DeviceId) -> Option<String> {
        self.names.get(id).cloned()
    }

    fn set_name(&mut self, id: DeviceId, name: Option<String>) -> Result<()> {
        match name {
            Some(n) => self.names.insert(id, n),
            None => self.names.remove(&id),
        };
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NameFile {
    names: HashMap<String, String>,
    last_updated: Option<DateTime<Utc>>,
}

/// Names persisted as JSON at `path`.
#[derive(Debug)]
pub struct JsonNameStore {
    path: PathBuf,
    file: NameFile,
}

impl JsonNameStore {
    /// Open the store at `path`. A missing file starts empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(content.trim_start_matches('\0'))
                .map_err(|e| anyhow!("Failed to parse name store {}: {}", path.display(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => NameFile::default(),
            Err(e) => {
                return Err(anyhow!(
                    "Failed to read name store {}: {}",
                    path.display(),
                    e
                ))
            }
        };
        Ok(Self { path, file })
    }

    pub fn len(&self) -> usize {
        self.file.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.names.is_empty()
    }

    fn save(&self) -> Result<()> {
        use std::fs::{self as sfs, File, OpenOptions};
        use std::io::Write;
        let content = serde_json::to_string_pretty(&self.file)?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        sfs::create_dir_all(dir)?;
        let base = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("names.json");

        // Write a sibling temp file, then rename over the destination.
        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(mut tmp) => {
                    tmp.write_all(content.as_bytes())?;
                    tmp.flush()?;
                    let _ = tmp.sync_all();
                    break candidate;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                }
                Err(e) => {
                    return Err(anyhow!(
                        "Failed to create temp file for atomic write: {}",
                        e
                    ))
                }
            }
        };
        sfs::rename(&tmp_path, &self.path)?;
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
        Ok(())
    }
}

impl NameStore for JsonNameStore {
    fn name_for(&self, id: &DeviceId) -> Option<String> {
        self.file.names.get(&id.to_string()).cloned()
    }

    fn set_name(&mut self, id: DeviceId, name: Option<String>) -> Result<()> {
        match name {
            Some(n) => self.file.names.insert(id.to_string(), n),
            None => self.file.names.remove(&id.to_string()),
        };
        self.file.last_updated = Some(Utc::now());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_store_persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("names.json");
        let id = DeviceId::new_random();

        let mut store = JsonNameStore::open(&path).unwrap();
        assert!(store.is_empty());
        store.set_name(id, Some("Desk lamp".into())).unwrap();

        let reopened = JsonNameStore::open(&path).unwrap();
        assert_eq!(reopened.name_for(&id).as_deref(), Some("Desk lamp"));
    }

    #[test]
    fn clearing_a_name_removes_it() {
        let mut store = MemoryNameStore::new();
        let id = DeviceId::new_random();
        store.set_name(id, Some("Porch".into())).unwrap();
        store.set_name(id, None).unwrap();
        assert_eq!(store.name_for(&id), None);
    }
}
