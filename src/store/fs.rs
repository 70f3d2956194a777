use super::{SidecarStore, StoreError, PREPROC_FILE, STAGE_FILE};
use crate::step::{StepRecord, SIDECAR_EXTENSION};
use crate::template::ReplacementMap;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Sidecars kept as JSON files directly under the build root
#[derive(Debug, Clone)]
pub struct FsSidecarStore {
    root: PathBuf,
}

impl FsSidecarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.path_of(name);
        let text = serde_json::to_string_pretty(value).map_err(|source| StoreError::Encode {
            what: name.to_string(),
            source,
        })?;
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(|source| StoreError::Io { path: path.clone(), source })?;
        debug!(path = %path.display(), "Wrote sidecar");
        Ok(())
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_of(name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_of(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

impl SidecarStore for FsSidecarStore {
    fn put(&self, name: &str, record: &StepRecord) -> Result<(), StoreError> {
        self.write_json(name, record)
    }

    fn get(&self, name: &str) -> Result<StepRecord, StoreError> {
        let text = self
            .read_optional(name)?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(StepRecord::from_json_lenient(&text))
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SIDECAR_EXTENSION) {
                continue;
            }
            if !path.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!(?name, "Skipping sidecar with non UTF-8 name"),
            }
        }

        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.remove(name)
    }

    fn read_stage(&self) -> Result<Option<String>, StoreError> {
        let Some(text) = self.read_optional(STAGE_FILE)? else {
            return Ok(None);
        };

        // Older writers stored the stage unquoted.
        let stage = serde_json::from_str::<String>(&text).unwrap_or_else(|_| text.trim().to_string());
        Ok(Some(stage))
    }

    fn write_stage(&self, stage: &str) -> Result<(), StoreError> {
        self.write_json(STAGE_FILE, stage)
    }

    fn read_preproc(&self) -> Result<Option<ReplacementMap>, StoreError> {
        let Some(text) = self.read_optional(PREPROC_FILE)? else {
            return Ok(None);
        };

        match serde_json::from_str::<ReplacementMap>(&text) {
            Ok(replacements) => Ok(Some(replacements)),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed preprocessing snapshot");
                Ok(Some(ReplacementMap::new()))
            }
        }
    }

    fn write_preproc(&self, replacements: &ReplacementMap) -> Result<(), StoreError> {
        self.write_json(PREPROC_FILE, replacements)
    }

    fn clear_snapshots(&self) -> Result<(), StoreError> {
        self.remove(STAGE_FILE)?;
        self.remove(PREPROC_FILE)
    }
}
