//! Storage layer: the scene IDs that identification keeps failing on.
//!
//! The set lives in a single JSON array file. It is read at the start of an
//! identification pass and overwritten at its end.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed shunned scenes file {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ShunnedSceneStore {
    path: PathBuf,
}

impl ShunnedSceneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the stored IDs. A missing file is an empty set.
    pub fn try_load(&self) -> Result<Vec<String>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Best-effort read: unreadable or corrupt files count as empty.
    pub fn load(&self) -> HashSet<String> {
        match self.try_load() {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!("ignoring shunned scenes: {}", e);
                HashSet::new()
            }
        }
    }

    /// Replaces the stored set with `ids`, keeping their order.
    pub fn save(&self, ids: &[String]) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        ids.serialize(&mut ser)
            .map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &buf).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }

    /// Like [`save`](Self::save) but only logs failures.
    pub fn save_or_log(&self, ids: &[String]) {
        if let Err(e) = self.save(ids) {
            error!("failed to write shunned scenes file: {}", e);
        }
    }
}
