use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use tempswitch_common::{default_config, parse_snapshot, ConfigError, ConfigSnapshot};

const CONFIG_FILE: &str = "TempSwitch.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("persisted configuration is unreadable: {0}")]
    Parse(#[from] ConfigError),
    #[error("failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed fallback for the bus-delivered configuration.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// `DATA_PATH` selects the base directory; defaults to the working dir.
    pub fn from_env() -> Self {
        let base = std::env::var("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            path: base.join(CONFIG_FILE),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the persisted mapping merged over the built-in defaults. A
    /// missing file falls back to the defaults alone; individually malformed
    /// entries are skipped.
    pub fn load_persisted(&self) -> Result<ConfigSnapshot, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    "no persisted configuration at {}; using defaults",
                    self.path.display()
                );
                return Ok(default_config());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let (persisted, rejected) = parse_snapshot(&raw)?;
        for entry in rejected {
            warn!(
                "skipping persisted control point {}: {}",
                entry.sensor_topic, entry.reason
            );
        }

        let mut snapshot = default_config();
        snapshot.extend(persisted);
        Ok(snapshot)
    }

    pub fn save(&self, snapshot: &ConfigSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let payload = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&self.path, payload).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}
