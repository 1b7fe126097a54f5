//! Model directory management
//!
//! This module provides:
//! - Atomic saving of new model files (temp file + rename)
//! - Checksums and a bounded history of previous versions
//! - A watch channel announcing each newly active model

use crate::error::TrainerError;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

const MODEL_FILE_PREFIX: &str = "model_";
const MODEL_FILE_EXTENSION: &str = "json";

/// Configuration for the model registry
#[derive(Debug, Clone)]
pub struct ModelRegistryConfig {
    /// Directory to store model files
    pub model_dir: PathBuf,
    /// Number of previous versions to keep on disk
    pub versions_to_keep: usize,
    /// Maximum model size in bytes
    pub max_model_size: usize,
}

impl Default for ModelRegistryConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("MLModels"),
            versions_to_keep: 5,
            max_model_size: 1024 * 1024, // 1MB
        }
    }
}

/// Model version information
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVersion {
    pub version: String,
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: usize,
    pub saved_at: i64,
}

/// Owner of the model directory and publisher of model updates
pub struct ModelRegistry {
    config: ModelRegistryConfig,
    previous_versions: RwLock<Vec<ModelVersion>>,
    updates: watch::Sender<Option<ModelVersion>>,
}

impl ModelRegistry {
    /// Create a new registry, creating the model directory if needed
    pub fn new(config: ModelRegistryConfig) -> Result<Self, TrainerError> {
        fs::create_dir_all(&config.model_dir).map_err(|e| TrainerError::Io {
            context: format!("Failed to create model directory {:?}", config.model_dir),
            source: e,
        })?;

        let (updates, _) = watch::channel(None);
        Ok(Self {
            config,
            previous_versions: RwLock::new(Vec::new()),
            updates,
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.config.model_dir
    }

    /// Receive the active model now and after every update
    pub fn subscribe(&self) -> watch::Receiver<Option<ModelVersion>> {
        self.updates.subscribe()
    }

    /// Currently active model
    pub fn current(&self) -> Option<ModelVersion> {
        self.updates.borrow().clone()
    }

    pub fn current_version(&self) -> Option<String> {
        self.updates.borrow().as_ref().map(|v| v.version.clone())
    }

    /// Whether the active model's file is still on disk
    pub fn model_exists(&self) -> bool {
        self.updates
            .borrow()
            .as_ref()
            .map(|v| v.path.exists())
            .unwrap_or(false)
    }

    /// Persist a new model and make it the active version
    pub async fn save(&self, version: &str, bytes: &[u8]) -> Result<ModelVersion, TrainerError> {
        if bytes.len() > self.config.max_model_size {
            return Err(TrainerError::Internal(format!(
                "Model size {} exceeds maximum {}",
                bytes.len(),
                self.config.max_model_size
            )));
        }

        let path = self.model_path(version);
        write_atomically(&path, bytes)?;

        let new_version = ModelVersion {
            version: version.to_string(),
            path,
            checksum: compute_checksum(bytes),
            size_bytes: bytes.len(),
            saved_at: chrono::Utc::now().timestamp(),
        };

        if let Some(old_version) = self.current() {
            let mut previous = self.previous_versions.write().await;
            previous.insert(0, old_version);

            while previous.len() > self.config.versions_to_keep {
                if let Some(removed) = previous.pop() {
                    if let Err(e) = fs::remove_file(&removed.path) {
                        warn!(
                            path = %removed.path.display(),
                            error = %e,
                            "Failed to remove old model file"
                        );
                    }
                }
            }
        }

        self.updates.send_replace(Some(new_version.clone()));

        info!(
            version = %new_version.version,
            path = %new_version.path.display(),
            checksum = %new_version.checksum,
            "Model saved and published"
        );

        Ok(new_version)
    }

    /// Activate the newest model file found in the model directory
    pub async fn load_latest(&self) -> Result<Option<ModelVersion>, TrainerError> {
        let mut candidates: Vec<(String, PathBuf)> = fs::read_dir(&self.config.model_dir)
            .map_err(|e| TrainerError::Io {
                context: format!("Failed to list {:?}", self.config.model_dir),
                source: e,
            })?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                version_from_path(&path).map(|v| (v, path))
            })
            .collect();

        // Version tags are timestamps, so lexical order is age order
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut candidates = candidates.into_iter();
        let Some((version, path)) = candidates.next() else {
            debug!(dir = %self.config.model_dir.display(), "No existing model found");
            return Ok(None);
        };

        let bytes = fs::read(&path).map_err(|e| TrainerError::Io {
            context: format!("Failed to read model file {:?}", path),
            source: e,
        })?;

        let model_version = ModelVersion {
            version,
            checksum: compute_checksum(&bytes),
            size_bytes: bytes.len(),
            path,
            saved_at: chrono::Utc::now().timestamp(),
        };

        {
            let mut previous = self.previous_versions.write().await;
            previous.clear();
            for (version, path) in candidates.take(self.config.versions_to_keep) {
                previous.push(ModelVersion {
                    version,
                    path,
                    checksum: String::new(),
                    size_bytes: 0,
                    saved_at: 0,
                });
            }
        }

        self.updates.send_replace(Some(model_version.clone()));

        info!(
            version = %model_version.version,
            path = %model_version.path.display(),
            "Loaded existing model"
        );

        Ok(Some(model_version))
    }

    /// Versions kept on disk besides the active one, newest first
    pub async fn previous_versions(&self) -> Vec<String> {
        self.previous_versions
            .read()
            .await
            .iter()
            .map(|v| v.version.clone())
            .collect()
    }

    fn model_path(&self, version: &str) -> PathBuf {
        self.config.model_dir.join(format!(
            "{}{}.{}",
            MODEL_FILE_PREFIX, version, MODEL_FILE_EXTENSION
        ))
    }
}

fn version_from_path(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != MODEL_FILE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(MODEL_FILE_PREFIX).map(str::to_string)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), TrainerError> {
    let io_err = |context: String| move |source| TrainerError::Io { context, source };

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .map_err(io_err(format!("Failed to create temp model file {:?}", temp_path)))?;
    file.write_all(bytes)
        .map_err(io_err("Failed to write model".to_string()))?;
    file.sync_all()
        .map_err(io_err("Failed to sync model file".to_string()))?;

    fs::rename(&temp_path, path)
        .map_err(io_err(format!("Failed to rename {:?} to {:?}", temp_path, path)))?;
    Ok(())
}

/// Compute SHA256 checksum of data
pub(crate) fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
