//! Persistent storage
//!
//! Application settings and local model discovery. Conversations live in
//! memory only and are never written to disk.

use std::path::PathBuf;
use thiserror::Error;

pub mod models;
pub mod settings;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access data directory: {0}")]
    DataDirError(String),
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to serialize/deserialize JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Model not found: {0}")]
    ModelNotFound(String),
}

/// Get the application data directory
///
/// - Windows: `C:\Users\{user}\AppData\Roaming\Twintrack\twintrack\data`
/// - macOS: `/Users/{user}/Library/Application Support/com.Twintrack.twintrack`
/// - Linux: `/home/{user}/.local/share/twintrack`
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    directories::ProjectDirs::from("com", "Twintrack", "twintrack")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| StorageError::DataDirError("Could not determine data directory".to_string()))
}

/// Creates `{data_dir}/models/`, the default place to look for GGUF files.
pub fn init_storage() -> Result<PathBuf, StorageError> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(data_dir.join("models"))?;

    tracing::info!("Initialized storage at: {}", data_dir.display());
    Ok(data_dir)
}
