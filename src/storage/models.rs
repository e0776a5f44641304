//! Local model discovery
//!
//! Finds GGUF files on disk and picks the one to load.

use crate::storage::StorageError;
use std::fs;
use std::path::{Path, PathBuf};

/// A GGUF model file on disk
#[derive(Debug, Clone)]
pub struct ModelFile {
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
}

impl ModelFile {
    fn from_path(path: PathBuf) -> Result<Self, std::io::Error> {
        let metadata = fs::metadata(&path)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            path,
            filename,
            size_bytes: metadata.len(),
        })
    }

    /// Get a human-readable size string
    pub fn size_string(&self) -> String {
        const UNITS: [&str; 3] = ["KB", "MB", "GB"];
        let mut size = self.size_bytes as f64;
        if size < 1024.0 {
            return format!("{} B", self.size_bytes);
        }
        let mut unit = UNITS[0];
        for next in UNITS {
            size /= 1024.0;
            unit = next;
            if size < 1024.0 {
                break;
            }
        }
        format!("{size:.2} {unit}")
    }
}

/// Lists `.gguf` files in `directory`, sorted by filename.
///
/// A missing directory is not an error; it simply holds no models.
pub fn scan_models_directory(directory: &Path) -> Result<Vec<ModelFile>, StorageError> {
    if !directory.is_dir() {
        tracing::warn!("Models directory does not exist: {}", directory.display());
        return Ok(vec![]);
    }

    let mut models = vec![];
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let is_gguf = path.extension().and_then(|e| e.to_str()) == Some("gguf");
        if !path.is_file() || !is_gguf {
            continue;
        }
        match ModelFile::from_path(path.clone()) {
            Ok(model) => models.push(model),
            Err(e) => tracing::warn!("Failed to read model file {:?}: {}", path, e),
        }
    }

    models.sort_by(|a, b| a.filename.cmp(&b.filename));
    tracing::debug!("Found {} model(s) in {}", models.len(), directory.display());
    Ok(models)
}

/// Picks the model to load: an explicit path if given, else the first GGUF
/// in `models_directory`.
pub fn resolve_model_path(explicit: Option<&Path>, models_directory: &Path) -> Result<PathBuf, StorageError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(StorageError::ModelNotFound(path.display().to_string()));
    }

    scan_models_directory(models_directory)?
        .into_iter()
        .next()
        .map(|model| {
            tracing::info!("Using model {} ({})", model.filename, model.size_string());
            model.path
        })
        .ok_or_else(|| {
            StorageError::ModelNotFound(format!("no .gguf files in {}", models_directory.display()))
        })
}
