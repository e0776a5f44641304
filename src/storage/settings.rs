//! Settings storage
//!
//! Persists generation parameters and model selection as JSON at
//! `{data_dir}/settings.json`. Command-line flags override what is loaded here.

use crate::inference::GenerationConfig;
use crate::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::storage::{get_data_dir, StorageError};
use crate::types::Mode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Decoding parameters shared by both modes
    pub generation: GenerationConfig,
    /// Mode a new chat starts in
    pub mode: Mode,
    /// Base instruction placed in every system segment
    pub system_prompt: String,
    /// Model to load; falls back to the first GGUF in `models_directory`
    pub model_path: Option<PathBuf>,
    /// Directory where model files (.gguf) are stored
    pub models_directory: PathBuf,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
    /// Extra token id that ends a response, on top of the model's own
    pub additional_eos_token_id: Option<u32>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            mode: Mode::Normal,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model_path: None,
            models_directory: get_data_dir()
                .ok()
                .map(|d| d.join("models"))
                .unwrap_or_else(|| PathBuf::from("./models")),
            gpu_layers: 99,
            additional_eos_token_id: None,
        }
    }
}

impl AppSettings {
    /// Validate settings values
    pub fn validate(&mut self) {
        self.generation.validate();

        if self.system_prompt.trim().is_empty() {
            self.system_prompt = DEFAULT_SYSTEM_PROMPT.to_string();
        }
    }
}

/// Get the settings file path
pub fn settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> AppSettings {
    match settings_path().and_then(|path| load_settings_from(&path)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            AppSettings::default()
        }
    }
}

/// Loads and validates settings from `path`; a missing file yields defaults.
pub fn load_settings_from(path: &Path) -> Result<AppSettings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(AppSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: AppSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Save settings to the default location
pub fn save_settings(settings: &AppSettings) -> Result<(), StorageError> {
    save_settings_to(settings, &settings_path()?)
}

pub fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to {}", path.display());
    Ok(())
}
