//! Interactive chat entry point
//!
//! Loads settings, applies command-line overrides, loads the model once and
//! hands a fresh session to the REPL.

use std::io;
use std::path::PathBuf;

use clap::Args;
use thiserror::Error;

use crate::inference::{LlamaEngine, ModelError};
use crate::prompt::PromptAssembler;
use crate::session::ChatSession;
use crate::storage::models::resolve_model_path;
use crate::storage::settings::{load_settings, save_settings, AppSettings};
use crate::storage::{self, StorageError};
use crate::types::Mode;
use crate::ui::run_repl;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Overrides for the stored settings; every flag left unset keeps its stored value.
#[derive(Args, Debug, Default, Clone, PartialEq)]
pub struct ChatArgs {
    /// Path to a GGUF model (defaults to the first model in the models directory)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Mode to start in: normal or deep
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Maximum prompt plus generated tokens
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Nucleus sampling threshold
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Top-K sampling (0 disables)
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Sampling temperature (0.0 = greedy)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Use greedy decoding (ignores temperature)
    #[arg(long)]
    pub greedy: bool,

    /// Repetition penalty (1.0 = no penalty)
    #[arg(long)]
    pub repetition_penalty: Option<f32>,

    /// Extra token id that ends a response
    #[arg(long)]
    pub eos_token_id: Option<u32>,

    /// Random seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Replace the base system prompt
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Number of layers to offload to the GPU
    #[arg(long)]
    pub gpu_layers: Option<u32>,

    /// Persist these overrides to the settings file
    #[arg(long)]
    pub save: bool,
}

impl ChatArgs {
    /// Writes every given flag into `settings`, then re-validates.
    pub fn apply(&self, settings: &mut AppSettings) {
        let generation = &mut settings.generation;
        if let Some(max_length) = self.max_length {
            generation.max_total_length = max_length;
        }
        if let Some(top_p) = self.top_p {
            generation.top_p = top_p;
        }
        if let Some(top_k) = self.top_k {
            generation.top_k = top_k;
        }
        if let Some(temperature) = self.temperature {
            generation.temperature = temperature;
        }
        if self.greedy {
            generation.use_sampling = false;
        }
        if let Some(penalty) = self.repetition_penalty {
            generation.repetition_penalty = penalty;
        }
        if self.seed.is_some() {
            generation.seed = self.seed;
        }

        if let Some(model) = &self.model {
            settings.model_path = Some(model.clone());
        }
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if self.eos_token_id.is_some() {
            settings.additional_eos_token_id = self.eos_token_id;
        }
        if let Some(prompt) = &self.system_prompt {
            settings.system_prompt = prompt.clone();
        }
        if let Some(layers) = self.gpu_layers {
            settings.gpu_layers = layers;
        }
        settings.validate();
    }
}

/// Runs an interactive chat on stdin/stdout until the user quits.
pub fn run_chat(args: &ChatArgs) -> Result<(), AppError> {
    if let Err(e) = storage::init_storage() {
        tracing::warn!("Could not prepare data directory: {}", e);
    }

    let mut settings = load_settings();
    args.apply(&mut settings);
    if args.save {
        save_settings(&settings)?;
        tracing::info!("Saved settings");
    }

    let model_path = resolve_model_path(settings.model_path.as_deref(), &settings.models_directory)?;
    let engine = LlamaEngine::load(&model_path, settings.gpu_layers)?;

    let mut session = ChatSession::new(
        &engine,
        PromptAssembler::new(settings.system_prompt.clone()),
        settings.generation.clone(),
        settings.mode,
    )
    .with_additional_terminator(settings.additional_eos_token_id);

    let span = tracing::info_span!("chat", session = %session.id());
    let _guard = span.enter();

    let stdin = io::stdin();
    run_repl(&mut session, stdin.lock(), io::stdout())?;
    Ok(())
}
