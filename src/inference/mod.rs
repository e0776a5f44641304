//! Token generation
//!
//! The decoding loop, its logits processing and stopping rules, and the
//! llama.cpp model backend behind the [`LanguageModel`] trait.

pub mod config;
pub mod engine;
pub mod llama;
pub mod model;
pub mod sampling;
pub mod stopping;
pub mod streaming;

// Re-export main types for convenience
pub use config::GenerationConfig;
pub use engine::{DecodingEngine, EngineError, Generation, ConfigurationWarning};
pub use llama::{validate_gguf, LlamaEngine, LoadedModelInfo, GGUF_MAGIC};
pub use model::{ForwardPass, LanguageModel, ModelError};
pub use stopping::{should_stop, FinishReason, StoppingPolicy};
pub use streaming::{DisplaySink, RecordingSink, StreamEvent};
