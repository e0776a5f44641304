//! Offline dataset tools
//!
//! Builds a fine-tuning corpus of short exchanges by prompting a hosted
//! chat-completion API, and merges corpus files into one. Nothing here
//! shares state with the chat runtime.

pub mod client;
pub mod merge;
pub mod synth;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::{ChatCompletion, ChatMessage, OpenAiClient, OpenAiConfig};
pub use merge::merge_corpus;
pub use synth::{synthesize, write_corpus};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("DASHSCOPE_API_KEY is not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Response contained no message")]
    EmptyResponse,

    #[error("Failed to access file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize/deserialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// One exchange in a corpus file.
///
/// Generated files carry the prompt and style for inspection; merged files
/// keep only `system`, `input` and `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_name: Option<String>,
    pub input: String,
    pub output: String,
}

/// Top-level record: a conversation of one or more entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusItem {
    pub conversation: Vec<CorpusEntry>,
}
