//! llama.cpp model backend
//!
//! Loads a GGUF model once per process and serves forward passes through
//! `llama-cpp-2`. Each generation gets its own `LlamaContext`; the context
//! keeps its KV cache across steps and re-evaluates only the tokens it has
//! not seen yet.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::num::NonZeroU32;
use std::path::Path;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::token::LlamaToken;

use crate::inference::model::{ForwardPass, LanguageModel, ModelError};
use crate::prompt::END_OF_TURN;

/// GGUF magic bytes (little-endian: "GGUF")
pub const GGUF_MAGIC: u32 = 0x46554747;

/// Tokens submitted to llama.cpp per decode call
const BATCH_SIZE: usize = 512;

/// Fixed-size GGUF header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GgufHeader {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
}

/// Checks the magic bytes and version of a GGUF file.
pub fn validate_gguf<P: AsRef<Path>>(path: P) -> Result<GgufHeader, ModelError> {
    // magic(4) + version(4) + tensor_count(8) + metadata_kv_count(8)
    let mut header = [0u8; 24];
    let mut file = File::open(path)?;
    if let Err(e) = file.read_exact(&mut header) {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => ModelError::InvalidGguf("file too small".to_string()),
            _ => ModelError::FileOpen(e),
        });
    }

    let word = |range: std::ops::Range<usize>| -> u64 {
        header[range]
            .iter()
            .rev()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
    };

    let magic = word(0..4) as u32;
    if magic != GGUF_MAGIC {
        return Err(ModelError::InvalidGguf(format!(
            "magic bytes mismatch (expected 0x{GGUF_MAGIC:08X}, got 0x{magic:08X})"
        )));
    }

    let version = word(4..8) as u32;
    if !(2..=3).contains(&version) {
        return Err(ModelError::InvalidGguf(format!("unsupported version {version}")));
    }

    Ok(GgufHeader {
        version,
        tensor_count: word(8..16),
        metadata_kv_count: word(16..24),
    })
}

/// Model information after loading
#[derive(Debug, Clone)]
pub struct LoadedModelInfo {
    pub path: String,
    pub vocab_size: i32,
    pub context_length: u32,
    pub param_count: u64,
    pub size_bytes: u64,
}

/// A GGUF model loaded through llama.cpp
pub struct LlamaEngine {
    backend: LlamaBackend,
    model: LlamaModel,
    info: LoadedModelInfo,
    terminators: Vec<u32>,
}

impl LlamaEngine {
    /// Initializes the backend and loads the model at `path`.
    ///
    /// # Arguments
    /// * `path` - Path to the GGUF model file
    /// * `gpu_layers` - Number of layers to offload to GPU (0 = CPU only)
    pub fn load<P: AsRef<Path>>(path: P, gpu_layers: u32) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let header = validate_gguf(path)?;
        tracing::debug!("GGUF v{} with {} tensors at {:?}", header.version, header.tensor_count, path);

        let backend = LlamaBackend::init().map_err(|e| ModelError::BackendInit(e.to_string()))?;
        let params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
        let model = LlamaModel::load_from_file(&backend, path, &params)
            .map_err(|e| ModelError::Load(e.to_string()))?;

        let info = LoadedModelInfo {
            path: path.to_string_lossy().to_string(),
            vocab_size: model.n_vocab(),
            context_length: model.n_ctx_train(),
            param_count: model.n_params() as u64,
            size_bytes: model.size() as u64,
        };

        let mut terminators = vec![token_id(model.token_eos())];
        // Chat-tuned vocabularies usually carry the end-of-turn marker as one token.
        match model.str_to_token(END_OF_TURN, AddBos::Never) {
            Ok(tokens) if tokens.len() == 1 => terminators.push(token_id(tokens[0])),
            Ok(_) => tracing::debug!("{} is not a single token in this vocabulary", END_OF_TURN),
            Err(e) => tracing::warn!("Failed to tokenize {}: {}", END_OF_TURN, e),
        }
        terminators.dedup();

        tracing::info!(
            "Model loaded: {} ({} params, {} vocab, {} ctx, terminators {:?})",
            info.path,
            info.param_count,
            info.vocab_size,
            info.context_length,
            terminators
        );

        Ok(Self {
            backend,
            model,
            info,
            terminators,
        })
    }
}

impl LanguageModel for LlamaEngine {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        // Prompts carry their own BOS marker.
        let tokens = self
            .model
            .str_to_token(text, AddBos::Never)
            .map_err(|e| ModelError::Tokenization(e.to_string()))?;
        Ok(tokens.into_iter().map(token_id).collect())
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String, ModelError> {
        let mut bytes = Vec::with_capacity(tokens.len() * 4);
        for &id in tokens {
            let piece = self
                .model
                .token_to_bytes(LlamaToken::new(id as i32), Special::Tokenize)
                .map_err(|e| ModelError::Detokenization(e.to_string()))?;
            bytes.extend_from_slice(&piece);
        }
        Ok(utf8_prefix(bytes))
    }

    fn terminator_ids(&self) -> Vec<u32> {
        self.terminators.clone()
    }

    fn context_length(&self) -> Option<usize> {
        // Some conversions leave the training context unset.
        let context = self.info.context_length as usize;
        (context > 0).then_some(context)
    }

    fn start_session(&self, max_total_length: usize) -> Result<Box<dyn ForwardPass + '_>, ModelError> {
        let limit = self.context_length().unwrap_or(max_total_length);
        let n_ctx = max_total_length.min(limit).max(1);
        let n_ctx_param = NonZeroU32::new(n_ctx as u32)
            .ok_or_else(|| ModelError::Context(format!("invalid context size {n_ctx}")))?;
        let params = LlamaContextParams::default()
            .with_n_ctx(Some(n_ctx_param))
            .with_n_batch(BATCH_SIZE as u32);
        let ctx = self
            .model
            .new_context(&self.backend, params)
            .map_err(|e| ModelError::Context(e.to_string()))?;

        tracing::debug!("Created llama context with {} slots", n_ctx);
        Ok(Box::new(LlamaForward {
            ctx,
            n_ctx,
            evaluated: Vec::new(),
        }))
    }
}

/// Forward passes over one llama context.
struct LlamaForward<'a> {
    ctx: LlamaContext<'a>,
    n_ctx: usize,
    /// Tokens whose keys and values are already in the cache.
    evaluated: Vec<u32>,
}

impl ForwardPass for LlamaForward<'_> {
    fn forward(&mut self, tokens: &[u32]) -> Result<Vec<f32>, ModelError> {
        if tokens.is_empty() {
            return Err(ModelError::Forward("empty token sequence".to_string()));
        }
        if tokens.len() > self.n_ctx {
            return Err(ModelError::Forward(format!(
                "sequence of {} tokens exceeds context window of {}",
                tokens.len(),
                self.n_ctx
            )));
        }

        let mut common = self
            .evaluated
            .iter()
            .zip(tokens)
            .take_while(|(a, b)| a == b)
            .count();
        if common < self.evaluated.len() || common == tokens.len() {
            // Diverged from the cache, or nothing new to evaluate: start over.
            self.ctx.clear_kv_cache();
            self.evaluated.clear();
            common = 0;
        }

        let mut batch = LlamaBatch::new(BATCH_SIZE, 1);
        let last = tokens.len() - 1;
        for (chunk_index, chunk) in tokens[common..].chunks(BATCH_SIZE).enumerate() {
            batch.clear();
            for (offset, &token) in chunk.iter().enumerate() {
                let pos = common + chunk_index * BATCH_SIZE + offset;
                batch
                    .add(LlamaToken::new(token as i32), pos as i32, &[0], pos == last)
                    .map_err(|e| ModelError::Forward(format!("Failed to add token to batch: {e}")))?;
            }
            self.ctx
                .decode(&mut batch)
                .map_err(|e| ModelError::Forward(format!("Failed to decode: {e}")))?;
        }

        self.evaluated.truncate(common);
        self.evaluated.extend_from_slice(&tokens[common..]);

        Ok(self.ctx.get_logits_ith(batch.n_tokens() - 1).to_vec())
    }
}

fn token_id(token: LlamaToken) -> u32 {
    token.0 as u32
}

/// Decodes UTF-8, holding back an incomplete trailing sequence that the next
/// token will complete.
fn utf8_prefix(mut bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let utf8 = err.utf8_error();
            bytes = err.into_bytes();
            if utf8.error_len().is_none() {
                bytes.truncate(utf8.valid_up_to());
            }
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }
}
