//! Model collaborator interface
//!
//! The decoding engine only needs tokenization and a forward pass. Weight
//! loading and tokenizer internals live behind these traits.

use thiserror::Error;

/// Errors reported by a model collaborator
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to open model file: {0}")]
    FileOpen(#[from] std::io::Error),

    #[error("Invalid GGUF file: {0}")]
    InvalidGguf(String),

    #[error("Failed to initialize backend: {0}")]
    BackendInit(String),

    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Failed to create context: {0}")]
    Context(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Detokenization failed: {0}")]
    Detokenization(String),

    #[error("Forward pass failed: {0}")]
    Forward(String),
}

/// One forward pass at a time over a growing token sequence.
///
/// A pass lives for exactly one generation; dropping it releases every
/// resource tied to that generation (context, KV cache).
pub trait ForwardPass {
    /// Scores for the token following `tokens`, one entry per vocabulary id.
    fn forward(&mut self, tokens: &[u32]) -> Result<Vec<f32>, ModelError>;
}

/// A causal language model shared read-only across sessions.
pub trait LanguageModel {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, ModelError>;

    fn detokenize(&self, tokens: &[u32]) -> Result<String, ModelError>;

    /// Token ids the model was trained to end a response with.
    fn terminator_ids(&self) -> Vec<u32>;

    /// Largest sequence a forward pass can hold, when the model has a limit.
    fn context_length(&self) -> Option<usize> {
        None
    }

    /// Opens a forward pass able to hold `max_total_length` tokens.
    fn start_session(&self, max_total_length: usize) -> Result<Box<dyn ForwardPass + '_>, ModelError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Byte-level scripted model for tests.

    use super::*;
    use std::cell::{Cell, RefCell};

    /// Bytes map to ids 0..256; `EOS` ends a reply.
    pub const EOS: u32 = 256;
    pub const EOS_TEXT: &str = "</s>";
    pub const VOCAB: usize = 258;

    /// Replays a fixed reply per session, one token per forward pass.
    pub struct ScriptedModel {
        replies: Vec<Vec<u32>>,
        fail_sessions: usize,
        fail_at_step: usize,
        fail_next: Cell<Option<usize>>,
        sessions: Cell<usize>,
        forwards: Cell<usize>,
        prompts: RefCell<Vec<String>>,
        uniform: bool,
        context: Option<usize>,
    }

    impl ScriptedModel {
        /// Session `i` replays `replies[i % len]` followed by `EOS`.
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|r| r.bytes().map(u32::from).chain([EOS]).collect())
                    .collect(),
                fail_sessions: 0,
                fail_at_step: 0,
                fail_next: Cell::new(None),
                sessions: Cell::new(0),
                forwards: Cell::new(0),
                prompts: RefCell::new(Vec::new()),
                uniform: false,
                context: None,
            }
        }

        /// A reply that never ends on its own.
        pub fn endless() -> Self {
            let mut model = Self::new(&[]);
            model.replies = vec![vec![b'a' as u32; 10_000]];
            model
        }

        /// Flat scores over the printable bytes; only sampling decides.
        pub fn uniform() -> Self {
            let mut model = Self::endless();
            model.uniform = true;
            model
        }

        /// The first `sessions` sessions fail their forward pass at `step`.
        pub fn failing(mut self, sessions: usize, step: usize) -> Self {
            self.fail_sessions = sessions;
            self.fail_at_step = step;
            self
        }

        /// Forward passes reject sequences longer than `tokens`.
        pub fn with_context(mut self, tokens: usize) -> Self {
            self.context = Some(tokens);
            self
        }

        /// The next session started fails its forward pass at `step`.
        pub fn fail_next_session(&self, step: usize) {
            self.fail_next.set(Some(step));
        }

        pub fn sessions_started(&self) -> usize {
            self.sessions.get()
        }

        pub fn forward_calls(&self) -> usize {
            self.forwards.get()
        }

        /// Every text passed to `tokenize`, oldest first.
        pub fn prompts(&self) -> Vec<String> {
            self.prompts.borrow().clone()
        }
    }

    impl LanguageModel for ScriptedModel {
        fn tokenize(&self, text: &str) -> Result<Vec<u32>, ModelError> {
            self.prompts.borrow_mut().push(text.to_string());
            Ok(text.bytes().map(u32::from).collect())
        }

        fn detokenize(&self, tokens: &[u32]) -> Result<String, ModelError> {
            let mut bytes = Vec::new();
            for &token in tokens {
                match token {
                    0..=255 => bytes.push(token as u8),
                    EOS => bytes.extend_from_slice(EOS_TEXT.as_bytes()),
                    other => return Err(ModelError::Detokenization(format!("unknown id {other}"))),
                }
            }
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }

        fn terminator_ids(&self) -> Vec<u32> {
            vec![EOS]
        }

        fn context_length(&self) -> Option<usize> {
            self.context
        }

        fn start_session(&self, max_total_length: usize) -> Result<Box<dyn ForwardPass + '_>, ModelError> {
            let index = self.sessions.get();
            self.sessions.set(index + 1);
            let reply = if self.replies.is_empty() {
                vec![EOS]
            } else {
                self.replies[index % self.replies.len()].clone()
            };
            let fail_at = match self.fail_next.take() {
                Some(step) => Some(step),
                None if index < self.fail_sessions => Some(self.fail_at_step),
                None => None,
            };
            let capacity = match self.context {
                Some(context) => max_total_length.min(context),
                None => max_total_length,
            };
            Ok(Box::new(ScriptedPass {
                model: self,
                reply,
                step: 0,
                fail_at,
                capacity,
            }))
        }
    }

    struct ScriptedPass<'a> {
        model: &'a ScriptedModel,
        reply: Vec<u32>,
        step: usize,
        fail_at: Option<usize>,
        capacity: usize,
    }

    impl ForwardPass for ScriptedPass<'_> {
        fn forward(&mut self, tokens: &[u32]) -> Result<Vec<f32>, ModelError> {
            self.model.forwards.set(self.model.forwards.get() + 1);
            if self.fail_at == Some(self.step) {
                return Err(ModelError::Forward("scripted failure".to_string()));
            }
            if tokens.len() > self.capacity {
                return Err(ModelError::Forward(format!(
                    "{} tokens exceed context window of {}",
                    tokens.len(),
                    self.capacity
                )));
            }
            let mut scores = vec![0.0; VOCAB];
            if self.model.uniform {
                for score in &mut scores[b'a' as usize..=b'z' as usize] {
                    *score = 5.0;
                }
            } else {
                let next = self.reply.get(self.step).copied().unwrap_or(EOS);
                scores[next as usize] = 20.0;
            }
            self.step += 1;
            Ok(scores)
        }
    }
}
