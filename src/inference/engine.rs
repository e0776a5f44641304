//! Decoding engine
//!
//! Runs the autoregressive loop: one forward pass per step, logits
//! processing, token selection, stop check, then the full decoded text so far.
//!
//! # Lifecycle
//!
//! [`DecodingEngine::generate`] tokenizes the prompt and returns a
//! [`Generation`], a pull-based iterator. Each call to `next` performs exactly
//! one decode step. The iterator cannot be resumed once finished; a new call
//! re-encodes the prompt from scratch. Dropping it early releases the forward
//! pass (and whatever the model tied to it) immediately.

use std::fmt;
use std::iter::FusedIterator;
use std::time::Instant;

use thiserror::Error;

use crate::inference::config::GenerationConfig;
use crate::inference::model::{ForwardPass, LanguageModel, ModelError};
use crate::inference::sampling::TokenSelector;
use crate::inference::stopping::{FinishReason, StoppingPolicy};

/// Errors that abort a generation
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to tokenize prompt: {0}")]
    Tokenization(#[source] ModelError),

    #[error("Failed to start decode session: {0}")]
    SessionStart(#[source] ModelError),

    #[error("Forward pass failed at step {step}: {source}")]
    Forward {
        step: usize,
        #[source]
        source: ModelError,
    },

    #[error("Failed to decode output tokens: {0}")]
    Detokenization(#[source] ModelError),
}

/// Conditions worth reporting that do not abort a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationWarning {
    /// The prompt alone already fills `max_total_length`.
    PromptExhaustsBudget {
        prompt_tokens: usize,
        max_total_length: usize,
    },
}

impl fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationWarning::PromptExhaustsBudget {
                prompt_tokens,
                max_total_length,
            } => write!(
                f,
                "prompt is {prompt_tokens} tokens but max_total_length is {max_total_length}; \
                 consider increasing max_total_length"
            ),
        }
    }
}

/// Drives generations against a shared model
pub struct DecodingEngine<'m, M: LanguageModel + ?Sized> {
    model: &'m M,
}

impl<M: LanguageModel + ?Sized> Clone for DecodingEngine<'_, M> {
    fn clone(&self) -> Self {
        Self { model: self.model }
    }
}

impl<'m, M: LanguageModel + ?Sized> DecodingEngine<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Self { model }
    }

    /// Starts a generation for `prompt`.
    ///
    /// `additional_terminator` is added to the model's own terminator ids.
    /// The length budget never exceeds the model's context window.
    /// A prompt that already fills the length budget is not an error: the
    /// returned generation yields a single empty text and records a warning.
    pub fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        additional_terminator: Option<u32>,
    ) -> Result<Generation<'m, M>, EngineError> {
        let mut config = config.clone();
        config.validate();
        if let Some(context) = self.model.context_length() {
            if context < config.max_total_length {
                tracing::warn!(
                    "max_total_length {} exceeds the model context of {} tokens; clamping",
                    config.max_total_length,
                    context
                );
                config.max_total_length = context;
            }
        }

        let tokens = self.model.tokenize(prompt).map_err(EngineError::Tokenization)?;
        let prompt_len = tokens.len();
        let policy = StoppingPolicy::new(
            self.model.terminator_ids(),
            additional_terminator,
            &config,
        );

        let warning = policy.prompt_exhausts_budget(prompt_len).then(|| {
            let warning = ConfigurationWarning::PromptExhaustsBudget {
                prompt_tokens: prompt_len,
                max_total_length: config.max_total_length,
            };
            tracing::warn!("{}", warning);
            warning
        });

        let forward = match warning {
            Some(_) => None,
            None => Some(
                self.model
                    .start_session(config.max_total_length)
                    .map_err(EngineError::SessionStart)?,
            ),
        };

        let selector = TokenSelector::from_config(&config);
        tracing::debug!(
            prompt_tokens = prompt_len,
            max_total_length = config.max_total_length,
            sampling = selector.is_sampling(),
            terminators = ?policy.terminators(),
            "Starting generation"
        );

        Ok(Generation {
            model: self.model,
            forward,
            selector,
            policy,
            tokens,
            prompt_len,
            unfinished: true,
            finish_reason: None,
            warning,
            started: Instant::now(),
        })
    }
}

/// One in-flight decode. Yields the full decoded output after every step.
pub struct Generation<'m, M: LanguageModel + ?Sized> {
    model: &'m M,
    forward: Option<Box<dyn ForwardPass + 'm>>,
    selector: TokenSelector,
    policy: StoppingPolicy,
    tokens: Vec<u32>,
    prompt_len: usize,
    unfinished: bool,
    finish_reason: Option<FinishReason>,
    warning: Option<ConfigurationWarning>,
    started: Instant,
}

impl<M: LanguageModel + ?Sized> Generation<'_, M> {
    pub fn prompt_tokens(&self) -> usize {
        self.prompt_len
    }

    pub fn generated_tokens(&self) -> usize {
        self.tokens.len() - self.prompt_len
    }

    pub fn is_finished(&self) -> bool {
        !self.unfinished
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn warning(&self) -> Option<ConfigurationWarning> {
        self.warning
    }

    /// Runs to the end and returns the final text.
    pub fn run_to_end(mut self) -> Result<String, EngineError> {
        let mut last = String::new();
        for step in self.by_ref() {
            last = step?;
        }
        Ok(last)
    }

    fn finish(&mut self, reason: FinishReason) {
        self.unfinished = false;
        self.finish_reason = Some(reason);
        self.forward = None;
        tracing::info!(
            reason = ?reason,
            prompt_tokens = self.prompt_len,
            generated_tokens = self.generated_tokens(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Generation finished"
        );
    }

    fn abort(&mut self) {
        self.unfinished = false;
        self.forward = None;
    }

    /// Decodes the generated tokens, dropping one trailing terminator.
    fn decode_output(&self) -> Result<String, EngineError> {
        let mut output = &self.tokens[self.prompt_len..];
        if let Some((&last, rest)) = output.split_last() {
            if self.policy.is_terminator(last) {
                output = rest;
            }
        }
        self.model
            .detokenize(output)
            .map_err(EngineError::Detokenization)
    }
}

impl<M: LanguageModel + ?Sized> Iterator for Generation<'_, M> {
    type Item = Result<String, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.unfinished {
            return None;
        }

        let step = self.generated_tokens();
        let Some(forward) = self.forward.as_mut() else {
            // Prompt already at the budget: the length check ends it before any forward pass.
            self.finish(FinishReason::MaxLength);
            return Some(Ok(String::new()));
        };

        let scores = match forward.forward(&self.tokens) {
            Ok(scores) => scores,
            Err(source) => {
                tracing::error!("Forward pass failed at step {}: {}", step, source);
                self.abort();
                return Some(Err(EngineError::Forward { step, source }));
            }
        };

        let next = self.selector.select(&self.tokens, scores);
        self.tokens.push(next);
        if let Some(reason) = self.policy.check(next, self.tokens.len()) {
            self.finish(reason);
        }

        let text = self.decode_output();
        if text.is_err() {
            self.abort();
        }
        Some(text)
    }
}

impl<M: LanguageModel + ?Sized> FusedIterator for Generation<'_, M> {}
