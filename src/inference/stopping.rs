//! Stopping policy
//!
//! Decides after every drawn token whether a sequence is finished.

use std::collections::BTreeSet;

use crate::inference::config::GenerationConfig;

/// Why a generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// A terminator token was drawn
    Terminator,
    /// The sequence reached `max_total_length`
    MaxLength,
}

/// Finished when `next_token` is a terminator or the sequence (prompt plus
/// generated tokens) has reached `max_total_length`.
pub fn should_stop(
    next_token: u32,
    sequence_length: usize,
    config: &GenerationConfig,
    terminator_ids: &BTreeSet<u32>,
) -> bool {
    terminator_ids.contains(&next_token) || sequence_length >= config.max_total_length
}

/// Terminator set and length budget for one generation
#[derive(Debug, Clone)]
pub struct StoppingPolicy {
    terminators: BTreeSet<u32>,
    config: GenerationConfig,
}

impl StoppingPolicy {
    /// Merges the model's terminators with an optional caller override.
    pub fn new(
        model_terminators: impl IntoIterator<Item = u32>,
        additional: Option<u32>,
        config: &GenerationConfig,
    ) -> Self {
        let mut terminators: BTreeSet<u32> = model_terminators.into_iter().collect();
        terminators.extend(additional);
        Self {
            terminators,
            config: config.clone(),
        }
    }

    pub fn terminators(&self) -> &BTreeSet<u32> {
        &self.terminators
    }

    pub fn is_terminator(&self, token: u32) -> bool {
        self.terminators.contains(&token)
    }

    /// True when the prompt alone leaves no room for a generated token.
    pub fn prompt_exhausts_budget(&self, prompt_length: usize) -> bool {
        prompt_length >= self.config.max_total_length
    }

    /// Stop decision after `next_token` was appended, making the sequence `sequence_length` long.
    pub fn check(&self, next_token: u32, sequence_length: usize) -> Option<FinishReason> {
        if !should_stop(next_token, sequence_length, &self.config, &self.terminators) {
            None
        } else if self.is_terminator(next_token) {
            Some(FinishReason::Terminator)
        } else {
            Some(FinishReason::MaxLength)
        }
    }
}
