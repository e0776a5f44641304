//! Prompt assembly
//!
//! Serializes a slice of resolved history plus the new user message into the
//! exact text fed to the decoding engine. No truncation happens here; the
//! engine bounds the total length.

pub mod templates;

use crate::conversation::HistoryTurn;
use crate::types::{Mode, Role};

pub use templates::{DEEP_INSTRUCTION, DEFAULT_SYSTEM_PROMPT, END_OF_TURN, OPEN_ASSISTANT};

/// Builds prompts for either mode from a fixed base instruction
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_prompt: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl PromptAssembler {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }


    /// System instruction for `mode`; deep mode appends the reasoning protocol.
    pub fn system_instruction(&self, mode: Mode) -> String {
        match mode {
            Mode::Normal => self.system_prompt.clone(),
            Mode::Deep => format!("{}\n{}", self.system_prompt, DEEP_INSTRUCTION),
        }
    }

    /// Assembles a prompt from `history` (in turn order) and the new user text.
    ///
    /// Assistant turns with no realized text on either track are skipped.
    pub fn assemble(&self, history: &[HistoryTurn<'_>], mode: Mode, new_user_text: &str) -> String {
        let mut prompt = templates::SYSTEM_TEMPLATE.replace("{system}", &self.system_instruction(mode));

        for turn in history {
            let Some(text) = turn.text else {
                continue;
            };
            match turn.role {
                Role::User => prompt.push_str(&templates::USER_TEMPLATE.replace("{user}", text)),
                Role::Assistant => {
                    prompt.push_str(&templates::ASSISTANT_TEMPLATE.replace("{assistant}", text))
                }
            }
        }

        prompt.push_str(&templates::USER_TEMPLATE.replace("{user}", new_user_text));
        prompt.push_str(OPEN_ASSISTANT);

        tracing::debug!(
            mode = %mode,
            history_turns = history.len(),
            prompt_chars = prompt.len(),
            "Assembled prompt"
        );
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_OPEN: &str = "<|im_start|>user\n";
    const ASSISTANT_OPEN: &str = "<|im_start|>assistant\n";

    #[test]
    fn test_empty_history_single_user_segment() {
        let prompt = PromptAssembler::default().assemble(&[], Mode::Normal, "hello");

        assert_eq!(prompt.matches(USER_OPEN).count(), 1);
        assert!(prompt.contains("<|im_start|>user\nhello<|im_end|>\n"));
        // The only assistant marker is the open one at the very end.
        assert_eq!(prompt.matches(ASSISTANT_OPEN).count(), 1);
        assert!(prompt.ends_with(OPEN_ASSISTANT));
        assert!(prompt.starts_with("<s><|im_start|>system\n"));
    }

    #[test]
    fn test_history_serialized_in_order() {
        let history = [
            HistoryTurn { role: Role::User, text: Some("first") },
            HistoryTurn { role: Role::Assistant, text: Some("reply") },
        ];
        let prompt = PromptAssembler::new("sys").assemble(&history, Mode::Normal, "second");

        assert_eq!(
            prompt,
            "<s><|im_start|>system\nsys<|im_end|>\n\
             <|im_start|>user\nfirst<|im_end|>\n\
             <|im_start|>assistant\nreply<|im_end|>\n\
             <|im_start|>user\nsecond<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_deep_mode_appends_reasoning_protocol() {
        let assembler = PromptAssembler::new("sys");
        let normal = assembler.assemble(&[], Mode::Normal, "q");
        let deep = assembler.assemble(&[], Mode::Deep, "q");

        assert!(!normal.contains("## Deep Understanding"));
        assert!(deep.contains("## Deep Understanding"));
        assert!(deep.contains("## Repeated Verification"));
        assert!(deep.contains(templates::ANSWER_DELIMITER));
        assert!(deep.len() > normal.len() * 10);
        assert!(deep.starts_with("<s><|im_start|>system\nsys\n"));
    }

    #[test]
    fn test_unresolved_assistant_turn_skipped() {
        let history = [
            HistoryTurn { role: Role::User, text: Some("first") },
            HistoryTurn { role: Role::Assistant, text: None },
        ];
        let prompt = PromptAssembler::new("sys").assemble(&history, Mode::Deep, "again");

        assert_eq!(prompt.matches(ASSISTANT_OPEN).count(), 1);
        assert_eq!(prompt.matches(USER_OPEN).count(), 2);
        assert!(!prompt.contains("None"));
    }
}
