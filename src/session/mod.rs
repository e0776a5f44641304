//! Session controller
//!
//! Turns user input into generations on the track selected by the current
//! mode, lazily materializes the other track on compare requests, and writes
//! finished answers back into the conversation store.
//!
//! One generation runs at a time: every operation that decodes takes
//! `&mut self`, so a session can never be mutated while it is generating.

use std::collections::BTreeSet;

use thiserror::Error;
use uuid::Uuid;

use crate::conversation::{ConversationError, ConversationState};
use crate::inference::{DecodingEngine, DisplaySink, EngineError, GenerationConfig, LanguageModel};
use crate::prompt::PromptAssembler;
use crate::types::{Mode, Role};
use crate::truncate_str;

/// Errors surfaced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

/// Where the current turn is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingInput,
    Generating(Mode),
    Realized,
}

/// What to show for one assistant turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnView<'a> {
    /// One answer, resolved for the current mode. `source` is the track the
    /// text came from, which differs from the mode after a fallback.
    Single { source: Mode, text: &'a str },
    /// Side by side; each column shows only its own track.
    Compare {
        normal: Option<&'a str>,
        deep: Option<&'a str>,
    },
    /// Nothing generated yet on either track.
    Pending,
}

/// A single conversation driven against a shared model
pub struct ChatSession<'m, M: LanguageModel + ?Sized> {
    id: Uuid,
    engine: DecodingEngine<'m, M>,
    assembler: PromptAssembler,
    state: ConversationState,
    mode: Mode,
    config: GenerationConfig,
    additional_terminator: Option<u32>,
    compare: BTreeSet<usize>,
    phase: Phase,
}

impl<'m, M: LanguageModel + ?Sized> ChatSession<'m, M> {
    pub fn new(model: &'m M, assembler: PromptAssembler, config: GenerationConfig, mode: Mode) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(session = %id, mode = %mode, "Chat session created");
        Self {
            id,
            engine: DecodingEngine::new(model),
            assembler,
            state: ConversationState::new(),
            mode,
            config,
            additional_terminator: None,
            compare: BTreeSet::new(),
            phase: Phase::AwaitingInput,
        }
    }

    /// Adds a caller-supplied terminator id on top of the model's own.
    pub fn with_additional_terminator(mut self, token: Option<u32>) -> Self {
        self.additional_terminator = token;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            tracing::info!(session = %self.id, "Mode switched to {}", mode);
        }
        self.mode = mode;
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn set_config(&mut self, mut config: GenerationConfig) {
        config.validate();
        self.config = config;
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Clears both tracks and every compare flag.
    pub fn clear(&mut self) {
        self.state.clear();
        self.compare.clear();
        self.phase = Phase::AwaitingInput;
        tracing::info!(session = %self.id, "Conversation cleared");
    }

    /// Records a user message and answers it on the current mode's track.
    ///
    /// Returns the index of the new assistant turn. On failure the turn stays
    /// pending on both tracks and can be retried with [`ChatSession::materialize`].
    pub fn submit(&mut self, text: &str, sink: &mut dyn DisplaySink) -> Result<usize, SessionError> {
        tracing::info!(session = %self.id, mode = %self.mode, "User: {}", truncate_str(text, 80));
        // Each submit opens a new turn.
        self.phase = Phase::AwaitingInput;
        self.state.append_user(text)?;
        let index = self.state.append_pending_assistant()?;

        let track = self.mode;
        let prompt = self.exchange_prompt(index, track)?;
        let answer = self.drive(track, &prompt, sink)?;
        self.state.realize(track, index, answer)?;
        self.phase = Phase::Realized;
        Ok(index)
    }

    /// Returns the answer of `track` at `index`, generating it first if the
    /// track never produced one. An existing answer is never replaced.
    pub fn materialize(
        &mut self,
        index: usize,
        track: Mode,
        sink: &mut dyn DisplaySink,
    ) -> Result<String, SessionError> {
        self.require_assistant(index)?;
        if let Some(text) = self.state.turn(track, index)?.text.as_realized() {
            return Ok(text.to_string());
        }
        let prompt = self.exchange_prompt(index, track)?;
        let answer = self.drive(track, &prompt, sink)?;
        self.state.realize(track, index, answer.clone())?;
        self.phase = Phase::Realized;
        Ok(answer)
    }

    /// Generates a fresh answer for `track` at `index` and replaces the old
    /// one. The other track is untouched; on failure so is this one.
    pub fn regenerate(
        &mut self,
        index: usize,
        track: Mode,
        sink: &mut dyn DisplaySink,
    ) -> Result<String, SessionError> {
        let prompt = self.exchange_prompt(index, track)?;
        tracing::info!(session = %self.id, turn = index, track = %track, "Regenerating answer");
        let answer = self.drive(track, &prompt, sink)?;
        self.state.replace(track, index, answer.clone())?;
        self.phase = Phase::Realized;
        Ok(answer)
    }

    /// Turns on side-by-side display for `index` and generates whichever
    /// tracks are still pending, current mode first. The two runs share no
    /// decode state.
    pub fn compare(&mut self, index: usize, sink: &mut dyn DisplaySink) -> Result<(), SessionError> {
        self.set_compare(index, true)?;
        for track in [self.mode, self.mode.other()] {
            self.materialize(index, track, sink)?;
        }
        Ok(())
    }

    /// Toggles the compare flag of an assistant turn without generating.
    pub fn set_compare(&mut self, index: usize, enabled: bool) -> Result<(), SessionError> {
        self.require_assistant(index)?;
        if enabled {
            self.compare.insert(index);
        } else {
            self.compare.remove(&index);
        }
        Ok(())
    }

    pub fn is_compared(&self, index: usize) -> bool {
        self.compare.contains(&index)
    }

    /// Resolves what to display for the assistant turn at `index`.
    pub fn view(&self, index: usize) -> Result<TurnView<'_>, SessionError> {
        self.require_assistant(index)?;
        if self.is_compared(index) {
            return Ok(TurnView::Compare {
                normal: self.state.turn(Mode::Normal, index)?.text.as_realized(),
                deep: self.state.turn(Mode::Deep, index)?.text.as_realized(),
            });
        }
        Ok(match self.state.resolve(self.mode, index)? {
            Some((source, text)) => TurnView::Single { source, text },
            None => TurnView::Pending,
        })
    }

    /// Prompt for answering the assistant turn at `index` on `track`.
    ///
    /// History covers every turn before the user message being answered,
    /// resolved with fallback; the answered turn itself never falls back.
    fn exchange_prompt(&self, index: usize, track: Mode) -> Result<String, SessionError> {
        self.require_assistant(index)?;
        let user_index = index
            .checked_sub(1)
            .filter(|&i| matches!(self.state.role(i), Ok(Role::User)))
            .ok_or_else(|| ConversationError::invalid(index, "not preceded by a user turn"))?;

        let user_text = self
            .state
            .turn(track, user_index)?
            .text
            .as_realized()
            .unwrap_or_default();
        let history = self.state.history(track, user_index)?;
        Ok(self.assembler.assemble(&history, track, user_text))
    }

    fn require_assistant(&self, index: usize) -> Result<(), ConversationError> {
        match self.state.role(index)? {
            Role::Assistant => Ok(()),
            Role::User => Err(ConversationError::invalid(index, "not an assistant turn")),
        }
    }

    /// Runs one generation to completion, streaming every snapshot to `sink`.
    fn drive(&mut self, track: Mode, prompt: &str, sink: &mut dyn DisplaySink) -> Result<String, SessionError> {
        self.phase = Phase::Generating(track);
        let generation = match self
            .engine
            .generate(prompt, &self.config, self.additional_terminator)
        {
            Ok(generation) => generation,
            Err(e) => return Err(self.fail(track, e, sink)),
        };

        let mut text = String::new();
        for step in generation {
            match step {
                Ok(snapshot) => {
                    sink.partial(track, &snapshot);
                    text = snapshot;
                }
                Err(e) => return Err(self.fail(track, e, sink)),
            }
        }

        sink.finished(track, &text);
        Ok(text)
    }

    fn fail(&mut self, track: Mode, error: EngineError, sink: &mut dyn DisplaySink) -> SessionError {
        tracing::warn!(session = %self.id, track = %track, "Generation failed: {}", error);
        self.phase = Phase::AwaitingInput;
        sink.failed(track, &error);
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::model::mock::ScriptedModel;
    use crate::inference::RecordingSink;
    use crate::prompt::DEEP_INSTRUCTION;

    fn session(model: &ScriptedModel, mode: Mode) -> ChatSession<'_, ScriptedModel> {
        ChatSession::new(model, PromptAssembler::new("sys"), GenerationConfig::default(), mode)
    }

    #[test]
    fn test_submit_realizes_only_active_track() {
        let model = ScriptedModel::new(&["plain"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();

        let index = chat.submit("hi", &mut sink).unwrap();

        assert_eq!(index, 1);
        assert_eq!(chat.state().len(), 2);
        assert_eq!(chat.state().turn(Mode::Normal, 1).unwrap().text.as_realized(), Some("plain"));
        assert!(chat.state().turn(Mode::Deep, 1).unwrap().text.is_pending());
        assert_eq!(chat.state().read(Mode::Deep, 1).unwrap(), Some("plain"));
        assert_eq!(chat.phase(), Phase::Realized);
        assert_eq!(sink.last_finished(Mode::Normal), Some("plain"));
        assert_eq!(sink.partials(Mode::Normal).first(), Some(&"p"));
    }

    #[test]
    fn test_deep_mode_uses_deep_track_and_instruction() {
        let model = ScriptedModel::new(&["reasoned"]);
        let mut chat = session(&model, Mode::Deep);
        chat.submit("why?", &mut RecordingSink::new()).unwrap();

        assert_eq!(chat.state().turn(Mode::Deep, 1).unwrap().text.as_realized(), Some("reasoned"));
        assert!(chat.state().turn(Mode::Normal, 1).unwrap().text.is_pending());
        assert!(model.prompts()[0].contains(DEEP_INSTRUCTION));
    }

    #[test]
    fn test_compare_fills_other_track_once() {
        let model = ScriptedModel::new(&["plain", "deep"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();
        let index = chat.submit("hi", &mut sink).unwrap();

        chat.compare(index, &mut sink).unwrap();
        assert_eq!(
            chat.view(index).unwrap(),
            TurnView::Compare {
                normal: Some("plain"),
                deep: Some("deep")
            }
        );
        assert_eq!(sink.last_finished(Mode::Deep), Some("deep"));
        assert!(model.prompts()[1].contains(DEEP_INSTRUCTION));

        // Both realized: comparing again generates nothing.
        chat.compare(index, &mut sink).unwrap();
        assert_eq!(model.sessions_started(), 2);
    }

    #[test]
    fn test_compare_can_be_turned_off() {
        let model = ScriptedModel::new(&["plain", "deep"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();
        let index = chat.submit("hi", &mut sink).unwrap();
        chat.compare(index, &mut sink).unwrap();
        assert!(chat.is_compared(index));

        chat.set_compare(index, false).unwrap();
        assert!(!chat.is_compared(index));
        assert_eq!(
            chat.view(index).unwrap(),
            TurnView::Single {
                source: Mode::Normal,
                text: "plain"
            }
        );

        // Turning it back on reuses both answers.
        chat.set_compare(index, true).unwrap();
        assert!(matches!(chat.view(index).unwrap(), TurnView::Compare { deep: Some("deep"), .. }));
        assert_eq!(model.sessions_started(), 2);
    }

    #[test]
    fn test_phase_follows_turn_lifecycle() {
        let model = ScriptedModel::new(&["one", "two", "three"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();
        assert_eq!(chat.phase(), Phase::AwaitingInput);

        chat.submit("q1", &mut sink).unwrap();
        assert_eq!(chat.phase(), Phase::Realized);

        model.fail_next_session(0);
        assert!(chat.submit("q2", &mut sink).is_err());
        assert_eq!(chat.phase(), Phase::AwaitingInput);

        chat.materialize(3, Mode::Normal, &mut sink).unwrap();
        assert_eq!(chat.phase(), Phase::Realized);

        chat.submit("q3", &mut sink).unwrap();
        assert_eq!(chat.phase(), Phase::Realized);
        assert_eq!(chat.state().read(Mode::Normal, 5).unwrap(), Some("one"));
    }

    #[test]
    fn test_regenerate_leaves_other_track_untouched() {
        let model = ScriptedModel::new(&["plain", "deep", "deeper"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();
        let index = chat.submit("hi", &mut sink).unwrap();
        chat.compare(index, &mut sink).unwrap();

        let answer = chat.regenerate(index, Mode::Deep, &mut sink).unwrap();

        assert_eq!(answer, "deeper");
        assert_eq!(chat.state().read(Mode::Deep, index).unwrap(), Some("deeper"));
        assert_eq!(chat.state().read(Mode::Normal, index).unwrap(), Some("plain"));
    }

    #[test]
    fn test_failed_generation_leaves_turn_retryable() {
        let model = ScriptedModel::new(&["answer"]).failing(1, 3);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();

        let err = chat.submit("hi", &mut sink).unwrap_err();
        assert!(matches!(err, SessionError::Engine(EngineError::Forward { step: 3, .. })));
        assert_eq!(chat.phase(), Phase::AwaitingInput);
        assert_eq!(chat.state().len(), 2);
        assert_eq!(chat.state().read(Mode::Normal, 1).unwrap(), None);
        assert_eq!(chat.view(1).unwrap(), TurnView::Pending);
        assert!(sink.events.last().unwrap().is_failed());
        assert_eq!(sink.last_finished(Mode::Normal), None);

        let answer = chat.materialize(1, Mode::Normal, &mut sink).unwrap();
        assert_eq!(answer, "answer");
        assert_eq!(chat.state().read(Mode::Normal, 1).unwrap(), Some("answer"));
    }

    #[test]
    fn test_failed_regenerate_keeps_previous_answer() {
        let model = ScriptedModel::new(&["first", "second"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();
        chat.submit("hi", &mut sink).unwrap();

        model.fail_next_session(2);
        assert!(chat.regenerate(1, Mode::Normal, &mut sink).is_err());
        assert_eq!(chat.state().read(Mode::Normal, 1).unwrap(), Some("first"));
        assert!(chat.state().turn(Mode::Deep, 1).unwrap().text.is_pending());
        assert_eq!(chat.phase(), Phase::AwaitingInput);

        assert_eq!(chat.regenerate(1, Mode::Normal, &mut sink).unwrap(), "first");
    }

    #[test]
    fn test_history_falls_back_across_tracks() {
        let model = ScriptedModel::new(&["a1", "a2"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();
        chat.submit("q1", &mut sink).unwrap();

        chat.set_mode(Mode::Deep);
        chat.submit("q2", &mut sink).unwrap();

        let prompt = &model.prompts()[1];
        assert!(prompt.contains("<|im_start|>user\nq1<|im_end|>\n<|im_start|>assistant\na1<|im_end|>\n"));
        assert!(prompt.ends_with("<|im_start|>user\nq2<|im_end|>\n<|im_start|>assistant\n"));
        assert_eq!(chat.state().read(Mode::Deep, 3).unwrap(), Some("a2"));
        assert_eq!(chat.state().read(Mode::Normal, 3).unwrap(), Some("a2"));
    }

    #[test]
    fn test_view_reports_fallback_source() {
        let model = ScriptedModel::new(&["plain"]);
        let mut chat = session(&model, Mode::Normal);
        chat.submit("hi", &mut RecordingSink::new()).unwrap();
        chat.set_mode(Mode::Deep);

        assert_eq!(
            chat.view(1).unwrap(),
            TurnView::Single {
                source: Mode::Normal,
                text: "plain"
            }
        );
    }

    #[test]
    fn test_invalid_turn_indices_rejected() {
        let model = ScriptedModel::new(&["plain"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();
        chat.submit("hi", &mut sink).unwrap();

        assert!(matches!(
            chat.regenerate(0, Mode::Deep, &mut sink),
            Err(SessionError::Conversation(ConversationError::InvalidTurn { index: 0, .. }))
        ));
        assert!(matches!(
            chat.compare(9, &mut sink),
            Err(SessionError::Conversation(ConversationError::InvalidTurn { index: 9, .. }))
        ));
        assert_eq!(model.sessions_started(), 1);
    }

    #[test]
    fn test_tracks_aligned_through_session() {
        let model = ScriptedModel::new(&["x", "y", "z"]);
        let mut chat = session(&model, Mode::Normal);
        let mut sink = RecordingSink::new();
        for (i, mode) in [Mode::Normal, Mode::Deep, Mode::Normal].into_iter().enumerate() {
            chat.set_mode(mode);
            chat.submit(&format!("q{i}"), &mut sink).unwrap();
            assert!(chat.state().check_aligned().is_ok());
        }
        assert_eq!(chat.state().len(), 6);

        chat.clear();
        assert!(chat.state().is_empty());
        assert!(!chat.is_compared(1));
    }

    #[test]
    fn test_zero_temperature_session_is_deterministic() {
        let config = GenerationConfig {
            temperature: 0.0,
            max_total_length: 400,
            ..Default::default()
        };
        let run = || {
            let model = ScriptedModel::uniform();
            let mut chat = ChatSession::new(&model, PromptAssembler::new("sys"), config.clone(), Mode::Normal);
            chat.submit("same", &mut RecordingSink::new()).unwrap();
            chat.state().read(Mode::Normal, 1).unwrap().map(str::to_string)
        };
        assert_eq!(run(), run());
    }
}
