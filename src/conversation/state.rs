//! Conversation state aggregate

use crate::conversation::ConversationError;
use crate::types::{Mode, Role, Turn, TurnText};

/// A turn of history resolved for prompt assembly.
///
/// `text` is `None` only when neither track has realized the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTurn<'a> {
    pub role: Role,
    pub text: Option<&'a str>,
}

/// Two index-aligned tracks of one conversation.
///
/// Turn `i` on both tracks is the same logical exchange. User turns carry
/// identical text on both tracks; assistant turns may differ or be pending.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    normal: Vec<Turn>,
    deep: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of turns on each track.
    pub fn len(&self) -> usize {
        self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normal.is_empty()
    }

    /// Fails fast if the tracks ever disagree on length.
    pub fn check_aligned(&self) -> Result<(), ConversationError> {
        if self.normal.len() != self.deep.len() {
            tracing::error!(
                normal = self.normal.len(),
                deep = self.deep.len(),
                "Conversation tracks diverged"
            );
            return Err(ConversationError::TrackDivergence {
                normal: self.normal.len(),
                deep: self.deep.len(),
            });
        }
        Ok(())
    }

    /// Appends a user turn with identical text to both tracks.
    pub fn append_user(&mut self, text: impl Into<String>) -> Result<usize, ConversationError> {
        let turn = Turn::user(text);
        self.push_pair(turn.clone(), turn)
    }

    /// Appends a pending assistant turn to both tracks and returns its index.
    pub fn append_pending_assistant(&mut self) -> Result<usize, ConversationError> {
        self.push_pair(Turn::pending_assistant(), Turn::pending_assistant())
    }

    /// Sets the answer of one track at one index.
    ///
    /// The turn must be a pending assistant turn; a realized answer is only
    /// replaced through [`ConversationState::replace`].
    pub fn realize(
        &mut self,
        track: Mode,
        index: usize,
        text: impl Into<String>,
    ) -> Result<(), ConversationError> {
        let turn = self.assistant_turn_mut(track, index)?;
        if !turn.text.is_pending() {
            return Err(ConversationError::AlreadyRealized { index, track });
        }
        turn.text = TurnText::Realized(text.into());
        Ok(())
    }

    /// Overwrites the answer of one track at one index. Explicit regeneration only.
    pub fn replace(
        &mut self,
        track: Mode,
        index: usize,
        text: impl Into<String>,
    ) -> Result<(), ConversationError> {
        let turn = self.assistant_turn_mut(track, index)?;
        turn.text = TurnText::Realized(text.into());
        Ok(())
    }

    /// The turn stored on `track` at `index`, without fallback.
    pub fn turn(&self, track: Mode, index: usize) -> Result<&Turn, ConversationError> {
        self.track(track)
            .get(index)
            .ok_or_else(|| self.out_of_range(index))
    }

    /// Role of the turn at `index` (identical on both tracks).
    pub fn role(&self, index: usize) -> Result<Role, ConversationError> {
        Ok(self.turn(Mode::Normal, index)?.role)
    }

    /// Resolves the text at `index` for `track`, falling back to the other
    /// track when this one is pending. Returns the track the text came from.
    pub fn resolve(
        &self,
        track: Mode,
        index: usize,
    ) -> Result<Option<(Mode, &str)>, ConversationError> {
        if let Some(text) = self.turn(track, index)?.text.as_realized() {
            return Ok(Some((track, text)));
        }
        let other = track.other();
        Ok(self
            .turn(other, index)?
            .text
            .as_realized()
            .map(|text| (other, text)))
    }

    /// Text at `index` for `track`, with fallback to the other track.
    pub fn read(&self, track: Mode, index: usize) -> Result<Option<&str>, ConversationError> {
        Ok(self.resolve(track, index)?.map(|(_, text)| text))
    }

    /// Resolved history of `track` for turns `[0, end)`.
    pub fn history(&self, track: Mode, end: usize) -> Result<Vec<HistoryTurn<'_>>, ConversationError> {
        if end > self.len() {
            return Err(ConversationError::invalid(
                end,
                format!("history end past {} turns", self.len()),
            ));
        }
        (0..end)
            .map(|index| {
                Ok(HistoryTurn {
                    role: self.role(index)?,
                    text: self.read(track, index)?,
                })
            })
            .collect()
    }

    /// Drops every turn from both tracks.
    pub fn clear(&mut self) {
        self.normal.clear();
        self.deep.clear();
    }

    fn push_pair(&mut self, normal: Turn, deep: Turn) -> Result<usize, ConversationError> {
        self.check_aligned()?;
        // Reserve both first so neither push can fail after the other succeeded.
        self.normal.reserve(1);
        self.deep.reserve(1);
        self.normal.push(normal);
        self.deep.push(deep);
        Ok(self.normal.len() - 1)
    }

    fn assistant_turn_mut(&mut self, track: Mode, index: usize) -> Result<&mut Turn, ConversationError> {
        let len = self.len();
        let turn = match track {
            Mode::Normal => self.normal.get_mut(index),
            Mode::Deep => self.deep.get_mut(index),
        }
        .ok_or_else(|| ConversationError::invalid(index, format!("out of range for {len} turns")))?;
        if turn.role != Role::Assistant {
            return Err(ConversationError::invalid(index, "not an assistant turn"));
        }
        Ok(turn)
    }

    fn track(&self, track: Mode) -> &[Turn] {
        match track {
            Mode::Normal => &self.normal,
            Mode::Deep => &self.deep,
        }
    }

    fn out_of_range(&self, index: usize) -> ConversationError {
        ConversationError::invalid(index, format!("out of range for {} turns", self.len()))
    }
}
