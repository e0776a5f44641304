//! Dual-track conversation store
//!
//! Holds the normal and deep tracks of one conversation and only exposes
//! paired mutations, so the two tracks always have the same number of turns.

pub mod state;

use thiserror::Error;

use crate::types::Mode;

pub use state::{ConversationState, HistoryTurn};

/// Errors raised by the conversation store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Invalid turn {index}: {reason}")]
    InvalidTurn { index: usize, reason: String },

    #[error("Turn {index} is already realized on the {track} track")]
    AlreadyRealized { index: usize, track: Mode },

    #[error("Track divergence: normal has {normal} turns, deep has {deep}")]
    TrackDivergence { normal: usize, deep: usize },
}

impl ConversationError {
    pub(crate) fn invalid(index: usize, reason: impl Into<String>) -> Self {
        ConversationError::InvalidTurn {
            index,
            reason: reason.into(),
        }
    }
}
