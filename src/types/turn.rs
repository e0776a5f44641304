//! Turn types
//!
//! Defines the roles, response modes and turn payloads shared by both tracks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a turn's author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Message from the user
    User,
    /// Response from the model
    Assistant,
}

/// Response mode. Each mode owns one track of the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plain answers under the base system instruction
    #[default]
    Normal,
    /// Answers under the extended structured-reasoning instruction
    Deep,
}

impl Mode {
    /// Both modes, normal first.
    pub const ALL: [Mode; 2] = [Mode::Normal, Mode::Deep];

    /// The mode owning the opposite track.
    pub fn other(self) -> Mode {
        match self {
            Mode::Normal => Mode::Deep,
            Mode::Deep => Mode::Normal,
        }
    }

    /// Display label used when rendering an answer.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Normal => "Normal Response",
            Mode::Deep => "Deep Thinking",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => f.write_str("normal"),
            Mode::Deep => f.write_str("deep"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "n" => Ok(Mode::Normal),
            "deep" | "d" | "deepthink" => Ok(Mode::Deep),
            other => Err(format!("unknown mode '{other}' (expected 'normal' or 'deep')")),
        }
    }
}

/// Text of a turn on one track.
///
/// `Pending` means the answer was never generated for this track. It is
/// distinct from a realized empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnText {
    Realized(String),
    Pending,
}

impl TurnText {
    pub fn as_realized(&self) -> Option<&str> {
        match self {
            TurnText::Realized(text) => Some(text),
            TurnText::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TurnText::Pending)
    }
}

/// A single step of one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: TurnText,
}

impl Turn {
    /// A user turn; user text is always realized.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: TurnText::Realized(text.into()),
        }
    }

    /// An assistant turn awaiting generation.
    pub fn pending_assistant() -> Self {
        Self {
            role: Role::Assistant,
            text: TurnText::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_other_is_involution() {
        for mode in Mode::ALL {
            assert_ne!(mode.other(), mode);
            assert_eq!(mode.other().other(), mode);
        }
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Deep".parse::<Mode>().unwrap(), Mode::Deep);
        assert_eq!(" normal ".parse::<Mode>().unwrap(), Mode::Normal);
        assert!("shallow".parse::<Mode>().is_err());
    }

    #[test]
    fn test_pending_differs_from_empty() {
        let empty = TurnText::Realized(String::new());
        assert_eq!(empty.as_realized(), Some(""));
        assert!(!empty.is_pending());
        assert_eq!(TurnText::Pending.as_realized(), None);
    }

    #[test]
    fn test_turn_constructors() {
        let user = Turn::user("hi");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.text.as_realized(), Some("hi"));

        let pending = Turn::pending_assistant();
        assert_eq!(pending.role, Role::Assistant);
        assert!(pending.text.is_pending());
    }

    #[test]
    fn test_mode_serde_lowercase() {
        let json = serde_json::to_string(&Mode::Deep).unwrap();
        assert_eq!(json, "\"deep\"");
    }
}
