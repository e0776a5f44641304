//! Shared domain types

pub mod turn;

pub use turn::{Mode, Role, Turn, TurnText};
