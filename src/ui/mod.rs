//! Terminal user interface

pub mod repl;
pub mod terminal;

pub use repl::{run_repl, Answer, Command};
pub use terminal::{render_answer, TerminalSink};
