//! Interactive chat loop
//!
//! Reads lines from the user, treats `/`-prefixed lines as commands and
//! everything else as a chat message. Answers are numbered from 1 in the
//! order they were asked.

use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::inference::LanguageModel;
use crate::session::ChatSession;
use crate::types::Mode;
use crate::ui::terminal::{self, TerminalSink};

pub const HELP: &str = "\
Commands:
  /mode [normal|deep]          switch mode (toggles without an argument)
  /compare <n> [on|off]        show answer n from both modes side by side
  /regen <n> [normal|deep]     regenerate answer n (current mode by default)
  /show                        print the conversation
  /clear                       start a new conversation
  /help                        show this help
  /quit                        exit";

/// A user-facing answer number, held as the assistant turn index it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer(usize);

impl Answer {
    /// The `n`th answer (1-based), if its turn index is representable.
    pub fn new(n: usize) -> Option<Self> {
        n.checked_mul(2)?.checked_sub(1).map(Answer)
    }

    pub fn number(self) -> usize {
        self.0 / 2 + 1
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Message(String),
    Mode(Option<Mode>),
    Compare { answer: Answer, enabled: bool },
    Regenerate { answer: Answer, track: Option<Mode> },
    Show,
    Clear,
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("Expected an answer number, got '{0}'")]
    BadAnswer(String),

    #[error("Missing argument for /{0}")]
    MissingArgument(&'static str),

    #[error("Unknown mode '{0}' (use normal or deep)")]
    BadMode(String),

    #[error("Expected on or off, got '{0}'")]
    BadToggle(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(if line.is_empty() {
                Command::Empty
            } else {
                Command::Message(line.to_string())
            });
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        match name {
            "mode" => words.next().map(parse_mode).transpose().map(Command::Mode),
            "compare" => {
                let answer = words.next().ok_or(CommandError::MissingArgument("compare"))?;
                Ok(Command::Compare {
                    answer: parse_answer(answer)?,
                    enabled: words.next().map(parse_toggle).transpose()?.unwrap_or(true),
                })
            }
            "regen" | "regenerate" => {
                let answer = words.next().ok_or(CommandError::MissingArgument("regen"))?;
                Ok(Command::Regenerate {
                    answer: parse_answer(answer)?,
                    track: words.next().map(parse_mode).transpose()?,
                })
            }
            "show" => Ok(Command::Show),
            "clear" => Ok(Command::Clear),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_mode(word: &str) -> Result<Mode, CommandError> {
    word.parse().map_err(|_| CommandError::BadMode(word.to_string()))
}

fn parse_answer(word: &str) -> Result<Answer, CommandError> {
    word.parse::<usize>()
        .ok()
        .and_then(Answer::new)
        .ok_or_else(|| CommandError::BadAnswer(word.to_string()))
}

fn parse_toggle(word: &str) -> Result<bool, CommandError> {
    match word {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(CommandError::BadToggle(other.to_string())),
    }
}

/// Runs the loop until `/quit` or end of input.
pub fn run_repl<M, R, W>(session: &mut ChatSession<'_, M>, input: R, mut out: W) -> io::Result<()>
where
    M: LanguageModel + ?Sized,
    R: BufRead,
    W: Write,
{
    writeln!(out, "Mode: {} (type /help for commands)", session.mode().label())?;
    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                writeln!(out, "{e}")?;
                continue;
            }
        };

        let result = match command {
            Command::Empty => Ok(()),
            Command::Quit => break,
            Command::Help => {
                writeln!(out, "{HELP}")?;
                Ok(())
            }
            Command::Mode(mode) => {
                let mode = mode.unwrap_or_else(|| session.mode().other());
                session.set_mode(mode);
                writeln!(out, "Mode: {}", mode.label())?;
                Ok(())
            }
            Command::Clear => {
                session.clear();
                writeln!(out, "Conversation cleared.")?;
                Ok(())
            }
            Command::Show => show(session, &mut out),
            Command::Message(text) => session
                .submit(&text, &mut TerminalSink::new(&mut out))
                .map(|_| ()),
            Command::Compare { answer, enabled } => {
                let index = answer.index();
                let compared = if enabled {
                    session.compare(index, &mut TerminalSink::new(&mut out))
                } else {
                    session.set_compare(index, false)
                };
                match compared.and_then(|()| session.view(index)) {
                    Ok(view) => {
                        writeln!(
                            out,
                            "--- answer {} ---\n{}\n",
                            answer.number(),
                            terminal::render_view(&view)
                        )?;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Command::Regenerate { answer, track } => {
                let track = track.unwrap_or(session.mode());
                session
                    .regenerate(answer.index(), track, &mut TerminalSink::new(&mut out))
                    .map(|_| ())
            }
        };

        if let Err(e) = result {
            writeln!(out, "error: {e}")?;
        }
    }
    writeln!(out, "Bye.")?;
    Ok(())
}

fn show<M: LanguageModel + ?Sized, W: Write>(
    session: &ChatSession<'_, M>,
    out: &mut W,
) -> Result<(), crate::session::SessionError> {
    let state = session.state();
    let mut index = 1;
    while index < state.len() {
        let question = state.read(session.mode(), index - 1)?.unwrap_or_default();
        let view = session.view(index)?;
        let block = format!(
            "--- answer {} ---\n> {}\n{}\n",
            index / 2 + 1,
            question,
            terminal::render_view(&view)
        );
        if let Err(e) = out.write_all(block.as_bytes()) {
            tracing::warn!("Failed to write conversation: {}", e);
        }
        index += 2;
    }
    Ok(())
}
