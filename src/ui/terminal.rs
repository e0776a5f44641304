//! Terminal rendering
//!
//! Streams answers to a writer as they grow and renders stored turns. Model
//! output uses `\( \)` and `\[ \]` math delimiters; terminals and markdown
//! viewers expect `$` and `$$`, so every answer is rewritten before display.

use std::io::Write;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::inference::{DisplaySink, EngineError};
use crate::session::TurnView;
use crate::types::Mode;

// Literal patterns, compiled once; `test_math_patterns_compile` covers them.
static INLINE_MATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\\(|\\\)").expect("valid inline math pattern"));
static DISPLAY_MATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\\[|\\\]").expect("valid display math pattern"));

/// Rewrites LaTeX math delimiters into dollar form.
pub fn render_answer(text: &str) -> String {
    let inline = INLINE_MATH.replace_all(text, "$$");
    DISPLAY_MATH.replace_all(&inline, "$$$$").into_owned()
}

/// Header shown above an answer from `track`.
pub fn label(track: Mode) -> String {
    format!("[{}]", track.label())
}

/// Renders an assistant turn for `/show` and `/compare`.
pub fn render_view(view: &TurnView<'_>) -> String {
    const PENDING: &str = "(not generated yet)";
    match view {
        TurnView::Single { source, text } => format!("{}\n\n{}", label(*source), render_answer(text)),
        TurnView::Compare { normal, deep } => format!(
            "{}\n\n{}\n\n{}\n\n{}",
            label(Mode::Normal),
            normal.map(render_answer).as_deref().unwrap_or(PENDING),
            label(Mode::Deep),
            deep.map(render_answer).as_deref().unwrap_or(PENDING),
        ),
        TurnView::Pending => PENDING.to_string(),
    }
}

/// Streams generation snapshots to a terminal, printing only what is new.
pub struct TerminalSink<W: Write> {
    out: W,
    active: Option<Mode>,
    /// Rendered text already written for the active track.
    printed: String,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            active: None,
            printed: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn begin(&mut self, track: Mode) {
        if self.active != Some(track) {
            if self.active.is_some() {
                self.emit("\n");
            }
            self.emit(&format!("{}\n\n", label(track)));
            self.active = Some(track);
            self.printed.clear();
        }
    }

    /// Writes the part of `rendered` not yet on screen.
    fn advance(&mut self, rendered: String) {
        match rendered.strip_prefix(self.printed.as_str()) {
            Some(suffix) => {
                let suffix = suffix.to_string();
                self.emit(&suffix);
            }
            None => {
                // Earlier output changed under us; start a fresh line.
                self.emit("\n");
                self.emit(&rendered);
            }
        }
        self.printed = rendered;
        self.flush();
    }

    fn end(&mut self) {
        self.emit("\n\n");
        self.flush();
        self.active = None;
        self.printed.clear();
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()) {
            tracing::warn!("Failed to write to terminal: {}", e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!("Failed to flush terminal: {}", e);
        }
    }
}

impl<W: Write> DisplaySink for TerminalSink<W> {
    fn partial(&mut self, track: Mode, text: &str) {
        self.begin(track);
        // A trailing backslash may open a math delimiter the next token closes.
        let stable = text.strip_suffix('\\').unwrap_or(text);
        self.advance(render_answer(stable));
    }

    fn finished(&mut self, track: Mode, text: &str) {
        self.begin(track);
        self.advance(render_answer(text));
        self.end();
    }

    fn failed(&mut self, track: Mode, error: &EngineError) {
        self.begin(track);
        self.emit(&format!("\n[generation failed: {error}]"));
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(sink: TerminalSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_math_patterns_compile() {
        assert!(INLINE_MATH.is_match(r"\("));
        assert!(DISPLAY_MATH.is_match(r"\]"));
        assert!(!INLINE_MATH.is_match(r"\["));
    }

    #[test]
    fn test_render_answer_rewrites_delimiters() {
        assert_eq!(render_answer(r"so \(x^2\) holds"), "so $x^2$ holds");
        assert_eq!(render_answer(r"\[a+b\]"), "$$a+b$$");
        assert_eq!(render_answer("plain $5"), "plain $5");
    }

    #[test]
    fn test_streaming_prints_suffixes_once() {
        let mut sink = TerminalSink::new(Vec::new());
        for snapshot in ["He", "Hell", "Hello"] {
            sink.partial(Mode::Normal, snapshot);
        }
        sink.finished(Mode::Normal, "Hello");

        assert_eq!(output(sink), "[Normal Response]\n\nHello\n\n");
    }

    #[test]
    fn test_split_delimiter_is_held_back() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.partial(Mode::Deep, "x = \\");
        sink.partial(Mode::Deep, "x = \\(1");
        sink.finished(Mode::Deep, "x = \\(1\\)");

        assert_eq!(output(sink), "[Deep Thinking]\n\nx = $1$\n\n");
    }

    #[test]
    fn test_each_track_gets_its_own_label() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.finished(Mode::Normal, "short");
        sink.partial(Mode::Deep, "long");
        sink.finished(Mode::Deep, "longer");

        let text = output(sink);
        assert!(text.starts_with("[Normal Response]\n\nshort\n\n"));
        assert!(text.ends_with("[Deep Thinking]\n\nlonger\n\n"));
    }

    #[test]
    fn test_render_view_variants() {
        let single = TurnView::Single {
            source: Mode::Normal,
            text: r"\(a\)",
        };
        assert_eq!(render_view(&single), "[Normal Response]\n\n$a$");

        let compare = TurnView::Compare {
            normal: Some("n"),
            deep: None,
        };
        let rendered = render_view(&compare);
        assert!(rendered.contains("[Normal Response]\n\nn"));
        assert!(rendered.contains("[Deep Thinking]\n\n(not generated yet)"));
    }
}
