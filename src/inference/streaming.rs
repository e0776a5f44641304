//! Streaming output
//!
//! A generation yields the full decoded text after every step. Display sinks
//! receive those snapshots plus a final or failure notice per track.

use crate::inference::engine::EngineError;
use crate::types::Mode;

/// Receives the progress of a generation for presentation.
pub trait DisplaySink {
    /// Full text decoded so far (not a delta).
    fn partial(&mut self, track: Mode, text: &str);

    /// Final text once the generation has stopped.
    fn finished(&mut self, track: Mode, text: &str);

    /// The generation failed; any partial text already shown is not an answer.
    fn failed(&mut self, track: Mode, error: &EngineError);
}

/// Represents one notification delivered to a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Partial { track: Mode, text: String },
    Finished { track: Mode, text: String },
    Failed { track: Mode, error: String },
}

impl StreamEvent {
    pub fn track(&self) -> Mode {
        match self {
            StreamEvent::Partial { track, .. }
            | StreamEvent::Finished { track, .. }
            | StreamEvent::Failed { track, .. } => *track,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, StreamEvent::Finished { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StreamEvent::Failed { .. })
    }
}

/// Sink that keeps every event, for headless callers.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<StreamEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final text of the most recent finished generation on `track`.
    pub fn last_finished(&self, track: Mode) -> Option<&str> {
        self.events.iter().rev().find_map(|event| match event {
            StreamEvent::Finished { track: t, text } if *t == track => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn partials(&self, track: Mode) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Partial { track: t, text } if *t == track => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl DisplaySink for RecordingSink {
    fn partial(&mut self, track: Mode, text: &str) {
        self.events.push(StreamEvent::Partial {
            track,
            text: text.to_string(),
        });
    }

    fn finished(&mut self, track: Mode, text: &str) {
        self.events.push(StreamEvent::Finished {
            track,
            text: text.to_string(),
        });
    }

    fn failed(&mut self, track: Mode, error: &EngineError) {
        self.events.push(StreamEvent::Failed {
            track,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_queries() {
        let mut sink = RecordingSink::new();
        sink.partial(Mode::Normal, "h");
        sink.partial(Mode::Normal, "hi");
        sink.finished(Mode::Normal, "hi");
        sink.partial(Mode::Deep, "x");

        assert_eq!(sink.partials(Mode::Normal), vec!["h", "hi"]);
        assert_eq!(sink.last_finished(Mode::Normal), Some("hi"));
        assert_eq!(sink.last_finished(Mode::Deep), None);
        assert!(sink.events[2].is_finished());
        assert_eq!(sink.events[3].track(), Mode::Deep);
    }
}
