//! Progress notifications for long discovery runs.
//!
//! Advisory only: a sink can log, stream, or drop events, and nothing in the
//! pipeline branches on them.

use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Search,
    RegionPower,
    BroadSearch,
    Scoring,
    Exposure,
    Saving,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Search => "search",
            Stage::RegionPower => "region_power",
            Stage::BroadSearch => "broad_search",
            Stage::Scoring => "scoring",
            Stage::Exposure => "exposure",
            Stage::Saving => "saving",
            Stage::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

pub trait ProgressSink {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent),
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Drops every event.
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

#[cfg(test)]
impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        info!(
            stage = event.stage.as_str(),
            current = event.current,
            total = event.total,
            message = %event.message,
            "progress"
        );
    }
}

/// Streams events as JSON lines, e.g. to stdout for a live progress view.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write> ProgressSink for JsonLinesSink<W> {
    fn emit(&self, event: ProgressEvent) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let written = serde_json::to_writer(&mut *out, &event)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out))
            .and_then(|_| out.flush());
        if let Err(e) = written {
            warn!(error = %e, "could not write progress event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn event(stage: Stage, current: usize) -> ProgressEvent {
        ProgressEvent {
            stage,
            current,
            total: 3,
            message: "검색 중".into(),
        }
    }

    #[test]
    fn test_closure_sink_collects_in_order() {
        let seen = RefCell::new(Vec::new());
        let sink = |e: ProgressEvent| seen.borrow_mut().push(e.stage);
        sink.emit(event(Stage::Search, 1));
        sink.emit(event(Stage::Done, 3));
        assert_eq!(*seen.borrow(), vec![Stage::Search, Stage::Done]);
    }

    #[test]
    fn test_json_lines_sink() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.emit(event(Stage::RegionPower, 1));
        sink.emit(event(Stage::BroadSearch, 2));
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"stage\":\"region_power\""));
        assert!(lines[1].contains("\"current\":2"));
    }
}
