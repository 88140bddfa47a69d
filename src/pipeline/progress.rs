//! Progress notifications

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::Stage;

/// One stage transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Stage entered
    pub stage: Stage,
    /// Human readable message
    pub message: String,
    /// Rough completion percentage
    pub percent: u8,
}

impl ProgressEvent {
    /// Event for entering `stage`
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            percent: stage.percent(),
        }
    }
}

/// Receives every progress event of a run, in order
pub trait ProgressSink: Send + Sync {
    /// Handle one event
    fn emit(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Forwards events to an async receiver
#[derive(Debug, Clone)]
pub struct ChannelSink(UnboundedSender<ProgressEvent>);

impl ChannelSink {
    /// Wrap a sender
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self(sender)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &ProgressEvent) {
        // A dropped receiver only means nobody is watching
        let _ = self.0.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: &ProgressEvent| seen.lock().unwrap().push(event.stage);
        sink.emit(&ProgressEvent::new(Stage::Extracting, "x"));
        sink.emit(&ProgressEvent::new(Stage::Building, "y"));
        assert_eq!(*seen.lock().unwrap(), vec![Stage::Extracting, Stage::Building]);
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.emit(&ProgressEvent::new(Stage::Extracting, "x"));
        assert_eq!(rx.try_recv().unwrap().percent, Stage::Extracting.percent());
        drop(rx);
        sink.emit(&ProgressEvent::new(Stage::Done, "done"));
    }
}
