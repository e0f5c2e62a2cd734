//! Progress events emitted by the pipeline.
//!
//! Workers publish [`ProgressEvent`]s into a bounded bus (see [`event_bus`]);
//! the presentation layer drains the receiver and hands each event to its
//! [`EventHandler`]s.

use crate::media::{MediaItem, MediaKind, Phase};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

mod bus;
pub mod json_handler;

pub use bus::{EventPublisher, EventReceiver, event_bus};

/// Outcome carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Started,
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventStatus::Started => "started",
            EventStatus::Succeeded => "succeeded",
            EventStatus::Failed => "failed",
            EventStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: u64,
    pub item_id: String,
    pub source_path: PathBuf,
    pub kind: MediaKind,
    pub phase: Phase,
    pub status: EventStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Event describing `item` as it is now.
    pub fn for_item(
        job_id: u64,
        item: &MediaItem,
        status: EventStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            item_id: item.id().to_string(),
            source_path: item.source_path().to_path_buf(),
            kind: item.kind(),
            phase: item.phase(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Terminal events are never dropped and there is exactly one per item.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Something that renders or records progress events.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &ProgressEvent);
}

/// Fans one event out to several handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn emit(&self, event: &ProgressEvent) {
        for handler in &self.handlers {
            handler.handle(event);
        }
    }

    /// Drains `receiver` until every publisher is gone.
    pub fn drain(&self, receiver: &EventReceiver) {
        for event in receiver.iter() {
            self.emit(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SkipReason;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<EventStatus>>);

    impl EventHandler for Recorder {
        fn handle(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.status);
        }
    }

    #[test]
    fn dispatcher_drains_until_publishers_are_gone() {
        let (publisher, receiver) = event_bus(8);
        let item = MediaItem::new("/x/a.mkv", MediaKind::Movie);
        publisher.publish(ProgressEvent::for_item(1, &item, EventStatus::Started, "go"));
        let mut skipped = MediaItem::new("/x/b.txt", MediaKind::Unknown);
        skipped.finish(Phase::Skipped(SkipReason::UnclassifiableInput));
        publisher.publish(ProgressEvent::for_item(1, &skipped, EventStatus::Skipped, "no"));
        drop(publisher);

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.add_handler(recorder.clone());
        dispatcher.drain(&receiver);

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![EventStatus::Started, EventStatus::Skipped]
        );
    }
}
