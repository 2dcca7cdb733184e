use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};

/// Structured progress records flowing from pipeline workers to a single
/// renderer task. Workers never touch the terminal directly, so batch
/// output stays readable regardless of how many items run concurrently.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Success,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "[INFO]",
            Level::Success => "[SUCCESS]",
            Level::Warn => "[WARN]",
            Level::Error => "[ERROR]",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub level: Level,
    pub item: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl EventSender {
    fn push(&self, level: Level, item: Option<&str>, message: impl Into<String>) {
        // A closed channel means the renderer is gone at shutdown; records
        // are droppable at that point.
        let _ = self.tx.send(ProgressEvent {
            level,
            item: item.map(|value| value.to_string()),
            message: message.into(),
            timestamp: Local::now(),
        });
    }

    pub fn info(&self, item: Option<&str>, message: impl Into<String>) {
        self.push(Level::Info, item, message);
    }

    pub fn success(&self, item: Option<&str>, message: impl Into<String>) {
        self.push(Level::Success, item, message);
    }

    pub fn warn(&self, item: Option<&str>, message: impl Into<String>) {
        self.push(Level::Warn, item, message);
    }

    pub fn error(&self, item: Option<&str>, message: impl Into<String>) {
        self.push(Level::Error, item, message);
    }
}

/// Spawn the single consumer that renders events to stderr. Dropping every
/// `EventSender` clone ends the task; await the handle to flush.
pub fn channel() -> (EventSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let ts = event.timestamp.format("%H:%M:%S");
            match &event.item {
                Some(item) => eprintln!("{ts} {} [{item}] {}", event.level.tag(), event.message),
                None => eprintln!("{ts} {} {}", event.level.tag(), event.message),
            }
        }
    });
    (EventSender { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renderer_drains_and_exits_on_drop() {
        let (events, handle) = channel();
        events.info(None, "starting");
        events.success(Some("ITEM_001"), "done");
        drop(events);
        handle.await.expect("renderer exits cleanly");
    }

    #[test]
    fn level_tags() {
        assert_eq!(Level::Info.tag(), "[INFO]");
        assert_eq!(Level::Error.tag(), "[ERROR]");
    }
}
