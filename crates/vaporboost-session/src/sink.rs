//! Message log sinks for inbound chat messages.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::mpsc};
use tracing::warn;
use vaporboost_core::traits::{InboundMessage, MessageSink, SinkError};

const MESSAGES_DIR: &str = "messages";

/// One log line: `[RFC3339] from: text`.
fn format_line(message: &InboundMessage) -> String {
    format!(
        "[{}] {}: {}\n",
        message.received_at.to_rfc3339(),
        message.from,
        message.text
    )
}

/// Appends messages to `messages/<account>.log` under a root directory.
///
/// Writes happen on a background task, so `append` never waits on disk.
/// Must be created inside a Tokio runtime.
pub struct FileMessageLog {
    sender: mpsc::UnboundedSender<InboundMessage>,
}

impl FileMessageLog {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let dir = root.into().join(MESSAGES_DIR);
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(dir, receiver));
        Self { sender }
    }
}

async fn write_loop(dir: PathBuf, mut receiver: mpsc::UnboundedReceiver<InboundMessage>) {
    while let Some(message) = receiver.recv().await {
        if let Err(e) = write_message(&dir, &message).await {
            warn!(account = %message.account_id, error = %e, "Failed to save message");
        }
    }
}

async fn write_message(dir: &Path, message: &InboundMessage) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.log", message.account_id));
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format_line(message).as_bytes()).await?;
    file.flush().await
}

impl MessageSink for FileMessageLog {
    fn append(&self, message: InboundMessage) -> Result<(), SinkError> {
        self.sender.send(message).map_err(|_| SinkError::Closed)
    }
}

/// Keeps messages in memory.
#[derive(Debug, Default)]
pub struct MemoryMessageLog {
    messages: Mutex<Vec<InboundMessage>>,
}

impl MemoryMessageLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<InboundMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MessageSink for MemoryMessageLog {
    fn append(&self, message: InboundMessage) -> Result<(), SinkError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}
