//! In-memory notifier for tests and local runs without delivery channels

use super::{Channel, Message, NotificationError, NotificationKind, NotificationResult, Notifier};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

/// Keeps every delivered message instead of sending it
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<Message>>,
    failing: Option<Channel>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose `channel` always fails with a transport error
    pub fn failing_on(channel: Channel) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failing: Some(channel),
        }
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    pub async fn messages_of(&self, kind: NotificationKind) -> Vec<Message> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|message| message.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, message: &Message) -> NotificationResult<()> {
        if self.failing == Some(message.channel) {
            return Err(NotificationError::Transport("connection refused".to_string()));
        }

        info!(
            order_number = %message.order_number,
            channel = %message.channel,
            "Recorded {:?} notification",
            message.kind
        );
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}
