use crate::chat::MessageId;
use crate::db::KvStore;
use log::{error, warn};
use std::sync::Arc;
use std::time::Duration;

/// How long a sent notification can be replied to
pub const RETENTION: Duration = Duration::from_secs(60 * 60 * 24 * 10);

/// Remembers which event each outbound chat message was about
#[derive(Clone)]
pub struct CorrelationStore {
    kv: Arc<dyn KvStore>,
}

impl CorrelationStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Record `message_id -> event_id`; failures are logged and otherwise ignored
    pub async fn remember(&self, message_id: MessageId, event_id: &str) {
        if let Err(e) = self
            .kv
            .put(&message_id.to_string(), event_id, RETENTION)
            .await
        {
            error!("Error saving message id {} into db: {}", message_id, e);
        }
    }

    /// Look up the event a message was about; missing, expired and unreadable all map to `None`
    pub async fn resolve(&self, message_id: MessageId) -> Option<String> {
        match self.kv.get(&message_id.to_string()).await {
            Ok(event_id) => event_id,
            Err(e) => {
                warn!("Error grabbing key from response id {}: {}", message_id, e);
                None
            }
        }
    }
}
