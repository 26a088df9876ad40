use crate::chat::{ChatId, ChatTransport, IncomingMessage};
use crate::db::KvStore;
use crate::error::Error;
use crate::media::MediaSource;
use crate::messaging::event::{topic_category, TopicCategory};
use crate::messaging::{EventPayload, TopicMessage};
use crate::services::correlation::CorrelationStore;
use crate::services::dispatcher::Dispatcher;
use crate::services::resolver::{CommandResolver, Resolution};
use crate::services::tracker::{EventTracker, ProcessOutcome};
use anyhow::Result;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Wires the NVR event feed and the chat together
pub struct Bridge {
    tracker: Arc<EventTracker>,
    resolver: Arc<CommandResolver>,
}

impl Bridge {
    pub fn new(
        chat: Arc<dyn ChatTransport>,
        media: Arc<dyn MediaSource>,
        kv: Arc<dyn KvStore>,
        authorized_chat: ChatId,
        zone_thresholds: HashMap<String, usize>,
    ) -> Self {
        let correlations = CorrelationStore::new(kv);
        let dispatcher = Arc::new(Dispatcher::new(
            chat,
            media.clone(),
            correlations.clone(),
            authorized_chat,
        ));
        let tracker = Arc::new(EventTracker::new(
            zone_thresholds,
            media,
            dispatcher.clone(),
        ));
        let resolver = Arc::new(CommandResolver::new(
            tracker.clone(),
            correlations,
            dispatcher,
            authorized_chat,
        ));

        Self::from_parts(tracker, resolver)
    }

    pub fn from_parts(tracker: Arc<EventTracker>, resolver: Arc<CommandResolver>) -> Self {
        Self { tracker, resolver }
    }

    pub fn tracker(&self) -> &Arc<EventTracker> {
        &self.tracker
    }

    /// Route one published message; only `frigate/events` is acted on
    pub async fn handle_published(&self, topic: &str, payload: &[u8]) -> Option<ProcessOutcome> {
        match topic_category(topic) {
            Some(TopicCategory::Events) => {}
            Some(TopicCategory::Stats) => return None,
            Some(TopicCategory::Other(_)) | None => {
                debug!("Received from topic {} message; skipped", topic);
                return None;
            }
        }

        match EventPayload::from_slice(payload) {
            Ok(event) => Some(self.tracker.process(event).await),
            Err(e) => {
                error!("error reading event: {}", e);
                None
            }
        }
    }

    pub async fn handle_incoming(&self, msg: &IncomingMessage) -> Resolution {
        self.resolver.handle(msg).await
    }

    /// Consume published messages; a closed subscription is an error since
    /// the process has no event feed without it
    pub async fn run_event_listener(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<TopicMessage>,
    ) -> Result<()> {
        info!("Event listener started");

        while let Some(message) = rx.recv().await {
            self.handle_published(&message.topic, &message.payload)
                .await;
        }

        warn!("Event subscription closed");
        Err(Error::Service("Event subscription closed".to_string()).into())
    }

    /// Poll the chat forever, retrying after failures
    pub async fn run_chat_listener(
        self: Arc<Self>,
        chat: Arc<dyn ChatTransport>,
        retry_delay: Duration,
    ) {
        info!("Chat listener started");

        loop {
            match chat.next_updates().await {
                Ok(messages) => {
                    for msg in &messages {
                        self.handle_incoming(msg).await;
                    }
                }
                Err(e) => {
                    error!("Error receiving chat updates: {}", e);
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
}
