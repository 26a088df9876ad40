use crate::chat::{ChatId, ChatTransport, MessageId};
use crate::media::{MediaKind, MediaSource};
use crate::messaging::EventDetail;
use crate::services::correlation::CorrelationStore;
use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;

/// Sends notifications to the configured chat and records which event each one is about
pub struct Dispatcher {
    chat: Arc<dyn ChatTransport>,
    media: Arc<dyn MediaSource>,
    correlations: CorrelationStore,
    chat_id: ChatId,
}

impl Dispatcher {
    pub fn new(
        chat: Arc<dyn ChatTransport>,
        media: Arc<dyn MediaSource>,
        correlations: CorrelationStore,
        chat_id: ChatId,
    ) -> Self {
        Self {
            chat,
            media,
            correlations,
            chat_id,
        }
    }

    /// Send an informational text message; it is not registered for replies
    pub async fn send_text(&self, text: &str, reply_to: Option<MessageId>) -> Option<MessageId> {
        match self.chat.send_text(self.chat_id, text, reply_to).await {
            Ok(message_id) => Some(message_id),
            Err(e) => {
                error!("Failed to send message to chat {}: {}", self.chat_id, e);
                None
            }
        }
    }

    /// Announce a newly seen event, with its thumbnail when one could be fetched
    pub async fn notify_new_event(
        &self,
        detail: &EventDetail,
        thumbnail: Option<&[u8]>,
    ) -> Option<MessageId> {
        let sent = match thumbnail {
            Some(thumbnail) => {
                let caption = format!(
                    "New {} detected on camera {} (id: {}).",
                    detail.label, detail.camera, detail.id
                );
                self.chat
                    .send_photo(self.chat_id, thumbnail.to_vec(), Some(&caption), None)
                    .await
            }
            None => {
                let text = format!(
                    "New {} detected on camera {} (id: {}). Sorry I couldn't get a thumbnail :(",
                    detail.label, detail.camera, detail.id
                );
                self.chat.send_text(self.chat_id, &text, None).await
            }
        };

        self.register(sent, &detail.id, "new event notification")
            .await
    }

    /// Fetch and send the event's snapshot as a reply
    pub async fn send_snapshot(&self, event_id: &str, reply_to: MessageId) -> Option<MessageId> {
        self.deliver_media(event_id, MediaKind::Snapshot, reply_to)
            .await
    }

    /// Fetch and send the event's clip as a reply
    pub async fn send_clip(&self, event_id: &str, reply_to: MessageId) -> Option<MessageId> {
        self.deliver_media(event_id, MediaKind::Clip, reply_to).await
    }

    async fn deliver_media(
        &self,
        event_id: &str,
        kind: MediaKind,
        reply_to: MessageId,
    ) -> Option<MessageId> {
        let media = match self.media.fetch(event_id, kind).await {
            Ok(media) => media,
            Err(e) => {
                warn!("Error getting {} for id {}: {}", kind, event_id, e);
                self.send_text(
                    &format!("Sorry! Error occurred grabbing {} for id {}", kind, event_id),
                    Some(reply_to),
                )
                .await;
                return None;
            }
        };

        let sent = match kind {
            MediaKind::Clip => {
                self.chat
                    .send_video(self.chat_id, media, Some(reply_to))
                    .await
            }
            MediaKind::Snapshot | MediaKind::Thumbnail => {
                self.chat
                    .send_photo(self.chat_id, media, None, Some(reply_to))
                    .await
            }
        };

        self.register(sent, event_id, &kind.to_string()).await
    }

    /// Record the correlation for a successfully sent message
    async fn register(
        &self,
        sent: Result<MessageId>,
        event_id: &str,
        what: &str,
    ) -> Option<MessageId> {
        match sent {
            Ok(message_id) => {
                info!("Sent {} for id {} as message {}", what, event_id, message_id);
                self.correlations.remember(message_id, event_id).await;
                Some(message_id)
            }
            Err(e) => {
                error!("Failed to send {} for id {}: {}", what, event_id, e);
                None
            }
        }
    }
}
