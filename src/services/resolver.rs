use crate::chat::{ChatId, Command, IncomingMessage};
use crate::services::correlation::CorrelationStore;
use crate::services::dispatcher::Dispatcher;
use crate::services::tracker::{EventTracker, TrackedState};
use log::{debug, info, warn};
use std::sync::Arc;

/// How an incoming chat message was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Wrong chat, not a command, or a command we do not know
    Ignored,
    /// Reply to a message with no live correlation entry
    EventNotFound,
    /// No reply and nothing tracked yet
    NoEvents,
    /// Clip requested for an event that is still running
    NotEnded(String),
    Snapshot(String),
    Clip(String),
}

/// Turns `/snapshot` and `/clip` commands into media deliveries
pub struct CommandResolver {
    tracker: Arc<EventTracker>,
    correlations: CorrelationStore,
    dispatcher: Arc<Dispatcher>,
    authorized_chat: ChatId,
}

impl CommandResolver {
    pub fn new(
        tracker: Arc<EventTracker>,
        correlations: CorrelationStore,
        dispatcher: Arc<Dispatcher>,
        authorized_chat: ChatId,
    ) -> Self {
        Self {
            tracker,
            correlations,
            dispatcher,
            authorized_chat,
        }
    }

    pub async fn handle(&self, msg: &IncomingMessage) -> Resolution {
        info!(
            "Message [{} in {}]: {}",
            msg.from.as_deref().unwrap_or("unknown"),
            msg.chat_id,
            msg.text.as_deref().unwrap_or_default()
        );

        // Do not respond outside the configured chat
        if msg.chat_id != self.authorized_chat {
            warn!(
                "Wrong chat id {}, expecting {}",
                msg.chat_id, self.authorized_chat
            );
            return Resolution::Ignored;
        }

        let wants_clip = match msg.command() {
            Some(Command::Snapshot) => false,
            Some(Command::Clip) => true,
            Some(Command::Other(name)) => {
                debug!("Ignoring unknown command /{}", name);
                return Resolution::Ignored;
            }
            None => {
                debug!("Ignoring non-command message {}", msg.message_id);
                return Resolution::Ignored;
            }
        };

        let (event_id, state) = match msg.reply_to_message_id {
            Some(replied_to) => match self.correlations.resolve(replied_to).await {
                Some(event_id) => {
                    info!("Key {} detected for message {}", event_id, replied_to);
                    let state = self.tracker.state_of(&event_id).await;
                    (event_id, state)
                }
                None => {
                    self.dispatcher
                        .send_text("Sorry I couldn't find this event", Some(msg.message_id))
                        .await;
                    return Resolution::EventNotFound;
                }
            },
            None => match self.tracker.last_event().await {
                Some(last) => last,
                None => {
                    self.dispatcher
                        .send_text("No events yet!", Some(msg.message_id))
                        .await;
                    return Resolution::NoEvents;
                }
            },
        };

        if !wants_clip {
            self.dispatcher
                .send_snapshot(&event_id, msg.message_id)
                .await;
            return Resolution::Snapshot(event_id);
        }

        // Ids the tracker has never seen (old replies) skip the ended check
        if state == TrackedState::Active {
            self.dispatcher
                .send_text(
                    &format!("Event id {} not ended yet; no clip available", event_id),
                    Some(msg.message_id),
                )
                .await;
            return Resolution::NotEnded(event_id);
        }

        self.dispatcher.send_clip(&event_id, msg.message_id).await;
        Resolution::Clip(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::testing::{command, payload, reply, Harness, Sent, CHAT};
    use anyhow::Result;

    #[tokio::test]
    async fn snapshot_without_events_says_so() -> Result<()> {
        let h = Harness::new().await?;

        let resolution = h.resolver.handle(&command(10, "/snapshot")).await;

        assert_eq!(resolution, Resolution::NoEvents);
        assert_eq!(
            h.chat.sent()[0].1,
            Sent::Text {
                text: "No events yet!".to_string(),
                reply_to: Some(10),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn clip_for_running_event_is_refused_without_fetch() -> Result<()> {
        let h = Harness::new().await?;
        h.tracker.process(payload("new", "abc", "front", false, &[])).await;
        h.media.insert("abc", MediaKind::Clip, b"mp4");
        let before = h.media.requests().len();

        let resolution = h.resolver.handle(&command(20, "/clip")).await;

        assert_eq!(resolution, Resolution::NotEnded("abc".to_string()));
        assert_eq!(h.media.requests().len(), before);
        assert_eq!(
            h.chat.texts().last().map(String::as_str),
            Some("Event id abc not ended yet; no clip available")
        );
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_is_attempted_for_running_event() -> Result<()> {
        let h = Harness::new().await?;
        h.tracker.process(payload("new", "abc", "front", false, &[])).await;
        h.media.insert("abc", MediaKind::Snapshot, b"snap");

        let resolution = h.resolver.handle(&command(21, "/snapshot")).await;

        assert_eq!(resolution, Resolution::Snapshot("abc".to_string()));
        assert!(h
            .media
            .requests()
            .contains(&("abc".to_string(), MediaKind::Snapshot)));
        Ok(())
    }

    #[tokio::test]
    async fn reply_to_unknown_message_is_not_found() -> Result<()> {
        let h = Harness::new().await?;
        h.tracker.process(payload("new", "abc", "front", false, &[])).await;

        let resolution = h.resolver.handle(&reply(30, "/snapshot", 9999)).await;

        assert_eq!(resolution, Resolution::EventNotFound);
        assert_eq!(
            h.chat.texts().last().map(String::as_str),
            Some("Sorry I couldn't find this event")
        );
        Ok(())
    }

    #[tokio::test]
    async fn reply_uses_correlated_event_not_latest() -> Result<()> {
        let h = Harness::new().await?;
        h.tracker.process(payload("new", "old", "front", false, &[])).await;
        let notification = h.chat.sent()[0].0;
        h.tracker.process(payload("end", "old", "front", false, &[])).await;
        h.tracker.process(payload("new", "newer", "back", false, &[])).await;
        h.media.insert("old", MediaKind::Clip, b"mp4");

        let resolution = h.resolver.handle(&reply(31, "/clip", notification)).await;

        assert_eq!(resolution, Resolution::Clip("old".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn clip_for_event_absent_from_tracker_is_fetched() -> Result<()> {
        let h = Harness::new().await?;
        // Entry written by a previous process run
        h.correlations.remember(500, "from-yesterday").await;
        h.media.insert("from-yesterday", MediaKind::Clip, b"mp4");

        let resolution = h.resolver.handle(&reply(32, "/clip", 500)).await;

        assert_eq!(resolution, Resolution::Clip("from-yesterday".to_string()));
        assert_eq!(
            h.chat.sent().last().map(|(_, sent)| sent.clone()),
            Some(Sent::Video {
                bytes: b"mp4".to_vec(),
                reply_to: Some(32),
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn other_chats_and_plain_text_are_ignored_silently() -> Result<()> {
        let h = Harness::new().await?;

        let mut foreign = command(40, "/snapshot");
        foreign.chat_id = CHAT + 1;
        assert_eq!(h.resolver.handle(&foreign).await, Resolution::Ignored);
        assert_eq!(h.resolver.handle(&command(41, "hello")).await, Resolution::Ignored);
        assert_eq!(h.resolver.handle(&command(42, "/start")).await, Resolution::Ignored);

        assert!(h.chat.sent().is_empty());
        Ok(())
    }
}
