//! In-process doubles for the chat, media and storage collaborators.

use crate::chat::{ChatId, ChatTransport, IncomingMessage, MessageId};
use crate::db::repositories::CorrelationsRepository;
use crate::db::{Clock, DatabaseService, KvStore};
use crate::error::Error;
use crate::media::{MediaError, MediaKind, MediaSource};
use crate::messaging::EventPayload;
use crate::services::bridge::Bridge;
use crate::services::correlation::CorrelationStore;
use crate::services::dispatcher::Dispatcher;
use crate::services::resolver::CommandResolver;
use crate::services::tracker::EventTracker;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CHAT: ChatId = -100_200_300;

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Store whose every operation fails
pub struct FailingKv;

#[async_trait]
impl KvStore for FailingKv {
    async fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(Error::Database("disk on fire".to_string()).into())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::Database("disk on fire".to_string()).into())
    }

    async fn purge_expired(&self) -> Result<u64> {
        Err(Error::Database("disk on fire".to_string()).into())
    }
}

/// Something delivered to the chat
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        text: String,
        reply_to: Option<MessageId>,
    },
    Photo {
        caption: Option<String>,
        bytes: Vec<u8>,
        reply_to: Option<MessageId>,
    },
    Video {
        bytes: Vec<u8>,
        reply_to: Option<MessageId>,
    },
}

#[derive(Default)]
struct ChatLog {
    next_id: MessageId,
    sent: Vec<(MessageId, Sent)>,
    incoming: VecDeque<Vec<IncomingMessage>>,
    fail_sends: bool,
}

/// Chat that records outbound messages and replays queued inbound batches
#[derive(Default)]
pub struct RecordingChat {
    log: Mutex<ChatLog>,
}

impl RecordingChat {
    pub fn sent(&self) -> Vec<(MessageId, Sent)> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, sent)| match sent {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.log.lock().unwrap().fail_sends = fail;
    }

    pub fn push_incoming(&self, batch: Vec<IncomingMessage>) {
        self.log.lock().unwrap().incoming.push_back(batch);
    }

    fn record(&self, chat_id: ChatId, sent: Sent) -> Result<MessageId> {
        let mut log = self.log.lock().unwrap();
        if log.fail_sends {
            return Err(Error::Chat("chat unreachable".to_string()).into());
        }
        assert_eq!(chat_id, CHAT, "message sent to the wrong chat");

        log.next_id += 1;
        let id = 1000 + log.next_id;
        log.sent.push((id, sent));
        Ok(id)
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        self.record(
            chat_id,
            Sent::Text {
                text: text.to_string(),
                reply_to,
            },
        )
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: Vec<u8>,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        self.record(
            chat_id,
            Sent::Photo {
                caption: caption.map(str::to_string),
                bytes: photo,
                reply_to,
            },
        )
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        video: Vec<u8>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        self.record(
            chat_id,
            Sent::Video {
                bytes: video,
                reply_to,
            },
        )
    }

    async fn next_updates(&self) -> Result<Vec<IncomingMessage>> {
        match self.log.lock().unwrap().incoming.pop_front() {
            Some(batch) => Ok(batch),
            None => Err(Error::Chat("no updates queued".to_string()).into()),
        }
    }
}

/// Media source serving whatever the test inserted; everything else is a 404
#[derive(Default)]
pub struct ScriptedMedia {
    files: Mutex<HashMap<(String, MediaKind), Vec<u8>>>,
    requests: Mutex<Vec<(String, MediaKind)>>,
}

impl ScriptedMedia {
    pub fn insert(&self, event_id: &str, kind: MediaKind, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert((event_id.to_string(), kind), bytes.to_vec());
    }

    pub fn remove(&self, event_id: &str, kind: MediaKind) {
        self.files
            .lock()
            .unwrap()
            .remove(&(event_id.to_string(), kind));
    }

    pub fn requests(&self) -> Vec<(String, MediaKind)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSource for ScriptedMedia {
    async fn fetch(&self, event_id: &str, kind: MediaKind) -> Result<Vec<u8>, MediaError> {
        self.requests
            .lock()
            .unwrap()
            .push((event_id.to_string(), kind));
        self.files
            .lock()
            .unwrap()
            .get(&(event_id.to_string(), kind))
            .cloned()
            .ok_or(MediaError::Status(404))
    }
}

/// Fully wired services over in-memory doubles
pub struct Harness {
    pub chat: Arc<RecordingChat>,
    pub media: Arc<ScriptedMedia>,
    pub clock: Arc<ManualClock>,
    pub correlations: CorrelationStore,
    pub dispatcher: Arc<Dispatcher>,
    pub tracker: Arc<EventTracker>,
    pub resolver: Arc<CommandResolver>,
    pub bridge: Arc<Bridge>,
    _db: DatabaseService,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        Self::with_thresholds(HashMap::new()).await
    }

    pub async fn with_thresholds(zone_thresholds: HashMap<String, usize>) -> Result<Self> {
        let db = DatabaseService::in_memory().await?;
        let clock = Arc::new(ManualClock::default());
        let kv = Arc::new(CorrelationsRepository::with_clock(
            db.pool.clone(),
            clock.clone(),
        ));

        let chat = Arc::new(RecordingChat::default());
        let media = Arc::new(ScriptedMedia::default());
        let correlations = CorrelationStore::new(kv);
        let dispatcher = Arc::new(Dispatcher::new(
            chat.clone(),
            media.clone(),
            correlations.clone(),
            CHAT,
        ));
        let tracker = Arc::new(EventTracker::new(
            zone_thresholds,
            media.clone(),
            dispatcher.clone(),
        ));
        let resolver = Arc::new(CommandResolver::new(
            tracker.clone(),
            correlations.clone(),
            dispatcher.clone(),
            CHAT,
        ));
        let bridge = Arc::new(Bridge::from_parts(tracker.clone(), resolver.clone()));

        Ok(Self {
            chat,
            media,
            clock,
            correlations,
            dispatcher,
            tracker,
            resolver,
            bridge,
            _db: db,
        })
    }
}

/// Event payload with a `person` label and the same zones entered and current
pub fn payload(
    event_type: &str,
    id: &str,
    camera: &str,
    stationary: bool,
    zones: &[&str],
) -> EventPayload {
    let detail = serde_json::json!({
        "id": id,
        "camera": camera,
        "label": "person",
        "stationary": stationary,
        "entered_zones": zones,
        "current_zones": zones,
        "has_snapshot": true,
        "has_clip": true,
    });
    let raw = serde_json::json!({
        "type": event_type,
        "before": detail,
        "after": detail,
    });
    EventPayload::from_slice(&serde_json::to_vec(&raw).unwrap()).unwrap()
}

/// Command typed into the authorized chat
pub fn command(message_id: MessageId, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: CHAT,
        message_id,
        from: Some("tester".to_string()),
        text: Some(text.to_string()),
        reply_to_message_id: None,
    }
}

/// Command sent as a reply to an earlier message
pub fn reply(message_id: MessageId, text: &str, replied_to: MessageId) -> IncomingMessage {
    IncomingMessage {
        reply_to_message_id: Some(replied_to),
        ..command(message_id, text)
    }
}
