use crate::media::{MediaKind, MediaSource};
use crate::messaging::{EventDetail, EventPayload, EventType};
use crate::services::dispatcher::Dispatcher;
use crate::services::filter::{self, FilterVerdict};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle of an event id as seen by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedState {
    /// No accepted message has been seen for the id
    Unseen,
    Active,
    /// An `end` message has been seen; clips may be requested
    Ended,
}

/// Everything known about one tracked event
#[derive(Debug, Clone)]
pub struct Event {
    /// Type of the last message received for this id
    pub event_type: EventType,
    pub before: EventDetail,
    pub after: EventDetail,
    pub state: TrackedState,
    /// Last successfully fetched thumbnail
    pub thumbnail: Option<Vec<u8>>,
}

impl Event {
    fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            before: EventDetail::default(),
            after: EventDetail::default(),
            state: TrackedState::Active,
            thumbnail: None,
        }
    }

    /// Record a message for this id; `end` is terminal
    fn apply(&mut self, payload: &EventPayload) {
        self.event_type = payload.event_type;
        self.before = payload.before.clone();
        self.after = payload.after.clone();

        if payload.event_type == EventType::End {
            self.state = TrackedState::Ended;
        }
    }

    pub fn ended(&self) -> bool {
        self.state == TrackedState::Ended
    }
}

/// What happened to an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Dropped by the noise filter; no state was touched
    Filtered(FilterVerdict),
    /// Payload without an event id
    Ignored,
    Tracked {
        event_id: String,
        first_sighting: bool,
        state: TrackedState,
    },
}

#[derive(Default)]
struct TrackerState {
    events: HashMap<String, Event>,
    last_event: Option<String>,
}

/// In-memory table of events plus the most recent event id
///
/// The lock is only held while reading or mutating the table, never across
/// media fetches or chat sends.
pub struct EventTracker {
    state: Mutex<TrackerState>,
    zone_thresholds: HashMap<String, usize>,
    media: Arc<dyn MediaSource>,
    dispatcher: Arc<Dispatcher>,
}

impl EventTracker {
    pub fn new(
        zone_thresholds: HashMap<String, usize>,
        media: Arc<dyn MediaSource>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            zone_thresholds,
            media,
            dispatcher,
        }
    }

    /// Filter, record and, on first sight, announce an event message
    pub async fn process(&self, payload: EventPayload) -> ProcessOutcome {
        let detail = &payload.after;

        match filter::evaluate(detail, &self.zone_thresholds) {
            FilterVerdict::Accept => {}
            verdict @ FilterVerdict::Stationary => {
                info!(
                    "Stationary object {} detected on {}",
                    detail.label, detail.camera
                );
                return ProcessOutcome::Filtered(verdict);
            }
            verdict @ FilterVerdict::TooFewZones { .. } => {
                info!(
                    "Object {} detected on {} but only entered zones {:?}",
                    detail.label, detail.camera, detail.entered_zones
                );
                return ProcessOutcome::Filtered(verdict);
            }
        }

        if detail.id.is_empty() {
            warn!(
                "Ignoring {} event from {} without an id",
                payload.event_type, detail.camera
            );
            return ProcessOutcome::Ignored;
        }

        info!(
            "{} detected on {} (id: {}, type: {})",
            detail.label, detail.camera, detail.id, payload.event_type
        );

        let event_id = detail.id.clone();
        let (first_sighting, state) = self.record(&payload).await;

        if first_sighting {
            let thumbnail = match self.media.fetch(&event_id, MediaKind::Thumbnail).await {
                Ok(thumbnail) => Some(thumbnail),
                Err(e) => {
                    warn!("Error getting thumbnail for id {}: {}", event_id, e);
                    None
                }
            };

            self.dispatcher
                .notify_new_event(&payload.after, thumbnail.as_deref())
                .await;

            if let Some(thumbnail) = thumbnail {
                self.store_initial_thumbnail(&event_id, thumbnail).await;
            }
        } else if payload.event_type == EventType::Update && state == TrackedState::Active {
            match self.media.fetch(&event_id, MediaKind::Thumbnail).await {
                Ok(thumbnail) => self.store_thumbnail(&event_id, thumbnail).await,
                Err(e) => debug!("Keeping previous thumbnail for id {}: {}", event_id, e),
            }
        } else if payload.event_type == EventType::End {
            info!("Event id {} ended; clip now available", event_id);
        }

        ProcessOutcome::Tracked {
            event_id,
            first_sighting,
            state,
        }
    }

    /// Apply the message to the table, returning whether the id was new
    async fn record(&self, payload: &EventPayload) -> (bool, TrackedState) {
        let mut state = self.state.lock().await;
        let id = payload.after.id.clone();

        state.last_event = Some(id.clone());

        let first_sighting = !state.events.contains_key(&id);
        let event = state
            .events
            .entry(id)
            .or_insert_with(|| Event::new(payload.event_type));
        event.apply(payload);

        (first_sighting, event.state)
    }

    async fn store_thumbnail(&self, event_id: &str, thumbnail: Vec<u8>) {
        if let Some(event) = self.state.lock().await.events.get_mut(event_id) {
            event.thumbnail = Some(thumbnail);
        }
    }

    /// Like `store_thumbnail`, but leaves a refresh stored meanwhile in place
    async fn store_initial_thumbnail(&self, event_id: &str, thumbnail: Vec<u8>) {
        if let Some(event) = self.state.lock().await.events.get_mut(event_id) {
            if event.thumbnail.is_none() {
                event.thumbnail = Some(thumbnail);
            }
        }
    }

    /// Lifecycle state of an event id
    pub async fn state_of(&self, event_id: &str) -> TrackedState {
        self.state
            .lock()
            .await
            .events
            .get(event_id)
            .map(|event| event.state)
            .unwrap_or(TrackedState::Unseen)
    }

    /// The most recently accepted event id and its state
    pub async fn last_event(&self) -> Option<(String, TrackedState)> {
        let state = self.state.lock().await;
        let id = state.last_event.as_ref()?;
        let event = state.events.get(id)?;
        Some((id.clone(), event.state))
    }

    /// Copy of a tracked event
    pub async fn event(&self, event_id: &str) -> Option<Event> {
        self.state.lock().await.events.get(event_id).cloned()
    }
}
