//! Event media (thumbnails, snapshots, clips) served by the NVR.

use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub mod frigate;

pub use frigate::FrigateClient;

/// Media kinds available for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Thumbnail,
    Snapshot,
    Clip,
}

impl MediaKind {
    /// File name of the media under the event's API path
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail.jpg",
            Self::Snapshot => "snapshot.jpg",
            Self::Clip => "clip.mp4",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thumbnail => write!(f, "thumbnail"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::Clip => write!(f, "clip"),
        }
    }
}

/// Why a piece of media could not be obtained
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("received non 200 response code: {0}")]
    Status(u16),
}

/// Fetches event media by event id
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, event_id: &str, kind: MediaKind) -> Result<Vec<u8>, MediaError>;
}
