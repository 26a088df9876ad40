pub mod broker;
pub mod event;

pub use broker::{EventSource, MessageBroker, TopicMessage};
pub use event::{EventDetail, EventPayload, EventType};
