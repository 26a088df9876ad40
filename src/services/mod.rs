pub mod bridge;
pub mod cleanup;
pub mod correlation;
pub mod dispatcher;
pub mod filter;
pub mod resolver;
pub mod tracker;


pub use bridge::Bridge;
pub use cleanup::CorrelationCleanupService;
pub use correlation::CorrelationStore;
pub use dispatcher::Dispatcher;
pub use resolver::{CommandResolver, Resolution};
pub use tracker::{EventTracker, ProcessOutcome, TrackedState};
