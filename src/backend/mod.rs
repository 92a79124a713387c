//! Message-driven bridge between a presentation layer and the queue

pub mod actor;
pub mod messages;

pub use actor::BackendActor;
pub use messages::{BackendCommand, BackendEvent};
