//! Conversation state and the per-message reply policy.

pub mod context;
pub mod presence;
pub mod responder;
pub mod store;

pub use context::{ContextWindows, Speaker};
pub use presence::{PresencePlan, PresenceSignal};
pub use responder::{HandleError, Outcome, Responder};
pub use store::Store;
