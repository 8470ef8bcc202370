//! Relay: the tagged events sessions emit and the dispatcher that acts on them.

pub mod dispatcher;
pub mod event;
pub mod outbound;

pub use dispatcher::{DispatchOutcome, Dispatcher, DropReason};
pub use event::{MessageEnvelope, RelayEvent};
pub use outbound::Outbound;
