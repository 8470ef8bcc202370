//! # courier-core
//!
//! Shared vocabulary for the Courier relay:
//!
//! - **Identities**: [`UserId`] and [`ConnectionId`] newtypes so a user can
//!   never be passed where a connection is expected
//! - **Wire protocol**: inbound frame parsing ([`protocol::InboundMessage`])
//!   and outbound frame construction ([`protocol::OutboundFrame`])
//! - **Errors**: [`ProtocolError`] for frames that cannot be relayed
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` stack

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::ProtocolError;
pub use ids::{ConnectionId, UserId};
