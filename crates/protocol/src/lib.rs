//! Wire protocol for the tether client.
//!
//! Newline-terminated UTF-8 lines exchanged over a single TCP link:
//! inbound [`Command`]s from the server, outbound [`Outbound`] lines from
//! the client, and the [`Endpoint`] value the link is opened against.

pub mod command;
pub mod constants;
pub mod endpoint;
pub mod outbound;

pub use command::Command;
pub use endpoint::{Endpoint, EndpointError};
pub use outbound::Outbound;
