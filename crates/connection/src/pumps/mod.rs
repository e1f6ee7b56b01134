//! Per-link tasks: the read loop and the heartbeat.

pub(crate) mod heartbeat;
pub(crate) mod read;
