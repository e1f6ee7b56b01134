//! Outbound client lines.

use std::fmt;

use crate::constants::{
    CLIENT_PREFIX, HEARTBEAT_MARKER, OK_PREFIX, PHOTO_DATA, PHOTO_NAME, PHOTO_SIZE, PHOTO_START,
    PONG_MARKER, STATUS_PREFIX,
};

/// A line sent from the client to the server.
///
/// `Display` renders the line without its terminating newline; the channel
/// appends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Identity line sent once after connecting.
    Identity(String),
    /// Client keep-alive.
    Heartbeat,
    Pong,
    Ok(String),
    Status(String),
    PhotoStart,
    PhotoName(String),
    PhotoSize(u64),
    /// Payload marker carrying a short description of the item.
    PhotoData(String),
}

impl Outbound {
    /// Builds the four-line framing for one uploaded item.
    pub fn item_frame(name: &str, size: u64, location: &str) -> [Outbound; 4] {
        [
            Outbound::PhotoStart,
            Outbound::PhotoName(name.to_string()),
            Outbound::PhotoSize(size),
            Outbound::PhotoData(format!("{size} bytes from {location}")),
        ]
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::Identity(id) => write!(f, "{CLIENT_PREFIX} {id}"),
            Outbound::Heartbeat => f.write_str(HEARTBEAT_MARKER),
            Outbound::Pong => f.write_str(PONG_MARKER),
            Outbound::Ok(msg) => write!(f, "{OK_PREFIX} {msg}"),
            Outbound::Status(state) => write!(f, "{STATUS_PREFIX} {state}"),
            Outbound::PhotoStart => f.write_str(PHOTO_START),
            Outbound::PhotoName(name) => write!(f, "{PHOTO_NAME} {name}"),
            Outbound::PhotoSize(size) => write!(f, "{PHOTO_SIZE} {size}"),
            Outbound::PhotoData(meta) => write!(f, "{PHOTO_DATA} {meta}"),
        }
    }
}
