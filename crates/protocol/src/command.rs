//! Inbound server commands.

use crate::constants::{HEARTBEAT_MARKER, PING_MARKER};

/// A command received from the server, one per line.
///
/// Unknown lines are not a protocol error: they parse to
/// [`Command::Unknown`] and are ignored by the dispatcher so newer servers
/// can talk to older clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `[PING]…` or `[HEARTBEAT]…` (prefix match).
    Ping,
    /// `stop`: stop the uploader.
    Stop,
    /// `restart`: (re)start the uploader.
    Restart,
    /// `status`: report the connection state.
    Status,
    /// `clear`: forget which items were already uploaded.
    ClearCache,
    /// `count`: report how many items were uploaded.
    Count,
    Unknown(String),
}

impl Command {
    /// Parses a single inbound line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.starts_with(PING_MARKER) || line.starts_with(HEARTBEAT_MARKER) {
            return Command::Ping;
        }
        match line {
            "stop" => Command::Stop,
            "restart" => Command::Restart,
            "status" => Command::Status,
            "clear" => Command::ClearCache,
            "count" => Command::Count,
            other => Command::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_and_heartbeat_are_prefix_matches() {
        assert_eq!(Command::parse("[PING]"), Command::Ping);
        assert_eq!(Command::parse("[PING] 1718000000"), Command::Ping);
        assert_eq!(Command::parse("[HEARTBEAT]"), Command::Ping);
        assert_eq!(Command::parse("[HEARTBEAT]server-7"), Command::Ping);
    }

    #[test]
    fn literal_commands() {
        assert_eq!(Command::parse("stop"), Command::Stop);
        assert_eq!(Command::parse("restart"), Command::Restart);
        assert_eq!(Command::parse("status"), Command::Status);
        assert_eq!(Command::parse("clear"), Command::ClearCache);
        assert_eq!(Command::parse("count"), Command::Count);
    }

    #[test]
    fn tolerates_crlf() {
        assert_eq!(Command::parse("status\r"), Command::Status);
        assert_eq!(Command::parse("  stop \r\n"), Command::Stop);
    }

    #[test]
    fn literals_are_exact() {
        assert_eq!(
            Command::parse("STATUS"),
            Command::Unknown("STATUS".into())
        );
        assert_eq!(
            Command::parse("stop now"),
            Command::Unknown("stop now".into())
        );
        assert_eq!(Command::parse("ping"), Command::Unknown("ping".into()));
        assert_eq!(Command::parse(""), Command::Unknown(String::new()));
    }
}
