//! Inbound command handling.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use tether_channel::ChannelWriter;
use tether_protocol::{Command, Outbound};
use tether_uploader::Uploader;

use crate::types::ConnectionState;

/// Maps inbound lines to replies and uploader side effects.
pub struct CommandDispatcher {
    uploader: Arc<Uploader>,
    state: watch::Receiver<ConnectionState>,
}

impl CommandDispatcher {
    pub fn new(uploader: Arc<Uploader>, state: watch::Receiver<ConnectionState>) -> Self {
        Self { uploader, state }
    }

    /// Handles one inbound line and writes the reply, if any, to `writer`.
    ///
    /// Reply failures are logged and otherwise ignored; the read loop is the
    /// one that notices a dead link.
    pub async fn dispatch(&self, line: &str, writer: &ChannelWriter) {
        let Some(reply) = self.handle(Command::parse(line)).await else {
            return;
        };
        if let Err(e) = writer.send(&reply).await {
            warn!(channel = writer.id(), reply = %reply, "failed to send reply: {e}");
        }
    }

    /// Applies the side effect of `command` and returns its reply.
    pub async fn handle(&self, command: Command) -> Option<Outbound> {
        match command {
            Command::Ping => Some(Outbound::Pong),
            Command::Stop => {
                self.uploader.stop().await;
                Some(Outbound::Ok("upload stopped".into()))
            }
            Command::Restart => {
                self.uploader.restart().await;
                Some(Outbound::Ok("upload started".into()))
            }
            Command::Status => {
                let state = *self.state.borrow();
                Some(Outbound::Status(state.to_string()))
            }
            Command::ClearCache => {
                self.uploader.clear_cache().await;
                Some(Outbound::Ok("upload cache cleared".into()))
            }
            Command::Count => {
                let n = self.uploader.uploaded_count().await;
                debug!(uploaded = n, "count requested");
                Some(Outbound::Ok(format!("{n} item(s) uploaded")))
            }
            Command::Unknown(line) => {
                trace!(line = %line, "ignoring unknown command");
                None
            }
        }
    }
}
