//! Local connectivity watcher.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time between connectivity probes.
pub const NETWORK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Reports whether the host currently has a usable network.
pub trait ConnectivityProbe: Send + Sync + 'static {
    fn is_online(&self) -> bool;
}

/// Online when any interface has a non-loopback, non link-local address.
#[derive(Debug, Default, Clone, Copy)]
pub struct InterfaceProbe;

impl ConnectivityProbe for InterfaceProbe {
    fn is_online(&self) -> bool {
        usable_addrs().next().is_some()
    }
}

fn usable_addrs() -> impl Iterator<Item = IpAddr> {
    if_addrs::get_if_addrs()
        .unwrap_or_default()
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.addr.ip())
        .filter(|ip| match ip {
            // Skip link-local (169.254.x.x, fe80::/10).
            IpAddr::V4(v4) => !v4.is_link_local(),
            IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
        })
}

/// Polls `probe` every `period` and calls `on_regained` on each
/// offline-to-online transition. Runs until `cancel` fires.
pub(crate) async fn watch_network<F>(
    probe: Arc<dyn ConnectivityProbe>,
    period: Duration,
    cancel: CancellationToken,
    on_regained: F,
) where
    F: Fn() + Send + Sync + 'static,
{
    let mut online = probe.is_online();
    debug!(online, "network watcher started");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let now = probe.is_online();
                if now != online {
                    if now {
                        info!("network connectivity regained");
                        on_regained();
                    } else {
                        warn!("network connectivity lost");
                    }
                    online = now;
                }
            }
        }
    }
}
