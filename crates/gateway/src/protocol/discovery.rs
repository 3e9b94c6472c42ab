//! Discovery stream: one `schema` event, then a `ping` every heartbeat period.
//!
//! The heartbeat is owned by the stream through a [`HeartbeatGuard`]; when the peer goes away
//! axum drops the stream, the guard is released and no further pings are produced.

use super::AppState;
use crate::registry::ServerDescriptor;
use axum::Extension;
use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use chrono::Utc;
use futures::{Stream, StreamExt as _, stream};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Schema(Value),
    Ping,
}

impl DiscoveryEvent {
    fn into_sse(self) -> Event {
        match self {
            Self::Schema(payload) => Event::default().event("schema").data(payload.to_string()),
            Self::Ping => Event::default().event("ping").data("{}"),
        }
    }
}

/// Per-process discovery counters.
#[derive(Debug, Default)]
pub struct DiscoveryStats {
    open: AtomicUsize,
    pings: AtomicU64,
}

impl DiscoveryStats {
    /// Streams whose heartbeat is still held.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Pings produced since startup, across all streams.
    #[must_use]
    pub fn pings_sent(&self) -> u64 {
        self.pings.load(Ordering::SeqCst)
    }
}

/// Heartbeat registration of one open stream.
#[derive(Debug)]
pub struct HeartbeatGuard {
    stats: Arc<DiscoveryStats>,
}

impl HeartbeatGuard {
    fn acquire(stats: Arc<DiscoveryStats>) -> Self {
        let open = stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(open, "discovery stream opened");
        Self { stats }
    }

    fn record_ping(&self) {
        self.stats.pings.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        let open = self.stats.open.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(open, "discovery stream closed");
    }
}

/// Events of one discovery connection. The stream never ends on its own.
pub fn discovery_events(
    server: &ServerDescriptor,
    period: Duration,
    stats: Arc<DiscoveryStats>,
) -> impl Stream<Item = DiscoveryEvent> + Send + 'static + use<> {
    let schema = DiscoveryEvent::Schema(server.schema_payload(Utc::now()));
    let guard = HeartbeatGuard::acquire(stats);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let pings = stream::unfold((interval, guard), |(mut interval, guard)| async move {
        interval.tick().await;
        guard.record_ping();
        Some((DiscoveryEvent::Ping, (interval, guard)))
    });
    stream::once(async move { schema }).chain(pings)
}

pub(crate) async fn sse(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let events = discovery_events(&state.server, state.heartbeat, Arc::clone(&state.stats))
        .take_until(state.shutdown.clone().cancelled_owned())
        .map(|event| Ok::<_, Infallible>(event.into_sse()));
    (
        [(CACHE_CONTROL, "no-cache"), (CONNECTION, "keep-alive")],
        Sse::new(events),
    )
}
