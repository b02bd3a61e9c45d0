//! Background reminder scheduler.
//!
//! A single loop scans the store on a fixed interval for events whose
//! reminder window `[reminder_time, event_time)` has opened, pushes each
//! through the injected sink, and marks it notified exactly once. The
//! loop is independent of client connections; with zero sessions the
//! broadcast is simply a no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use calshare_shared::{protocol, Envelope, Event};

use crate::registry::SessionRegistry;
use crate::state::SharedDb;

/// Where due reminders are delivered. Injected so the scheduler can be
/// exercised with a fake sink in tests.
#[async_trait]
pub trait ReminderSink: Send + Sync {
    async fn deliver(&self, event: &Event);
}

/// Production sink: wraps the event in a `reminder` message with a
/// human-readable line and broadcasts it to every live session.
pub struct BroadcastReminderSink {
    registry: Arc<SessionRegistry>,
}

impl BroadcastReminderSink {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ReminderSink for BroadcastReminderSink {
    async fn deliver(&self, event: &Event) {
        let minutes = event.minutes_until_start(Utc::now());
        let Ok(mut data) = serde_json::to_value(event) else {
            return;
        };
        if let Some(obj) = data.as_object_mut() {
            obj.insert(
                "message".to_string(),
                json!(format!(
                    "Reminder: {} starts in {} minutes",
                    event.title, minutes
                )),
            );
        }
        self.registry
            .broadcast(&Envelope::new(protocol::REMINDER, data))
            .await;
    }
}

/// The periodic scan loop.
pub struct ReminderScheduler {
    db: SharedDb,
    sink: Arc<dyn ReminderSink>,
    interval: Duration,
}

impl ReminderScheduler {
    pub fn new(db: SharedDb, sink: Arc<dyn ReminderSink>, interval: Duration) -> Self {
        Self { db, sink, interval }
    }

    /// Run until `shutdown` is cancelled. The current tick always
    /// completes before the loop exits.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "reminder scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.cancelled() => {
                    info!("reminder scheduler stopped");
                    return;
                }
            }
        }
    }

    /// One scan: deliver every due reminder, then persist the flip so it
    /// never fires again.
    pub(crate) async fn tick(&self) {
        let candidates = { self.db.lock().get_events_needing_reminder() };
        let candidates = match candidates {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "reminder scan failed");
                return;
            }
        };

        let now = Utc::now();
        for event in candidates.into_iter().filter(|e| e.needs_reminder(now)) {
            self.sink.deliver(&event).await;

            let marked = { self.db.lock().mark_reminder_sent(event.id) };
            match marked {
                Ok(_) => info!(event_id = event.id, title = %event.title, "reminder sent"),
                Err(e) => {
                    error!(error = %e, event_id = event.id, "failed to mark reminder sent");
                }
            }
        }
    }
}
