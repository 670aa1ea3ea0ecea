use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::store::OutboxStore;

/// Default poll interval between publish cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically pushes unpublished outbox entries to the message bus.
///
/// Each cycle fetches the unpublished entries in `created_at` order and
/// sends them one by one, keyed by aggregate ID. An entry is marked
/// published only after the bus acknowledges it, so a crash between send
/// and mark re-sends the entry on the next cycle (at-least-once). A failed
/// send skips the remaining entries of the same aggregate for the rest of
/// the cycle, preserving intra-aggregate order, while entries of other
/// aggregates continue.
pub struct OutboxPublisher<S, B>
where
    S: OutboxStore,
    B: MessageBus,
{
    store: S,
    bus: B,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl<S, B> OutboxPublisher<S, B>
where
    S: OutboxStore,
    B: MessageBus,
{
    /// Creates a publisher with the default 1-second poll interval.
    pub fn new(store: S, bus: B) -> Self {
        Self::with_poll_interval(store, bus, DEFAULT_POLL_INTERVAL)
    }

    /// Creates a publisher with a custom poll interval.
    pub fn with_poll_interval(store: S, bus: B, poll_interval: Duration) -> Self {
        Self {
            store,
            bus,
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle that stops the run loop when triggered.
    pub fn stop_handle(&self) -> PublisherStopHandle {
        PublisherStopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Publishes all pending entries once. Returns the number of entries
    /// acknowledged this cycle.
    #[tracing::instrument(skip(self))]
    pub async fn publish_pending(&self) -> Result<usize> {
        let pending = self.store.fetch_unpublished().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut published = 0usize;
        let mut failed_aggregates: HashSet<Uuid> = HashSet::new();

        for entry in &pending {
            // A failed aggregate must not have later entries jump the queue.
            if failed_aggregates.contains(&entry.aggregate_id) {
                continue;
            }

            let envelope = EventEnvelope::for_entry(entry);
            match self
                .bus
                .publish(&entry.destination_topic, entry.aggregate_id, &envelope)
                .await
            {
                Ok(()) => {
                    self.store.mark_published(entry.id, Utc::now()).await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    published += 1;
                }
                Err(e) => {
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::warn!(
                        entry_id = %entry.id,
                        aggregate_id = %entry.aggregate_id,
                        topic = %entry.destination_topic,
                        error = %e,
                        "publish failed, entry stays pending for the next poll"
                    );
                    failed_aggregates.insert(entry.aggregate_id);
                }
            }
        }

        if published > 0 {
            tracing::debug!(published, pending = pending.len(), "publish cycle complete");
        }
        Ok(published)
    }

    /// Runs publish cycles on the configured interval until stopped.
    ///
    /// Cycle errors are logged and the loop continues; a dead bus shows up
    /// as unbounded backlog growth, not data loss.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(interval = ?self.poll_interval, "outbox publisher started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if let Err(e) = self.publish_pending().await {
                tracing::error!(error = %e, "outbox publish cycle failed");
            }
        }

        tracing::info!("outbox publisher stopped");
    }
}

/// Stops an [`OutboxPublisher`] run loop from another task.
#[derive(Clone)]
pub struct PublisherStopHandle {
    running: Arc<AtomicBool>,
}

impl PublisherStopHandle {
    /// Signals the run loop to exit after the current cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
