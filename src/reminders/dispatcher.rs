use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, error, info, warn};

use crate::gateway::MessagingGateway;
use crate::reminders::model::Reminder;
use crate::reminders::store::ReminderStore;

/// One dispatch invocation: scan for due reminders, claim each with a
/// status CAS, deliver through the gateway, resolve the outcome.
///
/// Safe to run from overlapping ticks or multiple instances at once; the
/// claim is the only coordination between them.
pub struct Dispatcher {
    store: Arc<dyn ReminderStore>,
    gateway: Arc<dyn MessagingGateway>,
    max_retry: i32,
    batch_size: i64,
    stale_sending: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub released: u64,
    pub claimed: u32,
    pub sent: u32,
    pub retried: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        gateway: Arc<dyn MessagingGateway>,
        max_retry: i32,
        batch_size: i64,
        stale_sending_secs: i64,
    ) -> Self {
        Self {
            store,
            gateway,
            max_retry,
            batch_size,
            stale_sending: Duration::seconds(stale_sending_secs),
        }
    }

    pub async fn run_once(&self) -> anyhow::Result<DispatchStats> {
        let now = Utc::now();
        let mut stats = DispatchStats::default();

        stats.released = self
            .store
            .release_stale_sending(now - self.stale_sending, now)
            .await?;
        if stats.released > 0 {
            warn!("released {} reminders stuck in sending", stats.released);
        }

        let due = self.store.due_batch(now, self.batch_size).await?;
        for reminder in due {
            // One reminder's trouble must not sink the rest of the batch.
            if let Err(err) = self.process_one(&reminder, &mut stats).await {
                error!("reminder {}: dispatch error: {err:#}", reminder.id);
            }
        }

        Ok(stats)
    }

    async fn process_one(
        &self,
        reminder: &Reminder,
        stats: &mut DispatchStats,
    ) -> anyhow::Result<()> {
        if !self.store.claim(&reminder.id, Utc::now()).await? {
            // Another invocation claimed it, or it was cancelled in between.
            debug!("reminder {}: lost claim, skipping", reminder.id);
            stats.skipped += 1;
            return Ok(());
        }
        stats.claimed += 1;

        let text = format!("⏰ Reminder: {}", reminder.message);
        match self.gateway.send_push(&reminder.chat_id, &text).await {
            Ok(()) => {
                self.store.mark_sent(&reminder.id, Utc::now()).await?;
                stats.sent += 1;
                info!("reminder {} sent", reminder.id);
            }
            Err(err) => {
                let attempts = reminder.attempts + 1;
                let diagnostic = format!("{err:#}");
                if attempts >= self.max_retry {
                    self.store
                        .mark_failed(&reminder.id, attempts, &diagnostic, Utc::now())
                        .await?;
                    stats.failed += 1;
                    error!(
                        "reminder {} failed permanently after {} attempts: {}",
                        reminder.id, attempts, diagnostic
                    );
                } else {
                    self.store
                        .mark_retry(&reminder.id, attempts, &diagnostic, Utc::now())
                        .await?;
                    stats.retried += 1;
                    warn!(
                        "reminder {} failed (attempt {}/{}), will retry: {}",
                        reminder.id, attempts, self.max_retry, diagnostic
                    );
                }
            }
        }

        Ok(())
    }
}
