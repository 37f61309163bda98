use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::reminders::model::Reminder;

/// The relational boundary the reminder engine runs against.
///
/// The only concurrency-control primitive in the system is the conditional
/// update: `claim` and `cancel_active` must be single atomic writes guarded
/// by the current status, reporting whether a row was affected. Zero affected
/// rows means "lost the race", never an error.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn insert(&self, reminder: &Reminder) -> anyhow::Result<()>;

    async fn get(&self, id: &str) -> anyhow::Result<Option<Reminder>>;

    /// Reminders for (owner, chat) with status in {scheduled, sending},
    /// ascending by `remind_at_utc`.
    async fn list_active(
        &self,
        owner_user_id: &str,
        chat_id: &str,
    ) -> anyhow::Result<Vec<Reminder>>;

    /// Scheduled reminders due at `now`, ascending by `remind_at_utc`,
    /// capped at `limit`.
    async fn due_batch(&self, now: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<Reminder>>;

    /// CAS `scheduled` -> `sending`. True iff this caller won the claim.
    async fn claim(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<bool>;

    async fn mark_sent(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<()>;

    /// Back to `scheduled` after a failed delivery; eligible again on the
    /// next tick (no backoff).
    async fn mark_retry(
        &self,
        id: &str,
        attempts: i32,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Terminal failure; never selected by the due scan again.
    async fn mark_failed(
        &self,
        id: &str,
        attempts: i32,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// CAS {scheduled, sending} -> `cancelled`. False when the reminder
    /// moved to a terminal status in between.
    async fn cancel_active(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<bool>;

    /// Revert `sending` rows not touched since `cutoff` back to `scheduled`,
    /// leaving `attempts` alone. Recovers claims orphaned by a dispatch
    /// invocation that died mid-batch. Returns how many rows were released.
    async fn release_stale_sending(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
}
