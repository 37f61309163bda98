use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::info;
use rand::RngCore;

use crate::reminders::model::{Reminder, ReminderStatus, Source};
use crate::reminders::store::ReminderStore;
use crate::timeparse;

/// User-facing reminder operations: create, list, cancel.
///
/// Storage failures propagate to the caller; the webhook layer turns them
/// into a generic failure reply instead of silently dropping the command.
pub struct ReminderService {
    store: Arc<dyn ReminderStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    PermissionDenied,
    AlreadyCancelled,
    AlreadySent,
    AlreadyFailed,
    /// Legality check passed but the conditional write lost to a concurrent
    /// claim that finished the reminder. Tolerated race, reported as
    /// not-cancellable.
    Raced,
}

impl CancelOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::AlreadyCancelled => "ALREADY_CANCELLED",
            Self::AlreadySent => "ALREADY_SENT",
            Self::AlreadyFailed => "ALREADY_FAILED",
            Self::Raced => "RACED",
        }
    }

    pub fn reply_text(&self, id: &str) -> String {
        match self {
            Self::Cancelled => format!("Reminder {id} cancelled."),
            Self::NotFound => format!("No reminder found with ID {id}."),
            Self::PermissionDenied => "You do not have permission to cancel this reminder.".into(),
            Self::AlreadyCancelled => "This reminder was already cancelled.".into(),
            Self::AlreadySent => "This reminder was already sent and cannot be cancelled.".into(),
            Self::AlreadyFailed => "This reminder already failed and cannot be cancelled.".into(),
            Self::Raced => "This reminder is being delivered and can no longer be cancelled.".into(),
        }
    }
}

impl ReminderService {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }

    /// Insert a new reminder with `status = scheduled`, `attempts = 0`.
    /// Returns the generated id.
    pub async fn create(
        &self,
        source: &Source,
        remind_at_utc: DateTime<Utc>,
        message: &str,
        timezone: &str,
    ) -> anyhow::Result<String> {
        let id = generate_id();
        let now = Utc::now();
        let reminder = Reminder {
            id: id.clone(),
            owner_user_id: source.user_id.clone(),
            chat_type: source.chat_type.as_str().to_string(),
            chat_id: source.chat_id.clone(),
            message: message.to_string(),
            remind_at_utc,
            timezone: timezone.to_string(),
            status: ReminderStatus::Scheduled.as_str().to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&reminder).await?;

        info!(
            "created reminder {} for user {} at {}",
            id, source.user_id, remind_at_utc
        );
        Ok(id)
    }

    /// Render the owner's pending reminders for a chat, ascending by due
    /// time. Only `scheduled` and `sending` rows are visible here.
    pub async fn list(
        &self,
        owner_user_id: &str,
        chat_id: &str,
        fallback_tz: Tz,
    ) -> anyhow::Result<String> {
        let rows = self.store.list_active(owner_user_id, chat_id).await?;

        if rows.is_empty() {
            return Ok("No reminders scheduled.".to_string());
        }

        let mut out = String::from("Your reminders:");
        for (i, r) in rows.iter().enumerate() {
            let tz = timeparse::parse_zone(&r.timezone).unwrap_or(fallback_tz);
            let local = timeparse::format_local(r.remind_at_utc, tz);
            let sending = if r.status == ReminderStatus::Sending.as_str() {
                " (sending)"
            } else {
                ""
            };
            let _ = write!(out, "\n{}. [{}] {} - {}{}", i + 1, r.id, local, r.message, sending);
        }
        Ok(out)
    }

    /// Cancel a reminder on behalf of `requester_user_id`.
    ///
    /// Read-then-conditionally-write: the legality check reads the current
    /// row, then the write is restricted to pre-delivery statuses so a
    /// concurrent dispatch claim cannot be undone.
    pub async fn cancel(
        &self,
        id: &str,
        requester_user_id: &str,
    ) -> anyhow::Result<CancelOutcome> {
        let Some(reminder) = self.store.get(id).await? else {
            return Ok(CancelOutcome::NotFound);
        };

        if reminder.owner_user_id != requester_user_id {
            return Ok(CancelOutcome::PermissionDenied);
        }

        match ReminderStatus::parse(&reminder.status) {
            Some(ReminderStatus::Cancelled) => Ok(CancelOutcome::AlreadyCancelled),
            Some(ReminderStatus::Sent) => Ok(CancelOutcome::AlreadySent),
            Some(ReminderStatus::Failed) => Ok(CancelOutcome::AlreadyFailed),
            _ => {
                if self.store.cancel_active(id, Utc::now()).await? {
                    info!("cancelled reminder {} for user {}", id, requester_user_id);
                    Ok(CancelOutcome::Cancelled)
                } else {
                    Ok(CancelOutcome::Raced)
                }
            }
        }
    }
}

/// 12 hex characters from the thread-local CSPRNG. Unguessable enough to
/// keep ids from being enumerated across users.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(12);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
