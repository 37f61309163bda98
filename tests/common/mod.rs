use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use remindflow::gateway::MessagingGateway;
use remindflow::reminders::{ChatType, Reminder, ReminderStatus, ReminderStore, Source};

/// In-memory `ReminderStore` with the same compare-and-set contract as the
/// Postgres implementation: `claim` and `cancel_active` mutate under one
/// lock and report whether a row was affected.
#[derive(Default)]
pub struct MemStore {
    rows: Mutex<Vec<Reminder>>,
}

#[allow(dead_code)]
impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self, id: &str) -> Option<Reminder> {
        self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }

    pub fn insert_row(&self, reminder: Reminder) {
        self.rows.lock().unwrap().push(reminder);
    }
}

#[async_trait]
impl ReminderStore for MemStore {
    async fn insert(&self, reminder: &Reminder) -> anyhow::Result<()> {
        self.rows.lock().unwrap().push(reminder.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<Reminder>> {
        Ok(self.snapshot(id))
    }

    async fn list_active(
        &self,
        owner_user_id: &str,
        chat_id: &str,
    ) -> anyhow::Result<Vec<Reminder>> {
        let mut rows: Vec<Reminder> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.owner_user_id == owner_user_id
                    && r.chat_id == chat_id
                    && matches!(r.status.as_str(), "scheduled" | "sending")
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.remind_at_utc);
        Ok(rows)
    }

    async fn due_batch(&self, now: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<Reminder>> {
        let mut rows: Vec<Reminder> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == "scheduled" && r.remind_at_utc <= now)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.remind_at_utc);
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn claim(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| r.id == id) {
            Some(r) if r.status == "scheduled" => {
                r.status = ReminderStatus::Sending.as_str().to_string();
                r.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_sent(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let r = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("no reminder {id}"))?;
        r.status = ReminderStatus::Sent.as_str().to_string();
        r.updated_at = now;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: &str,
        attempts: i32,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let r = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("no reminder {id}"))?;
        r.status = ReminderStatus::Scheduled.as_str().to_string();
        r.attempts = attempts;
        r.last_error = Some(last_error.to_string());
        r.updated_at = now;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &str,
        attempts: i32,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let r = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("no reminder {id}"))?;
        r.status = ReminderStatus::Failed.as_str().to_string();
        r.attempts = attempts;
        r.last_error = Some(last_error.to_string());
        r.updated_at = now;
        Ok(())
    }

    async fn cancel_active(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| r.id == id) {
            Some(r) if matches!(r.status.as_str(), "scheduled" | "sending") => {
                r.status = ReminderStatus::Cancelled.as_str().to_string();
                r.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_stale_sending(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut released = 0u64;
        for r in rows
            .iter_mut()
            .filter(|r| r.status == "sending" && r.updated_at < cutoff)
        {
            r.status = ReminderStatus::Scheduled.as_str().to_string();
            r.updated_at = now;
            released += 1;
        }
        Ok(released)
    }
}

/// Gateway whose first `n` pushes fail; records every reply, push and leave.
pub struct ScriptedGateway {
    fail_next: AtomicUsize,
    pub pushes: Mutex<Vec<(String, String)>>,
    pub replies: Mutex<Vec<(String, String)>>,
    pub leaves: Mutex<Vec<(ChatType, String)>>,
}

#[allow(dead_code)]
impl ScriptedGateway {
    pub fn reliable() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_next: AtomicUsize::new(n),
            pushes: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            leaves: Mutex::new(Vec::new()),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing_first(usize::MAX)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingGateway for ScriptedGateway {
    async fn send_reply(&self, reply_token: &str, text: &str) {
        self.replies
            .lock()
            .unwrap()
            .push((reply_token.to_string(), text.to_string()));
    }

    async fn send_push(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        self.pushes
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
            }
            anyhow::bail!("push unavailable");
        }
        Ok(())
    }

    async fn leave_chat(&self, chat_type: ChatType, chat_id: &str) {
        self.leaves
            .lock()
            .unwrap()
            .push((chat_type, chat_id.to_string()));
    }
}

#[allow(dead_code)]
pub fn source() -> Source {
    Source {
        user_id: "user-1".to_string(),
        chat_type: ChatType::User,
        chat_id: "user-1".to_string(),
    }
}

#[allow(dead_code)]
pub fn reminder(id: &str, remind_at: DateTime<Utc>, status: ReminderStatus) -> Reminder {
    let now = Utc::now();
    Reminder {
        id: id.to_string(),
        owner_user_id: "user-1".to_string(),
        chat_type: "user".to_string(),
        chat_id: "user-1".to_string(),
        message: format!("msg-{id}"),
        remind_at_utc: remind_at,
        timezone: "Asia/Taipei".to_string(),
        status: status.as_str().to_string(),
        attempts: 0,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}
