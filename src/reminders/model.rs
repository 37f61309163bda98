use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    User,
    Group,
    Room,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Room => "room",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            "room" => Some(Self::Room),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderStatus {
    Scheduled,
    Sending,
    Sent,
    Cancelled,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A persisted request to deliver a message to a chat at a future instant.
///
/// Rows are never deleted; terminal statuses (`sent`, `cancelled`, `failed`)
/// stay behind as an audit trail.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Reminder {
    pub id: String,
    pub owner_user_id: String,
    pub chat_type: String,
    pub chat_id: String,
    pub message: String,
    pub remind_at_utc: DateTime<Utc>,
    /// IANA zone the original input was interpreted in, kept for display.
    pub timezone: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The (user, chat) pair a command came from; replies and pushes go back
/// to `chat_id`, authorization checks anchor on `user_id`.
#[derive(Debug, Clone)]
pub struct Source {
    pub user_id: String,
    pub chat_type: ChatType,
    pub chat_id: String,
}
