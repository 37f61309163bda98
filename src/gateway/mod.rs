use async_trait::async_trait;

use crate::reminders::model::ChatType;

pub mod line;

pub use line::{verify_signature, LineClient};

/// Outbound messaging boundary.
///
/// `send_push` failure is the sole delivery-failure signal the dispatch
/// state machine reacts to. Replies and leaves are fire-and-forget: their
/// failures are logged by the implementation, never propagated, because the
/// webhook has already acknowledged the event by then.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_reply(&self, reply_token: &str, text: &str);

    async fn send_push(&self, chat_id: &str, text: &str) -> anyhow::Result<()>;

    async fn leave_chat(&self, chat_type: ChatType, chat_id: &str);
}
