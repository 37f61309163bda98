use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use log::error;
use sha2::Sha256;

use crate::gateway::MessagingGateway;
use crate::reminders::model::ChatType;

const LINE_API_BASE: &str = "https://api.line.me/v2/bot";

/// LINE Messaging API client.
pub struct LineClient {
    http: reqwest::Client,
    access_token: String,
}

impl LineClient {
    pub fn new(access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
        }
    }
}

#[async_trait]
impl MessagingGateway for LineClient {
    async fn send_reply(&self, reply_token: &str, text: &str) {
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": text }],
        });
        let res = self
            .http
            .post(format!("{LINE_API_BASE}/message/reply"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await;
        match res {
            Ok(res) if res.status().is_success() => {}
            Ok(res) => {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                error!("LINE reply failed: {status} {body}");
            }
            Err(err) => error!("LINE reply failed: {err}"),
        }
    }

    async fn send_push(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "to": chat_id,
            "messages": [{ "type": "text", "text": text }],
        });
        let res = self
            .http
            .post(format!("{LINE_API_BASE}/message/push"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if res.status().is_success() {
            return Ok(());
        }
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        anyhow::bail!("LINE push failed: {status} {body}")
    }

    async fn leave_chat(&self, chat_type: ChatType, chat_id: &str) {
        let endpoint = match chat_type {
            ChatType::Group => "group",
            ChatType::Room => "room",
            // 1:1 chats cannot be left.
            ChatType::User => return,
        };
        let res = self
            .http
            .post(format!("{LINE_API_BASE}/{endpoint}/{chat_id}/leave"))
            .bearer_auth(&self.access_token)
            .send()
            .await;
        match res {
            Ok(res) if res.status().is_success() => {}
            Ok(res) => {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                error!("LINE leave {endpoint} failed: {status} {body}");
            }
            Err(err) => error!("LINE leave {endpoint} failed: {err}"),
        }
    }
}

/// Validate LINE's `x-line-signature` header: base64(HMAC-SHA256(secret, body)).
pub fn verify_signature(body: &[u8], signature: &str, channel_secret: &str) -> bool {
    // new_from_slice accepts any key length for SHA-256.
    let Ok(mut mac) = <Hmac<Sha256>>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = STANDARD.encode(mac.finalize().into_bytes());
    expected == signature
}
