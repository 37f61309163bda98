use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use chrono_tz::Tz;
use futures::future::join_all;
use log::{error, warn};
use serde::Deserialize;

use crate::commands::{parse_command, Command, CommandError};
use crate::gateway::{verify_signature, MessagingGateway};
use crate::reminders::model::{ChatType, Source};
use crate::reminders::service::ReminderService;
use crate::timeparse::{self, TimeParseError};

const USAGE_TEXT: &str = "Reminder bot usage:

/remind <time> <message>
  Set a reminder. Examples:
  /remind 10m drink water
  /remind 2h send the report
  /remind 2026-02-15 09:00 meeting

/list
  Show your pending reminders

/cancel <id>
  Cancel a reminder";

const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReminderService>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub channel_secret: String,
    pub default_timezone: Tz,
    pub allowed_groups: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook/line", post(handle_webhook))
        .with_state(state)
}

async fn health() -> &'static str {
    "remindflow is running"
}

// ---- webhook envelope ----

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "replyToken", default)]
    pub reply_token: String,
    pub source: EventSource,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
pub struct EventSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "groupId")]
    pub group_id: Option<String>,
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let Some(signature) = headers
        .get("x-line-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return StatusCode::UNAUTHORIZED;
    };
    if !verify_signature(body.as_bytes(), signature, &state.channel_secret) {
        return StatusCode::UNAUTHORIZED;
    }

    let webhook: WebhookBody = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("webhook: unparseable payload: {err}");
            return StatusCode::BAD_REQUEST;
        }
    };

    // Events are independent; none of them may fail the acknowledgment,
    // and one slow reply must not delay the rest of the batch.
    join_all(webhook.events.iter().map(|event| process_event(&state, event))).await;

    StatusCode::OK
}

async fn process_event(state: &AppState, event: &Event) {
    if event.kind == "join" {
        handle_join(state, event).await;
        return;
    }

    if event.kind != "message" {
        return;
    }
    let Some(text) = event
        .message
        .as_ref()
        .filter(|m| m.kind == "text")
        .and_then(|m| m.text.as_deref())
    else {
        return;
    };

    let text = text.trim();
    if !text.starts_with('/') {
        return;
    }

    // Diagnostic command, answered even in non-whitelisted groups.
    if text == "/groupid" {
        handle_groupid(state, event).await;
        return;
    }

    let Some(source) = resolve_source(&event.source) else {
        warn!("webhook: could not resolve source from event");
        return;
    };

    // Group whitelist gates commands; 1:1 chats are always allowed.
    if matches!(source.chat_type, ChatType::Group | ChatType::Room)
        && !state.allowed_groups.is_empty()
        && !state.allowed_groups.iter().any(|g| g == &source.chat_id)
    {
        return;
    }

    let reply = match parse_command(text, state.default_timezone, Utc::now()) {
        Err(err) => error_reply(err),
        Ok(Command::Remind {
            remind_at_utc,
            message,
        }) => {
            match state
                .service
                .create(
                    &source,
                    remind_at_utc,
                    &message,
                    state.default_timezone.name(),
                )
                .await
            {
                Ok(id) => {
                    let local = timeparse::format_local(remind_at_utc, state.default_timezone);
                    format!("Reminder set!\nID: {id}\nTime: {local}\nMessage: {message}")
                }
                Err(err) => {
                    error!("create reminder failed: {err:#}");
                    GENERIC_FAILURE.to_string()
                }
            }
        }
        Ok(Command::List) => {
            match state
                .service
                .list(&source.user_id, &source.chat_id, state.default_timezone)
                .await
            {
                Ok(text) => text,
                Err(err) => {
                    error!("list reminders failed: {err:#}");
                    GENERIC_FAILURE.to_string()
                }
            }
        }
        Ok(Command::Cancel { reminder_id }) => {
            match state.service.cancel(&reminder_id, &source.user_id).await {
                Ok(outcome) => outcome.reply_text(&reminder_id),
                Err(err) => {
                    error!("cancel reminder failed: {err:#}");
                    GENERIC_FAILURE.to_string()
                }
            }
        }
        Ok(Command::Unknown) => USAGE_TEXT.to_string(),
    };

    state.gateway.send_reply(&event.reply_token, &reply).await;
}

/// Auto-leave groups and rooms that are not on the whitelist. An empty
/// whitelist allows everything.
async fn handle_join(state: &AppState, event: &Event) {
    if state.allowed_groups.is_empty() {
        return;
    }
    let (chat_type, chat_id) = match event.source.kind.as_str() {
        "group" => (ChatType::Group, event.source.group_id.as_deref()),
        "room" => (ChatType::Room, event.source.room_id.as_deref()),
        _ => return,
    };
    let Some(chat_id) = chat_id else { return };

    if state.allowed_groups.iter().any(|g| g == chat_id) {
        return;
    }

    state
        .gateway
        .send_reply(
            &event.reply_token,
            "This group is not on the allow list; the bot will leave.",
        )
        .await;
    state.gateway.leave_chat(chat_type, chat_id).await;
}

async fn handle_groupid(state: &AppState, event: &Event) {
    let reply = match resolve_source(&event.source) {
        Some(src) if matches!(src.chat_type, ChatType::Group | ChatType::Room) => {
            format!("This group's ID:\n{}", src.chat_id)
        }
        _ => "This command is only available in groups.".to_string(),
    };
    state.gateway.send_reply(&event.reply_token, &reply).await;
}

fn resolve_source(source: &EventSource) -> Option<Source> {
    let user_id = source.user_id.clone()?;
    match source.kind.as_str() {
        "user" => Some(Source {
            chat_id: user_id.clone(),
            chat_type: ChatType::User,
            user_id,
        }),
        "group" => source.group_id.clone().map(|chat_id| Source {
            user_id: user_id.clone(),
            chat_type: ChatType::Group,
            chat_id,
        }),
        "room" => source.room_id.clone().map(|chat_id| Source {
            user_id: user_id.clone(),
            chat_type: ChatType::Room,
            chat_id,
        }),
        _ => None,
    }
}

fn error_reply(err: CommandError) -> String {
    match err {
        CommandError::MissingCancelId => "Please provide a reminder ID.\nUsage: /cancel <id>".into(),
        CommandError::MissingRemindArgs => {
            "Usage: /remind <time> <message>\nExamples:\n  /remind 10m drink water\n  /remind 2026-02-15 09:00 meeting"
                .into()
        }
        CommandError::UnparseableTime => {
            "Could not parse the time.\nSupported formats:\n  relative: 10m, 2h, 1d\n  absolute: YYYY-MM-DD HH:mm"
                .into()
        }
        CommandError::Time(TimeParseError::InvalidFormat) => {
            "Invalid date or time. Use YYYY-MM-DD HH:mm.".into()
        }
        CommandError::Time(TimeParseError::OutOfRange) => {
            "Reminder time must be between 1 minute and 365 days from now.".into()
        }
        CommandError::Time(TimeParseError::NotInFuture) => {
            "Reminder time must be in the future.".into()
        }
    }
}
