use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::timeparse::{self, TimeParseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Remind {
        remind_at_utc: DateTime<Utc>,
        message: String,
    },
    List,
    Cancel {
        reminder_id: String,
    },
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    MissingCancelId,
    MissingRemindArgs,
    UnparseableTime,
    Time(TimeParseError),
}

impl CommandError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCancelId => "MISSING_CANCEL_ID",
            Self::MissingRemindArgs => "MISSING_REMIND_ARGS",
            Self::UnparseableTime => "UNPARSEABLE_TIME",
            Self::Time(err) => err.as_str(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for CommandError {}

/// Parse an inbound slash command into a typed [`Command`].
///
/// Exact, case-sensitive prefixes; leading/trailing whitespace is trimmed.
/// Anything that is not `/list`, `/cancel <id>` or `/remind <time> <message>`
/// comes back as `Unknown` and the caller decides how to respond.
pub fn parse_command(text: &str, tz: Tz, now: DateTime<Utc>) -> Result<Command, CommandError> {
    let trimmed = text.trim();

    if trimmed == "/list" {
        return Ok(Command::List);
    }

    if let Some(rest) = trimmed.strip_prefix("/cancel ") {
        let reminder_id = rest.trim();
        if reminder_id.is_empty() {
            return Err(CommandError::MissingCancelId);
        }
        return Ok(Command::Cancel {
            reminder_id: reminder_id.to_string(),
        });
    }

    if let Some(rest) = trimmed.strip_prefix("/remind ") {
        return parse_remind(rest.trim(), tz, now);
    }

    Ok(Command::Unknown)
}

/// `<time> <message>`: the time is either a relative token ("10m") or a
/// `YYYY-MM-DD HH:mm` pair; whatever follows is the message, internal
/// whitespace and newlines intact. The message is trimmed and may be empty.
fn parse_remind(args: &str, tz: Tz, now: DateTime<Utc>) -> Result<Command, CommandError> {
    if args.is_empty() {
        return Err(CommandError::MissingRemindArgs);
    }

    let (first, rest) = split_token(args);

    if timeparse::is_relative_shape(first) {
        let remind_at_utc = timeparse::parse_relative(first, now).map_err(CommandError::Time)?;
        return Ok(Command::Remind {
            remind_at_utc,
            message: rest.trim().to_string(),
        });
    }

    if timeparse::is_date_shape(first) {
        let (second, remainder) = split_token(rest.trim_start());
        if timeparse::is_time_shape(second) {
            let remind_at_utc =
                timeparse::parse_absolute(first, second, tz, now).map_err(CommandError::Time)?;
            return Ok(Command::Remind {
                remind_at_utc,
                message: remainder.trim().to_string(),
            });
        }
    }

    Err(CommandError::UnparseableTime)
}

fn split_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}
