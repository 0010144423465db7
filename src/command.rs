//! Outbound commands and their replies

use crate::{
    constants::{HEADER_REPLY_TEXT, HEADER_TERMINATOR},
    error::{EslError, EslResult},
    event::EventFormat,
};
use std::collections::HashMap;
use std::fmt;

/// ESL commands are line-delimited; an embedded newline would let a caller
/// smuggle a second command onto the wire.
fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains(['\n', '\r']) {
        return Err(EslError::protocol_error(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Classification of the `Reply-Text` header.
///
/// FreeSWITCH answers `+OK …` on success and `-ERR …` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplyStatus {
    /// Starts with `+OK`, or no `Reply-Text` at all (`api/response` frames).
    Ok,
    /// Starts with `-ERR`.
    Err,
    /// Present but neither of the above.
    Other,
}

impl ReplyStatus {
    fn classify(reply_text: Option<&str>) -> Self {
        match reply_text {
            None | Some("") => ReplyStatus::Ok,
            Some(t) if t.starts_with("+OK") => ReplyStatus::Ok,
            Some(t) if t.starts_with("-ERR") => ReplyStatus::Err,
            Some(_) => ReplyStatus::Other,
        }
    }
}

/// Reply to a command: headers plus, for `api`, the command output as body.
#[derive(Debug, Clone, PartialEq)]
pub struct EslResponse {
    headers: HashMap<String, String>,
    body: Option<String>,
    status: ReplyStatus,
}

impl EslResponse {
    pub fn new(headers: HashMap<String, String>, body: Option<String>) -> Self {
        let status = ReplyStatus::classify(
            headers
                .get(HEADER_REPLY_TEXT)
                .map(String::as_str),
        );
        Self {
            headers,
            body,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    pub fn reply_status(&self) -> ReplyStatus {
        self.status
    }

    /// Output of an `api` command.
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// Body as owned `String`, empty if absent.
    pub fn body_string(&self) -> String {
        self.body
            .clone()
            .unwrap_or_default()
    }

    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Raw `Reply-Text` (e.g. `+OK accepted`, `-ERR invalid`).
    pub fn reply_text(&self) -> Option<&str> {
        self.header(HEADER_REPLY_TEXT)
    }
}

/// Commands sent on an inbound connection.
#[derive(Clone, PartialEq, Eq)]
pub enum EslCommand {
    /// `auth <password>`, answer to `auth/request`
    Auth { password: String },
    /// `api <command>`, blocking API call whose output comes back as body
    Api { command: String },
    /// `event <format> <names>`
    Events { format: EventFormat, events: String },
}

impl fmt::Debug for EslCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EslCommand::Auth { .. } => f
                .debug_struct("Auth")
                .field("password", &"[REDACTED]")
                .finish(),
            EslCommand::Api { command } => f
                .debug_struct("Api")
                .field("command", command)
                .finish(),
            EslCommand::Events { format, events } => f
                .debug_struct("Events")
                .field("format", format)
                .field("events", events)
                .finish(),
        }
    }
}

impl EslCommand {
    /// Wire text, terminated by a blank line.
    ///
    /// Fails if any user-supplied part contains a newline.
    pub fn to_wire_format(&self) -> EslResult<String> {
        let line = match self {
            EslCommand::Auth { password } => {
                validate_no_newlines(password, "password")?;
                format!("auth {}", password)
            }
            EslCommand::Api { command } => {
                validate_no_newlines(command, "api command")?;
                format!("api {}", command)
            }
            EslCommand::Events { format, events } => {
                validate_no_newlines(events, "event list")?;
                format!("event {} {}", format, events)
            }
        };
        Ok(line + HEADER_TERMINATOR)
    }

    /// Log-safe rendering of the command line.
    pub(crate) fn describe(&self) -> String {
        match self {
            EslCommand::Auth { .. } => "auth [REDACTED]".to_string(),
            EslCommand::Api { command } => format!("api {}", command),
            EslCommand::Events { format, events } => format!("event {} {}", format, events),
        }
    }
}
