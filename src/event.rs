//! ESL event types and structures

use crate::headers::EventHeader;
use crate::variables::ChannelVariable;
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Event format types supported by FreeSWITCH ESL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum EventFormat {
    /// Plain text format (default)
    #[default]
    Plain,
    /// JSON format
    Json,
}

impl EventFormat {
    /// Determine event format from a Content-Type header value.
    pub fn from_content_type(ct: &str) -> Self {
        match ct {
            "text/event-json" => Self::Json,
            _ => Self::Plain,
        }
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFormat::Plain => write!(f, "plain"),
            EventFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for EventFormat {
    type Err = ParseEventFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => Err(ParseEventFormatError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid event format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventFormatError(pub String);

impl fmt::Display for ParseEventFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event format: {}", self.0)
    }
}

impl std::error::Error for ParseEventFormatError {}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventTypeError(pub String);

impl fmt::Display for ParseEventTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for ParseEventTypeError {}

define_header_enum! {
    error_type: ParseEventTypeError,
    /// FreeSWITCH event names this crate subscribes to or recognises.
    ///
    /// Anything else parses to `None` on [`EslEvent::event_type`] and is
    /// skipped by the listener.
    pub enum EslEventType {
        ChannelCreate => "CHANNEL_CREATE",
        ChannelAnswer => "CHANNEL_ANSWER",
        ChannelHangup => "CHANNEL_HANGUP",
        ChannelHangupComplete => "CHANNEL_HANGUP_COMPLETE",
        BackgroundJob => "BACKGROUND_JOB",
        Heartbeat => "HEARTBEAT",
        Custom => "CUSTOM",
    }
}

impl EslEventType {
    /// `true` for the notifications the hangup listener acts on.
    pub fn is_hangup(&self) -> bool {
        matches!(self, EslEventType::ChannelHangup)
    }
}

/// ESL Event structure containing headers and optional body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EslEvent {
    event_type: Option<EslEventType>,
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    /// Create a new empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Create event with specified type, also setting `Event-Name`.
    pub fn with_type(event_type: EslEventType) -> Self {
        let mut event = Self::new();
        event.set_header(EventHeader::EventName.as_str(), event_type.as_str());
        event.event_type = Some(event_type);
        event
    }

    /// Parsed event type, if recognized.
    pub fn event_type(&self) -> Option<EslEventType> {
        self.event_type
    }

    /// Override the event type.
    pub fn set_event_type(&mut self, event_type: Option<EslEventType>) {
        self.event_type = event_type;
    }

    /// Look up a header by name (case-sensitive).
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// All headers as a map.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Set or overwrite a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into(), value.into());
    }

    /// Event body (the content after the blank line in plain-text events).
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// Set the event body.
    pub fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }

    /// `Unique-ID` header, falling back to `Caller-Unique-ID`.
    pub fn unique_id(&self) -> Option<&str> {
        self.header(EventHeader::UniqueId)
            .or_else(|| self.header(EventHeader::CallerUniqueId))
    }

    /// `Hangup-Cause` header (e.g. `NORMAL_CLEARING`, `USER_BUSY`).
    pub fn hangup_cause(&self) -> Option<&str> {
        self.header(EventHeader::HangupCause)
    }

    /// Look up a channel variable via its `variable_{name}` header.
    pub fn variable(&self, name: ChannelVariable) -> Option<&str> {
        self.header(name.header_name())
    }

    /// Check whether this event matches the given type.
    pub fn is_event_type(&self, event_type: EslEventType) -> bool {
        self.event_type == Some(event_type)
    }

    /// Serialize to ESL plain text wire format with percent-encoded header values.
    ///
    /// `Event-Name` is emitted first, remaining headers are sorted alphabetically
    /// for deterministic output. `Content-Length` is recomputed from the body.
    pub fn to_plain_format(&self) -> String {
        use std::fmt::Write;
        let mut result = String::new();

        if let Some(event_name) = self
            .headers
            .get("Event-Name")
        {
            let _ = writeln!(
                result,
                "Event-Name: {}",
                percent_encode(event_name.as_bytes(), NON_ALPHANUMERIC)
            );
        }

        let mut sorted_headers: Vec<_> = self
            .headers
            .iter()
            .filter(|(k, _)| k.as_str() != "Event-Name" && k.as_str() != "Content-Length")
            .collect();
        sorted_headers.sort_by_key(|(k, _)| k.as_str());

        for (key, value) in sorted_headers {
            let _ = writeln!(
                result,
                "{}: {}",
                key,
                percent_encode(value.as_bytes(), NON_ALPHANUMERIC)
            );
        }

        if let Some(body) = &self.body {
            let _ = writeln!(result, "Content-Length: {}", body.len());
            result.push('\n');
            result.push_str(body);
        } else {
            result.push('\n');
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parse() {
        assert_eq!(
            "CHANNEL_HANGUP".parse::<EslEventType>(),
            Ok(EslEventType::ChannelHangup)
        );
        assert_eq!(
            "channel_hangup".parse::<EslEventType>(),
            Ok(EslEventType::ChannelHangup)
        );
        assert!("UNKNOWN_EVENT"
            .parse::<EslEventType>()
            .is_err());
    }

    #[test]
    fn test_event_type_from_wire_is_exact() {
        assert_eq!(
            EslEventType::from_wire("CHANNEL_HANGUP"),
            Some(EslEventType::ChannelHangup)
        );
        assert_eq!(EslEventType::from_wire("channel_hangup"), None);
        assert_eq!(EslEventType::from_wire("CHANNEL_HANGUP "), None);
    }

    #[test]
    fn test_only_channel_hangup_is_hangup() {
        assert!(EslEventType::ChannelHangup.is_hangup());
        assert!(!EslEventType::ChannelHangupComplete.is_hangup());
        assert!(!EslEventType::Heartbeat.is_hangup());
    }

    #[test]
    fn test_with_type_sets_event_name() {
        let event = EslEvent::with_type(EslEventType::ChannelHangup);
        assert_eq!(event.header("Event-Name"), Some("CHANNEL_HANGUP"));
        assert!(event.is_event_type(EslEventType::ChannelHangup));
    }

    #[test]
    fn test_headers_are_case_sensitive() {
        let mut event = EslEvent::new();
        event.set_header("Unique-ID", "abc");
        assert_eq!(event.header("Unique-ID"), Some("abc"));
        assert_eq!(event.header("unique-id"), None);
    }

    #[test]
    fn test_unique_id_fallback() {
        let mut event = EslEvent::new();
        assert_eq!(event.unique_id(), None);
        event.set_header("Caller-Unique-ID", "caller-uuid");
        assert_eq!(event.unique_id(), Some("caller-uuid"));
        event.set_header("Unique-ID", "uuid");
        assert_eq!(event.unique_id(), Some("uuid"));
    }

    #[test]
    fn test_variable_accessor() {
        let mut event = EslEvent::new();
        event.set_header("variable_billsec", "42");
        assert_eq!(event.variable(ChannelVariable::Billsec), Some("42"));
        assert_eq!(event.variable(ChannelVariable::Duration), None);
    }

    #[test]
    fn test_to_plain_format_percent_encoding() {
        let mut event = EslEvent::with_type(EslEventType::ChannelHangup);
        event.set_header("Hangup-Cause", "NORMAL_CLEARING");
        event.set_header("Caller-Caller-ID-Name", "Alice Smith");

        let plain = event.to_plain_format();

        assert!(plain.starts_with("Event-Name: CHANNEL%5FHANGUP\n"));
        assert!(plain.contains("Caller-Caller-ID-Name: Alice%20Smith\n"));
        assert!(plain.ends_with("\n\n"));
    }

    #[test]
    fn test_to_plain_format_with_body() {
        let mut event = EslEvent::with_type(EslEventType::BackgroundJob);
        event.set_body("+OK result\n".to_string());

        let plain = event.to_plain_format();

        assert!(plain.contains("Content-Length: 11\n"));
        assert!(plain.ends_with("\n\n+OK result\n"));
    }

    #[test]
    fn test_event_format_from_str() {
        assert_eq!("plain".parse::<EventFormat>(), Ok(EventFormat::Plain));
        assert_eq!("json".parse::<EventFormat>(), Ok(EventFormat::Json));
        assert!("xml"
            .parse::<EventFormat>()
            .is_err());
        assert_eq!(EventFormat::default(), EventFormat::Plain);
    }

    #[test]
    fn test_event_format_from_content_type() {
        assert_eq!(
            EventFormat::from_content_type("text/event-json"),
            EventFormat::Json
        );
        assert_eq!(
            EventFormat::from_content_type("text/event-plain"),
            EventFormat::Plain
        );
    }
}
