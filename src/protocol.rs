//! ESL wire framing: header blocks, `Content-Length` bodies, event payloads

use crate::{
    buffer::EslBuffer,
    command::EslResponse,
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_TEXT_EVENT_JSON,
        CONTENT_TYPE_TEXT_EVENT_PLAIN, HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE,
        HEADER_TERMINATOR, MAX_MESSAGE_SIZE,
    },
    error::{EslError, EslResult},
    event::{EslEvent, EslEventType, EventFormat},
    headers::EventHeader,
};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// Kind of frame, taken from its `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageType {
    /// `auth/request`, first frame after dialing
    AuthRequest,
    /// `command/reply`
    CommandReply,
    /// `api/response`
    ApiResponse,
    /// `text/event-plain` or `text/event-json`
    Event,
    /// `text/disconnect-notice`
    Disconnect,
    /// Anything else
    Unknown(String),
}

impl MessageType {
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => MessageType::AuthRequest,
            CONTENT_TYPE_COMMAND_REPLY => MessageType::CommandReply,
            CONTENT_TYPE_API_RESPONSE => MessageType::ApiResponse,
            CONTENT_TYPE_TEXT_EVENT_PLAIN | CONTENT_TYPE_TEXT_EVENT_JSON => MessageType::Event,
            CONTENT_TYPE_DISCONNECT_NOTICE => MessageType::Disconnect,
            other => MessageType::Unknown(other.to_string()),
        }
    }
}

/// One complete frame read off the socket.
#[derive(Debug, Clone)]
pub struct EslMessage {
    pub message_type: MessageType,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl EslMessage {
    pub fn new(
        message_type: MessageType,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) -> Self {
        Self {
            message_type,
            headers,
            body,
        }
    }

    pub fn into_response(self) -> EslResponse {
        EslResponse::new(self.headers, self.body)
    }

    /// Format of an event frame, from its `Content-Type`.
    pub fn event_format(&self) -> EventFormat {
        self.headers
            .get(HEADER_CONTENT_TYPE)
            .map(|ct| EventFormat::from_content_type(ct))
            .unwrap_or_default()
    }
}

/// Split a `Key: Value` line at the first colon and percent-decode the value.
///
/// Values that are not valid percent-encoded UTF-8 are kept raw.
fn decode_header_line(line: &str) -> Option<(String, String)> {
    let (key, raw_value) = line.split_once(':')?;
    let raw_value = raw_value.trim();
    let value = percent_decode_str(raw_value)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw_value.to_string());
    Some((key.trim().to_string(), value))
}

#[derive(Debug)]
enum ParseState {
    Headers,
    Body {
        message_type: MessageType,
        headers: HashMap<String, String>,
        length: usize,
    },
}

/// Incremental ESL frame parser.
///
/// Feed raw socket bytes with [`add_data`](Self::add_data) and drain frames
/// with [`parse_message`](Self::parse_message) until it yields `None`.
pub struct EslParser {
    buffer: EslBuffer,
    state: ParseState,
}

impl EslParser {
    pub fn new() -> Self {
        Self {
            buffer: EslBuffer::new(),
            state: ParseState::Headers,
        }
    }

    pub fn add_data(&mut self, data: &[u8]) -> EslResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()
    }

    /// Next complete frame, `Ok(None)` while more bytes are needed.
    pub fn parse_message(&mut self) -> EslResult<Option<EslMessage>> {
        if let ParseState::Headers = self.state {
            let Some(raw) = self
                .buffer
                .extract_until_pattern(HEADER_TERMINATOR.as_bytes())
            else {
                return Ok(None);
            };
            self.buffer
                .compact();

            let text = String::from_utf8(raw)
                .map_err(|_| EslError::protocol_error("Invalid UTF-8 in headers"))?;
            let headers = self.parse_headers(&text)?;

            // A frame without Content-Type means we lost sync with the stream.
            let message_type = headers
                .get(HEADER_CONTENT_TYPE)
                .map(|ct| MessageType::from_content_type(ct))
                .ok_or_else(|| {
                    EslError::protocol_error("Missing Content-Type header, stream out of sync")
                })?;

            let length = match headers.get(HEADER_CONTENT_LENGTH) {
                Some(value) => parse_content_length(value)?,
                None => 0,
            };
            if length == 0 {
                return Ok(Some(EslMessage::new(message_type, headers, None)));
            }
            self.state = ParseState::Body {
                message_type,
                headers,
                length,
            };
        }

        let ParseState::Body { length, .. } = &self.state else {
            return Ok(None);
        };
        let Some(raw) = self
            .buffer
            .extract_bytes(*length)
        else {
            return Ok(None);
        };
        self.buffer
            .compact();

        let ParseState::Body {
            message_type,
            headers,
            ..
        } = std::mem::replace(&mut self.state, ParseState::Headers)
        else {
            return Ok(None);
        };
        let body = String::from_utf8(raw)
            .map_err(|_| EslError::protocol_error("Invalid UTF-8 in body"))?;
        Ok(Some(EslMessage::new(message_type, headers, Some(body))))
    }

    fn parse_headers(&self, text: &str) -> EslResult<HashMap<String, String>> {
        let mut headers = HashMap::new();
        for line in text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            let (key, value) = decode_header_line(line).ok_or_else(|| EslError::InvalidHeader {
                header: line.to_string(),
            })?;
            headers.insert(key, value);
        }
        Ok(headers)
    }

    /// Turn an event frame into an [`EslEvent`].
    pub fn parse_event(&self, message: EslMessage, format: EventFormat) -> EslResult<EslEvent> {
        if message.message_type != MessageType::Event {
            return Err(EslError::protocol_error("Not an event message"));
        }
        let body = message
            .body
            .ok_or_else(|| EslError::protocol_error(format!("{} event missing body", format)))?;

        let mut event = match format {
            EventFormat::Json => parse_json_event(&body)?,
            _ => parse_plain_event(&body),
        };
        let event_type = event
            .header(EventHeader::EventName)
            .and_then(EslEventType::from_wire);
        event.set_event_type(event_type);
        Ok(event)
    }
}

impl Default for EslParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_content_length(value: &str) -> EslResult<usize> {
    let length: usize = value
        .trim()
        .parse()
        .map_err(|_| EslError::InvalidHeader {
            header: format!("{}: {}", HEADER_CONTENT_LENGTH, value),
        })?;
    if length > MAX_MESSAGE_SIZE {
        return Err(EslError::protocol_error(format!(
            "Content-Length {} exceeds limit {}",
            length, MAX_MESSAGE_SIZE
        )));
    }
    Ok(length)
}

/// `text/event-plain` bodies hold percent-encoded `Key: Value` lines, then
/// optionally a blank line and an inner body.
fn parse_plain_event(body: &str) -> EslEvent {
    let (header_section, inner_body) = match body.split_once(HEADER_TERMINATOR) {
        Some((headers, rest)) => (headers, Some(rest)),
        None => (body, None),
    };

    let mut event = EslEvent::new();
    for (key, value) in header_section
        .lines()
        .map(str::trim)
        .filter_map(decode_header_line)
    {
        event.set_header(key, value);
    }
    if let Some(inner) = inner_body.filter(|b| !b.is_empty()) {
        event.set_body(inner.to_string());
    }
    event
}

/// `text/event-json` bodies are a flat object; `_body` carries the inner body.
fn parse_json_event(body: &str) -> EslResult<EslEvent> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let object = value
        .as_object()
        .ok_or_else(|| EslError::protocol_error("JSON event is not an object"))?;

    let mut event = EslEvent::new();
    for (key, value) in object {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if key == "_body" {
            event.set_body(text);
        } else {
            event.set_header(key.clone(), text);
        }
    }
    Ok(event)
}
