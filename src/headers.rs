//! Typed event header names for FreeSWITCH ESL events.

/// Error returned when parsing an unrecognized event header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventHeaderError(pub String);

impl std::fmt::Display for ParseEventHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event header: {}", self.0)
    }
}

impl std::error::Error for ParseEventHeaderError {}

define_header_enum! {
    error_type: ParseEventHeaderError,
    /// Header names read from hangup events and `uuid_dump` output.
    ///
    /// `uuid_dump` prints the same `Key: Value` pairs a channel event
    /// carries, so one enum serves both. Use with [`EslEvent::header()`]
    /// for type-safe lookups.
    pub enum EventHeader {
        EventName => "Event-Name",
        UniqueId => "Unique-ID",
        CallerUniqueId => "Caller-Unique-ID",
        ChannelName => "Channel-Name",
        ChannelState => "Channel-State",
        CallDirection => "Call-Direction",
        HangupCause => "Hangup-Cause",
        CallerCallerIdNumber => "Caller-Caller-ID-Number",
        CallerDestinationNumber => "Caller-Destination-Number",
        CallerChannelCreatedTime => "Caller-Channel-Created-Time",
        CallerChannelAnsweredTime => "Caller-Channel-Answered-Time",
    }
}
