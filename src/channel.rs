//! Channel-related values reported by FreeSWITCH in `Key: Value` form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel state from `switch_channel_state_t` — carried in the `Channel-State` header
/// as a string (`CS_ROUTING`) and in `Channel-State-Number` as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ChannelState {
    CsNew = 0,
    CsInit = 1,
    CsRouting = 2,
    CsSoftExecute = 3,
    CsExecute = 4,
    CsExchangeMedia = 5,
    CsPark = 6,
    CsConsumeMedia = 7,
    CsHibernate = 8,
    CsReset = 9,
    CsHangup = 10,
    CsReporting = 11,
    CsDestroy = 12,
    CsNone = 13,
}

const CHANNEL_STATES: [(ChannelState, &str); 14] = [
    (ChannelState::CsNew, "CS_NEW"),
    (ChannelState::CsInit, "CS_INIT"),
    (ChannelState::CsRouting, "CS_ROUTING"),
    (ChannelState::CsSoftExecute, "CS_SOFT_EXECUTE"),
    (ChannelState::CsExecute, "CS_EXECUTE"),
    (ChannelState::CsExchangeMedia, "CS_EXCHANGE_MEDIA"),
    (ChannelState::CsPark, "CS_PARK"),
    (ChannelState::CsConsumeMedia, "CS_CONSUME_MEDIA"),
    (ChannelState::CsHibernate, "CS_HIBERNATE"),
    (ChannelState::CsReset, "CS_RESET"),
    (ChannelState::CsHangup, "CS_HANGUP"),
    (ChannelState::CsReporting, "CS_REPORTING"),
    (ChannelState::CsDestroy, "CS_DESTROY"),
    (ChannelState::CsNone, "CS_NONE"),
];

impl ChannelState {
    /// Parse from the `Channel-State-Number` integer header value.
    pub fn from_number(n: u8) -> Option<Self> {
        CHANNEL_STATES
            .get(n as usize)
            .map(|(state, _)| *state)
    }

    /// Integer discriminant matching `switch_channel_state_t`.
    pub fn as_number(&self) -> u8 {
        *self as u8
    }

    /// `true` once the channel has started tearing down.
    pub fn is_ending(&self) -> bool {
        matches!(
            self,
            Self::CsHangup | Self::CsReporting | Self::CsDestroy
        )
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(CHANNEL_STATES[self.as_number() as usize].1)
    }
}

/// Error returned when parsing an invalid channel state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelStateError(pub String);

impl fmt::Display for ParseChannelStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel state: {}", self.0)
    }
}

impl std::error::Error for ParseChannelStateError {}

impl FromStr for ChannelState {
    type Err = ParseChannelStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CHANNEL_STATES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(state, _)| *state)
            .ok_or_else(|| ParseChannelStateError(s.to_string()))
    }
}

/// Call direction from the `Call-Direction` header. Wire format is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid call direction string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCallDirectionError(pub String);

impl fmt::Display for ParseCallDirectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown call direction: {}", self.0)
    }
}

impl std::error::Error for ParseCallDirectionError {}

impl FromStr for CallDirection {
    type Err = ParseCallDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .to_lowercase()
            .as_str()
        {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            _ => Err(ParseCallDirectionError(s.to_string())),
        }
    }
}
