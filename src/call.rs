//! Call identifiers and status snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::channel::{CallDirection, ChannelState};

/// FreeSWITCH channel UUID of an originated call.
///
/// Treated as opaque: whatever the switch returned is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CallId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Point-in-time view of a live channel, rebuilt from `uuid_dump` output.
///
/// `uuid` is the queried identifier. Every other field is `None` when the
/// dump did not carry it, so an absent value is never confused with an empty
/// string or a zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatus {
    pub uuid: String,
    pub caller: Option<String>,
    pub callee: Option<String>,
    pub state: Option<String>,
    pub call_direction: Option<String>,
    /// Microseconds since the epoch, verbatim from the switch.
    pub created_time: Option<String>,
    /// Microseconds since the epoch, `0` when never answered.
    pub answered_time: Option<String>,
    /// Billed seconds (`variable_billsec`).
    pub duration: Option<u64>,
}

impl CallStatus {
    /// `state` parsed as a [`ChannelState`], `None` if absent or unknown.
    pub fn channel_state_typed(&self) -> Option<ChannelState> {
        self.state
            .as_deref()?
            .parse()
            .ok()
    }

    /// `call_direction` parsed as a [`CallDirection`], `None` if absent or unknown.
    pub fn call_direction_typed(&self) -> Option<CallDirection> {
        self.call_direction
            .as_deref()?
            .parse()
            .ok()
    }

    /// Billed seconds, reporting an absent value as 0.
    pub fn duration_or_zero(&self) -> u64 {
        self.duration
            .unwrap_or(0)
    }
}
