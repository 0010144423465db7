//! Hangup notifications: per-call summary and the default logging handler

use std::fmt;
use std::future::Future;

use tracing::{info, warn};

use crate::{
    call::CallId,
    constants::NORMAL_CLEARING,
    event::EslEvent,
    headers::EventHeader,
    listener::EventHandler,
    variables::ChannelVariable,
};

/// How a call ended, from its hangup cause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallOutcome {
    /// Cleared normally (`NORMAL_CLEARING`).
    Completed,
    /// Any other cause, kept verbatim. Empty when the event had none.
    Failed(String),
}

impl CallOutcome {
    pub fn from_cause(cause: Option<&str>) -> Self {
        match cause {
            Some(NORMAL_CLEARING) => CallOutcome::Completed,
            other => CallOutcome::Failed(
                other
                    .unwrap_or_default()
                    .to_string(),
            ),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CallOutcome::Completed)
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Completed => f.write_str("COMPLETED"),
            CallOutcome::Failed(cause) => write!(f, "FAILED_{}", cause),
        }
    }
}

/// What a `CHANNEL_HANGUP` event says about the call that ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HangupSummary {
    pub call_id: CallId,
    /// Total seconds, `variable_duration`.
    pub duration: Option<u64>,
    /// Billed seconds, `variable_billsec`.
    pub billsec: Option<u64>,
    pub hangup_cause: Option<String>,
    pub outcome: CallOutcome,
}

impl HangupSummary {
    /// `None` when the event carries no `Unique-ID`.
    pub fn from_event(event: &EslEvent) -> Option<Self> {
        let call_id = CallId::from(event.header(EventHeader::UniqueId)?);
        let number = |var: ChannelVariable| {
            event
                .variable(var)
                .and_then(|v| {
                    v.trim()
                        .parse()
                        .ok()
                })
        };
        let hangup_cause = event
            .hangup_cause()
            .map(str::to_string);

        Some(Self {
            call_id,
            duration: number(ChannelVariable::Duration),
            billsec: number(ChannelVariable::Billsec),
            outcome: CallOutcome::from_cause(hangup_cause.as_deref()),
            hangup_cause,
        })
    }

    pub fn duration_or_zero(&self) -> u64 {
        self.duration
            .unwrap_or(0)
    }

    pub fn billsec_or_zero(&self) -> u64 {
        self.billsec
            .unwrap_or(0)
    }
}

/// Default handler: logs one line per finished call.
#[derive(Debug, Clone, Copy, Default)]
pub struct HangupLogger;

impl EventHandler for HangupLogger {
    fn handle(&self, event: EslEvent) -> impl Future<Output = ()> + Send {
        async move {
            let Some(summary) = HangupSummary::from_event(&event) else {
                warn!("Hangup event without Unique-ID, discarding");
                return;
            };
            info!(
                call_id = %summary.call_id,
                duration = summary.duration_or_zero(),
                billsec = summary.billsec_or_zero(),
                status = %summary.outcome,
                hangup_cause = summary.hangup_cause.as_deref().unwrap_or_default(),
                "Call {} ended",
                summary.call_id
            );
        }
    }
}
