//! Typed channel variable names read by call control.

/// Error returned when parsing an unrecognized channel variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelVariableError(pub String);

impl std::fmt::Display for ParseChannelVariableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown channel variable: {}", self.0)
    }
}

impl std::error::Error for ParseChannelVariableError {}

define_header_enum! {
    error_type: ParseChannelVariableError,
    /// Channel variable names (the part after the `variable_` prefix).
    ///
    /// Use with [`EslEvent::variable()`] or [`ChannelVariable::header_name`]
    /// when reading `uuid_dump` output.
    pub enum ChannelVariable {
        Duration => "duration",
        Billsec => "billsec",
        HangupCause => "hangup_cause",
        OriginationCallerIdNumber => "origination_caller_id_number",
    }
}

impl ChannelVariable {
    /// Header name under which events and `uuid_dump` expose this variable.
    pub fn header_name(&self) -> String {
        format!("variable_{}", self.as_str())
    }
}
