//! Parsing of `api` command output

use std::collections::HashMap;

use crate::call::CallId;

/// Parse `Key: Value` lines into a map.
///
/// Each line is split at its first colon; key and value are trimmed. Lines
/// without a colon are skipped. A repeated key keeps its last value.
pub fn parse_key_values(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| {
            (
                key.trim()
                    .to_string(),
                value
                    .trim()
                    .to_string(),
            )
        })
        .collect()
}

/// Extract the channel UUID from an `originate` reply body.
///
/// `+OK <uuid>` yields the token after `+OK`. Any other non-empty reply that
/// is not `-ERR …` is taken whole, so a bare `+OK` comes back as `"+OK"`.
/// Empty and `-ERR` replies yield `None`.
pub fn parse_call_id(body: &str) -> Option<CallId> {
    let body = body.trim();
    let mut tokens = body.split_whitespace();
    if let (Some("+OK"), Some(token)) = (tokens.next(), tokens.next()) {
        return Some(CallId::from(token));
    }
    if body.is_empty() || body.starts_with("-ERR") {
        return None;
    }
    Some(CallId::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_values() {
        let body = "Channel-State: CS_EXECUTE\nCaller-Caller-ID-Number:  1000 \nno colon here\n\nvariable_sip_req_uri: 1001@10.0.0.5:5060\n";
        let map = parse_key_values(body);

        assert_eq!(map.len(), 3);
        assert_eq!(map["Channel-State"], "CS_EXECUTE");
        assert_eq!(map["Caller-Caller-ID-Number"], "1000");
        assert_eq!(map["variable_sip_req_uri"], "1001@10.0.0.5:5060");
    }

    #[test]
    fn test_parse_key_values_empty() {
        assert!(parse_key_values("").is_empty());
        assert!(parse_key_values("   \n\n").is_empty());
    }

    #[test]
    fn test_ok_with_token() {
        assert_eq!(
            parse_call_id("+OK 6a7b2c1e-4f1d-11ee-9b1a-0242ac120002\n"),
            Some(CallId::from("6a7b2c1e-4f1d-11ee-9b1a-0242ac120002"))
        );
        assert_eq!(parse_call_id("  +OK abc extra"), Some(CallId::from("abc")));
    }

    #[test]
    fn test_bare_ok_taken_whole() {
        assert_eq!(parse_call_id("+OK"), Some(CallId::from("+OK")));
        assert_eq!(parse_call_id("+OK   \n"), Some(CallId::from("+OK")));
    }

    #[test]
    fn test_ok_without_separator_taken_whole() {
        assert_eq!(parse_call_id("+OKabc"), Some(CallId::from("+OKabc")));
        assert_eq!(parse_call_id("+OKabc def\n"), Some(CallId::from("+OKabc def")));
    }

    #[test]
    fn test_other_body_taken_whole() {
        assert_eq!(
            parse_call_id("  some-raw-id \n"),
            Some(CallId::from("some-raw-id"))
        );
    }

    #[test]
    fn test_err_and_empty() {
        assert_eq!(parse_call_id("-ERR USER_NOT_REGISTERED\n"), None);
        assert_eq!(parse_call_id(""), None);
        assert_eq!(parse_call_id(" \n\t"), None);
    }
}
