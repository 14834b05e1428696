//! Response classification.
//!
//! EWS and Autodiscover report status through several overlapping
//! conventions: a `ResponseCode` element (EWS), an `ErrorCode` element
//! (Autodiscover), and SOAP `faultcode`/`faultstring` pairs. Any combination
//! may be present. `ResponseCode` is consulted before `ErrorCode` for every
//! sentinel. Comparisons are exact.

use crate::error::{
    AttemptOutcome, FatalKind, RecoverableKind, TransportError, TransportErrorKind,
};
use crate::parser::{local_part, parse_xml, TEXT_KEY};
use serde_json::Value;

/// Status value meaning success.
pub const NO_ERROR: &str = "NoError";
pub const ACCESS_DENIED: &str = "ErrorAccessDenied";
pub const INVALID_ID_MALFORMED: &str = "ErrorInvalidIdMalformed";

/// Marker phrases around the id formats in a malformed-id message.
const CONVERT_ID_START: &str = "convert the Id from ";
const CONVERT_ID_END: &str = " format.";

/// Codes after which another (version, endpoint) candidate may succeed.
pub const RECOVERABLE_CODES: [&str; 16] = [
    "ErrorInvalidServerVersion",
    "ErrorIncorrectSchemaVersion",
    "ErrorInvalidSchemaVersionForMailboxVersion",
    "ErrorServerBusy",
    "ErrorMailboxMoveInProgress",
    "ErrorMailboxStoreUnavailable",
    "ErrorNonExistentMailbox",
    "ErrorImpersonateUserDenied",
    "InvalidUser",
    "InvalidRequest",
    "InvalidSetting",
    "SettingIsNotAvailable",
    "ServerBusy",
    "InvalidDomain",
    "NotFederated",
    "RedirectAddress",
];

/// Result of classifying one response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Success(Value),
    Recoverable {
        kind: RecoverableKind,
        message: Option<String>,
    },
    Fatal {
        kind: FatalKind,
        message: Option<String>,
    },
    Transport(TransportError),
}

impl ResponseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Outcome without the payload, for attempt records.
    pub fn summary(&self) -> AttemptOutcome {
        match self {
            Self::Success(_) => AttemptOutcome::Succeeded,
            Self::Recoverable { kind, message } => AttemptOutcome::Recoverable {
                kind: kind.clone(),
                message: message.clone(),
            },
            Self::Fatal { kind, message } => AttemptOutcome::Fatal {
                kind: kind.clone(),
                message: message.clone(),
            },
            Self::Transport(e) => AttemptOutcome::Transport(e.clone()),
        }
    }
}

/// Status signals found in a response tree.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StatusSignals<'a> {
    pub response_code: Option<&'a str>,
    pub error_code: Option<&'a str>,
    pub message_text: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub fault_code: Option<&'a str>,
    pub fault_string: Option<&'a str>,
}

impl<'a> StatusSignals<'a> {
    /// Collect the first occurrence of each signal in document order.
    pub fn extract(tree: &'a Value) -> Self {
        Self {
            response_code: find_text(tree, "ResponseCode"),
            error_code: find_text(tree, "ErrorCode"),
            message_text: find_text(tree, "MessageText"),
            error_message: find_text(tree, "ErrorMessage"),
            fault_code: find_text(tree, "faultcode"),
            fault_string: find_text(tree, "faultstring"),
        }
    }

    /// True when the tree carries any EWS, Autodiscover or SOAP fault code.
    pub fn has_status(&self) -> bool {
        self.response_code.is_some() || self.error_code.is_some() || self.fault_code.is_some()
    }

    /// Primary then secondary code.
    fn codes(&self) -> impl Iterator<Item = &'a str> {
        self.response_code.into_iter().chain(self.error_code)
    }

    fn has(&self, sentinel: &str) -> bool {
        self.codes().any(|c| c == sentinel)
    }

    fn description(&self) -> Option<String> {
        self.message_text.or(self.error_message).map(str::to_string)
    }
}

/// Parse and classify raw response bytes.
pub fn classify(raw: &[u8]) -> ResponseOutcome {
    let tree = match parse_xml(raw) {
        Ok(tree) => tree,
        Err(e) => {
            return ResponseOutcome::Transport(TransportError::new(
                TransportErrorKind::EmptyOrMalformed,
                e.to_string(),
            ))
        }
    };
    if tree.as_object().map_or(true, |m| m.is_empty()) {
        return ResponseOutcome::Transport(TransportError::new(
            TransportErrorKind::EmptyOrMalformed,
            "empty response body",
        ));
    }
    classify_tree(tree)
}

/// Classify an already parsed response tree.
pub fn classify_tree(tree: Value) -> ResponseOutcome {
    let signals = StatusSignals::extract(&tree);

    if signals.has(NO_ERROR) {
        return ResponseOutcome::Success(tree);
    }

    if signals.has(ACCESS_DENIED) {
        return ResponseOutcome::Recoverable {
            kind: RecoverableKind::AccessDenied,
            message: signals.description(),
        };
    }

    if signals.has(INVALID_ID_MALFORMED) {
        let message = signals.description();
        let kind = match message.as_deref().and_then(parse_convert_id_message) {
            Some((from, to)) => RecoverableKind::MalformedIdentifier { from, to },
            None => RecoverableKind::OtherKnownCode {
                code: INVALID_ID_MALFORMED.to_string(),
            },
        };
        return ResponseOutcome::Recoverable { kind, message };
    }

    if let Some(code) = signals.codes().find(|c| RECOVERABLE_CODES.contains(c)) {
        return ResponseOutcome::Recoverable {
            kind: RecoverableKind::OtherKnownCode {
                code: code.to_string(),
            },
            message: signals.description(),
        };
    }

    if signals.fault_code.is_some() || signals.fault_string.is_some() {
        return ResponseOutcome::Fatal {
            kind: FatalKind::Fault {
                code: signals.fault_code.map(str::to_string),
            },
            message: signals.fault_string.map(str::to_string),
        };
    }

    ResponseOutcome::Fatal {
        kind: FatalKind::UnknownCode {
            code: signals.codes().next().map(str::to_string),
        },
        message: signals.description(),
    }
}

/// Extract `(from, to)` from "...convert the Id from EwsLegacyId to EwsId format."
pub fn parse_convert_id_message(message: &str) -> Option<(String, String)> {
    let start = message.find(CONVERT_ID_START)? + CONVERT_ID_START.len();
    let rest = &message[start..];
    let end = rest.find(CONVERT_ID_END)?;
    let (from, to) = rest[..end].split_once(" to ")?;
    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() || to.is_empty() {
        return None;
    }
    Some((from.to_string(), to.to_string()))
}

/// Text of the first element named `name` (ignoring prefixes), depth first.
fn find_text<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    match value {
        Value::Object(map) => map.iter().find_map(|(k, v)| {
            if !k.starts_with('@') && local_part(k) == name {
                if let Some(text) = text_of(v) {
                    return Some(text);
                }
            }
            find_text(v, name)
        }),
        Value::Array(items) => items.iter().find_map(|item| find_text(item, name)),
        _ => None,
    }
}

fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get(TEXT_KEY).and_then(Value::as_str),
        Value::Array(items) => items.first().and_then(text_of),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(body: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>{}</s:Body>
</s:Envelope>"#,
            body
        )
        .into_bytes()
    }

    #[test]
    fn test_no_error_is_success() {
        let raw = envelope(
            r#"<m:GetItemResponse xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages">
                 <m:ResponseMessages><m:GetItemResponseMessage ResponseClass="Success">
                   <m:ResponseCode>NoError</m:ResponseCode>
                 </m:GetItemResponseMessage></m:ResponseMessages>
               </m:GetItemResponse>"#,
        );
        assert!(classify(&raw).is_success());
    }

    #[test]
    fn test_primary_no_error_wins_over_other_signals() {
        let tree = json!({
            "Envelope": {
                "ErrorCode": "ErrorAccessDenied",
                "Fault": {"faultcode": "s:Client", "faultstring": "boom"},
                "ResponseCode": "NoError"
            }
        });
        assert!(classify_tree(tree).is_success());
    }

    #[test]
    fn test_secondary_no_error_is_success() {
        let tree = json!({"Response": {"ErrorCode": "NoError", "ErrorMessage": null}});
        assert!(classify_tree(tree).is_success());
    }

    #[test]
    fn test_access_denied() {
        let tree = json!({"R": {"ResponseCode": "ErrorAccessDenied", "MessageText": "Access is denied."}});
        assert_eq!(
            classify_tree(tree),
            ResponseOutcome::Recoverable {
                kind: RecoverableKind::AccessDenied,
                message: Some("Access is denied.".to_string()),
            }
        );
    }

    #[test]
    fn test_malformed_identifier_extracts_formats() {
        let tree = json!({"R": {
            "ResponseCode": "ErrorInvalidIdMalformed",
            "MessageText": "Id is malformed. Please use the ConvertId method to convert the Id from EwsLegacyId to EwsId format."
        }});
        match classify_tree(tree) {
            ResponseOutcome::Recoverable {
                kind: RecoverableKind::MalformedIdentifier { from, to },
                ..
            } => {
                assert_eq!(from, "EwsLegacyId");
                assert_eq!(to, "EwsId");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_identifier_without_hint() {
        let tree = json!({"R": {"ResponseCode": "ErrorInvalidIdMalformed", "MessageText": "Id is malformed."}});
        assert!(matches!(
            classify_tree(tree),
            ResponseOutcome::Recoverable {
                kind: RecoverableKind::OtherKnownCode { ref code },
                ..
            } if code == INVALID_ID_MALFORMED
        ));
    }

    #[test]
    fn test_other_known_code() {
        let tree = json!({"R": {"ErrorCode": "InvalidUser", "ErrorMessage": "Invalid user: 'x@y.com'"}});
        assert_eq!(
            classify_tree(tree),
            ResponseOutcome::Recoverable {
                kind: RecoverableKind::OtherKnownCode {
                    code: "InvalidUser".to_string()
                },
                message: Some("Invalid user: 'x@y.com'".to_string()),
            }
        );
    }

    #[test]
    fn test_soap_fault() {
        let raw = envelope(
            r#"<s:Fault><faultcode xmlns:a="urn:x">a:ErrorSchemaValidation</faultcode>
                 <faultstring xml:lang="en-US">The request failed schema validation.</faultstring></s:Fault>"#,
        );
        assert_eq!(
            classify(&raw),
            ResponseOutcome::Fatal {
                kind: FatalKind::Fault {
                    code: Some("a:ErrorSchemaValidation".to_string())
                },
                message: Some("The request failed schema validation.".to_string()),
            }
        );
    }

    #[test]
    fn test_no_signals_is_unknown_not_success() {
        let tree = json!({"Envelope": {"Body": {"Something": "else"}}});
        assert_eq!(
            classify_tree(tree),
            ResponseOutcome::Fatal {
                kind: FatalKind::UnknownCode { code: None },
                message: None,
            }
        );
    }

    #[test]
    fn test_unknown_code() {
        let tree = json!({"R": {"ResponseCode": "ErrorItemNotFound", "MessageText": "gone"}});
        assert!(matches!(
            classify_tree(tree),
            ResponseOutcome::Fatal { kind: FatalKind::UnknownCode { code: Some(ref c) }, .. } if c == "ErrorItemNotFound"
        ));
    }

    #[test]
    fn test_sentinels_are_case_sensitive() {
        let tree = json!({"R": {"ResponseCode": "noerror"}});
        assert!(!classify_tree(tree).is_success());
        let tree = json!({"R": {"ResponseCode": "erroraccessdenied"}});
        assert!(matches!(classify_tree(tree), ResponseOutcome::Fatal { .. }));
    }

    #[test]
    fn test_empty_and_malformed_bodies() {
        for raw in [&b""[..], &b"   "[..], &b"<unclosed>"[..], &b"not xml at all <"[..]] {
            match classify(raw) {
                ResponseOutcome::Transport(e) => assert_eq!(e.kind, TransportErrorKind::EmptyOrMalformed),
                other => panic!("unexpected outcome for {:?}: {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_first_signal_in_document_order() {
        let tree = json!({"Messages": [
            {"ResponseCode": "ErrorAccessDenied"},
            {"ResponseCode": "NoError"}
        ]});
        assert!(matches!(classify_tree(tree), ResponseOutcome::Recoverable { kind: RecoverableKind::AccessDenied, .. }));
    }

    #[test]
    fn test_has_status() {
        let fault = json!({"Envelope": {"Body": {"Fault": {"faultcode": "s:Server"}}}});
        assert!(StatusSignals::extract(&fault).has_status());
        let page = json!({"html": {"body": {"h1": "401 - Unauthorized"}}});
        assert!(!StatusSignals::extract(&page).has_status());
        let message_only = json!({"R": {"MessageText": "Access is denied."}});
        assert!(!StatusSignals::extract(&message_only).has_status());
    }

    #[test]
    fn test_parse_convert_id_message() {
        assert_eq!(
            parse_convert_id_message("Please use the ConvertId method to convert the Id from EntryId to EwsId format."),
            Some(("EntryId".to_string(), "EwsId".to_string()))
        );
        assert_eq!(parse_convert_id_message("convert the Id from  format."), None);
        assert_eq!(parse_convert_id_message("nothing here"), None);
    }
}
