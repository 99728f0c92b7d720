use crate::provider::RpcError;
use std::fmt;

/// Error code wallets report when the user cancels a request.
pub const TX_REJECTED_BY_USER: i64 = 4001;

/// Status message surfaced when a transaction is included but reverts; the
/// ledger does not expose the underlying reason.
pub const REMOTE_ACTION_FAILED: &str = "remote action failed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UserDeclined,
    RemoteRejected,
    Unknown,
}

/// A remote-call failure fit for session state. Raw provider errors never
/// reach the session; they pass through `classify` first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn remote_rejected(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::RemoteRejected,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            message: message.into(),
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub fn classify(raw: &RpcError) -> ClassifiedError {
    if raw.code == Some(TX_REJECTED_BY_USER) {
        // Silent path: callers drop this without surfacing a message.
        return ClassifiedError {
            kind: ErrorKind::UserDeclined,
            message: String::new(),
        };
    }
    match &raw.data_message {
        Some(data) => ClassifiedError::remote_rejected(data.clone()),
        None => ClassifiedError::unknown(stringified_message(raw)),
    }
}

/// Second extraction tier for errors that only carry a flattened blob:
/// re-encode the message as JSON, split around the nested `message` marker
/// and strip everything that is not readable text. Blobs without the
/// expected nesting pass through unmodified.
fn stringified_message(raw: &RpcError) -> String {
    let encoded = match serde_json::to_string(&raw.message) {
        Ok(encoded) => encoded,
        Err(_) => return raw.message.clone(),
    };
    let segments: Vec<&str> = encoded.split("message").collect();
    match segments.get(2) {
        Some(tail) => tail
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '\'' || *c == ' ')
            .collect(),
        None => raw.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn classify__user_rejection_code_is_silent() {
        let raw = RpcError::with_code(TX_REJECTED_BY_USER, "User denied transaction");

        let classified = classify(&raw);

        assert_eq!(classified.kind, ErrorKind::UserDeclined);
        assert!(classified.message.is_empty());
    }

    #[test]
    fn classify__prefers_structured_provider_message() {
        let raw = RpcError::with_data(
            "Internal JSON-RPC error.",
            "execution reverted: nothing staked",
        );

        let classified = classify(&raw);

        assert_eq!(classified.kind, ErrorKind::RemoteRejected);
        assert_eq!(classified.message, "execution reverted: nothing staked");
    }

    #[test]
    fn classify__parses_nested_message_out_of_stringified_blob() {
        let raw = RpcError::new(
            r#"processing error: {"message":"outer","error":{"message":"VM Exception: invalid guess"}}"#,
        );

        let classified = classify(&raw);

        assert_eq!(classified.kind, ErrorKind::Unknown);
        assert!(classified.message.contains("VM Exception"));
        assert!(!classified.message.contains('{'));
        assert!(!classified.message.contains('"'));
    }

    #[test]
    fn classify__falls_back_to_raw_message_when_parse_is_short() {
        let raw = RpcError::new("connection refused");

        let classified = classify(&raw);

        assert_eq!(classified.kind, ErrorKind::Unknown);
        assert_eq!(classified.message, "connection refused");
    }

    #[test]
    fn classify__other_codes_are_not_user_declined() {
        let raw = RpcError::with_code(-32603, "Internal error");

        let classified = classify(&raw);

        assert_ne!(classified.kind, ErrorKind::UserDeclined);
    }
}
