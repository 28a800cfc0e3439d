//! Errors returned by blocking bridge operations.

use serde_json::Value;

/// Errors that can occur during bridge operations.
///
/// None of these are fatal to the bridge: after any of them the bridge keeps
/// running and can be driven further.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// No matching notification arrived before the deadline.
    ///
    /// The underlying action may still complete later.
    Timeout,
    /// The remote side (or the protocol client) refused the action.
    Rejected(Value),
    /// The bridge has stopped and no longer accepts requests.
    Closed,
    /// No tokio runtime was available to drive the bridge.
    Runtime(String),
}

impl BridgeError {
    /// Whether this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// The rejection reason, if the action was refused.
    #[must_use]
    pub fn reason(&self) -> Option<&Value> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "Operation timed out"),
            Self::Rejected(reason) => write!(f, "Rejected: {reason}"),
            Self::Closed => write!(f, "Bridge closed"),
            Self::Runtime(msg) => write!(f, "Runtime unavailable: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(BridgeError::Timeout.to_string(), "Operation timed out");
        assert_eq!(
            BridgeError::Rejected(json!({"reason": "unauthorized"})).to_string(),
            r#"Rejected: {"reason":"unauthorized"}"#
        );
    }

    #[test]
    fn test_reason() {
        let err = BridgeError::Rejected(json!("nope"));
        assert_eq!(err.reason(), Some(&json!("nope")));
        assert!(BridgeError::Timeout.is_timeout());
        assert!(BridgeError::Closed.reason().is_none());
    }
}
