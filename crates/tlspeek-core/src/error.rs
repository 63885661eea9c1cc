use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// More bytes may still arrive; parse again once they do.
    #[error("need more data: {field} needs {needed} bytes, {available} available")]
    InsufficientInput {
        field: &'static str,
        needed: usize,
        available: usize,
    },
    /// A structure with a known length ended early.
    #[error("truncated {field}: needs {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
}

impl ParseError {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            field,
            reason: reason.into(),
        }
    }

    /// True for the one recoverable condition.
    pub fn is_insufficient_input(&self) -> bool {
        matches!(self, ParseError::InsufficientInput { .. })
    }
}

/// Fails with `Malformed` unless `condition` holds.
pub(crate) fn must(condition: bool, field: &'static str, reason: &str) -> Result<(), ParseError> {
    if condition {
        Ok(())
    } else {
        Err(ParseError::malformed(field, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_insufficient_input_is_recoverable() {
        let more = ParseError::InsufficientInput {
            field: "x",
            needed: 2,
            available: 1,
        };
        let truncated = ParseError::Truncated {
            field: "x",
            needed: 2,
            available: 1,
        };
        assert!(more.is_insufficient_input());
        assert!(!truncated.is_insufficient_input());
        assert!(!ParseError::malformed("x", "bad").is_insufficient_input());
    }

    #[test]
    fn test_must_reports_field_and_reason() {
        assert!(must(true, "TLSPlaintext.type", "unknown").is_ok());
        let err = must(false, "TLSPlaintext.type", "unknown").unwrap_err();
        assert_eq!(err.to_string(), "malformed TLSPlaintext.type: unknown");
    }
}
