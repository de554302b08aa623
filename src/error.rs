use thiserror::Error;

/// Errors raised while driving an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// The ID provider reported an unsuccessful authentication or call response.
    #[error("{0}")]
    Provider(String),
    /// A provider payload was malformed or inconsistent.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// An outbound provider call exceeded its deadline.
    #[error("Request timeout: {0}")]
    Timeout(String),
    /// The existence check or login against the membership backend failed.
    #[error("Membership error: {0}")]
    Membership(String),
    /// The attempt's driver stopped without reaching a terminal state.
    #[error("{0}")]
    Unknown(String),
}

impl FlowError {
    /// Short machine-readable code, mirrored in snapshots and logs.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Membership(_) => "MEMBERSHIP_ERROR",
            Self::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Map a transport error from `reqwest`, keeping timeouts distinct.
    pub(crate) fn from_transport(context: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{context}: request timeout"))
        } else {
            Self::Provider(format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FlowError;

    #[test]
    fn provider_error_displays_message_verbatim() {
        let err = FlowError::Provider("Invalid credentials".to_string());
        assert_eq!(err.to_string(), "Invalid credentials");
        assert_eq!(err.code(), "PROVIDER_ERROR");
    }

    #[test]
    fn codes_are_distinct() {
        let codes = [
            FlowError::Provider(String::new()).code(),
            FlowError::InvalidResponse(String::new()).code(),
            FlowError::Timeout(String::new()).code(),
            FlowError::Membership(String::new()).code(),
            FlowError::Unknown(String::new()).code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
