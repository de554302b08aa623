use super::log::LogEntry;
use crate::{
    challenge::ChallengeToken,
    error::FlowError,
    membership::{MembershipOutcome, Session},
    provider::IdentityResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    Initiating,
    Pending,
    Complete,
    Failed,
    Error,
}

impl FlowState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initiating => "initiating",
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    /// No transition leaves these states within one attempt.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Error)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub code: &'static str,
    pub message: String,
}

impl From<&FlowError> for ErrorView {
    fn from(err: &FlowError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Read-only view of one attempt, republished after every mutation.
#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot {
    pub id: String,
    pub state: FlowState,
    pub message: String,
    pub error: Option<ErrorView>,
    pub transaction_id: Option<String>,
    pub challenge: Option<ChallengeToken>,
    /// Deep link the browser should open; set once the redirect delay elapsed.
    pub redirect: Option<String>,
    pub identity: Option<IdentityResult>,
    pub membership: Option<MembershipOutcome>,
    /// Cookies from the membership login. Never serialized.
    #[serde(skip)]
    pub session: Option<Session>,
    pub login_complete: bool,
    pub cancelled: bool,
    pub log: Vec<LogEntry>,
    pub updated_at: DateTime<Utc>,
}

impl FlowSnapshot {
    /// Terminal, or abandoned by the caller.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.cancelled || self.state.is_terminal()
    }

    /// The view of an attempt whose driver stopped before it finished.
    #[must_use]
    pub fn abandoned(mut self, err: &FlowError) -> Self {
        self.state = FlowState::Error;
        self.message = err.to_string();
        self.error = Some(ErrorView::from(err));
        self.challenge = None;
        self.redirect = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!FlowState::Initiating.is_terminal());
        assert!(!FlowState::Pending.is_terminal());
        assert!(FlowState::Complete.is_terminal());
        assert!(FlowState::Failed.is_terminal());
        assert!(FlowState::Error.is_terminal());
    }

    #[test]
    fn error_view_carries_code() {
        let view = ErrorView::from(&FlowError::Timeout("Sign failed: request timeout".to_string()));
        assert_eq!(view.code, "TIMEOUT");
        assert_eq!(view.message, "Request timeout: Sign failed: request timeout");
    }

    fn pending() -> FlowSnapshot {
        FlowSnapshot {
            id: "01J00000000000000000000000".to_string(),
            state: FlowState::Pending,
            message: "waiting for the ID app".to_string(),
            error: None,
            transaction_id: Some("T1".to_string()),
            challenge: Some(ChallengeToken {
                url: "https://img/qr?t=1".to_string(),
                marker: 1,
            }),
            redirect: None,
            identity: None,
            membership: None,
            session: None,
            login_complete: false,
            cancelled: false,
            log: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn abandoned_snapshot_is_a_finished_error() {
        let snapshot = pending().abandoned(&FlowError::Unknown("flow stopped".to_string()));
        assert!(snapshot.is_finished());
        assert_eq!(snapshot.state, FlowState::Error);
        assert_eq!(snapshot.message, "flow stopped");
        assert_eq!(snapshot.error.map(|error| error.code), Some("UNKNOWN_ERROR"));
        assert!(snapshot.challenge.is_none());
    }

    #[test]
    fn session_is_not_serialized() -> Result<(), serde_json::Error> {
        let mut snapshot = pending();
        snapshot.session = Some(Session::new(vec![secrecy::SecretString::from(
            "wordpress_logged_in=abc".to_string(),
        )]));
        let json = serde_json::to_string(&snapshot)?;
        assert!(!json.contains("wordpress_logged_in"));
        assert!(!json.contains("session"));
        Ok(())
    }
}
