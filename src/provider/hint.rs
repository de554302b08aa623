use serde::{Serialize, Serializer};
use std::fmt;

/// Message shown while the provider has not reported a recognised hint code.
pub const DEFAULT_MESSAGE: &str = "waiting for the ID app";

/// Provider hint codes reported alongside `pending` and `failed` statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintCode {
    OutstandingTransaction,
    NoClient,
    Started,
    UserSign,
    ExpiredTransaction,
    CertificateErr,
    UserCancel,
    Cancelled,
    StartFailed,
    Other(String),
}

impl HintCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::OutstandingTransaction => "outstandingTransaction",
            Self::NoClient => "noClient",
            Self::Started => "started",
            Self::UserSign => "userSign",
            Self::ExpiredTransaction => "expiredTransaction",
            Self::CertificateErr => "certificateErr",
            Self::UserCancel => "userCancel",
            Self::Cancelled => "cancelled",
            Self::StartFailed => "startFailed",
            Self::Other(code) => code.as_str(),
        }
    }

    /// User-facing status text for this hint.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::OutstandingTransaction => "waiting for the app to open",
            Self::NoClient => "app not found, is it installed?",
            Self::Started => "app started, please authenticate",
            Self::UserSign => "enter your security code in the app",
            Self::ExpiredTransaction => "took too long, try again",
            Self::CertificateErr => "something went wrong with your credential, try again",
            Self::UserCancel => "you cancelled",
            Self::Cancelled => "cancelled",
            Self::StartFailed => "app could not be started",
            Self::Other(_) => DEFAULT_MESSAGE,
        }
    }
}

impl From<&str> for HintCode {
    fn from(code: &str) -> Self {
        match code {
            "outstandingTransaction" => Self::OutstandingTransaction,
            "noClient" => Self::NoClient,
            "started" => Self::Started,
            "userSign" => Self::UserSign,
            "expiredTransaction" => Self::ExpiredTransaction,
            "certificateErr" => Self::CertificateErr,
            "userCancel" => Self::UserCancel,
            "cancelled" => Self::Cancelled,
            "startFailed" => Self::StartFailed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for HintCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HintCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Status text for an optional hint, falling back to the generic waiting message.
#[must_use]
pub fn status_message(hint: Option<&HintCode>) -> &'static str {
    hint.map_or(DEFAULT_MESSAGE, HintCode::message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip_through_their_wire_name() {
        let codes = [
            "outstandingTransaction",
            "noClient",
            "started",
            "userSign",
            "expiredTransaction",
            "certificateErr",
            "userCancel",
            "cancelled",
            "startFailed",
        ];
        for code in codes {
            let hint = HintCode::from(code);
            assert!(!matches!(hint, HintCode::Other(_)), "{code} not recognised");
            assert_eq!(hint.as_str(), code);
        }
    }

    #[test]
    fn messages_match_table() {
        assert_eq!(HintCode::UserCancel.message(), "you cancelled");
        assert_eq!(HintCode::NoClient.message(), "app not found, is it installed?");
        assert_eq!(
            HintCode::from("userSign").message(),
            "enter your security code in the app"
        );
    }

    #[test]
    fn unknown_or_absent_code_uses_default_message() {
        assert_eq!(status_message(None), DEFAULT_MESSAGE);
        assert_eq!(
            status_message(Some(&HintCode::from("somethingNew"))),
            DEFAULT_MESSAGE
        );
        assert_eq!(HintCode::from("somethingNew").as_str(), "somethingNew");
    }

    #[test]
    fn serializes_as_wire_string() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&HintCode::ExpiredTransaction)?;
        assert_eq!(json, "\"expiredTransaction\"");
        Ok(())
    }
}
