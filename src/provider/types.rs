use super::hint::HintCode;
use serde::{Deserialize, Serialize};

/// One in-flight signed-authentication attempt as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub challenge_ref: Option<String>,
    pub auto_start_token: Option<String>,
}

/// Identity confirmed by a completed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResult {
    pub subject_id: String,
    pub display_name: String,
    pub given_name: String,
    pub family_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectStatus {
    Pending,
    Complete,
    Failed,
    Error,
}

impl CollectStatus {
    /// Unrecognised or missing provider statuses map to `Error`.
    #[must_use]
    pub fn from_provider(status: Option<&str>) -> Self {
        match status {
            Some("pending") => Self::Pending,
            Some("complete") => Self::Complete,
            Some("failed") => Self::Failed,
            _ => Self::Error,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Outcome of one status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: CollectStatus,
    pub identity: Option<IdentityResult>,
    pub hint_code: Option<HintCode>,
}

impl StatusReport {
    #[must_use]
    pub const fn pending(hint_code: Option<HintCode>) -> Self {
        Self {
            status: CollectStatus::Pending,
            identity: None,
            hint_code,
        }
    }

    #[must_use]
    pub const fn complete(identity: IdentityResult) -> Self {
        Self {
            status: CollectStatus::Complete,
            identity: Some(identity),
            hint_code: None,
        }
    }

    #[must_use]
    pub const fn failed(hint_code: Option<HintCode>) -> Self {
        Self {
            status: CollectStatus::Failed,
            identity: None,
            hint_code,
        }
    }
}

// Broker wire format below. Request bodies are camelCase, the inner provider
// payloads are PascalCase.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignRequest<'a> {
    pub api_user: &'a str,
    pub password: &'a str,
    pub company_api_guid: &'a str,
    pub end_user_ip: String,
    pub user_visible_data: &'a str,
    pub get_qr: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusRequest<'a> {
    pub api_user: &'a str,
    pub password: &'a str,
    pub company_api_guid: &'a str,
    pub order_ref: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope<T> {
    pub auth_response: Option<AuthResponse>,
    pub api_call_response: Option<ApiCallResponse<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ApiCallResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub status_message: Option<String>,
    pub response: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SignResponse {
    pub order_ref: String,
    pub auto_start_token: Option<String>,
    pub qr_image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CollectResponse {
    pub status: Option<String>,
    pub hint_code: Option<String>,
    pub completion_data: Option<CompletionData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionData {
    pub user: Option<CompletionUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompletionUser {
    pub personal_number: String,
    pub name: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub surname: String,
}

impl From<CompletionUser> for IdentityResult {
    fn from(user: CompletionUser) -> Self {
        Self {
            subject_id: user.personal_number,
            display_name: user.name,
            given_name: user.given_name,
            family_name: user.surname,
        }
    }
}
