//! Membership backend bridge.
//!
//! A confirmed identity is first checked for an existing account and, only
//! when one exists, logged in. Backend failures never escape as errors; they
//! become a [`Resolution`] whose [`Resolution::logged_in`] is `false`.

pub mod client;

pub use self::client::{MembershipClient, MembershipConfig};

use crate::{error::FlowError, provider::IdentityResult, BoxFuture};
use secrecy::SecretString;
use serde::Serialize;
use std::{fmt, sync::Arc};
use tracing::{info, instrument, warn};

pub const USER_NOT_FOUND: &str = "User not found";
pub const LOGIN_REJECTED: &str = "Login was rejected";

/// Decoded `{success, message?}` answer from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipReply {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginReply {
    pub reply: MembershipReply,
    pub session: Session,
}

/// Session credentials handed out by the backend on login.
#[derive(Clone, Default)]
pub struct Session {
    cookies: Vec<SecretString>,
}

impl Session {
    #[must_use]
    pub const fn new(cookies: Vec<SecretString>) -> Self {
        Self { cookies }
    }

    #[must_use]
    pub fn cookies(&self) -> &[SecretString] {
        &self.cookies
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookies.len())
            .finish()
    }
}

pub trait MembershipBackend: Send + Sync {
    fn check<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Result<MembershipReply, FlowError>>;

    fn login<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Result<LoginReply, FlowError>>;
}

/// Outcome of handing an identity to the membership backend.
#[derive(Debug, Clone)]
pub enum Resolution {
    LoggedIn { session: Session },
    NotFound { message: String },
    LoginRejected { message: String },
    Failed(FlowError),
}

impl Resolution {
    #[must_use]
    pub const fn logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn { .. })
    }

    /// Credentials the backend issued, only present after a successful login.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::LoggedIn { session } => Some(session),
            _ => None,
        }
    }

    /// User-facing message for unsuccessful outcomes.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::LoggedIn { .. } => None,
            Self::NotFound { message } | Self::LoginRejected { message } => Some(message.clone()),
            Self::Failed(err) => Some(err.to_string()),
        }
    }

    #[must_use]
    pub fn outcome(&self) -> MembershipOutcome {
        MembershipOutcome {
            logged_in: self.logged_in(),
            message: self.message(),
        }
    }
}

/// Serializable summary of a [`Resolution`], without session credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipOutcome {
    pub logged_in: bool,
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct MembershipBridge {
    backend: Arc<dyn MembershipBackend>,
}

impl fmt::Debug for MembershipBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MembershipBridge").finish_non_exhaustive()
    }
}

impl MembershipBridge {
    #[must_use]
    pub fn new(backend: Arc<dyn MembershipBackend>) -> Self {
        Self { backend }
    }

    /// Check, then log in. Login is never attempted for a subject whose
    /// existence check did not succeed.
    #[instrument(skip_all, fields(subject_id = %identity.subject_id))]
    pub async fn resolve(&self, identity: &IdentityResult) -> Resolution {
        let exists = match self.backend.check(&identity.subject_id).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("membership check failed: {err}");
                return Resolution::Failed(err);
            }
        };

        if !exists.success {
            info!("no membership account for subject");
            return Resolution::NotFound {
                message: exists.message.unwrap_or_else(|| USER_NOT_FOUND.to_string()),
            };
        }

        match self.backend.login(&identity.subject_id).await {
            Ok(login) if login.reply.success => {
                info!("membership login succeeded");
                Resolution::LoggedIn {
                    session: login.session,
                }
            }
            Ok(login) => {
                warn!("membership login rejected");
                Resolution::LoginRejected {
                    message: login
                        .reply
                        .message
                        .unwrap_or_else(|| LOGIN_REJECTED.to_string()),
                }
            }
            Err(err) => {
                warn!("membership login failed: {err}");
                Resolution::Failed(err)
            }
        }
    }
}
