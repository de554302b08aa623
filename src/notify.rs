//! One-way outcome messages for the embedding host page.

use crate::{BoxFuture, APP_USER_AGENT};
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Message delivered to the host, serialized as `{"type": …, "data": {…}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum HostMessage {
    #[serde(rename = "BANKID_LOGIN_SUCCESS", rename_all = "camelCase")]
    LoginSuccess {
        personal_number: String,
        name: String,
        redirect: String,
    },
    #[serde(rename = "BANKID_USER_NOT_FOUND", rename_all = "camelCase")]
    UserNotFound {
        personal_number: String,
        name: String,
    },
    #[serde(rename = "BANKID_LOGIN_ERROR")]
    LoginError { error: String },
}

impl HostMessage {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LoginSuccess { .. } => "BANKID_LOGIN_SUCCESS",
            Self::UserNotFound { .. } => "BANKID_USER_NOT_FOUND",
            Self::LoginError { .. } => "BANKID_LOGIN_ERROR",
        }
    }
}

/// Where the host should send the browser to finish the first-party login.
#[must_use]
pub fn login_redirect(base: &Url, personal_number: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("personal_number", personal_number);
    url
}

pub trait HostNotifier: Send + Sync {
    fn notify<'a>(&'a self, message: &'a HostMessage) -> BoxFuture<'a, Result<()>>;
}

/// Posts messages as JSON to the trusted host endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    target: Url,
}

impl WebhookNotifier {
    /// # Errors
    /// Rejects a wildcard target or anything that is not an HTTP(S) URL.
    pub fn new(target: &str, timeout: Duration) -> Result<Self> {
        let target = target.trim();
        if target == "*" {
            return Err(anyhow!("host target must be an explicit origin, not '*'"));
        }

        let target =
            Url::parse(target).with_context(|| format!("invalid host target: {target}"))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(anyhow!(
                "host target must use http or https, got '{}'",
                target.scheme()
            ));
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, target })
    }

    #[must_use]
    pub const fn target(&self) -> &Url {
        &self.target
    }
}

impl HostNotifier for WebhookNotifier {
    fn notify<'a>(&'a self, message: &'a HostMessage) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.target.clone())
                .json(message)
                .send()
                .await
                .context("failed to deliver host message")?;

            let status = response.status();
            if !status.is_success() {
                return Err(anyhow!("host rejected message: {status}"));
            }

            debug!(kind = message.kind(), "host message delivered");
            Ok(())
        })
    }
}

/// In-process sink, used by the terminal front end.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<HostMessage>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostNotifier for ChannelNotifier {
    fn notify<'a>(&'a self, message: &'a HostMessage) -> BoxFuture<'a, Result<()>> {
        let sent = self
            .tx
            .send(message.clone())
            .map_err(|_| anyhow!("host message receiver dropped"));
        Box::pin(async move { sent })
    }
}

/// Writes messages to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl HostNotifier for LogNotifier {
    fn notify<'a>(&'a self, message: &'a HostMessage) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let payload = serde_json::to_string(message)?;
            info!(kind = message.kind(), "host message: {payload}");
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    #[test]
    fn messages_use_host_wire_shape() {
        let success = HostMessage::LoginSuccess {
            personal_number: "199001011234".to_string(),
            name: "Anna Andersson".to_string(),
            redirect: "https://members.example/done?personal_number=199001011234".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({
                "type": "BANKID_LOGIN_SUCCESS",
                "data": {
                    "personalNumber": "199001011234",
                    "name": "Anna Andersson",
                    "redirect": "https://members.example/done?personal_number=199001011234"
                }
            })
        );

        let error = HostMessage::LoginError {
            error: "took too long, try again".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({ "type": "BANKID_LOGIN_ERROR", "data": { "error": "took too long, try again" } })
        );
    }

    #[test]
    fn login_redirect_encodes_personal_number() {
        let base = Url::parse("https://members.example/process-login/").unwrap();
        assert_eq!(
            login_redirect(&base, "19900101 1234").as_str(),
            "https://members.example/process-login/?personal_number=19900101+1234"
        );
    }

    #[test]
    fn webhook_rejects_wildcard_and_non_http_targets() {
        assert!(WebhookNotifier::new("*", DEFAULT_TIMEOUT).is_err());
        assert!(WebhookNotifier::new("ftp://host.example/", DEFAULT_TIMEOUT).is_err());
        assert!(WebhookNotifier::new("https://host.example/hook", DEFAULT_TIMEOUT).is_ok());
    }

    #[tokio::test]
    async fn channel_notifier_forwards_messages() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let message = HostMessage::LoginError {
            error: "boom".to_string(),
        };
        notifier.notify(&message).await.unwrap();
        assert_eq!(rx.recv().await, Some(message));
    }

    #[tokio::test]
    async fn webhook_posts_json() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({
                "type": "BANKID_USER_NOT_FOUND",
                "data": { "personalNumber": "1", "name": "X" }
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&format!("{}/hook", server.uri()), DEFAULT_TIMEOUT).unwrap();
        notifier
            .notify(&HostMessage::UserNotFound {
                personal_number: "1".to_string(),
                name: "X".to_string(),
            })
            .await
            .unwrap();
    }
}
