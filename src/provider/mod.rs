//! Client for the ID provider's signed-transaction broker.
//!
//! Two calls are exposed: [`IdProvider::start`] opens a transaction and
//! [`IdProvider::check`] collects its status. Both carry the broker
//! credentials in the request body; the password is kept in a
//! [`SecretString`] and is never logged. Every call has an absolute timeout,
//! surfaced as [`FlowError::Timeout`].

pub mod hint;
pub mod types;

pub use self::hint::HintCode;
pub use self::types::{CollectStatus, IdentityResult, StatusReport, Transaction};

use self::types::{
    CollectResponse, Envelope, SignRequest, SignResponse, StatusRequest,
};
use crate::{error::FlowError, BoxFuture, APP_USER_AGENT};
use anyhow::Result;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};
use tracing::{debug, instrument, warn};
use url::Url;

/// Absolute deadline applied to every provider call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

pub const DEFAULT_USER_VISIBLE_DATA: &str = "Sign in to application";

/// Signed-authentication service seam used by the flow orchestrator.
pub trait IdProvider: Send + Sync {
    /// Start a new transaction. Each call creates an independent provider-side
    /// transaction; callers guard against double starts.
    fn start(&self) -> BoxFuture<'_, Result<Transaction, FlowError>>;

    /// Collect the current status of a transaction. No retries are performed.
    fn check<'a>(&'a self, transaction_id: &'a str)
        -> BoxFuture<'a, Result<StatusReport, FlowError>>;
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub sign_url: Url,
    pub status_url: Url,
    pub api_user: String,
    pub password: SecretString,
    pub company_api_guid: String,
    pub end_user_ip: IpAddr,
    pub user_visible_data: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(
        sign_url: Url,
        status_url: Url,
        api_user: String,
        password: SecretString,
        company_api_guid: String,
    ) -> Self {
        Self {
            sign_url,
            status_url,
            api_user,
            password,
            company_api_guid,
            end_user_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            user_visible_data: DEFAULT_USER_VISIBLE_DATA.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("sign_url", &self.sign_url.as_str())
            .field("status_url", &self.status_url.as_str())
            .field("api_user", &self.api_user)
            .field("password", &"***")
            .field("company_api_guid", &self.company_api_guid)
            .field("end_user_ip", &self.end_user_ip)
            .field("user_visible_data", &self.user_visible_data)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct ProviderClient {
    client: Client,
    config: ProviderConfig,
}

impl ProviderClient {
    /// Build a provider client with its own connection pool.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Same client and credentials, reporting a different end-user address.
    #[must_use]
    pub fn with_end_user_ip(&self, end_user_ip: IpAddr) -> Self {
        let mut config = self.config.clone();
        config.end_user_ip = end_user_ip;
        Self {
            client: self.client.clone(),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Initiate a signed-authentication transaction.
    ///
    /// # Errors
    /// `Provider` when the broker rejects the call, `Timeout` on deadline,
    /// `InvalidResponse` when the payload cannot be decoded.
    #[instrument(skip(self), fields(end_user_ip = %self.config.end_user_ip))]
    pub async fn initiate(&self) -> Result<Transaction, FlowError> {
        let context = "Sign failed";
        let payload = SignRequest {
            api_user: &self.config.api_user,
            password: self.config.password.expose_secret(),
            company_api_guid: &self.config.company_api_guid,
            end_user_ip: self.config.end_user_ip.to_string(),
            user_visible_data: &self.config.user_visible_data,
            get_qr: true,
        };

        let envelope: Envelope<SignResponse> =
            self.post(&self.config.sign_url, &payload, context).await?;
        let response = unwrap_envelope(envelope, context)?;

        if response.order_ref.trim().is_empty() {
            return Err(FlowError::InvalidResponse(format!(
                "{context}: missing transaction reference"
            )));
        }

        debug!(
            order_ref = %response.order_ref,
            has_challenge = response.qr_image.is_some(),
            "transaction initiated"
        );

        Ok(Transaction {
            transaction_id: response.order_ref,
            challenge_ref: response.qr_image.filter(|qr| !qr.trim().is_empty()),
            auto_start_token: response
                .auto_start_token
                .filter(|token| !token.trim().is_empty()),
        })
    }

    /// Collect the status of a transaction.
    ///
    /// # Errors
    /// `InvalidResponse` when a `complete` status carries no completion data,
    /// otherwise the same errors as [`ProviderClient::initiate`].
    #[instrument(skip(self))]
    pub async fn collect(&self, transaction_id: &str) -> Result<StatusReport, FlowError> {
        let context = "Status check failed";
        let payload = StatusRequest {
            api_user: &self.config.api_user,
            password: self.config.password.expose_secret(),
            company_api_guid: &self.config.company_api_guid,
            order_ref: transaction_id,
        };

        let envelope: Envelope<CollectResponse> =
            self.post(&self.config.status_url, &payload, context).await?;
        let response = unwrap_envelope(envelope, context)?;

        let status = CollectStatus::from_provider(response.status.as_deref());
        let hint_code = response.hint_code.as_deref().map(HintCode::from);

        let identity = if status == CollectStatus::Complete {
            let user = response
                .completion_data
                .and_then(|data| data.user)
                .ok_or_else(|| {
                    FlowError::InvalidResponse(format!(
                        "{context}: Incomplete data for complete status"
                    ))
                })?;
            Some(IdentityResult::from(user))
        } else {
            None
        };

        debug!(
            ?status,
            hint_code = hint_code.as_ref().map(HintCode::as_str),
            has_identity = identity.is_some(),
            "transaction status collected"
        );

        Ok(StatusReport {
            status,
            identity,
            hint_code,
        })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &Url,
        payload: &B,
        context: &str,
    ) -> Result<Envelope<T>, FlowError> {
        let response = self
            .client
            .post(url.clone())
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|err| FlowError::from_transport(context, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlowError::Provider(format!("{context}: HTTP {status}")));
        }

        response.json::<Envelope<T>>().await.map_err(|err| {
            if err.is_timeout() {
                FlowError::Timeout(format!("{context}: request timeout"))
            } else {
                FlowError::InvalidResponse(format!("{context}: {err}"))
            }
        })
    }
}

/// Validate the broker envelope and return the inner provider payload.
fn unwrap_envelope<T>(envelope: Envelope<T>, context: &str) -> Result<T, FlowError> {
    let auth = envelope.auth_response;
    if !auth.as_ref().is_some_and(|auth| auth.success) {
        let message = auth
            .and_then(|auth| auth.error_message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| "Authentication failed".to_string());
        return Err(FlowError::Provider(message));
    }

    let Some(call) = envelope.api_call_response else {
        return Err(FlowError::Provider(format!(
            "{context}: no call response from provider"
        )));
    };

    if !call.success {
        let message = call
            .status_message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("{context}: provider call failed"));
        warn!("provider call failed: {message}");
        return Err(FlowError::Provider(message));
    }

    call.response
        .ok_or_else(|| FlowError::InvalidResponse(format!("{context}: empty provider response")))
}

impl IdProvider for ProviderClient {
    fn start(&self) -> BoxFuture<'_, Result<Transaction, FlowError>> {
        Box::pin(self.initiate())
    }

    fn check<'a>(
        &'a self,
        transaction_id: &'a str,
    ) -> BoxFuture<'a, Result<StatusReport, FlowError>> {
        Box::pin(self.collect(transaction_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn client_for(server: &MockServer, timeout: Duration) -> ProviderClient {
        let base = Url::parse(&server.uri()).unwrap();
        let mut config = ProviderConfig::new(
            base.join("/sign").unwrap(),
            base.join("/status").unwrap(),
            "api-user".to_string(),
            SecretString::from("api-password".to_string()),
            "company-guid".to_string(),
        );
        config.timeout = timeout;
        ProviderClient::new(config).unwrap()
    }

    fn ok_envelope(response: serde_json::Value) -> serde_json::Value {
        json!({
            "authResponse": { "Success": true, "ErrorMessage": null },
            "apiCallResponse": {
                "Success": true,
                "StatusMessage": "OK",
                "Response": response
            }
        })
    }

    #[tokio::test]
    async fn start_returns_transaction() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sign"))
            .and(body_partial_json(json!({
                "apiUser": "api-user",
                "password": "api-password",
                "companyApiGuid": "company-guid",
                "endUserIp": "127.0.0.1",
                "getQr": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope(json!({
                "OrderRef": "T1",
                "AutoStartToken": "AT1",
                "QrImage": "https://img/qr"
            }))))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let transaction = client.start().await.unwrap();
        assert_eq!(
            transaction,
            Transaction {
                transaction_id: "T1".to_string(),
                challenge_ref: Some("https://img/qr".to_string()),
                auto_start_token: Some("AT1".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn start_allows_missing_challenge() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope(json!({
                "OrderRef": "T2",
                "AutoStartToken": "AT2"
            }))))
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let transaction = client.start().await.unwrap();
        assert_eq!(transaction.challenge_ref, None);
        assert_eq!(transaction.auto_start_token.as_deref(), Some("AT2"));
    }

    #[tokio::test]
    async fn start_surfaces_provider_message_verbatim() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "authResponse": { "Success": false, "ErrorMessage": "Invalid API user" },
                "apiCallResponse": null
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let result = client.start().await;
        assert_eq!(
            result,
            Err(FlowError::Provider("Invalid API user".to_string()))
        );
    }

    #[tokio::test]
    async fn start_falls_back_to_generic_message() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "authResponse": { "Success": false, "ErrorMessage": null },
                "apiCallResponse": null
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let result = client.start().await;
        assert_eq!(
            result,
            Err(FlowError::Provider("Authentication failed".to_string()))
        );
    }

    #[tokio::test]
    async fn start_rejects_unsuccessful_call_response() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "authResponse": { "Success": true, "ErrorMessage": null },
                "apiCallResponse": {
                    "Success": false,
                    "StatusMessage": "Already in progress",
                    "Response": null
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let result = client.start().await;
        assert_eq!(
            result,
            Err(FlowError::Provider("Already in progress".to_string()))
        );
    }

    #[tokio::test]
    async fn http_error_is_provider_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sign"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let result = client.start().await;
        assert!(matches!(result, Err(FlowError::Provider(message)) if message.contains("502")));
    }

    #[tokio::test]
    async fn collect_complete_without_completion_data_is_invalid() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/status"))
            .and(body_partial_json(json!({ "orderRef": "T1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope(json!({
                "OrderRef": "T1",
                "Status": "complete"
            }))))
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let result = client.check("T1").await;
        assert!(matches!(result, Err(FlowError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn collect_failed_forwards_hint_without_identity() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope(json!({
                "OrderRef": "T1",
                "Status": "failed",
                "HintCode": "userCancel"
            }))))
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let report = client.check("T1").await.unwrap();
        assert_eq!(report, StatusReport::failed(Some(HintCode::UserCancel)));
    }

    #[tokio::test]
    async fn collect_unknown_status_maps_to_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope(json!({
                "OrderRef": "T1",
                "Status": "somethingElse",
                "CompletionData": {
                    "user": { "personalNumber": "1", "name": "X" }
                }
            }))))
            .mount(&server)
            .await;

        let client = client_for(&server, REQUEST_TIMEOUT);
        let report = client.check("T1").await.unwrap();
        assert_eq!(report.status, CollectStatus::Error);
        assert_eq!(report.identity, None);
    }

    #[tokio::test]
    async fn slow_provider_raises_timeout() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(ok_envelope(json!({ "OrderRef": "T1", "Status": "pending" }))),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(50));
        let result = client.check("T1").await;
        assert!(matches!(result, Err(FlowError::Timeout(_))));
    }

    #[test]
    fn debug_redacts_password() {
        let config = ProviderConfig::new(
            Url::parse("https://broker.example/sign").unwrap(),
            Url::parse("https://broker.example/status").unwrap(),
            "user".to_string(),
            SecretString::from("hunter2".to_string()),
            "guid".to_string(),
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn with_end_user_ip_keeps_credentials() {
        let config = ProviderConfig::new(
            Url::parse("https://broker.example/sign").unwrap(),
            Url::parse("https://broker.example/status").unwrap(),
            "user".to_string(),
            SecretString::from("hunter2".to_string()),
            "guid".to_string(),
        );
        let client = ProviderClient::new(config).unwrap();
        let ip: IpAddr = "198.51.100.7".parse().unwrap();
        let scoped = client.with_end_user_ip(ip);
        assert_eq!(scoped.config().end_user_ip, ip);
        assert_eq!(scoped.config().api_user, "user");
        assert_eq!(scoped.config().password.expose_secret(), "hunter2");
    }
}
