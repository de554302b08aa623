use super::{LoginReply, MembershipBackend, MembershipReply, Session};
use crate::{error::FlowError, BoxFuture, APP_USER_AGENT};
use anyhow::Result;
use reqwest::{header::SET_COOKIE, Client, Response};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

pub const DEFAULT_CHECK_PATH: &str = "/wp-json/bankid/v1/check-user";
pub const DEFAULT_LOGIN_PATH: &str = "/wp-json/bankid/v1/login-user";
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub struct MembershipConfig {
    pub base_url: Url,
    pub check_path: String,
    pub login_path: String,
    pub timeout: Duration,
}

impl MembershipConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            check_path: DEFAULT_CHECK_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, FlowError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|err| FlowError::Membership(format!("invalid endpoint {path}: {err}")))
    }
}

/// HTTP client for the membership backend's existence-check and login calls.
#[derive(Debug, Clone)]
pub struct MembershipClient {
    client: Client,
    config: MembershipConfig,
}

impl MembershipClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: MembershipConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Ask the backend whether an account exists for `subject_id`.
    ///
    /// # Errors
    /// `Membership` on transport failure, timeout, non-2xx status or a body
    /// without a boolean `success`.
    #[instrument(skip(self))]
    pub async fn check_user(&self, subject_id: &str) -> Result<MembershipReply, FlowError> {
        let context = "Failed to check user";
        let mut url = self.config.endpoint(&self.config.check_path)?;
        url.query_pairs_mut()
            .append_pair("personal_number", subject_id);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| transport_error(context, &err))?;

        let (reply, _) = read_reply(response, context).await?;
        debug!(success = reply.success, "membership existence checked");
        Ok(reply)
    }

    /// Log the account in, capturing any session cookies the backend sets.
    ///
    /// # Errors
    /// Same as [`MembershipClient::check_user`].
    #[instrument(skip(self))]
    pub async fn login_user(&self, subject_id: &str) -> Result<LoginReply, FlowError> {
        let context = "Failed to login user";
        let url = self.config.endpoint(&self.config.login_path)?;

        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(&json!({ "personal_number": subject_id }))
            .send()
            .await
            .map_err(|err| transport_error(context, &err))?;

        let (reply, session) = read_reply(response, context).await?;
        debug!(
            success = reply.success,
            cookies = session.len(),
            "membership login answered"
        );
        Ok(LoginReply { reply, session })
    }
}

fn transport_error(context: &str, err: &reqwest::Error) -> FlowError {
    if err.is_timeout() {
        FlowError::Membership(format!("{context}: request timeout"))
    } else {
        FlowError::Membership(format!("{context}: {err}"))
    }
}

async fn read_reply(
    response: Response,
    context: &str,
) -> Result<(MembershipReply, Session), FlowError> {
    let status = response.status();
    let session = Session::new(
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(|value| SecretString::from(value.to_string()))
            .collect(),
    );

    let body = response
        .text()
        .await
        .map_err(|err| transport_error(context, &err))?;

    let data: Value = serde_json::from_str(extract_json(&body)).map_err(|err| {
        warn!("undecodable membership response: {err}");
        FlowError::Membership(format!("{context}: invalid response from backend"))
    })?;

    let message = data
        .get("message")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    if !status.is_success() {
        return Err(FlowError::Membership(
            message.unwrap_or_else(|| format!("{context}: backend returned {status}")),
        ));
    }

    let Some(success) = data.get("success").and_then(Value::as_bool) else {
        return Err(FlowError::Membership(format!(
            "{context}: invalid response format"
        )));
    };

    Ok((MembershipReply { success, message }, session))
}

/// Slice out the JSON object of a body that may carry leading or trailing
/// noise (PHP notices, BOMs). Bodies without braces are returned unchanged.
#[must_use]
pub fn extract_json(body: &str) -> &str {
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start <= end => &body[start..=end],
        _ => body,
    }
}

impl MembershipBackend for MembershipClient {
    fn check<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Result<MembershipReply, FlowError>> {
        Box::pin(self.check_user(subject_id))
    }

    fn login<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Result<LoginReply, FlowError>> {
        Box::pin(self.login_user(subject_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn client_for(server: &MockServer) -> MembershipClient {
        let config = MembershipConfig::new(Url::parse(&server.uri()).unwrap());
        MembershipClient::new(config).unwrap()
    }

    #[test]
    fn extract_json_strips_noise() {
        assert_eq!(
            extract_json("Notice: deprecated\n{\"success\":true}\n"),
            "{\"success\":true}"
        );
        assert_eq!(extract_json("plain"), "plain");
        assert_eq!(extract_json("}{"), "}{");
    }

    #[test]
    fn endpoint_joins_base_with_path() {
        let config = MembershipConfig::new(Url::parse("https://members.example/site/").unwrap());
        assert_eq!(
            config.endpoint(DEFAULT_CHECK_PATH).unwrap().as_str(),
            "https://members.example/site/wp-json/bankid/v1/check-user"
        );
    }

    #[tokio::test]
    async fn check_user_reads_success_flag() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DEFAULT_CHECK_PATH))
            .and(query_param("personal_number", "199001011234"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<br/>Warning: x\n{\"success\":true,\"message\":\"found\"}"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server).check("199001011234").await.unwrap();
        assert_eq!(
            reply,
            MembershipReply {
                success: true,
                message: Some("found".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn non_boolean_success_is_membership_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DEFAULT_CHECK_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"success\":\"yes\"}"))
            .mount(&server)
            .await;

        let result = client_for(&server).check("1").await;
        assert!(matches!(result, Err(FlowError::Membership(_))));
    }

    #[tokio::test]
    async fn error_status_prefers_backend_message() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DEFAULT_CHECK_PATH))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("{\"message\":\"forbidden\"}"),
            )
            .mount(&server)
            .await;

        let result = client_for(&server).check("1").await;
        assert_eq!(result, Err(FlowError::Membership("forbidden".to_string())));
    }

    #[tokio::test]
    async fn login_captures_session_cookies() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEFAULT_LOGIN_PATH))
            .and(body_json(json!({ "personal_number": "199001011234" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("Set-Cookie", "wordpress_logged_in=abc; Path=/")
                    .append_header("Set-Cookie", "wp_session=def; Path=/")
                    .set_body_string("{\"success\":true}"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let login = client_for(&server).login("199001011234").await.unwrap();
        assert!(login.reply.success);
        assert_eq!(login.session.len(), 2);
        assert_eq!(
            login.session.cookies()[0].expose_secret(),
            "wordpress_logged_in=abc; Path=/"
        );
    }
}
