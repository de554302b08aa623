//! HTTP surface hosting authentication attempts for browsers.

pub mod handlers;
pub mod registry;

pub use self::registry::{FlowRegistry, ProviderFactory};

use self::handlers::{flows, health};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

/// Build the router with request ids, tracing and CORS for the host origin.
#[must_use]
pub fn router(registry: Arc<FlowRegistry>, host_origin: Option<HeaderValue>) -> Router {
    let cors = match host_origin {
        Some(origin) => CorsLayer::new()
            .allow_headers([CONTENT_TYPE])
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_origin(AllowOrigin::exact(origin)),
        None => CorsLayer::new(),
    };

    Router::new()
        .route("/health", get(health).options(health))
        .route("/v1/flows", post(flows::create))
        .route("/v1/flows/:id", get(flows::show).delete(flows::cancel))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(registry)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, registry: Arc<FlowRegistry>, host_url: Option<&str>) -> Result<()> {
    let host_origin = host_url.map(host_origin).transpose()?;
    let app = router(registry, host_origin);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Reduce the host page URL to the origin allowed by CORS.
///
/// # Errors
/// Returns an error if the URL is invalid or has no host.
pub fn host_origin(host_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(host_url).with_context(|| format!("Invalid host URL: {host_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Host URL must include a valid host: {host_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build host origin header")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[test]
    fn host_origin_strips_path() {
        assert_eq!(
            host_origin("https://members.example:8443/wp-login.php").unwrap(),
            "https://members.example:8443"
        );
        assert_eq!(
            host_origin("https://members.example/").unwrap(),
            "https://members.example"
        );
        assert!(host_origin("not a url").is_err());
    }

    #[tokio::test]
    async fn router_sets_request_id_and_cors() {
        let app = router(
            Arc::new(registry::tests::registry(None)),
            Some(host_origin("https://members.example").unwrap()),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Origin", "https://members.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .unwrap();
        assert!(Ulid::from_string(request_id).is_ok());
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://members.example"
        );
    }
}
