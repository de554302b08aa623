use crate::{
    api::registry::FlowRegistry,
    flow::{ClientContext, FlowSnapshot},
};
use axum::{
    extract::{ConnectInfo, Extension, Path},
    http::{
        header::{SET_COOKIE, USER_AGENT},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tracing::{debug, instrument, warn};
use ulid::Ulid;

#[derive(Debug, Default, Deserialize)]
pub struct CreateFlow {
    /// Page the ID app should return the browser to.
    pub return_url: Option<String>,
}

/// End-user address: first `X-Forwarded-For` hop, then the peer address.
fn end_user_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|hop| hop.trim().parse::<IpAddr>().ok())
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("flow {id} not found") })),
    )
        .into_response()
}

#[instrument(skip_all)]
pub async fn create(
    Extension(registry): Extension<Arc<FlowRegistry>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<CreateFlow>>,
) -> impl IntoResponse {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let ip = end_user_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    debug!(%ip, %user_agent, "creating flow");

    let snapshot = registry
        .create(
            ClientContext {
                user_agent,
                return_url: request.return_url.filter(|url| !url.trim().is_empty()),
            },
            ip,
        )
        .await;

    (StatusCode::CREATED, Json(snapshot))
}

pub async fn show(
    Extension(registry): Extension<Arc<FlowRegistry>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(flow_id) = Ulid::from_string(&id) else {
        return not_found(&id);
    };

    match registry.get(flow_id).await {
        Some(snapshot) => {
            let cookies = session_cookies(&snapshot);
            let mut response = Json(snapshot).into_response();
            response.headers_mut().extend(cookies);
            response
        }
        None => not_found(&id),
    }
}

/// `Set-Cookie` headers for the membership session once the login finished.
fn session_cookies(snapshot: &FlowSnapshot) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(session) = snapshot.session.as_ref().filter(|_| snapshot.login_complete) else {
        return headers;
    };
    for cookie in session.cookies() {
        match HeaderValue::from_str(cookie.expose_secret()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => warn!(flow_id = %snapshot.id, "skipping session cookie: {err}"),
        }
    }
    headers
}

pub async fn cancel(
    Extension(registry): Extension<Arc<FlowRegistry>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(flow_id) = Ulid::from_string(&id) else {
        return not_found(&id);
    };

    if registry.cancel(flow_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(&id)
    }
}
