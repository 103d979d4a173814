//! Well-known endpoints
//!
//! - /.well-known/webfinger
//! - /.well-known/nodeinfo
//! - /nodeinfo/2.0

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;

const NODEINFO_SCHEMA: &str = "http://nodeinfo.diaspora.software/ns/schema/2.0";

/// Create well-known router
///
/// Routes:
/// - GET /.well-known/webfinger
/// - GET /.well-known/nodeinfo
/// - GET /nodeinfo/2.0
pub fn wellknown_router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/webfinger", get(webfinger))
        .route("/.well-known/nodeinfo", get(nodeinfo_links))
        .route("/nodeinfo/2.0", get(nodeinfo))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: Option<String>,
}

/// Split `acct:user@domain` (or bare `user@domain`) into its parts.
fn parse_acct(resource: &str) -> Option<(&str, &str)> {
    let acct = resource.strip_prefix("acct:").unwrap_or(resource);
    let (username, domain) = acct.split_once('@')?;
    if username.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some((username, domain))
}

/// GET /.well-known/webfinger
///
/// Only the relay actor is discoverable.
///
/// Query: ?resource=acct:relay@domain
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
) -> Result<impl IntoResponse, AppError> {
    let resource = query
        .resource
        .as_deref()
        .map(str::trim)
        .filter(|resource| !resource.is_empty())
        .ok_or_else(|| AppError::Validation("Missing resource parameter".to_string()))?;

    let (username, domain) = parse_acct(resource).ok_or(AppError::NotFound)?;

    if !username.eq_ignore_ascii_case(&state.config.actor.username)
        || !domain.eq_ignore_ascii_case(&state.config.server.domain)
    {
        tracing::debug!(resource, "WebFinger lookup for unknown resource");
        return Err(AppError::NotFound);
    }

    let actor_url = &state.actor.id;
    let body = Json(serde_json::json!({
        "subject": format!(
            "acct:{}@{}",
            state.config.actor.username, state.config.server.domain
        ),
        "aliases": [actor_url],
        "links": [
            {
                "rel": "self",
                "type": "application/activity+json",
                "href": actor_url
            }
        ]
    }));

    Ok(([(header::CONTENT_TYPE, "application/jrd+json")], body))
}

/// GET /.well-known/nodeinfo
///
/// Returns links to nodeinfo documents.
async fn nodeinfo_links(State(state): State<AppState>) -> Json<serde_json::Value> {
    let base_url = state.config.server.base_url();
    Json(serde_json::json!({
        "links": [
            {
                "rel": NODEINFO_SCHEMA,
                "href": format!("{}/nodeinfo/2.0", base_url)
            }
        ]
    }))
}

/// GET /nodeinfo/2.0
async fn nodeinfo() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": "2.0",
        "software": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "protocols": ["activitypub"],
        "services": {
            "inbound": [],
            "outbound": []
        },
        "openRegistrations": false,
        "usage": {
            "users": {
                "total": 1
            }
        },
        "metadata": {}
    }))
}
