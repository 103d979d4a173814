//! Relay actor endpoint

use axum::{
    Router,
    extract::State,
    http::header,
    response::{IntoResponse, Json},
    routing::get,
};

use crate::AppState;
use crate::metrics::HTTP_REQUESTS_TOTAL;

/// Create actor router
///
/// Routes:
/// - GET /actor - Relay actor document
pub fn actor_router() -> Router<AppState> {
    Router::new().route("/actor", get(actor))
}

/// GET /actor
///
/// Content-Type: application/activity+json
async fn actor(State(state): State<AppState>) -> impl IntoResponse {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/actor", "200"])
        .inc();

    (
        [(header::CONTENT_TYPE, "application/activity+json")],
        Json(state.actor.as_ref().clone()),
    )
}
