//! Inbox endpoint
//!
//! Adapts an HTTP delivery into an `InboundRequest` and maps the
//! pipeline's verdict back onto a response.

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, OriginalUri, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
};
use tower_http::limit::RequestBodyLimitLayer;

use crate::AppState;
use crate::federation::{InboundRequest, InboxRejection, VerificationOutcome};
use crate::metrics::{HTTP_REQUESTS_TOTAL, INBOX_ACTIVITIES_TOTAL, INBOX_REJECTIONS_TOTAL};

/// Create inbox router
///
/// Routes:
/// - POST /inbox - Shared inbox
///
/// Bodies larger than `max_body_bytes` are refused with 413 before the
/// pipeline runs.
pub fn inbox_router(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/inbox", post(inbox))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
}

impl IntoResponse for InboxRejection {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// POST /inbox
///
/// # Steps
/// 1. Buffer the body and capture the request target
/// 2. Run the admission pipeline
/// 3. 202 on accept, the rejection's status otherwise
async fn inbox(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest {
        method,
        path_and_query: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers,
        body,
    };

    match state.inbox.process(&request).await {
        VerificationOutcome::Accepted(activity) => {
            tracing::info!(
                activity_type = %activity.activity_type,
                activity_id = %activity.id,
                actor = %activity.actor,
                "Activity accepted"
            );
            INBOX_ACTIVITIES_TOTAL
                .with_label_values(&[activity.activity_type.as_str()])
                .inc();
            HTTP_REQUESTS_TOTAL
                .with_label_values(&["POST", "/inbox", "202"])
                .inc();

            StatusCode::ACCEPTED.into_response()
        }
        VerificationOutcome::Rejected(rejection) => {
            let status = rejection.status_code();
            if status.is_server_error() {
                tracing::error!(error = %rejection, "Inbox delivery failed");
            } else {
                tracing::warn!(
                    reason = rejection.reason(),
                    error = %rejection,
                    "Inbox delivery rejected"
                );
            }
            INBOX_REJECTIONS_TOTAL
                .with_label_values(&[rejection.reason()])
                .inc();
            HTTP_REQUESTS_TOTAL
                .with_label_values(&["POST", "/inbox", status.as_str()])
                .inc();

            rejection.into_response()
        }
    }
}
