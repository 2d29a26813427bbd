use std::sync::Arc;

use axum::{
    body::Bytes,
    extract,
    http::{StatusCode, Uri, header},
    response::IntoResponse,
};

use crate::api::{api_error::ApiError, state::ApiServerState};

pub(crate) const ROOT_MESSAGE: &str = "pod-label-webhook is running";

/// Liveness probe, reachable from a browser as well.
pub(crate) async fn root_handler() -> &'static str {
    ROOT_MESSAGE
}

pub(crate) async fn readiness_handler() -> StatusCode {
    StatusCode::OK
}

#[tracing::instrument(
    name = "mutation",
    fields(
        request_uid=tracing::field::Empty,
        host=crate::config::HOSTNAME.as_str(),
        name=tracing::field::Empty,
        namespace=tracing::field::Empty,
        operation=tracing::field::Empty,
        kind=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
    ),
    skip_all)]
/// Admission webhook entrypoint.
///
/// The body is taken as raw bytes: malformed envelopes must be answered
/// with `400 Bad Request`, which is decided by the codec rather than by
/// an axum extractor.
pub(crate) async fn mutate_handler(
    extract::State(state): extract::State<Arc<ApiServerState>>,
    body: Bytes,
) -> impl IntoResponse {
    let (status, body) = state
        .mutation_handler
        .clone()
        .handle_with_deadline(body)
        .await;

    (status, [(header::CONTENT_TYPE, "application/json")], body)
}

pub(crate) async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        message: format!("no route for {}", uri.path()),
    }
}
