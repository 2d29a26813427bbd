use axum::{
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;

#[derive(Debug)]
/// An error that can be returned by the API
/// and will be converted into a JSON response.
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ApiError {
    fn payload(&self) -> serde_json::Value {
        json!({
            "message": self.message,
            "status": self.status.as_u16(),
        })
    }

    /// Status code and serialized JSON body of the error.
    pub(crate) fn into_parts(self) -> (StatusCode, Vec<u8>) {
        let body = serde_json::to_vec(&self.payload()).unwrap_or_default();
        (self.status, body)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = self.into_parts();

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
