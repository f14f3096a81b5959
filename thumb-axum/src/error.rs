use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thumb_core::ThumbError;

#[derive(Debug)]
pub struct ThumbAxumError(pub ThumbError);

impl From<ThumbError> for ThumbAxumError {
    fn from(e: ThumbError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ThumbAxumError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::info!(error = %self.0, "request rejected");
        }
        (status, Json(self.0.to_json())).into_response()
    }
}
