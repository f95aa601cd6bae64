use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::response::ErrorResponse;
use crate::error::Error;

/// Error response wrapper for converting crate errors to HTTP responses
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    fn status_and_body(&self) -> (StatusCode, ErrorResponse) {
        let message = self.0.to_string();
        match &self.0 {
            Error::Config(_) | Error::Compile(_) | Error::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::bad_data(message))
            }
            Error::Run(_) | Error::ResultType(_) | Error::AmbiguousResult(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::execution(message),
            ),
            Error::Fetch(_) | Error::Decode(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::internal(message),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}
