//! Engine errors as HTTP responses
//!
//! Handlers return `Result<impl Reply, ApiError>` instead of rejecting:
//! a failed engine call is final and must not fall through to other routes.
//! [`into_response`] flattens that result for `.map(..)`.

use flex_core::FlexError;
use serde_json::{json, Value as Json};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

#[derive(Debug)]
pub enum ApiError {
    /// Identity header absent or empty
    MissingIdentity(&'static str),
    Engine(FlexError),
}

impl From<FlexError> for ApiError {
    fn from(err: FlexError) -> Self {
        ApiError::Engine(err)
    }
}

impl ApiError {
    fn status_code_body(self) -> (StatusCode, Json) {
        let err = match self {
            ApiError::MissingIdentity(header) => {
                return (
                    StatusCode::UNAUTHORIZED,
                    json!({"error": "unauthorized", "message": format!("missing {header} header")}),
                )
            }
            ApiError::Engine(err) => err,
        };

        let code = err.code();
        let message = err.to_string();
        match err {
            FlexError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"error": code, "message": message, "fields": errors}),
            ),
            FlexError::InvalidQuery { field, reason } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"error": code, "message": message, "fields": [{"field": field, "code": "invalid", "reason": reason}]}),
            ),
            FlexError::SchemaConflict(conflict) => (
                StatusCode::CONFLICT,
                json!({"error": code, "message": message, "conflict": conflict}),
            ),
            FlexError::WriteConflict { actual, .. } => (
                StatusCode::CONFLICT,
                json!({"error": code, "message": message, "currentUpdatedAt": actual}),
            ),
            FlexError::NotFound(_) => (StatusCode::NOT_FOUND, json!({"error": code, "message": message})),
            FlexError::Expired { .. } => (StatusCode::GONE, json!({"error": code, "message": message})),
            FlexError::Storage(_) => {
                tracing::error!("Storage failure: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": code, "message": "internal storage error"}),
                )
            }
        }
    }
}

impl Reply for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_code_body();
        warp::reply::with_status(warp::reply::json(&body), status).into_response()
    }
}

pub fn into_response<S: Reply, E: Reply>(reply_res: Result<S, E>) -> Response {
    match reply_res {
        Ok(resp) => resp.into_response(),
        Err(err) => err.into_response(),
    }
}
