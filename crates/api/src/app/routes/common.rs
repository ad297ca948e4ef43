use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;

use equiplend_core::DomainError;

use crate::app::errors;

/// Parse a path identifier, answering 400 when malformed.
pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

/// Unwrap a JSON body, answering 400 with the extractor's reason.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text()))
}

/// Wrap a service outcome in the response envelope.
pub fn respond<T: serde::Serialize>(
    result: equiplend_infra::ServiceResult<T>,
    status: StatusCode,
    message: &str,
) -> Response {
    match result {
        Ok(data) => errors::json_ok(status, message, data),
        Err(e) => errors::service_error_to_response(e),
    }
}
