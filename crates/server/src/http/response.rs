//! Error replies and rejection recovery

use crate::error::PeripheralError;
use crate::http::models::ErrorBody;
use std::convert::Infallible;
use tracing::{debug, error};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

/// Rejection carrying a failed peripheral operation
#[derive(Debug)]
pub struct ApiError(pub PeripheralError);

impl warp::reject::Reject for ApiError {}

/// Reject a request with `err`
pub fn reject(err: impl Into<PeripheralError>) -> Rejection {
    warp::reject::custom(ApiError(err.into()))
}

fn error_reply(status: StatusCode, detail: impl Into<String>) -> warp::reply::Response {
    let body = ErrorBody {
        detail: detail.into(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

/// Turn every rejection into a `{"detail": ...}` reply
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    if let Some(ApiError(e)) = err.find::<ApiError>() {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        return Ok(error_reply(status, e.to_string()));
    }

    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "Not Found"));
    }

    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        debug!("Malformed request body: {}", e);
        return Ok(error_reply(StatusCode::BAD_REQUEST, e.to_string()));
    }

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method Not Allowed",
        ));
    }

    if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        return Ok(error_reply(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a JSON body",
        ));
    }

    error!("Unhandled rejection: {:?}", err);
    Ok(error_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error",
    ))
}
