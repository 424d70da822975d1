use crate::server::ServerError;
use axum::{
    Json as AxumJson,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query as AxumQuery},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::Serialize;

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumJson), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match to_json_bytes(&self.0) {
            Ok(json) => json_bytes_response(json),
            Err(err) => err.into_response(),
        }
    }
}

#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(AxumQuery), rejection(ServerError))]
pub struct Query<T>(pub T);

pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Bytes, ServerError> {
    Ok(serde_json::to_vec(value)?.into())
}

pub fn json_bytes_response(json: Bytes) -> Response {
    (TypedHeader(ContentType::json()), json).into_response()
}

/// A form page sent back because the submission did not validate.
pub fn unprocessable<T: Serialize>(page: T) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(page)).into_response()
}
