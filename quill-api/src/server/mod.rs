use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use cache::PageCache;
use extract::Json;
use media::{MediaError, MediaStore};
use quill_common::{
    model::{
        Id,
        auth::{AuthTokenDecodeError, HashError},
        group::GroupSlug,
        post::PostMarker,
        user::{UserMarker, Username},
    },
    util::PositiveDuration,
};
use quill_db::{Database, DbError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use url::form_urlencoded;

mod auth;
pub mod cache;
mod extract;
pub mod media;
mod routes;
#[cfg(test)]
mod tests;

pub const LOGIN_PATH: &str = "/auth/login/";

pub type ServerRouter = Router<ServerState>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthSettings {
    /// Tokens never expire when unset.
    pub token_lifetime: Option<PositiveDuration>,
}

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub db: Arc<dyn Database>,
    pub page_cache: Arc<PageCache>,
    pub media: Arc<MediaStore>,
    pub auth_settings: AuthSettings,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// The complete application with request tracing.
pub fn app(state: ServerState) -> Router {
    routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

/// Where an anonymous visitor is sent, remembering what they asked for.
#[must_use]
pub fn login_url(next: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("Hashing failed: {0}")]
    Hash(#[from] HashError),
    #[error("Login required to access {next}")]
    LoginRequired { next: String },
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("User {0} was not found.")]
    UserNotFound(Username),
    #[error("Group {0} was not found.")]
    GroupNotFound(GroupSlug),
    #[error("Post {post_id} by {username} was not found.")]
    PostNotFound {
        username: Username,
        post_id: Id<PostMarker>,
    },
    #[error("User {follower} does not follow {author}.")]
    FollowNotFound {
        follower: Id<UserMarker>,
        author: Username,
    },
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::UserNotFound(_)
            | ServerError::GroupNotFound(_)
            | ServerError::PostNotFound { .. }
            | ServerError::FollowNotFound { .. } => StatusCode::NOT_FOUND,
            ServerError::LoginRequired { .. } => StatusCode::SEE_OTHER,
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Hash(_)
            | ServerError::Database(_)
            | ServerError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let ServerError::LoginRequired { next } = &self {
            debug!(next, "Redirecting anonymous request to login");
            return Redirect::to(&login_url(next)).into_response();
        }

        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
        };
        (status, Json(error_response)).into_response()
    }
}
