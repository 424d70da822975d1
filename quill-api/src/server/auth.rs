use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use quill_common::model::{Id, auth::AuthToken, user::UserMarker};
use quill_db::Database;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user a request's bearer token belongs to.
///
/// Used directly, anonymous requests are redirected to the login page. As
/// `Option<AuthenticatedUser>` they are let through as `None`. A token that
/// cannot even be parsed is rejected either way.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }
}

async fn authenticate<S>(
    parts: &mut Parts,
    state: &S,
) -> Result<Option<AuthenticatedUser>, ServerError>
where
    Arc<dyn Database>: FromRef<S>,
    S: Send + Sync,
{
    let header =
        <AuthorizationHeader as FromRequestParts<S>>::from_request_parts(parts, state).await;
    let header = match header {
        Ok(TypedHeader(header)) => header,
        Err(rejection) if rejection.is_missing() => return Ok(None),
        Err(rejection) => return Err(ServerError::InvalidAuthorizationHeader(rejection)),
    };

    let request_token: AuthToken = header.token().parse()?;
    let token_hash = request_token.hash()?;

    let Some(authentication) = Arc::<dyn Database>::from_ref(state)
        .fetch_auth(&token_hash)
        .await?
    else {
        debug!(user = %request_token.user_id, "Unknown auth token");
        return Ok(None);
    };

    if authentication.user != request_token.user_id {
        debug!(user = %request_token.user_id, "Auth token belongs to another user");
        return Ok(None);
    }
    if authentication.is_expired_at(UtcDateTime::now()) {
        debug!(user = %authentication.user, "Auth token expired");
        return Ok(None);
    }

    Ok(Some(AuthenticatedUser {
        id: authentication.user,
    }))
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Database>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .await?
            .ok_or_else(|| ServerError::LoginRequired {
                next: parts
                    .uri
                    .path_and_query()
                    .map_or_else(|| parts.uri.path().to_owned(), ToString::to_string),
            })
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Database>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        authenticate(parts, state).await
    }
}
