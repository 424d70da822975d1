use crate::server::{
    AuthSettings, Result, ServerError, ServerRouter,
    extract::{Json, Query, unprocessable},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use quill_common::{
    form::{FormErrors, INVALID_LOGIN, LoginForm, NON_FIELD_ERRORS, SignupForm, USERNAME_TAKEN},
    model::{
        Id,
        auth::{AuthToken, Authentication, PasswordHash},
        user::{CreateUser, User, UserMarker},
    },
};
use quill_db::{Database, DbError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(login_form)
        .typed_post(login)
        .typed_get(signup_form)
        .typed_post(signup)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login/", rejection(ServerError))]
struct LoginPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup/", rejection(ServerError))]
struct SignupPath();

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct LoginPage {
    form: LoginForm,
    errors: FormErrors,
    next: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct SignupPage {
    form: SignupForm,
    errors: FormErrors,
}

/// A freshly issued bearer token. It is never shown again.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct SessionPage {
    user: User,
    token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

async fn issue_token(
    db: &dyn Database,
    user_id: Id<UserMarker>,
    settings: AuthSettings,
) -> Result<String> {
    let token = AuthToken::generate_random(user_id);
    let authentication = Authentication {
        user: user_id,
        token_hash: token.hash()?,
        created_at: UtcDateTime::now(),
        expires_after: settings.token_lifetime,
    };
    db.create_auth(&authentication).await?;

    Ok(token.as_token_str())
}

async fn login_form(
    LoginPath(): LoginPath,
    Query(NextQuery { next }): Query<NextQuery>,
) -> Json<LoginPage> {
    Json(LoginPage {
        form: LoginForm::default(),
        errors: FormErrors::default(),
        next,
    })
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<dyn Database>>,
    State(settings): State<AuthSettings>,
    Query(NextQuery { next }): Query<NextQuery>,
    Json(form): Json<LoginForm>,
) -> Result<Response> {
    let (username, password) = match form.clean() {
        Ok(credentials) => credentials,
        Err(errors) => return Ok(unprocessable(LoginPage { form, errors, next })),
    };

    let mut verified = None;
    if let Some(user) = db.fetch_user_by_username(&username).await?
        && let Some(password_hash) = db.fetch_password_hash(user.id).await?
        && password_hash.verify(&password)?
    {
        verified = Some(user);
    }
    let Some(user) = verified else {
        debug!(%username, "Rejected login");
        let errors = FormErrors::single(NON_FIELD_ERRORS, INVALID_LOGIN);
        return Ok(unprocessable(LoginPage { form, errors, next }));
    };

    let token = issue_token(&*db, user.id, settings).await?;
    info!(user = %user.id, "User logged in");

    Ok(Json(SessionPage { user, token, next }).into_response())
}

async fn signup_form(SignupPath(): SignupPath) -> Json<SignupPage> {
    Json(SignupPage {
        form: SignupForm::default(),
        errors: FormErrors::default(),
    })
}

async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<dyn Database>>,
    State(settings): State<AuthSettings>,
    Json(form): Json<SignupForm>,
) -> Result<Response> {
    let clean = match form.clean() {
        Ok(clean) => clean,
        Err(errors) => return Ok(unprocessable(SignupPage { form, errors })),
    };

    let password_hash = PasswordHash::generate(&clean.password)?;
    let new_user = CreateUser {
        username: clean.username,
        email: clean.email,
    };
    let user = match db.create_user(&new_user, &password_hash).await {
        Ok(user) => user,
        Err(DbError::Conflict(_)) => {
            let errors = FormErrors::single("username", USERNAME_TAKEN);
            return Ok(unprocessable(SignupPage { form, errors }));
        }
        Err(err) => return Err(err.into()),
    };

    let token = issue_token(&*db, user.id, settings).await?;
    info!(user = %user.id, username = %user.username, "User signed up");

    let session = SessionPage {
        user,
        token,
        next: None,
    };
    Ok((StatusCode::CREATED, Json(session)).into_response())
}
