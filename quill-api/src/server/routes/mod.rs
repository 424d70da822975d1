use crate::server::{Result, ServerError, ServerRouter};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::routing::TypedPath;
use quill_common::{
    model::{
        post::{PostEntry, PostFilter},
        user::{User, Username},
    },
    pagination::{Page, Paginator, parse_page_number},
};
use quill_db::Database;
use serde::Deserialize;

mod accounts;
mod groups;
mod index;
mod posts;
mod profiles;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(index::routes())
        .merge(groups::routes())
        .merge(posts::routes())
        .merge(profiles::routes())
        .merge(accounts::routes())
}

/// `?page=` as sent; anything unparsable means the first page.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    fn requested(&self) -> i64 {
        parse_page_number(self.page.as_deref())
    }
}

async fn feed_page(
    db: &dyn Database,
    filter: PostFilter,
    requested: i64,
) -> Result<Page<PostEntry>> {
    let paginator = Paginator::new(db.count_posts(filter).await?);
    let window = paginator.window(requested);
    let posts = db.fetch_posts(filter, window).await?;

    Ok(paginator.page(window, posts))
}

async fn find_user(db: &dyn Database, username: &Username) -> Result<User> {
    db.fetch_user_by_username(username)
        .await?
        .ok_or_else(|| ServerError::UserNotFound(username.clone()))
}

fn redirect_to<P: TypedPath>(path: &P) -> Response {
    Redirect::to(&path.to_string()).into_response()
}
