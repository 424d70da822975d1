use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    extract::{Json, Query},
    routes::{PageQuery, feed_page, find_user, redirect_to},
};
use axum::{extract::State, response::Response};
use axum_extra::routing::{RouterExt, TypedPath};
use quill_common::{
    model::{
        follow::{Follow, FollowCounts},
        post::{PostEntry, PostFilter},
        user::{User, Username},
    },
    pagination::Page,
};
use quill_db::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(follow_feed)
        .typed_get(profile)
        .typed_get(follow)
        .typed_get(unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/follow/", rejection(ServerError))]
struct FollowFeedPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/", rejection(ServerError))]
struct ProfilePath {
    username: Username,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/follow/", rejection(ServerError))]
struct FollowPath {
    username: Username,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/unfollow/", rejection(ServerError))]
struct UnfollowPath {
    username: Username,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct FollowFeedPage {
    page: Page<PostEntry>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ProfilePage {
    author: User,
    post_count: u64,
    follow_counts: FollowCounts,
    /// Whether the viewer follows the author; only shown to other logged-in users.
    #[serde(skip_serializing_if = "Option::is_none")]
    following: Option<bool>,
    page: Page<PostEntry>,
}

/// Posts by everyone the viewer follows.
async fn follow_feed(
    FollowFeedPath(): FollowFeedPath,
    State(db): State<Arc<dyn Database>>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<FollowFeedPage>> {
    let filter = PostFilter::FollowedBy(user.user_id());
    let page = feed_page(&*db, filter, query.requested()).await?;

    Ok(Json(FollowFeedPage { page }))
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    State(db): State<Arc<dyn Database>>,
    viewer: Option<AuthenticatedUser>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ProfilePage>> {
    let author = find_user(&*db, &username).await?;
    let page = feed_page(&*db, PostFilter::Author(author.id), query.requested()).await?;
    let follow_counts = db.fetch_follow_counts(author.id).await?;

    let following = match viewer {
        Some(viewer) if viewer.user_id() != author.id => Some(
            db.follow_exists(Follow {
                follower: viewer.user_id(),
                author: author.id,
            })
            .await?,
        ),
        _ => None,
    };

    Ok(Json(ProfilePage {
        author,
        post_count: page.count,
        follow_counts,
        following,
        page,
    }))
}

/// Following twice, or following oneself, changes nothing.
async fn follow(
    FollowPath { username }: FollowPath,
    State(db): State<Arc<dyn Database>>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let author = find_user(&*db, &username).await?;
    let follow = Follow {
        follower: user.user_id(),
        author: author.id,
    };

    if !follow.is_self_follow() && db.create_follow(follow).await? {
        info!(follower = %follow.follower, author = %follow.author, "Followed author");
    }

    Ok(redirect_to(&ProfilePath { username }))
}

async fn unfollow(
    UnfollowPath { username }: UnfollowPath,
    State(db): State<Arc<dyn Database>>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let author = find_user(&*db, &username).await?;
    let follow = Follow {
        follower: user.user_id(),
        author: author.id,
    };

    if !db.delete_follow(follow).await? {
        return Err(ServerError::FollowNotFound {
            follower: follow.follower,
            author: username,
        });
    }
    info!(follower = %follow.follower, author = %follow.author, "Unfollowed author");

    Ok(redirect_to(&ProfilePath { username }))
}
