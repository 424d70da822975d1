use crate::server::{
    Result, ServerError, ServerRouter,
    extract::{Json, Query},
    routes::{PageQuery, feed_page},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use quill_common::{
    model::{
        group::{Group, GroupSlug},
        post::{PostEntry, PostFilter},
    },
    pagination::Page,
};
use quill_db::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(group_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
struct GroupPath {
    slug: GroupSlug,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct GroupPage {
    group: Group,
    page: Page<PostEntry>,
}

async fn group_posts(
    GroupPath { slug }: GroupPath,
    State(db): State<Arc<dyn Database>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<GroupPage>> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupNotFound(slug))?;
    let page = feed_page(&*db, PostFilter::Group(group.id), query.requested()).await?;

    Ok(Json(GroupPage { group, page }))
}
