use crate::server::{
    Result, ServerError, ServerRouter,
    cache::PageCache,
    extract::{Query, json_bytes_response, to_json_bytes},
    routes::{PageQuery, feed_page},
};
use axum::{extract::State, response::Response};
use axum_extra::routing::{RouterExt, TypedPath};
use quill_common::{
    model::post::{PostEntry, PostFilter},
    pagination::Page,
};
use quill_db::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(index)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
pub struct IndexPath();

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct IndexPage {
    page: Page<PostEntry>,
}

/// The landing page is served from the page cache while it is fresh.
async fn index(
    IndexPath(): IndexPath,
    State(db): State<Arc<dyn Database>>,
    State(page_cache): State<Arc<PageCache>>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let requested = query.requested();
    if let Some(body) = page_cache.get(requested) {
        debug!(page = requested, "Serving cached index page");
        return Ok(json_bytes_response(body));
    }

    let page = feed_page(&*db, PostFilter::All, requested).await?;
    let body = to_json_bytes(&IndexPage { page })?;
    page_cache.insert(requested, body.clone());

    Ok(json_bytes_response(body))
}
