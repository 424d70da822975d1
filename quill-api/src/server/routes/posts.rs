use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    extract::{Json, unprocessable},
    media::MediaStore,
    routes::{index::IndexPath, redirect_to},
};
use axum::{
    Json as AxumJson,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use quill_common::{
    form::{Choice, CommentForm, FormErrors, PostForm},
    model::{
        Id,
        comment::{CommentEntry, CreateComment},
        follow::FollowCounts,
        group::Group,
        post::{CreatePost, PostContent, PostEntry, PostFilter, PostMarker},
        user::{User, Username},
    },
};
use quill_db::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(new_post_form)
        .typed_post(create_post)
        .typed_get(post_detail)
        .typed_get(edit_post_form)
        .typed_post(edit_post)
        .typed_post(add_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/new/", rejection(ServerError))]
struct NewPostPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/{post_id}/", rejection(ServerError))]
struct PostPath {
    username: Username,
    post_id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/{post_id}/edit/", rejection(ServerError))]
struct EditPostPath {
    username: Username,
    post_id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/{post_id}/comment/", rejection(ServerError))]
struct CommentPath {
    username: Username,
    post_id: Id<PostMarker>,
}

/// The post form, for both new posts and edits.
#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct PostFormPage {
    form: PostForm,
    groups: Vec<Group>,
    errors: FormErrors,
    /// The post being edited.
    post: Option<PostEntry>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct PostPage {
    author: User,
    post: PostEntry,
    author_post_count: u64,
    follow_counts: FollowCounts,
    comments: Vec<CommentEntry>,
    form: CommentForm,
    errors: FormErrors,
}

/// Looks a post up by id, but only under its author's username.
async fn find_post(
    db: &dyn Database,
    username: &Username,
    post_id: Id<PostMarker>,
) -> Result<PostEntry> {
    db.fetch_post(post_id)
        .await?
        .filter(|entry| &entry.author_username == username)
        .ok_or_else(|| ServerError::PostNotFound {
            username: username.clone(),
            post_id,
        })
}

async fn post_page(
    db: &dyn Database,
    post: PostEntry,
    form: CommentForm,
    errors: FormErrors,
) -> Result<PostPage> {
    let author = db
        .fetch_user(post.post.author)
        .await?
        .ok_or_else(|| ServerError::UserNotFound(post.author_username.clone()))?;
    let author_post_count = db.count_posts(PostFilter::Author(author.id)).await?;
    let follow_counts = db.fetch_follow_counts(author.id).await?;
    let comments = db.fetch_post_comments(post.post.id).await?;

    Ok(PostPage {
        author,
        post,
        author_post_count,
        follow_counts,
        comments,
        form,
        errors,
    })
}

async fn new_post_form(
    NewPostPath(): NewPostPath,
    State(db): State<Arc<dyn Database>>,
    _user: AuthenticatedUser,
) -> Result<Json<PostFormPage>> {
    Ok(Json(PostFormPage {
        form: PostForm::default(),
        groups: db.fetch_groups().await?,
        errors: FormErrors::default(),
        post: None,
    }))
}

async fn create_post(
    NewPostPath(): NewPostPath,
    State(db): State<Arc<dyn Database>>,
    State(media): State<Arc<MediaStore>>,
    user: AuthenticatedUser,
    Json(form): Json<PostForm>,
) -> Result<Response> {
    let groups = db.fetch_groups().await?;
    let clean = match form.clean(&groups) {
        Ok(clean) => clean,
        Err(errors) => {
            debug!(?errors, "Rejected new post");
            return Ok(unprocessable(PostFormPage {
                form,
                groups,
                errors,
                post: None,
            }));
        }
    };

    let author = user.user_id();
    let post = media
        .apply(clean.image, None, |image| async move {
            let content = PostContent {
                text: clean.text,
                group: clean.group,
                image,
            };
            Ok::<_, ServerError>(db.create_post(&CreatePost { author, content }).await?)
        })
        .await?;
    info!(post = %post.id, author = %post.author, "Created post");

    Ok(redirect_to(&IndexPath()))
}

async fn post_detail(
    PostPath { username, post_id }: PostPath,
    State(db): State<Arc<dyn Database>>,
) -> Result<Json<PostPage>> {
    let post = find_post(&*db, &username, post_id).await?;
    let page = post_page(&*db, post, CommentForm::default(), FormErrors::default()).await?;

    Ok(Json(page))
}

fn is_author(viewer: Option<AuthenticatedUser>, post: &PostEntry) -> bool {
    viewer.is_some_and(|viewer| viewer.user_id() == post.post.author)
}

async fn edit_post_form(
    EditPostPath { username, post_id }: EditPostPath,
    State(db): State<Arc<dyn Database>>,
    viewer: Option<AuthenticatedUser>,
) -> Result<Response> {
    let post = find_post(&*db, &username, post_id).await?;
    if !is_author(viewer, &post) {
        return Ok(redirect_to(&PostPath { username, post_id }));
    }

    let form = PostForm {
        text: post.post.text.get().to_owned(),
        group: post.post.group.map(Choice::from),
        image: None,
        clear_image: false,
    };
    let page = PostFormPage {
        form,
        groups: db.fetch_groups().await?,
        errors: FormErrors::default(),
        post: Some(post),
    };

    Ok(Json(page).into_response())
}

async fn edit_post(
    EditPostPath { username, post_id }: EditPostPath,
    State(db): State<Arc<dyn Database>>,
    State(media): State<Arc<MediaStore>>,
    viewer: Option<AuthenticatedUser>,
    body: Bytes,
) -> Result<Response> {
    let post = find_post(&*db, &username, post_id).await?;
    if !is_author(viewer, &post) {
        debug!(post = %post_id, "Ignoring edit by someone other than the author");
        return Ok(redirect_to(&PostPath { username, post_id }));
    }
    let AxumJson(form) = AxumJson::<PostForm>::from_bytes(&body)?;

    let groups = db.fetch_groups().await?;
    let clean = match form.clean(&groups) {
        Ok(clean) => clean,
        Err(errors) => {
            debug!(?errors, post = %post_id, "Rejected post edit");
            return Ok(unprocessable(PostFormPage {
                form,
                groups,
                errors,
                post: Some(post),
            }));
        }
    };

    media
        .apply(clean.image, post.post.image, |image| {
            let content = PostContent {
                text: clean.text,
                group: clean.group,
                image,
            };
            let (db, username) = (&db, &username);
            async move {
                db.update_post(post_id, &content)
                    .await?
                    .ok_or_else(|| ServerError::PostNotFound {
                        username: username.clone(),
                        post_id,
                    })
            }
        })
        .await?;
    info!(post = %post_id, "Edited post");

    Ok(redirect_to(&PostPath { username, post_id }))
}

async fn add_comment(
    CommentPath { username, post_id }: CommentPath,
    State(db): State<Arc<dyn Database>>,
    user: AuthenticatedUser,
    Json(form): Json<CommentForm>,
) -> Result<Response> {
    let post = find_post(&*db, &username, post_id).await?;
    let text = match form.clean() {
        Ok(text) => text,
        Err(errors) => {
            let page = post_page(&*db, post, form, errors).await?;
            return Ok(unprocessable(page));
        }
    };

    let comment = db
        .create_comment(&CreateComment {
            post: post_id,
            author: user.user_id(),
            text,
        })
        .await?;
    info!(comment = %comment.id, post = %post_id, "Added comment");

    Ok(redirect_to(&PostPath { username, post_id }))
}
