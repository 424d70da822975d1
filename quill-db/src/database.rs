use async_trait::async_trait;
use quill_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication, PasswordHash},
        comment::{Comment, CommentEntry, CreateComment},
        follow::{Follow, FollowCounts},
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostEntry, PostFilter, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    pagination::PageWindow,
    snowflake::SnowflakeError,
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeError),
    #[error("A record with the same {0} already exists")]
    Conflict(&'static str),
    #[error("The referenced {0} does not exist")]
    MissingReference(&'static str),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence for every record the application knows about.
///
/// Deleting a user removes their posts, comments, follows and authentications;
/// deleting a post removes its comments; deleting a group detaches its posts.
/// Post listings are ordered newest first, comments likewise.
#[async_trait]
pub trait Database: Send + Sync {
    /// Fails with [`DbError::Conflict`] if the username is taken.
    async fn create_user(&self, user: &CreateUser, password: &PasswordHash) -> Result<User>;

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>>;

    async fn fetch_password_hash(&self, user_id: Id<UserMarker>) -> Result<Option<PasswordHash>>;

    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool>;

    async fn create_auth(&self, authentication: &Authentication) -> Result<()>;

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>>;

    /// Fails with [`DbError::Conflict`] if the slug is taken.
    async fn create_group(&self, group: &CreateGroup) -> Result<Group>;

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>>;

    /// All groups, ordered by title.
    async fn fetch_groups(&self) -> Result<Vec<Group>>;

    async fn delete_group(&self, group_id: Id<GroupMarker>) -> Result<bool>;

    /// Stamps the post with the current time.
    async fn create_post(&self, post: &CreatePost) -> Result<Post>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<PostEntry>>;

    /// Replaces the editable content; `None` if the post does not exist.
    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>>;

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool>;

    async fn count_posts(&self, filter: PostFilter) -> Result<u64>;

    async fn fetch_posts(&self, filter: PostFilter, window: PageWindow) -> Result<Vec<PostEntry>>;

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment>;

    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<CommentEntry>>;

    /// Returns `false` if the relationship already existed.
    async fn create_follow(&self, follow: Follow) -> Result<bool>;

    async fn follow_exists(&self, follow: Follow) -> Result<bool>;

    /// Returns `false` if there was no such relationship.
    async fn delete_follow(&self, follow: Follow) -> Result<bool>;

    async fn fetch_follow_counts(&self, user_id: Id<UserMarker>) -> Result<FollowCounts>;
}
