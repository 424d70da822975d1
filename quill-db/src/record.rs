use quill_common::model::{
    Id, ModelValidationError,
    auth::Authentication,
    comment::{Comment, CommentEntry},
    group::{Group, GroupSlug, GroupTitle},
    post::{ImageRef, Post, PostEntry, Text},
    user::{Email, User, Username},
};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub username: String,
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct GroupRecord {
    pub group_snowflake: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub user_snowflake: i64,
    pub group_snowflake: Option<i64>,
    pub text: String,
    pub image: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostEntryRecord {
    #[sqlx(flatten)]
    pub post: PostRecord,
    pub username: String,
    pub group_slug: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_snowflake: i64,
    pub post_snowflake: i64,
    pub user_snowflake: i64,
    pub text: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentEntryRecord {
    #[sqlx(flatten)]
    pub comment: CommentRecord,
    pub username: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AuthenticationRecord {
    pub user_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_snowflake),
            username: Username::new(value.username)?,
            email: Email::new(value.email)?,
        })
    }
}

impl TryFrom<GroupRecord> for Group {
    type Error = ModelValidationError;

    fn try_from(value: GroupRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.group_snowflake),
            title: GroupTitle::new(value.title)?,
            slug: GroupSlug::new(value.slug)?,
            description: value.description,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            author: Id::from_db(value.user_snowflake),
            group: value.group_snowflake.map(Id::from_db),
            text: Text::new(&value.text)?,
            image: value.image.map(ImageRef::new).transpose()?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<PostEntryRecord> for PostEntry {
    type Error = ModelValidationError;

    fn try_from(value: PostEntryRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            post: value.post.try_into()?,
            author_username: Username::new(value.username)?,
            group_slug: value.group_slug.map(GroupSlug::new).transpose()?,
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.comment_snowflake),
            post: Id::from_db(value.post_snowflake),
            author: Id::from_db(value.user_snowflake),
            text: Text::new(&value.text)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<CommentEntryRecord> for CommentEntry {
    type Error = ModelValidationError;

    fn try_from(value: CommentEntryRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            comment: value.comment.try_into()?,
            author_username: Username::new(value.username)?,
        })
    }
}

impl TryFrom<AuthenticationRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: AuthenticationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: Id::from_db(value.user_snowflake),
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}
