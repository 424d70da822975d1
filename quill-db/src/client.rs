use crate::{
    database::{Database, DbError, Result},
    record::{
        AuthenticationRecord, CommentEntryRecord, CommentRecord, GroupRecord, PostEntryRecord,
        PostRecord, UserRecord,
    },
};
use async_trait::async_trait;
use parking_lot::Mutex;
use quill_common::{
    model::{
        Id, QuillSnowflake, QuillSnowflakeGenerator,
        auth::{AuthTokenHash, Authentication, PasswordHash},
        comment::{Comment, CommentEntry, CreateComment},
        follow::{Follow, FollowCounts},
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostEntry, PostFilter, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    pagination::PageWindow,
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgPool, postgres::PgPoolOptions, query, query_as, query_scalar};
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info};

const POST_ENTRY_SELECT: &str = "
    SELECT
        posts.post_snowflake,
        posts.user_snowflake,
        posts.group_snowflake,
        posts.text,
        posts.image,
        posts.created_at,
        users.username,
        groups.slug AS group_slug
    FROM
        posts.posts
        JOIN users.users ON users.user_snowflake = posts.user_snowflake
        LEFT JOIN posts.groups ON groups.group_snowflake = posts.group_snowflake
";

const POST_FILTER_WHERE: &str = "
    WHERE
        ($1::BIGINT IS NULL OR posts.group_snowflake = $1)
        AND ($2::BIGINT IS NULL OR posts.user_snowflake = $2)
        AND ($3::BIGINT IS NULL OR posts.user_snowflake IN (
            SELECT follows.author_snowflake
            FROM users.follows
            WHERE follows.follower_snowflake = $3
        ))
";

/// Bind values for [`POST_FILTER_WHERE`]: group, author, follower.
fn filter_params(filter: PostFilter) -> (Option<i64>, Option<i64>, Option<i64>) {
    match filter {
        PostFilter::All => (None, None, None),
        PostFilter::Group(group) => (Some(group.to_db()), None, None),
        PostFilter::Author(author) => (None, Some(author.to_db()), None),
        PostFilter::FollowedBy(follower) => (None, None, Some(follower.to_db())),
    }
}

/// Translates constraint violations into the errors callers can act on.
fn constraint_error(error: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(database_error) = &error {
        let constraint = database_error.constraint().unwrap_or_default();
        if database_error.is_unique_violation() {
            return match constraint {
                "unique_username" => DbError::Conflict("username"),
                "unique_group_slug" => DbError::Conflict("group slug"),
                _ => DbError::Conflict("key"),
            };
        }
        if database_error.is_foreign_key_violation() {
            return DbError::MissingReference(match constraint {
                "posts_group_snowflake_fkey" => "group",
                "comments_post_snowflake_fkey" => "post",
                _ => "user",
            });
        }
    }
    error.into()
}

fn to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

/// PostgreSQL-backed [`Database`].
pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<QuillSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(QuillSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(
        database_url: &str,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new().connect(database_url).await?;
        debug!("Connected to database");

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations are up to date");

        Ok(())
    }

    fn generate_snowflake(&self) -> Result<QuillSnowflake> {
        Ok(self.snowflake_generator.lock().generate()?)
    }
}

#[async_trait]
impl Database for DbClient {
    async fn create_user(&self, user: &CreateUser, password: &PasswordHash) -> Result<User> {
        let user_snowflake = self.generate_snowflake()?;

        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_snowflake, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING user_snowflake, username, email
            ",
        )
        .bind(user_snowflake.get().cast_signed())
        .bind(user.username.get())
        .bind(user.email.get())
        .bind(password.to_bytes())
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_error)?;

        Ok(record.try_into()?)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_snowflake, username, email
            FROM users.users
            WHERE user_snowflake = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_snowflake, username, email
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    async fn fetch_password_hash(&self, user_id: Id<UserMarker>) -> Result<Option<PasswordHash>> {
        let bytes: Option<Vec<u8>> = query_scalar(
            "
            SELECT password_hash
            FROM users.users
            WHERE user_snowflake = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        bytes
            .map(|bytes| PasswordHash::try_from(bytes).map_err(|err| DbError::Data(err.into())))
            .transpose()
    }

    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let result = query("DELETE FROM users.users WHERE user_snowflake = $1")
            .bind(user_id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        let created_at = authentication.created_at;

        query(
            "
            INSERT INTO users.authentications
                (token_hash, user_snowflake, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(authentication.token_hash.0.to_vec())
        .bind(authentication.user.to_db())
        .bind(PrimitiveDateTime::new(created_at.date(), created_at.time()))
        .bind(
            authentication
                .expires_after
                .map(|lifetime| lifetime.whole_seconds()),
        )
        .execute(&self.pool)
        .await
        .map_err(constraint_error)?;

        Ok(())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT user_snowflake, token_hash, created_at, expires_after_seconds
            FROM users.authentications
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash.0.to_vec())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Authentication::try_from).transpose()?)
    }

    async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let group_snowflake = self.generate_snowflake()?;

        let record = query_as::<_, GroupRecord>(
            "
            INSERT INTO posts.groups (group_snowflake, title, slug, description)
            VALUES ($1, $2, $3, $4)
            RETURNING group_snowflake, title, slug, description
            ",
        )
        .bind(group_snowflake.get().cast_signed())
        .bind(group.title.get())
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_error)?;

        Ok(record.try_into()?)
    }

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT group_snowflake, title, slug, description
            FROM posts.groups
            WHERE slug = $1
            ",
        )
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Group::try_from).transpose()?)
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT group_snowflake, title, slug, description
            FROM posts.groups
            ORDER BY title, group_snowflake
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn delete_group(&self, group_id: Id<GroupMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts.groups WHERE group_snowflake = $1")
            .bind(group_id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let post_snowflake = self.generate_snowflake()?;

        let record = query_as::<_, PostRecord>(
            "
            INSERT INTO posts.posts
                (post_snowflake, user_snowflake, group_snowflake, text, image, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING post_snowflake, user_snowflake, group_snowflake, text, image, created_at
            ",
        )
        .bind(post_snowflake.get().cast_signed())
        .bind(post.author.to_db())
        .bind(post.content.group.map(Id::to_db))
        .bind(post.content.text.get())
        .bind(post.content.image.as_ref().map(|image| image.get()))
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_error)?;

        Ok(record.try_into()?)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<PostEntry>> {
        let record = query_as::<_, PostEntryRecord>(&format!(
            "{POST_ENTRY_SELECT} WHERE posts.post_snowflake = $1"
        ))
        .bind(post_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(PostEntry::try_from).transpose()?)
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            UPDATE posts.posts
            SET group_snowflake = $2, text = $3, image = $4
            WHERE post_snowflake = $1
            RETURNING post_snowflake, user_snowflake, group_snowflake, text, image, created_at
            ",
        )
        .bind(post_id.to_db())
        .bind(content.group.map(Id::to_db))
        .bind(content.text.get())
        .bind(content.image.as_ref().map(|image| image.get()))
        .fetch_optional(&self.pool)
        .await
        .map_err(constraint_error)?;

        Ok(record.map(Post::try_from).transpose()?)
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts.posts WHERE post_snowflake = $1")
            .bind(post_id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let (group, author, follower) = filter_params(filter);

        let count: i64 = query_scalar(&format!(
            "SELECT COUNT(*) FROM posts.posts {POST_FILTER_WHERE}"
        ))
        .bind(group)
        .bind(author)
        .bind(follower)
        .fetch_one(&self.pool)
        .await?;

        Ok(to_u64(count))
    }

    async fn fetch_posts(&self, filter: PostFilter, window: PageWindow) -> Result<Vec<PostEntry>> {
        let (group, author, follower) = filter_params(filter);

        let records = query_as::<_, PostEntryRecord>(&format!(
            "
            {POST_ENTRY_SELECT}
            {POST_FILTER_WHERE}
            ORDER BY posts.created_at DESC, posts.post_snowflake DESC
            LIMIT $4 OFFSET $5
            "
        ))
        .bind(group)
        .bind(author)
        .bind(follower)
        .bind(i64::try_from(window.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(window.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(PostEntry::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let comment_snowflake = self.generate_snowflake()?;

        let record = query_as::<_, CommentRecord>(
            "
            INSERT INTO posts.comments
                (comment_snowflake, post_snowflake, user_snowflake, text, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING comment_snowflake, post_snowflake, user_snowflake, text, created_at
            ",
        )
        .bind(comment_snowflake.get().cast_signed())
        .bind(comment.post.to_db())
        .bind(comment.author.to_db())
        .bind(comment.text.get())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_error)?;

        Ok(record.try_into()?)
    }

    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<CommentEntry>> {
        let records = query_as::<_, CommentEntryRecord>(
            "
            SELECT
                comments.comment_snowflake,
                comments.post_snowflake,
                comments.user_snowflake,
                comments.text,
                comments.created_at,
                users.username
            FROM
                posts.comments
                JOIN users.users ON users.user_snowflake = comments.user_snowflake
            WHERE
                comments.post_snowflake = $1
            ORDER BY comments.created_at DESC, comments.comment_snowflake DESC
            ",
        )
        .bind(post_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(CommentEntry::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn create_follow(&self, follow: Follow) -> Result<bool> {
        let result = query(
            "
            INSERT INTO users.follows (follower_snowflake, author_snowflake)
            VALUES ($1, $2)
            ON CONFLICT ON CONSTRAINT unique_follow DO NOTHING
            ",
        )
        .bind(follow.follower.to_db())
        .bind(follow.author.to_db())
        .execute(&self.pool)
        .await
        .map_err(constraint_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn follow_exists(&self, follow: Follow) -> Result<bool> {
        let exists: bool = query_scalar(
            "
            SELECT EXISTS (
                SELECT 1 FROM users.follows
                WHERE follower_snowflake = $1 AND author_snowflake = $2
            )
            ",
        )
        .bind(follow.follower.to_db())
        .bind(follow.author.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn delete_follow(&self, follow: Follow) -> Result<bool> {
        let result = query(
            "
            DELETE FROM users.follows
            WHERE follower_snowflake = $1 AND author_snowflake = $2
            ",
        )
        .bind(follow.follower.to_db())
        .bind(follow.author.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_follow_counts(&self, user_id: Id<UserMarker>) -> Result<FollowCounts> {
        let (followers, following): (i64, i64) = query_as(
            "
            SELECT
                (SELECT COUNT(*) FROM users.follows WHERE author_snowflake = $1),
                (SELECT COUNT(*) FROM users.follows WHERE follower_snowflake = $1)
            ",
        )
        .bind(user_id.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(FollowCounts {
            followers: to_u64(followers),
            following: to_u64(following),
        })
    }
}
