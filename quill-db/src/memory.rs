//! In-process [`Database`] used by tests and when no `DATABASE_URL` is set.
//!
//! Mirrors the constraints of the SQL schema: unique usernames and slugs,
//! foreign keys checked on insert, and the same cascades on delete. All data is
//! lost when the value is dropped.

use crate::database::{Database, DbError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use quill_common::{
    model::{
        Id, QuillSnowflake, QuillSnowflakeGenerator,
        auth::{AuthTokenHash, Authentication, PasswordHash},
        comment::{Comment, CommentEntry, CommentMarker, CreateComment},
        follow::{Follow, FollowCounts},
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostEntry, PostFilter, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    pagination::PageWindow,
    snowflake::{ProcessId, WorkerId},
};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<Id<UserMarker>, (User, PasswordHash)>,
    authentications: Vec<Authentication>,
    groups: BTreeMap<Id<GroupMarker>, Group>,
    posts: BTreeMap<Id<PostMarker>, Post>,
    comments: BTreeMap<Id<CommentMarker>, Comment>,
    follows: BTreeSet<Follow>,
}

impl Tables {
    fn matches(&self, post: &Post, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::Group(group) => post.group == Some(group),
            PostFilter::Author(author) => post.author == author,
            PostFilter::FollowedBy(follower) => self.follows.contains(&Follow {
                follower,
                author: post.author,
            }),
        }
    }

    fn entry(&self, post: &Post) -> Result<PostEntry> {
        let (author, _) = self
            .users
            .get(&post.author)
            .ok_or(DbError::MissingReference("user"))?;
        let group_slug = post
            .group
            .and_then(|group| self.groups.get(&group))
            .map(|group| group.slug.clone());

        Ok(PostEntry {
            post: post.clone(),
            author_username: author.username.clone(),
            group_slug,
        })
    }

    fn check_post_references(&self, author: Id<UserMarker>, content: &PostContent) -> Result<()> {
        if !self.users.contains_key(&author) {
            return Err(DbError::MissingReference("user"));
        }
        if let Some(group) = content.group
            && !self.groups.contains_key(&group)
        {
            return Err(DbError::MissingReference("group"));
        }
        Ok(())
    }

    fn remove_post(&mut self, post_id: Id<PostMarker>) -> bool {
        self.comments.retain(|_, comment| comment.post != post_id);
        self.posts.remove(&post_id).is_some()
    }
}

pub struct MemoryDb {
    tables: RwLock<Tables>,
    snowflake_generator: Mutex<QuillSnowflakeGenerator>,
}

impl MemoryDb {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snowflake_generator: Mutex::new(QuillSnowflakeGenerator::new(worker_id, process_id)),
        }
    }

    fn generate_snowflake(&self) -> Result<QuillSnowflake> {
        Ok(self.snowflake_generator.lock().generate()?)
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

#[async_trait]
impl Database for MemoryDb {
    async fn create_user(&self, user: &CreateUser, password: &PasswordHash) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|(existing, _)| existing.username == user.username)
        {
            return Err(DbError::Conflict("username"));
        }

        let created = User {
            id: self.generate_snowflake()?.into(),
            username: user.username.clone(),
            email: user.email.clone(),
        };
        tables
            .users
            .insert(created.id, (created.clone(), password.clone()));

        Ok(created)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&user_id).map(|(user, _)| user.clone()))
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|(user, _)| &user.username == username)
            .map(|(user, _)| user.clone()))
    }

    async fn fetch_password_hash(&self, user_id: Id<UserMarker>) -> Result<Option<PasswordHash>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&user_id).map(|(_, hash)| hash.clone()))
    }

    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&user_id).is_none() {
            return Ok(false);
        }

        tables
            .authentications
            .retain(|authentication| authentication.user != user_id);
        tables
            .follows
            .retain(|follow| follow.follower != user_id && follow.author != user_id);
        tables.comments.retain(|_, comment| comment.author != user_id);

        let authored: Vec<_> = tables
            .posts
            .values()
            .filter(|post| post.author == user_id)
            .map(|post| post.id)
            .collect();
        for post_id in authored {
            tables.remove_post(post_id);
        }

        Ok(true)
    }

    async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&authentication.user) {
            return Err(DbError::MissingReference("user"));
        }
        if tables
            .authentications
            .iter()
            .any(|existing| existing.token_hash == authentication.token_hash)
        {
            return Err(DbError::Conflict("key"));
        }

        tables.authentications.push(authentication.clone());
        Ok(())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let tables = self.tables.read().await;
        Ok(tables
            .authentications
            .iter()
            .find(|authentication| &authentication.token_hash == token_hash)
            .cloned())
    }

    async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let mut tables = self.tables.write().await;
        if tables
            .groups
            .values()
            .any(|existing| existing.slug == group.slug)
        {
            return Err(DbError::Conflict("group slug"));
        }

        let created = Group {
            id: self.generate_snowflake()?.into(),
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        };
        tables.groups.insert(created.id, created.clone());

        Ok(created)
    }

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .values()
            .find(|group| &group.slug == slug)
            .cloned())
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let tables = self.tables.read().await;
        let mut groups: Vec<_> = tables.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        Ok(groups)
    }

    async fn delete_group(&self, group_id: Id<GroupMarker>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.groups.remove(&group_id).is_none() {
            return Ok(false);
        }

        for post in tables.posts.values_mut() {
            if post.group == Some(group_id) {
                post.group = None;
            }
        }
        Ok(true)
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let mut tables = self.tables.write().await;
        tables.check_post_references(post.author, &post.content)?;

        let created = Post {
            id: self.generate_snowflake()?.into(),
            author: post.author,
            group: post.content.group,
            text: post.content.text.clone(),
            image: post.content.image.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.posts.insert(created.id, created.clone());

        Ok(created)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<PostEntry>> {
        let tables = self.tables.read().await;
        tables
            .posts
            .get(&post_id)
            .map(|post| tables.entry(post))
            .transpose()
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let mut tables = self.tables.write().await;
        let Some(author) = tables.posts.get(&post_id).map(|post| post.author) else {
            return Ok(None);
        };
        tables.check_post_references(author, content)?;

        let Some(post) = tables.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        post.text = content.text.clone();
        post.group = content.group;
        post.image = content.image.clone();

        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.remove_post(post_id))
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables
            .posts
            .values()
            .filter(|post| tables.matches(post, filter))
            .count();

        Ok(count as u64)
    }

    async fn fetch_posts(&self, filter: PostFilter, window: PageWindow) -> Result<Vec<PostEntry>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<_> = tables
            .posts
            .values()
            .filter(|post| tables.matches(post, filter))
            .collect();
        posts.sort_by_key(|post| Reverse((post.created_at, post.id)));

        posts
            .into_iter()
            .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
            .map(|post| tables.entry(post))
            .collect()
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&comment.post) {
            return Err(DbError::MissingReference("post"));
        }
        if !tables.users.contains_key(&comment.author) {
            return Err(DbError::MissingReference("user"));
        }

        let created = Comment {
            id: self.generate_snowflake()?.into(),
            post: comment.post,
            author: comment.author,
            text: comment.text.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.comments.insert(created.id, created.clone());

        Ok(created)
    }

    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<CommentEntry>> {
        let tables = self.tables.read().await;
        let mut comments: Vec<_> = tables
            .comments
            .values()
            .filter(|comment| comment.post == post_id)
            .collect();
        comments.sort_by_key(|comment| Reverse((comment.created_at, comment.id)));

        comments
            .into_iter()
            .map(|comment| {
                let (author, _) = tables
                    .users
                    .get(&comment.author)
                    .ok_or(DbError::MissingReference("user"))?;
                Ok(CommentEntry {
                    comment: comment.clone(),
                    author_username: author.username.clone(),
                })
            })
            .collect()
    }

    async fn create_follow(&self, follow: Follow) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&follow.follower) || !tables.users.contains_key(&follow.author)
        {
            return Err(DbError::MissingReference("user"));
        }

        Ok(tables.follows.insert(follow))
    }

    async fn follow_exists(&self, follow: Follow) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.follows.contains(&follow))
    }

    async fn delete_follow(&self, follow: Follow) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.follows.remove(&follow))
    }

    async fn fetch_follow_counts(&self, user_id: Id<UserMarker>) -> Result<FollowCounts> {
        let tables = self.tables.read().await;
        let followers = tables
            .follows
            .iter()
            .filter(|follow| follow.author == user_id)
            .count();
        let following = tables
            .follows
            .iter()
            .filter(|follow| follow.follower == user_id)
            .count();

        Ok(FollowCounts {
            followers: followers as u64,
            following: following as u64,
        })
    }
}
