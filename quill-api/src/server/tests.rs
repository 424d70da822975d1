use crate::server::{AuthSettings, ServerState, app, cache::PageCache, media::MediaStore};
use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use base64::{Engine, prelude::BASE64_STANDARD};
use quill_common::{
    form::{INVALID_CHOICE, INVALID_LOGIN, REQUIRED, USERNAME_TAKEN},
    model::{
        auth::{AuthToken, Authentication, Password, PasswordHash},
        follow::Follow,
        group::{CreateGroup, Group, GroupSlug, GroupTitle},
        post::{CreatePost, PostContent, PostEntry, PostFilter, Text},
        user::{CreateUser, Email, User, Username},
    },
    pagination::Paginator,
    util::PositiveDuration,
};
use quill_db::{Database, memory::MemoryDb};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use tempfile::TempDir;
use time::{OffsetDateTime, UtcDateTime};
use tower::ServiceExt;

const SMALL_GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\x00\x00\x00\xff\xff\xff!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";

static PASSWORD_HASH: LazyLock<PasswordHash> = LazyLock::new(|| {
    PasswordHash::generate(&Password::new("password123".to_owned()).unwrap()).unwrap()
});

struct TestApp {
    db: Arc<MemoryDb>,
    page_cache: Arc<PageCache>,
    media: Arc<MediaStore>,
    router: Router,
    _media_dir: TempDir,
}

struct TestUser {
    user: User,
    token: String,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(MemoryDb::default());
        let page_cache = Arc::new(PageCache::new(PositiveDuration::from_seconds(20).unwrap(), 16));
        let media_dir = tempfile::tempdir().unwrap();
        let media = Arc::new(MediaStore::new(media_dir.path()));

        let state = ServerState {
            db: db.clone(),
            page_cache: page_cache.clone(),
            media: media.clone(),
            auth_settings: AuthSettings {
                token_lifetime: None,
            },
        };

        Self {
            db,
            page_cache,
            media,
            router: app(state),
            _media_dir: media_dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, user: Option<&TestUser>) -> Response {
        let mut builder = Request::get(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, user: Option<&TestUser>, body: &Value) -> Response {
        self.post_raw(uri, user, "application/json", body.to_string())
            .await
    }

    async fn post_raw(
        &self,
        uri: &str,
        user: Option<&TestUser>,
        content_type: &str,
        body: String,
    ) -> Response {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, content_type);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    async fn user(&self, username: &str) -> TestUser {
        let user = self
            .db
            .create_user(
                &CreateUser {
                    username: Username::new(username.to_owned()).unwrap(),
                    email: Email::new(format!("{username}@example.com")).unwrap(),
                },
                &PASSWORD_HASH,
            )
            .await
            .unwrap();

        let token = AuthToken::generate_random(user.id);
        self.db
            .create_auth(&Authentication {
                user: user.id,
                token_hash: token.hash().unwrap(),
                created_at: UtcDateTime::now(),
                expires_after: None,
            })
            .await
            .unwrap();

        TestUser {
            user,
            token: token.as_token_str(),
        }
    }

    async fn group(&self, slug: &str) -> Group {
        self.db
            .create_group(&CreateGroup {
                title: GroupTitle::new(format!("Group {slug}")).unwrap(),
                slug: GroupSlug::new(slug.to_owned()).unwrap(),
                description: String::new(),
            })
            .await
            .unwrap()
    }

    async fn stored_post(&self, author: &TestUser, text: &str, group: Option<&Group>) -> PostEntry {
        let post = self
            .db
            .create_post(&CreatePost {
                author: author.user.id,
                content: PostContent {
                    text: Text::new(text).unwrap(),
                    group: group.map(|group| group.id),
                    image: None,
                },
            })
            .await
            .unwrap();
        self.db.fetch_post(post.id).await.unwrap().unwrap()
    }

    async fn post_count(&self) -> u64 {
        self.db.count_posts(PostFilter::All).await.unwrap()
    }

    async fn latest_post(&self) -> PostEntry {
        self.db
            .fetch_posts(PostFilter::All, Paginator::new(1).window(1))
            .await
            .unwrap()
            .remove(0)
    }
}

fn post_url(post: &PostEntry) -> String {
    format!("/{}/{}/", post.author_username, post.post.id)
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn texts(page: &Value) -> Vec<&str> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["text"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/no/such/route/here/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({ "status": 404 }));
}

#[tokio::test]
async fn index_paginates_newest_first() {
    let app = TestApp::new();
    let author = app.user("author").await;
    for number in 1..=13 {
        app.stored_post(&author, &format!("Post {number}"), None).await;
    }

    let first = body_json(app.get("/", None).await).await;
    assert_eq!(first["page"]["number"], 1);
    assert_eq!(first["page"]["num_pages"], 2);
    assert_eq!(first["page"]["has_next"], true);
    let first_texts = texts(&first["page"]);
    assert_eq!(first_texts.len(), 10);
    assert_eq!(first_texts[0], "Post 13");
    assert_eq!(first_texts[9], "Post 4");
    assert_eq!(first["page"]["items"][0]["author_username"], "author");

    let second = body_json(app.get("/?page=2", None).await).await;
    assert_eq!(texts(&second["page"]), ["Post 3", "Post 2", "Post 1"]);
    assert_eq!(second["page"]["has_previous"], true);

    let past_the_end = body_json(app.get("/?page=99", None).await).await;
    assert_eq!(past_the_end["page"]["number"], 2);

    for requested in ["/?page=abc", "/?page=0", "/?page=-3"] {
        let page = body_json(app.get(requested, None).await).await;
        assert_eq!(page["page"]["number"], 1, "{requested}");
    }
}

#[tokio::test]
async fn empty_index_has_one_page() {
    let app = TestApp::new();

    let page = body_json(app.get("/?page=5", None).await).await;
    assert_eq!(page["page"]["number"], 1);
    assert_eq!(page["page"]["num_pages"], 1);
    assert!(texts(&page["page"]).is_empty());
}

#[tokio::test]
async fn index_is_cached_until_cleared() {
    let app = TestApp::new();
    let author = app.user("author").await;
    app.stored_post(&author, "first", None).await;

    let before = body_bytes(app.get("/", None).await).await;

    let response = app.post("/new/", Some(&author), &json!({ "text": "second" })).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.post_count().await, 2);

    let cached = body_bytes(app.get("/", None).await).await;
    assert_eq!(before, cached);

    app.page_cache.clear();
    let fresh = body_bytes(app.get("/", None).await).await;
    assert_ne!(before, fresh);
    let fresh: Value = serde_json::from_slice(&fresh).unwrap();
    assert_eq!(texts(&fresh["page"]), ["second", "first"]);
}

#[tokio::test]
async fn creating_a_post() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let cats = app.group("cats").await;

    let form = app.get("/new/", Some(&author)).await;
    assert_eq!(form.status(), StatusCode::OK);
    assert_eq!(body_json(form).await["groups"][0]["slug"], "cats");

    let started = OffsetDateTime::now_utc();
    let response = app
        .post(
            "/new/",
            Some(&author),
            &json!({ "text": "  Hello there  ", "group": u64::from(cats.id) }),
        )
        .await;
    let finished = OffsetDateTime::now_utc();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert_eq!(app.post_count().await, 1);

    let post = app.latest_post().await;
    assert_eq!(post.post.author, author.user.id);
    assert_eq!(post.post.text.get(), "Hello there");
    assert_eq!(post.post.group, Some(cats.id));
    assert!(started <= post.post.created_at && post.post.created_at <= finished);
}

#[tokio::test]
async fn anonymous_submissions_redirect_to_login() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let post = app.stored_post(&author, "text", None).await;

    let response = app.post("/new/", None, &json!({ "text": "sneaky" })).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/?next=%2Fnew%2F");

    let comment_url = format!("{}comment/", post_url(&post));
    let response = app.post(&comment_url, None, &json!({ "text": "sneaky" })).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/auth/login/?next="));

    let response = app.get("/follow/?page=2", None).await;
    assert_eq!(location(&response), "/auth/login/?next=%2Ffollow%2F%3Fpage%3D2");

    assert_eq!(app.post_count().await, 1);
    assert!(app.db.fetch_post_comments(post.post.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_posts_are_not_saved() {
    let app = TestApp::new();
    let author = app.user("author").await;

    let response = app
        .post("/new/", Some(&author), &json!({ "text": "   ", "group": 12345 }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let page = body_json(response).await;
    assert_eq!(page["errors"]["text"], json!([REQUIRED]));
    assert_eq!(page["errors"]["group"], json!([INVALID_CHOICE]));
    assert_eq!(page["form"]["group"], 12345);

    let response = app
        .post("/new/", Some(&author), &json!({ "text": "fine", "group": "abc" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let page = body_json(response).await;
    assert_eq!(page["errors"]["group"], json!([INVALID_CHOICE]));
    assert_eq!(page["form"]["group"], "abc");

    let response = app
        .post(
            "/new/",
            Some(&author),
            &json!({ "text": "picture", "image": { "file_name": "a.gif", "content": "bm90IGFuIGltYWdl" } }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(response).await["errors"]["image"].is_array());

    assert_eq!(app.post_count().await, 0);
}

#[tokio::test]
async fn images_are_stored() {
    let app = TestApp::new();
    let author = app.user("author").await;

    let response = app
        .post(
            "/new/",
            Some(&author),
            &json!({
                "text": "with a picture",
                "image": { "file_name": "small.gif", "content": BASE64_STANDARD.encode(SMALL_GIF) },
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let post = app.latest_post().await;
    let image = post.post.image.unwrap();
    assert_eq!(image.get(), "posts/small.gif");
    assert_eq!(tokio::fs::read(app.media.path_of(&image)).await.unwrap(), SMALL_GIF);
}

#[tokio::test]
async fn post_page() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let reader = app.user("reader").await;
    let post = app.stored_post(&author, "text", None).await;

    let response = app.get(&post_url(&post), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["author"]["username"], "author");
    assert!(page["author"].get("email").is_none());
    assert_eq!(page["post"]["text"], "text");
    assert_eq!(page["author_post_count"], 1);
    assert_eq!(page["comments"], json!([]));

    let wrong_author = format!("/{}/{}/", reader.user.username, post.post.id);
    assert_eq!(app.get(&wrong_author, None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.get("/author/not-a-number/", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(app.get("/nobody/", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn commenting() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let reader = app.user("reader").await;
    let post = app.stored_post(&author, "text", None).await;
    let comment_url = format!("{}comment/", post_url(&post));

    let response = app.post(&comment_url, Some(&reader), &json!({ "text": "" })).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["errors"]["text"], json!([REQUIRED]));

    let response = app
        .post(&comment_url, Some(&reader), &json!({ "text": "Nice post" }))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), post_url(&post));

    let page = body_json(app.get(&post_url(&post), None).await).await;
    assert_eq!(page["comments"][0]["text"], "Nice post");
    assert_eq!(page["comments"][0]["author_username"], "reader");

    let missing = format!("/author/{}/comment/", u64::from(post.post.id) + 1);
    let response = app.post(&missing, Some(&reader), &json!({ "text": "hi" })).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_author_can_edit() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let intruder = app.user("intruder").await;
    let cats = app.group("cats").await;
    let post = app.stored_post(&author, "original", Some(&cats)).await;
    let edit_url = format!("{}edit/", post_url(&post));

    for user in [None, Some(&intruder)] {
        let response = app.get(&edit_url, user).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), post_url(&post));

        let response = app
            .post(&edit_url, user, &json!({ "text": "defaced", "clear_image": true }))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), post_url(&post));

        // The body is never looked at, so a broken one changes nothing.
        for (content_type, body) in [
            ("application/json", r#"{"text": "x", "group": {}}"#),
            ("application/json", "{not json"),
            ("application/x-www-form-urlencoded", "text=x"),
        ] {
            let response = app
                .post_raw(&edit_url, user, content_type, body.to_owned())
                .await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{body}");
            assert_eq!(location(&response), post_url(&post));
        }
    }

    let unchanged = app.db.fetch_post(post.post.id).await.unwrap().unwrap();
    assert_eq!(unchanged, post);

    let form = app.get(&edit_url, Some(&author)).await;
    assert_eq!(form.status(), StatusCode::OK);
    let form = body_json(form).await;
    assert_eq!(form["form"]["text"], "original");
    assert_eq!(form["post"]["id"], u64::from(post.post.id));

    let response = app
        .post(&edit_url, Some(&author), &json!({ "text": "revised" }))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), post_url(&post));

    let edited = app.db.fetch_post(post.post.id).await.unwrap().unwrap();
    assert_eq!(edited.post.text.get(), "revised");
    assert_eq!(edited.post.group, None);
    assert_eq!(edited.post.created_at, post.post.created_at);

    let wrong_author = format!("/{}/{}/edit/", intruder.user.username, post.post.id);
    assert_eq!(
        app.get(&wrong_author, Some(&intruder)).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn editing_images() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let upload = json!({ "file_name": "small.gif", "content": BASE64_STANDARD.encode(SMALL_GIF) });

    app.post("/new/", Some(&author), &json!({ "text": "pic", "image": upload }))
        .await;
    let post = app.latest_post().await;
    let edit_url = format!("{}edit/", post_url(&post));
    let original_image = post.post.image.clone().unwrap();

    app.post(&edit_url, Some(&author), &json!({ "text": "kept" }))
        .await;
    let kept = app.db.fetch_post(post.post.id).await.unwrap().unwrap();
    assert_eq!(kept.post.image, Some(original_image.clone()));

    app.post(&edit_url, Some(&author), &json!({ "text": "replaced", "image": upload }))
        .await;
    let replaced = app.db.fetch_post(post.post.id).await.unwrap().unwrap();
    let new_image = replaced.post.image.unwrap();
    assert_ne!(new_image, original_image);
    assert!(app.media.path_of(&new_image).exists());

    let response = app
        .post(
            &edit_url,
            Some(&author),
            &json!({ "text": "both", "image": upload, "clear_image": true }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    app.post(&edit_url, Some(&author), &json!({ "text": "cleared", "clear_image": true }))
        .await;
    let cleared = app.db.fetch_post(post.post.id).await.unwrap().unwrap();
    assert_eq!(cleared.post.image, None);
}

#[tokio::test]
async fn following() {
    let app = TestApp::new();
    let follower = app.user("follower").await;
    let author = app.user("author").await;
    let relationship = Follow {
        follower: follower.user.id,
        author: author.user.id,
    };

    for _ in 0..2 {
        let response = app.get("/author/follow/", Some(&follower)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/author/");
    }
    assert!(app.db.follow_exists(relationship).await.unwrap());
    let counts = app.db.fetch_follow_counts(author.user.id).await.unwrap();
    assert_eq!(counts.followers, 1);

    app.get("/author/follow/", Some(&author)).await;
    assert_eq!(
        app.db.fetch_follow_counts(author.user.id).await.unwrap().following,
        0
    );

    assert_eq!(
        app.get("/nobody/follow/", Some(&follower)).await.status(),
        StatusCode::NOT_FOUND
    );

    let response = app.get("/author/unfollow/", Some(&follower)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(!app.db.follow_exists(relationship).await.unwrap());

    let response = app.get("/author/unfollow/", Some(&follower)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn follow_feed_shows_followed_authors_only() {
    let app = TestApp::new();
    let follower = app.user("follower").await;
    let bystander = app.user("bystander").await;
    let author = app.user("author").await;

    app.get("/author/follow/", Some(&follower)).await;
    app.stored_post(&author, "for followers", None).await;

    let feed = body_json(app.get("/follow/", Some(&follower)).await).await;
    assert_eq!(texts(&feed["page"]), ["for followers"]);

    let feed = body_json(app.get("/follow/", Some(&bystander)).await).await;
    assert!(texts(&feed["page"]).is_empty());
}

#[tokio::test]
async fn profile_page() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let follower = app.user("follower").await;
    app.stored_post(&author, "one", None).await;
    app.stored_post(&author, "two", None).await;
    app.stored_post(&follower, "elsewhere", None).await;
    app.get("/author/follow/", Some(&follower)).await;

    let page = body_json(app.get("/author/", Some(&follower)).await).await;
    assert_eq!(page["author"]["username"], "author");
    assert_eq!(page["post_count"], 2);
    assert_eq!(page["follow_counts"]["followers"], 1);
    assert_eq!(page["following"], true);
    assert_eq!(texts(&page["page"]), ["two", "one"]);

    let anonymous = body_json(app.get("/author/", None).await).await;
    assert!(anonymous.get("following").is_none());

    let own = body_json(app.get("/author/", Some(&author)).await).await;
    assert!(own.get("following").is_none());
}

#[tokio::test]
async fn group_page() {
    let app = TestApp::new();
    let author = app.user("author").await;
    let cats = app.group("cats").await;
    app.stored_post(&author, "meow", Some(&cats)).await;
    app.stored_post(&author, "woof", None).await;

    let page = body_json(app.get("/group/cats/", None).await).await;
    assert_eq!(page["group"]["title"], "Group cats");
    assert_eq!(texts(&page["page"]), ["meow"]);
    assert_eq!(page["page"]["items"][0]["group_slug"], "cats");

    let response = app.get("/group/dogs/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tokens() {
    let app = TestApp::new();
    let user = app.user("author").await;

    let malformed = TestUser {
        user: user.user.clone(),
        token: "not-a-token".to_owned(),
    };
    assert_eq!(
        app.get("/follow/", Some(&malformed)).await.status(),
        StatusCode::BAD_REQUEST
    );

    let unknown = TestUser {
        user: user.user.clone(),
        token: AuthToken::generate_random(user.user.id).as_token_str(),
    };
    let response = app.get("/follow/", Some(&unknown)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/?next=%2Ffollow%2F");

    let expired = AuthToken::generate_random(user.user.id);
    app.db
        .create_auth(&Authentication {
            user: user.user.id,
            token_hash: expired.hash().unwrap(),
            created_at: UtcDateTime::now() - time::Duration::hours(2),
            expires_after: Some(PositiveDuration::from_seconds(60).unwrap()),
        })
        .await
        .unwrap();
    let expired = TestUser {
        user: user.user.clone(),
        token: expired.as_token_str(),
    };
    assert_eq!(
        app.get("/follow/", Some(&expired)).await.status(),
        StatusCode::SEE_OTHER
    );

    assert_eq!(app.get("/follow/", Some(&user)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn signup_and_login() {
    let app = TestApp::new();

    let login_page = body_json(app.get("/auth/login/?next=/new/", None).await).await;
    assert_eq!(login_page["next"], "/new/");

    let response = app
        .post(
            "/auth/signup/",
            None,
            &json!({ "username": "newbie", "email": "newbie@example.com", "password": "hunter2hunter2" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = body_json(response).await;
    assert_eq!(session["user"]["username"], "newbie");

    let newbie = TestUser {
        user: app
            .db
            .fetch_user_by_username(&Username::new("newbie".to_owned()).unwrap())
            .await
            .unwrap()
            .unwrap(),
        token: session["token"].as_str().unwrap().to_owned(),
    };
    assert_eq!(app.get("/new/", Some(&newbie)).await.status(), StatusCode::OK);

    let response = app
        .post(
            "/auth/signup/",
            None,
            &json!({ "username": "newbie", "email": "other@example.com", "password": "hunter2hunter2" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(response).await["errors"]["username"],
        json!([USERNAME_TAKEN])
    );

    let response = app
        .post(
            "/auth/login/",
            None,
            &json!({ "username": "newbie", "password": "wrong password" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["errors"]["__all__"], json!([INVALID_LOGIN]));

    let response = app
        .post(
            "/auth/login/?next=/new/",
            None,
            &json!({ "username": "newbie", "password": "hunter2hunter2" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["next"], "/new/");
    assert!(session["token"].as_str().unwrap().starts_with(&newbie.user.id.to_string()));
}
