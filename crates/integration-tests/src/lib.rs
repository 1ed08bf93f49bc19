//! Shared fixtures for the HTTP-level tests.
//!
//! Every test gets a fresh router over the in-process store with the 30
//! teams seeded. Sessions come from a mock identity provider that accepts a
//! user id as the bearer token; `expired` is the one token it rejects.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bt_api::AppState;
use bt_config::AppConfig;
use bt_core::models::{Role, Session, Thread, ThreadKind, User};
use bt_core::traits::{MockArticleSource, MockIdentityProvider};
use bt_core::validation::NewThreadForm;
use bt_core::{Community, FeedLimits};
use bt_store_memory::MemoryCommunityRepo;
use chrono::Utc;
use tower::ServiceExt;

pub const SIGN_IN_URL: &str = "/signin";
pub const EXPIRED_TOKEN: &str = "expired";

pub fn session_for(uid: &str) -> Session {
    Session {
        uid: uid.to_string(),
        email: format!("{uid}@example.com"),
        display_name: Some(uid.to_string()),
    }
}

pub fn identity() -> MockIdentityProvider {
    let mut identity = MockIdentityProvider::new();
    identity
        .expect_verify()
        .returning(|token: &str| Ok((token != EXPIRED_TOKEN).then(|| session_for(token))));
    identity
}

/// A CMS with nothing published.
pub fn empty_articles() -> MockArticleSource {
    let mut articles = MockArticleSource::new();
    articles.expect_list_articles().returning(|_| Ok(Vec::new()));
    articles.expect_get_article().returning(|_| Ok(None));
    articles.expect_list_categories().returning(|| Ok(Vec::new()));
    articles
}

fn test_config() -> AppConfig {
    AppConfig::from_toml(&format!(
        r#"
        [auth]
        jwt_secret = "integration"
        sign_in_url = "{SIGN_IN_URL}"
        "#
    ))
    .expect("test config")
}

/// Application state over `community`, with the mock identity provider.
pub fn app_state(community: Community, articles: MockArticleSource) -> AppState {
    AppState {
        community,
        identity: Arc::new(identity()),
        articles: Arc::new(articles),
        config: Arc::new(test_config()),
    }
}

pub struct TestApp {
    pub repo: Arc<MemoryCommunityRepo>,
    pub community: Community,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_articles(empty_articles()).await
    }

    pub async fn with_articles(articles: MockArticleSource) -> Self {
        let repo = Arc::new(MemoryCommunityRepo::new());
        let community = Community::new(repo.clone(), FeedLimits::default());
        community.seed_teams().await.expect("seed teams");

        let router = bt_api::router(app_state(community.clone(), articles));
        Self {
            repo,
            community,
            router,
        }
    }

    /// The profile `uid` gets on first sign-in.
    pub async fn user(&self, uid: &str) -> User {
        self.community
            .ensure_profile(&session_for(uid))
            .await
            .expect("provision user")
    }

    pub async fn moderator(&self, uid: &str) -> User {
        let mut user = User::from_session(&session_for(uid), Utc::now());
        user.roles.insert(Role::Moderator);
        self.repo.set_user(user.clone()).await;
        user
    }

    /// A free thread by `author`, with its opening post.
    pub async fn thread(&self, author: &User, title: &str) -> Thread {
        let form = NewThreadForm {
            title: title.to_string(),
            content: format!("{title} body"),
            kind: Some(ThreadKind::Free),
            agree_to_terms: Some("on".to_string()),
            ..NewThreadForm::default()
        };
        self.community
            .create_thread(author, &form)
            .await
            .expect("create thread")
    }

    /// Id of the thread's opening post, the earliest one on the page.
    pub async fn opening_post(&self, thread: &Thread) -> String {
        let detail = self
            .community
            .thread_detail(&thread.id, None)
            .await
            .expect("thread detail");
        detail
            .posts
            .iter()
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|post| post.id.clone())
            .expect("thread has an opening post")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(request(Method::GET, uri, token).body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        token: Option<&str>,
        fields: &[(&str, &str)],
    ) -> Response {
        let request = request(Method::POST, uri, token)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form_body(fields)))
            .expect("request");
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, token: &str) -> Response {
        let request = request(Method::POST, uri, Some(token))
            .header(ACCEPT, "application/json")
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }
}

fn request(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

/// `application/x-www-form-urlencoded` body.
pub fn form_body(fields: &[(&str, &str)]) -> String {
    serde_urlencoded::to_string(fields).expect("form body")
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub fn assert_redirect(response: &Response, to: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(response), to);
}
