use std::time::Duration;

use axum::http::StatusCode;
use integration_tests::{assert_redirect, body_text, location, TestApp, EXPIRED_TOKEN, SIGN_IN_URL};

#[tokio::test]
async fn health_check() {
    let app = TestApp::new().await;
    let response = app.get("/healthz", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn home_lists_newest_threads_for_anonymous_visitors() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    app.thread(&author, "Lakers preview").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.thread(&author, "Warriors recap").await;

    let response = app.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    let newer = html.find("Warriors recap").expect("newer thread listed");
    let older = html.find("Lakers preview").expect("older thread listed");
    assert!(newer < older);
}

#[tokio::test]
async fn writes_require_a_session() {
    let app = TestApp::new().await;

    let response = app.get("/community/new", None).await;
    assert_redirect(&response, SIGN_IN_URL);

    let response = app.get("/community/new", Some(EXPIRED_TOKEN)).await;
    assert_redirect(&response, SIGN_IN_URL);

    let response = app
        .post_form("/community/new", None, &[("title", "t"), ("content", "c")])
        .await;
    assert_redirect(&response, SIGN_IN_URL);
}

#[tokio::test]
async fn creating_a_thread_redirects_to_it() {
    let app = TestApp::new().await;

    let response = app
        .post_form(
            "/community/new",
            Some("alice"),
            &[
                ("title", "Trade deadline"),
                ("content", "Who moves first?"),
                ("kind", "free"),
                ("tags", "trade, rumours"),
                ("agree_to_terms", "on"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let thread_url = location(&response).to_string();
    assert!(thread_url.starts_with("/community/thread/"));

    let response = app.get(&thread_url, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Trade deadline"));
    assert!(html.contains("Who moves first?"));
    assert!(html.contains("rumours"));
}

#[tokio::test]
async fn invalid_thread_form_is_rerendered_with_the_message() {
    let app = TestApp::new().await;

    let response = app
        .post_form(
            "/community/new",
            Some("alice"),
            &[("title", "No consent"), ("content", "body"), ("kind", "free")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_text(response).await;
    assert!(html.contains("利用規約に同意してください"));
    assert!(html.contains("No consent"));

    let response = app
        .post_form(
            "/community/new",
            Some("alice"),
            &[("title", "Board"), ("content", "body"), ("kind", "team"), ("agree_to_terms", "on")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn team_board_resolves_slug_and_id() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    app.community
        .create_thread(
            &author,
            &bt_core::validation::NewThreadForm {
                title: "Lakers board".into(),
                content: "LeBron minutes".into(),
                kind: Some(bt_core::models::ThreadKind::Team),
                team_id: Some("lal".into()),
                agree_to_terms: Some("on".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    for path in ["/community/team/la-lakers", "/community/team/lal"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert!(body_text(response).await.contains("Lakers board"));
    }

    let response = app.get("/community/team/no-such-team", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replies_land_in_the_thread() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    let thread = app.thread(&author, "Game night").await;
    let before = app.community.thread_detail(&thread.id, None).await.unwrap();
    assert_eq!(before.thread.posts_count, 1);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let response = app
        .post_form(
            &format!("/community/thread/{}/posts", thread.id),
            Some("bob"),
            &[("content", "What a finish")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(&format!("/community/thread/{}#post-", thread.id)));

    let detail = app.community.thread_detail(&thread.id, None).await.unwrap();
    assert_eq!(detail.thread.posts_count, before.thread.posts_count + 1);
    assert_eq!(detail.posts.len(), 2);
    assert_eq!(detail.posts[0].body, "What a finish");
    assert_eq!(detail.posts[1].id, before.posts[0].id);

    // The thread author is told about the reply.
    let notes = app.community.notifications(&author, true).await.unwrap();
    assert_eq!(notes.len(), 1);
}

#[tokio::test]
async fn unknown_pages_are_404() {
    let app = TestApp::new().await;

    for path in ["/community/thread/missing", "/community/user/nobody", "/no/such/route"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }

    let response = app
        .post_form("/community/thread/missing/posts", Some("alice"), &[("content", "hi")])
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_thread_kind_is_a_bad_request() {
    let app = TestApp::new().await;
    let response = app.get("/community?kind=rumour", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/community?kind=team", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn thread_page_lists_newest_post_first() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    let bob = app.user("bob").await;
    let thread = app.thread(&author, "Trade deadline").await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let reply = app
        .community
        .create_post(
            &bob,
            &thread.id,
            &bt_core::validation::NewPostForm {
                content: "newest".into(),
                parent_post_id: None,
            },
        )
        .await
        .unwrap();

    let detail = app.community.thread_detail(&thread.id, None).await.unwrap();
    assert_eq!(detail.posts[0].id, reply.id);
    assert_eq!(app.opening_post(&thread).await, detail.posts[1].id);

    let html = body_text(app.get(&format!("/community/thread/{}", thread.id), None).await).await;
    let newest = html.find("newest").expect("reply rendered");
    let opening = html.find("Trade deadline body").expect("opening post rendered");
    assert!(newest < opening);
}
