use axum::http::StatusCode;
use integration_tests::{assert_redirect, body_json, TestApp, SIGN_IN_URL};
use serde_json::json;

#[tokio::test]
async fn like_toggles_and_the_counter_follows() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    let thread = app.thread(&author, "Dunk contest").await;
    let post_id = app.opening_post(&thread).await;
    let like_url = format!("/community/posts/{post_id}/like");

    let response = app.post_json(&like_url, "bob").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "state": "liked", "likes_count": 1 }));

    let response = app.post_json(&like_url, "carol").await;
    assert_eq!(body_json(response).await, json!({ "state": "liked", "likes_count": 2 }));

    let response = app.post_json(&like_url, "bob").await;
    assert_eq!(body_json(response).await, json!({ "state": "not_liked", "likes_count": 1 }));

    assert_eq!(app.repo.like_count(&post_id).await, 1);
}

#[tokio::test]
async fn form_like_redirects_back_to_the_post() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    let thread = app.thread(&author, "Rookie watch").await;
    let post_id = app.opening_post(&thread).await;

    let response = app
        .post_form(&format!("/community/posts/{post_id}/like"), Some("bob"), &[])
        .await;
    assert_redirect(&response, &format!("/community/posts/{post_id}"));

    let response = app.get(&format!("/community/posts/{post_id}"), None).await;
    assert_redirect(&response, &format!("/community/thread/{}#post-{post_id}", thread.id));
}

#[tokio::test]
async fn liking_needs_a_session_and_a_live_post() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    let thread = app.thread(&author, "Bench mob").await;
    let post_id = app.opening_post(&thread).await;

    let response = app
        .post_form(&format!("/community/posts/{post_id}/like"), None, &[])
        .await;
    assert_redirect(&response, SIGN_IN_URL);

    let response = app.post_json("/community/posts/missing/like", "bob").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.community.delete_post(&author, &post_id).await.unwrap();
    let response = app
        .post_json(&format!("/community/posts/{post_id}/like"), "bob")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_author_may_delete() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    let thread = app.thread(&author, "Hot takes").await;
    let post_id = app.opening_post(&thread).await;
    let delete_url = format!("/community/posts/{post_id}/delete");

    let response = app.post_form(&delete_url, Some("bob"), &[]).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.post_form(&delete_url, Some("alice"), &[]).await;
    assert_redirect(&response, &format!("/community/thread/{}", thread.id));

    let post = app.community.post(&post_id).await.unwrap();
    assert!(post.deleted_flag);
    let detail = app.community.thread_detail(&thread.id, None).await.unwrap();
    assert_eq!(detail.thread.posts_count, 0);
}
