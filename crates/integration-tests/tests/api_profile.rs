use axum::http::StatusCode;
use integration_tests::{assert_redirect, body_text, TestApp};

#[tokio::test]
async fn first_visit_provisions_a_profile() {
    let app = TestApp::new().await;

    let response = app.get("/notifications", Some("newcomer")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = app.community.user("newcomer").await.unwrap();
    assert_eq!(user.display_name, "newcomer");
    assert!(!user.is_moderator());
}

#[tokio::test]
async fn profile_edit_is_validated() {
    let app = TestApp::new().await;

    let response = app
        .post_form(
            "/me/profile",
            Some("alice"),
            &[("display_name", "Alice B"), ("bio", "Lakers since 2004")],
        )
        .await;
    assert_redirect(&response, "/community/user/alice");

    let response = app.get("/community/user/alice", Some("bob")).await;
    let html = body_text(response).await;
    assert!(html.contains("Alice B"));
    assert!(html.contains("Lakers since 2004"));

    let response = app
        .post_form("/me/profile", Some("alice"), &[("display_name", "   ")])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn favourite_teams_are_capped_at_three() {
    let app = TestApp::new().await;

    for team in ["lal", "gsw", "bos"] {
        let response = app
            .post_form(&format!("/me/favorites/{team}"), Some("alice"), &[])
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{team}");
    }

    let response = app.post_form("/me/favorites/mia", Some("alice"), &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.post_form("/me/favorites/xyz", Some("alice"), &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_form("/me/favorites/gsw/remove", Some("alice"), &[])
        .await;
    assert_redirect(&response, "/community/user/alice");

    let user = app.community.user("alice").await.unwrap();
    assert_eq!(user.favorite_teams, vec!["lal", "bos"]);
}

#[tokio::test]
async fn notifications_can_be_marked_read_by_their_owner_only() {
    let app = TestApp::new().await;
    let author = app.user("alice").await;
    let bob = app.user("bob").await;
    let thread = app.thread(&author, "Playoff odds").await;
    app.community
        .create_post(
            &bob,
            &thread.id,
            &bt_core::validation::NewPostForm {
                content: "Top seed".into(),
                parent_post_id: None,
            },
        )
        .await
        .unwrap();

    let notes = app.community.notifications(&author, true).await.unwrap();
    let note_id = notes[0].id.clone();

    let response = app.get("/notifications?unread=true", Some("alice")).await;
    assert!(body_text(response).await.contains("Playoff odds"));

    let response = app
        .post_form(&format!("/notifications/{note_id}/read"), Some("bob"), &[])
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_form(&format!("/notifications/{note_id}/read"), Some("alice"), &[])
        .await;
    assert_redirect(&response, "/notifications");
    assert!(app.community.notifications(&author, true).await.unwrap().is_empty());
}
