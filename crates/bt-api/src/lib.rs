//! # bt-api
//!
//! The web routing and orchestration layer for Basket Talk.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

/// Builds the full site router with its layer stack.
///
/// # Developer Note
/// Writes are plain HTML form posts answered with 303 redirects, so every
/// mutating route is `POST`. The binary only has to bind a listener.
pub fn router(state: AppState) -> Router {
    let cors_origins = state.config.server.cors_origins.clone();

    let routes = Router::new()
        .route("/", get(handlers::home))
        .route("/healthz", get(handlers::healthz))
        // Community
        .route("/community", get(handlers::community))
        .route(
            "/community/new",
            get(handlers::new_thread_form).post(handlers::create_thread),
        )
        .route("/community/team/{slug}", get(handlers::team_board))
        .route("/community/thread/{id}", get(handlers::thread))
        .route("/community/thread/{id}/posts", post(handlers::create_post))
        .route("/community/posts/{id}", get(handlers::post_permalink))
        .route("/community/posts/{id}/like", post(handlers::toggle_like))
        .route("/community/posts/{id}/delete", post(handlers::delete_post))
        .route("/community/posts/{id}/report", post(handlers::report_post))
        .route("/community/user/{id}", get(handlers::profile))
        .route("/community/user/{id}/report", post(handlers::report_user))
        // Account
        .route("/me/profile", post(handlers::update_profile))
        .route("/me/favorites/{team_id}", post(handlers::add_favorite))
        .route("/me/favorites/{team_id}/remove", post(handlers::remove_favorite))
        .route("/notifications", get(handlers::notifications))
        .route("/notifications/{id}/read", post(handlers::mark_notification_read))
        // Moderation
        .route("/admin", get(handlers::admin))
        .route("/admin/reports/{id}", post(handlers::review_report))
        // CMS and fixed pages
        .route("/articles", get(handlers::articles))
        .route("/articles/{slug}", get(handlers::article))
        .route("/about", get(handlers::about))
        .route("/rules", get(handlers::rules))
        .route("/privacy", get(handlers::privacy))
        .fallback(handlers::not_found)
        .with_state(state);

    middleware::standard_layers(routes, &cors_origins)
}
