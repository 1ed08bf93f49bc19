//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//!
//! The document store only promises equality lookups. Every method that
//! touches more than one record (a post and its thread's counter, a like
//! and its post's counter, a report and the post it removes) must be
//! applied atomically by the adapter.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::feed::{PostClause, ThreadClause};
use crate::likes::LikeOutcome;
use crate::models::{
    Article, ArticleCategory, ArticleQuery, Match, Notification, Post, Report, ReportStatus,
    Session, Team, Thread, User,
};
use crate::moderation::ReportReview;

/// Read access to user profiles, used by the author join.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>>;
}

/// Data persistence contract for the community.
#[async_trait]
pub trait CommunityRepo: UserDirectory {
    // User Operations
    /// Inserts `user` unless a profile with the same id exists; returns the stored profile.
    async fn insert_user_if_absent(&self, user: User) -> anyhow::Result<User>;
    async fn update_user(&self, user: &User) -> anyhow::Result<()>;

    // Team Operations
    async fn get_team(&self, id: &str) -> anyhow::Result<Option<Team>>;
    async fn find_team_by_slug(&self, slug: &str) -> anyhow::Result<Option<Team>>;
    async fn find_team_by_abbreviation(&self, abbreviation: &str) -> anyhow::Result<Option<Team>>;
    async fn list_teams(&self) -> anyhow::Result<Vec<Team>>;
    async fn upsert_team(&self, team: Team) -> anyhow::Result<()>;

    // Match Operations
    async fn get_match(&self, id: &str) -> anyhow::Result<Option<Match>>;
    /// Matches with `start <= start_time < end`.
    async fn list_matches_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Match>>;
    /// Updates the match carrying the same `external_id`, or inserts it. Returns the stored id.
    async fn upsert_match(&self, m: Match) -> anyhow::Result<String>;

    // Thread Operations
    async fn get_thread(&self, id: &str) -> anyhow::Result<Option<Thread>>;
    /// Candidates for the feed assembler; `None` scans the collection.
    async fn query_threads(&self, clause: Option<&ThreadClause>) -> anyhow::Result<Vec<Thread>>;
    /// Atomic: the thread and its opening post land together. The thread's
    /// `posts_count` already counts the opening post.
    async fn create_thread(&self, thread: Thread, opening_post: Post) -> anyhow::Result<()>;

    // Post Operations
    async fn get_post(&self, id: &str) -> anyhow::Result<Option<Post>>;
    async fn query_posts(&self, clause: Option<&PostClause>) -> anyhow::Result<Vec<Post>>;
    /// Atomic: inserts the post, increments the thread's `posts_count` and
    /// bumps its `updated_at`. Fails with `NotFound` when the thread is gone.
    async fn create_post(&self, post: Post) -> anyhow::Result<()>;
    /// Atomic: flags the post deleted and decrements `posts_count` (floor 0).
    /// Returns `false` when the post is missing or already deleted.
    async fn soft_delete_post(&self, post_id: &str, at: DateTime<Utc>) -> anyhow::Result<bool>;

    // Like Operations
    /// Atomic: flips the (user, post) like and adjusts `likes_count`.
    async fn toggle_like(
        &self,
        user_id: &str,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<LikeOutcome>;
    /// The subset of `post_ids` liked by `user_id`.
    async fn liked_post_ids(
        &self,
        user_id: &str,
        post_ids: &[String],
    ) -> anyhow::Result<HashSet<String>>;

    // Report Operations
    async fn insert_report(&self, report: Report) -> anyhow::Result<()>;
    async fn get_report(&self, id: &str) -> anyhow::Result<Option<Report>>;
    async fn query_reports(&self, status: Option<ReportStatus>) -> anyhow::Result<Vec<Report>>;
    /// Atomic: applies the review via [`crate::moderation::review`] and, for
    /// post removals, soft-deletes the target and resolves its other open
    /// reports ([`crate::moderation::resolve_sibling`]) in the same
    /// transaction. Fails with `NotFound` when the report or the post to
    /// remove is missing, leaving everything untouched.
    async fn review_report(&self, review: &ReportReview) -> anyhow::Result<Report>;

    // Notification Operations
    async fn insert_notification(&self, notification: Notification) -> anyhow::Result<()>;
    async fn query_notifications(&self, user_id: &str) -> anyhow::Result<Vec<Notification>>;
    /// Returns `false` unless the notification exists and belongs to `user_id`.
    async fn mark_notification_read(&self, user_id: &str, id: &str) -> anyhow::Result<bool>;
}

/// Session verification against the external identity provider.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` for a token that is well-formed but not valid (expired, bad signature).
    async fn verify(&self, token: &str) -> anyhow::Result<Option<Session>>;
}

/// Read-only article content from the headless CMS.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn list_articles(&self, query: &ArticleQuery) -> anyhow::Result<Vec<Article>>;
    async fn get_article(&self, slug: &str) -> anyhow::Result<Option<Article>>;
    async fn list_categories(&self) -> anyhow::Result<Vec<ArticleCategory>>;
}
