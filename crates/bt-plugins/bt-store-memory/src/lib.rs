//! # bt-store-memory
//!
//! An in-process document store. All collections sit behind one
//! `RwLock`, so every composite write runs under a single write guard and
//! is atomic with respect to every other request. Used for local runs
//! (`store.url = "memory"`) and by the router tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bt_core::counters;
use bt_core::error::AppError;
use bt_core::feed::{PostClause, ThreadClause};
use bt_core::likes::{self, LikeOutcome, LikeState};
use bt_core::models::{
    new_id, Like, Match, Notification, Post, Report, ReportStatus, Team, Thread, User,
};
use bt_core::moderation::{self, ReportReview};
use bt_core::traits::{CommunityRepo, UserDirectory};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Collections {
    users: HashMap<String, User>,
    teams: HashMap<String, Team>,
    matches: HashMap<String, Match>,
    threads: HashMap<String, Thread>,
    posts: HashMap<String, Post>,
    /// Keyed by (user_id, post_id): one like per pair.
    likes: HashMap<(String, String), Like>,
    reports: HashMap<String, Report>,
    notifications: HashMap<String, Notification>,
}

impl Collections {
    /// Flags the post deleted and decrements its thread's counter.
    fn soft_delete(&mut self, post_id: &str, at: DateTime<Utc>) -> bool {
        let Some(post) = self.posts.get_mut(post_id) else {
            return false;
        };
        if post.deleted_flag {
            return false;
        }
        post.deleted_flag = true;
        post.deleted_at = Some(at);

        if let Some(thread) = self.threads.get_mut(&post.thread_id) {
            thread.posts_count = counters::adjust(thread.posts_count, -1);
        }
        true
    }
}

fn missing(entity: &str, id: &str) -> anyhow::Error {
    anyhow::Error::new(AppError::not_found(entity, id))
}

#[derive(Debug, Default)]
pub struct MemoryCommunityRepo {
    state: RwLock<Collections>,
}

impl MemoryCommunityRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored likes for `post_id`.
    pub async fn like_count(&self, post_id: &str) -> usize {
        let state = self.state.read().await;
        state.likes.keys().filter(|(_, p)| p == post_id).count()
    }

    /// Stores `user` as given, replacing any existing profile. Roles can
    /// only be granted this way.
    pub async fn set_user(&self, user: User) {
        self.state.write().await.users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for MemoryCommunityRepo {
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        Ok(self.state.read().await.users.get(id).cloned())
    }
}

#[async_trait]
impl CommunityRepo for MemoryCommunityRepo {
    async fn insert_user_if_absent(&self, user: User) -> anyhow::Result<User> {
        let mut state = self.state.write().await;
        Ok(state.users.entry(user.id.clone()).or_insert(user).clone())
    }

    async fn update_user(&self, user: &User) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .users
            .get_mut(&user.id)
            .ok_or_else(|| missing("User", &user.id))?;
        *stored = user.clone();
        Ok(())
    }

    async fn get_team(&self, id: &str) -> anyhow::Result<Option<Team>> {
        Ok(self.state.read().await.teams.get(id).cloned())
    }

    async fn find_team_by_slug(&self, slug: &str) -> anyhow::Result<Option<Team>> {
        let state = self.state.read().await;
        Ok(state.teams.values().find(|t| t.slug == slug).cloned())
    }

    async fn find_team_by_abbreviation(&self, abbreviation: &str) -> anyhow::Result<Option<Team>> {
        let state = self.state.read().await;
        Ok(state
            .teams
            .values()
            .find(|t| t.abbreviation == abbreviation)
            .cloned())
    }

    async fn list_teams(&self) -> anyhow::Result<Vec<Team>> {
        Ok(self.state.read().await.teams.values().cloned().collect())
    }

    async fn upsert_team(&self, team: Team) -> anyhow::Result<()> {
        self.state.write().await.teams.insert(team.id.clone(), team);
        Ok(())
    }

    async fn get_match(&self, id: &str) -> anyhow::Result<Option<Match>> {
        Ok(self.state.read().await.matches.get(id).cloned())
    }

    async fn list_matches_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Match>> {
        let state = self.state.read().await;
        Ok(state
            .matches
            .values()
            .filter(|m| start <= m.start_time && m.start_time < end)
            .cloned()
            .collect())
    }

    async fn upsert_match(&self, mut m: Match) -> anyhow::Result<String> {
        let mut state = self.state.write().await;
        let existing = m.external_id.as_ref().and_then(|ext| {
            state
                .matches
                .values()
                .find(|stored| stored.external_id.as_ref() == Some(ext))
        });
        if let Some(existing) = existing {
            m.id = existing.id.clone();
            m.created_at = existing.created_at;
        }
        let id = m.id.clone();
        state.matches.insert(id.clone(), m);
        Ok(id)
    }

    async fn get_thread(&self, id: &str) -> anyhow::Result<Option<Thread>> {
        Ok(self.state.read().await.threads.get(id).cloned())
    }

    async fn query_threads(&self, clause: Option<&ThreadClause>) -> anyhow::Result<Vec<Thread>> {
        let state = self.state.read().await;
        Ok(state
            .threads
            .values()
            .filter(|t| clause.is_none_or(|c| c.matches(t)))
            .cloned()
            .collect())
    }

    async fn create_thread(&self, thread: Thread, opening_post: Post) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if state.threads.contains_key(&thread.id) {
            anyhow::bail!(AppError::Conflict(format!("thread {} already exists", thread.id)));
        }
        state.posts.insert(opening_post.id.clone(), opening_post);
        state.threads.insert(thread.id.clone(), thread);
        Ok(())
    }

    async fn get_post(&self, id: &str) -> anyhow::Result<Option<Post>> {
        Ok(self.state.read().await.posts.get(id).cloned())
    }

    async fn query_posts(&self, clause: Option<&PostClause>) -> anyhow::Result<Vec<Post>> {
        let state = self.state.read().await;
        Ok(state
            .posts
            .values()
            .filter(|p| clause.is_none_or(|c| c.matches(p)))
            .cloned()
            .collect())
    }

    async fn create_post(&self, post: Post) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let thread = state
            .threads
            .get_mut(&post.thread_id)
            .ok_or_else(|| missing("Thread", &post.thread_id))?;
        thread.posts_count = counters::adjust(thread.posts_count, 1);
        thread.updated_at = post.created_at;
        state.posts.insert(post.id.clone(), post);
        Ok(())
    }

    async fn soft_delete_post(&self, post_id: &str, at: DateTime<Utc>) -> anyhow::Result<bool> {
        Ok(self.state.write().await.soft_delete(post_id, at))
    }

    async fn toggle_like(
        &self,
        user_id: &str,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<LikeOutcome> {
        let mut state = self.state.write().await;
        let likes_count = match state.posts.get(post_id) {
            Some(post) if !post.deleted_flag => post.likes_count,
            _ => return Err(missing("Post", post_id)),
        };

        let key = (user_id.to_string(), post_id.to_string());
        let transition = likes::toggle(LikeState::from_present(state.likes.contains_key(&key)));
        if transition.to.is_liked() {
            let like = Like {
                id: new_id(),
                user_id: user_id.to_string(),
                post_id: post_id.to_string(),
                created_at: at,
            };
            state.likes.insert(key, like);
        } else {
            state.likes.remove(&key);
        }

        let likes_count = transition.apply_to(likes_count);
        if let Some(post) = state.posts.get_mut(post_id) {
            post.likes_count = likes_count;
        }
        debug!(user_id, post_id, liked = transition.to.is_liked(), "like toggled");

        Ok(LikeOutcome {
            state: transition.to,
            likes_count,
        })
    }

    async fn liked_post_ids(
        &self,
        user_id: &str,
        post_ids: &[String],
    ) -> anyhow::Result<HashSet<String>> {
        let state = self.state.read().await;
        Ok(post_ids
            .iter()
            .filter(|id| state.likes.contains_key(&(user_id.to_string(), (*id).clone())))
            .cloned()
            .collect())
    }

    async fn insert_report(&self, report: Report) -> anyhow::Result<()> {
        self.state
            .write()
            .await
            .reports
            .insert(report.id.clone(), report);
        Ok(())
    }

    async fn get_report(&self, id: &str) -> anyhow::Result<Option<Report>> {
        Ok(self.state.read().await.reports.get(id).cloned())
    }

    async fn query_reports(&self, status: Option<ReportStatus>) -> anyhow::Result<Vec<Report>> {
        let state = self.state.read().await;
        Ok(state
            .reports
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect())
    }

    async fn review_report(&self, review: &ReportReview) -> anyhow::Result<Report> {
        let mut state = self.state.write().await;
        let report = state
            .reports
            .get(&review.report_id)
            .ok_or_else(|| missing("Report", &review.report_id))?;

        // Everything is checked before the first write.
        let reviewed = moderation::review(report, review)?;
        let siblings: Vec<Report> = if review.removes_post() {
            if !state.posts.contains_key(&reviewed.target_id) {
                return Err(missing("Post", &reviewed.target_id));
            }
            state
                .reports
                .values()
                .filter_map(|other| moderation::resolve_sibling(&reviewed, other, review))
                .collect()
        } else {
            Vec::new()
        };

        if review.removes_post() {
            state.soft_delete(&reviewed.target_id, review.reviewed_at);
        }
        for sibling in siblings {
            state.reports.insert(sibling.id.clone(), sibling);
        }
        state.reports.insert(reviewed.id.clone(), reviewed.clone());
        Ok(reviewed)
    }

    async fn insert_notification(&self, notification: Notification) -> anyhow::Result<()> {
        self.state
            .write()
            .await
            .notifications
            .insert(notification.id.clone(), notification);
        Ok(())
    }

    async fn query_notifications(&self, user_id: &str) -> anyhow::Result<Vec<Notification>> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, user_id: &str, id: &str) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        match state.notifications.get_mut(id) {
            Some(n) if n.user_id == user_id => {
                n.read_flag = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_core::models::{ReportTarget, ThreadKind};
    use bt_core::moderation::ReviewAction;
    use std::sync::Arc;

    fn thread(id: &str) -> Thread {
        let now = Utc::now();
        Thread {
            id: id.into(),
            title: "試合後の感想".into(),
            kind: ThreadKind::Free,
            match_id: None,
            team_id: None,
            author_id: "author".into(),
            tags: vec![],
            pinned: false,
            likes_count: 0,
            posts_count: 1,
            views_count: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn post(id: &str, thread_id: &str) -> Post {
        Post {
            id: id.into(),
            thread_id: thread_id.into(),
            author_id: "author".into(),
            parent_post_id: None,
            content: "ナイスゲーム".into(),
            likes_count: 0,
            deleted_flag: false,
            deleted_at: None,
            created_at: Utc::now(),
            edited_at: None,
        }
    }

    async fn seeded() -> MemoryCommunityRepo {
        let repo = MemoryCommunityRepo::new();
        repo.create_thread(thread("t1"), post("op", "t1")).await.unwrap();
        repo.create_post(post("p1", "t1")).await.unwrap();
        repo
    }

    fn removal(report_id: &str) -> ReportReview {
        ReportReview {
            report_id: report_id.into(),
            moderator_id: "mod".into(),
            action: ReviewAction::RemovePost,
            reviewed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn posting_and_deleting_keep_the_counter_in_step() {
        let repo = seeded().await;
        assert_eq!(repo.get_thread("t1").await.unwrap().unwrap().posts_count, 2);

        assert!(repo.soft_delete_post("p1", Utc::now()).await.unwrap());
        assert!(!repo.soft_delete_post("p1", Utc::now()).await.unwrap());
        assert_eq!(repo.get_thread("t1").await.unwrap().unwrap().posts_count, 1);

        let orphan = repo.create_post(post("p2", "gone")).await.unwrap_err();
        assert!(matches!(AppError::from(orphan), AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn concurrent_toggles_never_duplicate_likes() {
        let repo = Arc::new(seeded().await);

        let toggles = (0..25).map(|_| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.toggle_like("fan", "p1", Utc::now()).await })
        });
        for handle in futures_util::future::join_all(toggles).await {
            handle.unwrap().unwrap();
        }

        // An odd number of toggles leaves exactly one like.
        let post = repo.get_post("p1").await.unwrap().unwrap();
        assert_eq!(repo.like_count("p1").await, 1);
        assert_eq!(post.likes_count, 1);
    }

    #[tokio::test]
    async fn liking_a_deleted_post_is_not_found() {
        let repo = seeded().await;
        repo.soft_delete_post("p1", Utc::now()).await.unwrap();
        let err = repo.toggle_like("fan", "p1", Utc::now()).await.unwrap_err();
        assert!(matches!(AppError::from(err), AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn removal_resolves_every_open_report_on_the_post() {
        let repo = seeded().await;
        let now = Utc::now();
        let first = moderation::new_report("u1", ReportTarget::Post, "p1", "スパム".into(), now);
        let second = moderation::new_report("u2", ReportTarget::Post, "p1", "荒らし".into(), now);
        repo.insert_report(first.clone()).await.unwrap();
        repo.insert_report(second.clone()).await.unwrap();

        let resolved = repo.review_report(&removal(&first.id)).await.unwrap();
        assert_eq!(resolved.status, ReportStatus::Resolved);

        assert!(repo.get_post("p1").await.unwrap().unwrap().deleted_flag);
        assert!(repo
            .query_reports(Some(ReportStatus::Pending))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(repo.get_thread("t1").await.unwrap().unwrap().posts_count, 1);
    }

    #[tokio::test]
    async fn failed_removal_changes_nothing() {
        let repo = seeded().await;
        let report =
            moderation::new_report("u1", ReportTarget::Post, "ghost", "スパム".into(), Utc::now());
        repo.insert_report(report.clone()).await.unwrap();

        let err = repo.review_report(&removal(&report.id)).await.unwrap_err();
        assert!(matches!(AppError::from(err), AppError::NotFound(..)));

        let stored = repo.get_report(&report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Pending);
        assert_eq!(stored.reviewed_by, None);
    }

    #[tokio::test]
    async fn upsert_match_is_keyed_by_external_id() {
        let repo = MemoryCommunityRepo::new();
        let game = |status| Match {
            id: new_id(),
            home_team_id: "lal".into(),
            away_team_id: "bos".into(),
            start_time: Utc::now(),
            status,
            score_home: None,
            score_away: None,
            boxscore_url: None,
            external_id: Some("nba-42".into()),
            created_at: Utc::now(),
            updated_at: None,
        };
        let first = repo
            .upsert_match(game(bt_core::MatchStatus::Scheduled))
            .await
            .unwrap();
        let second = repo
            .upsert_match(game(bt_core::MatchStatus::Finished))
            .await
            .unwrap();

        assert_eq!(first, second);
        let stored = repo.get_match(&first).await.unwrap().unwrap();
        assert_eq!(stored.status, bt_core::MatchStatus::Finished);
    }

    #[tokio::test]
    async fn notifications_are_marked_read_by_their_owner_only() {
        let repo = MemoryCommunityRepo::new();
        let n = Notification {
            id: "n1".into(),
            user_id: "owner".into(),
            kind: bt_core::NotificationKind::Reply,
            payload: serde_json::json!({ "thread_id": "t1" }),
            read_flag: false,
            created_at: Utc::now(),
        };
        repo.insert_notification(n).await.unwrap();

        assert!(!repo.mark_notification_read("intruder", "n1").await.unwrap());
        assert!(repo.mark_notification_read("owner", "n1").await.unwrap());
        assert!(repo.query_notifications("owner").await.unwrap()[0].read_flag);
    }
}
