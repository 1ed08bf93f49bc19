//! # Community Service
//!
//! Orchestrates the store port, the feed assembler and the author join for
//! every page and action. Handlers hold one `Community` and never talk to
//! the store directly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::error::{AppError, Result};
use crate::feed::{
    assemble, degrade, NotificationFilter, NotificationQuery, NotificationSortKey, PostFilter,
    PostQuery, PostSortKey, ReportFilter, ReportQuery, ReportSortKey, SortDirection,
    ThreadFilter, ThreadQuery,
};
use crate::join::{attach_authors, join_authors, resolve_authors};
use crate::likes::LikeOutcome;
use crate::models::{
    new_id, Match, Notification, NotificationKind, Post, Report, ReportStatus, ReportTarget,
    Session, Team, Thread, ThreadKind, User,
};
use crate::moderation::{self, ReportReview, ReviewAction};
use crate::schedule::{jst_day_window, FeedGame};
use crate::teams::{backfill_slug, NBA_TEAMS};
use crate::traits::{CommunityRepo, UserDirectory};
use crate::validation::{self, NewPostForm, NewThreadForm, ProfileForm};
use crate::views::{MatchCard, PostView, ProfilePage, TeamBoard, ThreadCard, ThreadDetail};

/// The moderation queue shows at most this many reports.
pub const MODERATION_QUEUE_LIMIT: usize = 50;
pub const NOTIFICATION_LIMIT: usize = 50;
pub const PROFILE_THREAD_LIMIT: usize = 20;

/// How many threads each listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub home: usize,
    pub community: usize,
    pub team_board: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            home: 10,
            community: 20,
            team_board: 100,
        }
    }
}

#[derive(Clone)]
pub struct Community {
    repo: Arc<dyn CommunityRepo>,
    limits: FeedLimits,
}

impl Community {
    pub fn new(repo: Arc<dyn CommunityRepo>, limits: FeedLimits) -> Self {
        Self { repo, limits }
    }

    pub fn limits(&self) -> FeedLimits {
        self.limits
    }

    // ── Feeds ──────────────────────────────────────────────────────────────

    /// Assembles a thread feed and joins its authors.
    #[instrument(skip(self))]
    pub async fn thread_feed(&self, query: &ThreadQuery) -> Result<Vec<ThreadCard>> {
        let candidates = self
            .repo
            .query_threads(query.filter.pushdown().as_ref())
            .await?;
        let threads = assemble(candidates, query);
        Ok(join_authors(threads, self.repo.as_ref()).await)
    }

    /// Newest threads of any kind, for the home page.
    pub async fn home_threads(&self) -> Vec<ThreadCard> {
        let query = ThreadQuery::newest(ThreadFilter::default(), self.limits.home);
        degrade("home.threads", self.thread_feed(&query)).await
    }

    /// The community index, optionally narrowed to one thread kind.
    pub async fn community_threads(&self, kind: Option<ThreadKind>) -> Vec<ThreadCard> {
        let filter = ThreadFilter {
            kind,
            ..ThreadFilter::default()
        };
        let query = ThreadQuery::newest(filter, self.limits.community);
        degrade("community.threads", self.thread_feed(&query)).await
    }

    /// All teams, ordered by abbreviation.
    pub async fn teams(&self) -> Result<Vec<Team>> {
        let mut teams = self.repo.list_teams().await?;
        teams.sort_by(|a, b| a.abbreviation.cmp(&b.abbreviation));
        Ok(teams)
    }

    /// Resolves `/community/team/{key}`: by slug first, then by id.
    #[instrument(skip(self))]
    pub async fn team_by_route_key(&self, key: &str) -> Result<Team> {
        if let Some(team) = self.repo.find_team_by_slug(key).await? {
            return Ok(team);
        }
        self.repo
            .get_team(key)
            .await?
            .ok_or_else(|| AppError::not_found("Team", key))
    }

    pub async fn team_board(&self, key: &str) -> Result<TeamBoard> {
        let team = self.team_by_route_key(key).await?;
        let query = ThreadQuery::newest(ThreadFilter::team_board(&team.id), self.limits.team_board);
        let threads = degrade("team.threads", self.thread_feed(&query)).await;
        Ok(TeamBoard { team, threads })
    }

    /// The thread page: header, posts newest first, and the match or team
    /// the thread belongs to. Authors of the thread and of every post are
    /// resolved in a single batch.
    #[instrument(skip(self, viewer), fields(viewer = viewer.map(|v| v.id.as_str())))]
    pub async fn thread_detail(
        &self,
        thread_id: &str,
        viewer: Option<&User>,
    ) -> Result<ThreadDetail> {
        let thread = self
            .repo
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", thread_id))?;

        let query = PostQuery {
            filter: PostFilter::in_thread(thread_id),
            sort: PostSortKey::CreatedAt,
            direction: SortDirection::Desc,
            limit: None,
        };
        let posts = degrade("thread.posts", async {
            let candidates = self.repo.query_posts(query.filter.pushdown().as_ref()).await?;
            anyhow::Ok(assemble(candidates, &query))
        })
        .await;

        let author_ids = std::iter::once(thread.author_id.as_str())
            .chain(posts.iter().map(|p| p.author_id.as_str()));
        let authors = resolve_authors(author_ids, self.repo.as_ref()).await;
        let author = authors.get(&thread.author_id).cloned();

        let liked = match viewer {
            Some(viewer) => {
                let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
                degrade("thread.likes", self.repo.liked_post_ids(&viewer.id, &ids)).await
            }
            None => Default::default(),
        };

        let posts = attach_authors(posts, &authors)
            .into_iter()
            .map(|joined| {
                let is_liked = liked.contains(&joined.record.id);
                PostView::new(joined, viewer, is_liked)
            })
            .collect();

        let team = match thread.team_id.as_deref() {
            Some(id) => degrade("thread.team", self.repo.get_team(id)).await,
            None => None,
        };
        let game = match thread.match_id.as_deref() {
            Some(id) => degrade("thread.match", self.match_card(id)).await,
            None => None,
        };

        Ok(ThreadDetail {
            thread,
            author,
            team,
            game,
            posts,
        })
    }

    async fn match_card(&self, match_id: &str) -> anyhow::Result<Option<MatchCard>> {
        let Some(game) = self.repo.get_match(match_id).await? else {
            return Ok(None);
        };
        let home = self.repo.get_team(&game.home_team_id).await?;
        let away = self.repo.get_team(&game.away_team_id).await?;
        Ok(Some(MatchCard { game, home, away }))
    }

    // ── Writing ────────────────────────────────────────────────────────────

    /// Creates a thread together with its opening post.
    #[instrument(skip(self, author, form), fields(author = %author.id))]
    pub async fn create_thread(&self, author: &User, form: &NewThreadForm) -> Result<Thread> {
        let valid = validation::validate_thread(form)?;

        if let Some(team_id) = valid.team_id.as_deref() {
            if self.repo.get_team(team_id).await?.is_none() {
                return Err(AppError::not_found("Team", team_id));
            }
        }
        if let Some(match_id) = valid.match_id.as_deref() {
            if self.repo.get_match(match_id).await?.is_none() {
                return Err(AppError::not_found("Match", match_id));
            }
        }

        let now = Utc::now();
        let thread = Thread {
            id: new_id(),
            title: valid.title,
            kind: valid.kind,
            match_id: valid.match_id,
            team_id: valid.team_id,
            author_id: author.id.clone(),
            tags: valid.tags,
            pinned: false,
            likes_count: 0,
            posts_count: 1,
            views_count: None,
            created_at: now,
            updated_at: now,
        };
        thread.check_scope()?;

        let opening = Post {
            id: new_id(),
            thread_id: thread.id.clone(),
            author_id: author.id.clone(),
            parent_post_id: None,
            content: valid.content,
            likes_count: 0,
            deleted_flag: false,
            deleted_at: None,
            created_at: now,
            edited_at: None,
        };

        self.repo.create_thread(thread.clone(), opening).await?;
        info!(thread_id = %thread.id, kind = %thread.kind, "thread created");
        Ok(thread)
    }

    /// Replies in a thread and notifies the thread author.
    #[instrument(skip(self, author, form), fields(author = %author.id))]
    pub async fn create_post(
        &self,
        author: &User,
        thread_id: &str,
        form: &NewPostForm,
    ) -> Result<Post> {
        let content = validation::validate_post(form)?;
        let thread = self
            .repo
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", thread_id))?;

        let parent_post_id = form
            .parent_post_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        if let Some(parent_id) = parent_post_id {
            let parent = self.repo.get_post(parent_id).await?;
            if parent.is_none_or(|p| p.thread_id != thread.id) {
                return Err(AppError::ValidationError(
                    "返信先の投稿が見つかりません".into(),
                ));
            }
        }

        let post = Post {
            id: new_id(),
            thread_id: thread.id.clone(),
            author_id: author.id.clone(),
            parent_post_id: parent_post_id.map(str::to_string),
            content,
            likes_count: 0,
            deleted_flag: false,
            deleted_at: None,
            created_at: Utc::now(),
            edited_at: None,
        };
        self.repo.create_post(post.clone()).await?;
        info!(post_id = %post.id, thread_id = %thread.id, "post created");

        if thread.author_id != author.id {
            self.notify_reply(&thread, &post, author).await;
        }
        Ok(post)
    }

    /// Best effort: a failed notification never fails the reply.
    async fn notify_reply(&self, thread: &Thread, post: &Post, actor: &User) {
        let notification = Notification {
            id: new_id(),
            user_id: thread.author_id.clone(),
            kind: NotificationKind::Reply,
            payload: json!({
                "thread_id": thread.id,
                "thread_title": thread.title,
                "post_id": post.id,
                "actor_id": actor.id,
                "actor_name": actor.display_name,
            }),
            read_flag: false,
            created_at: post.created_at,
        };
        if let Err(err) = self.repo.insert_notification(notification).await {
            warn!(thread_id = %thread.id, error = %err, "reply notification failed");
        }
    }

    /// Soft-deletes a post. Only its author or a moderator may do so;
    /// deleting an already-deleted post changes nothing.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn delete_post(&self, actor: &User, post_id: &str) -> Result<Post> {
        let post = self
            .repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", post_id))?;

        if post.author_id != actor.id && !actor.is_moderator() {
            return Err(AppError::Forbidden("この投稿を削除する権限がありません".into()));
        }
        if post.deleted_flag {
            return Ok(post);
        }

        if self.repo.soft_delete_post(post_id, Utc::now()).await? {
            info!(post_id, "post deleted");
        }
        Ok(post)
    }

    pub async fn post(&self, post_id: &str) -> Result<Post> {
        self.repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", post_id))
    }

    #[instrument(skip(self, user), fields(user = %user.id))]
    pub async fn toggle_like(&self, user: &User, post_id: &str) -> Result<LikeOutcome> {
        match self.repo.get_post(post_id).await? {
            Some(post) if !post.deleted_flag => {}
            _ => return Err(AppError::not_found("Post", post_id)),
        }
        Ok(self.repo.toggle_like(&user.id, post_id, Utc::now()).await?)
    }

    // ── Reports ────────────────────────────────────────────────────────────

    #[instrument(skip(self, reporter, details), fields(reporter = %reporter.id))]
    pub async fn report(
        &self,
        reporter: &User,
        target_type: ReportTarget,
        target_id: &str,
        reason: &str,
        details: Option<&str>,
    ) -> Result<Report> {
        let reason = moderation::compose_reason(reason, details)?;
        let exists = match target_type {
            ReportTarget::Post => self
                .repo
                .get_post(target_id)
                .await?
                .is_some_and(|post| !post.deleted_flag),
            ReportTarget::User => self.repo.get_user(target_id).await?.is_some(),
        };
        if !exists {
            return Err(AppError::not_found(target_type.as_str(), target_id));
        }

        let report =
            moderation::new_report(&reporter.id, target_type, target_id, reason, Utc::now());
        self.repo.insert_report(report.clone()).await?;
        info!(report_id = %report.id, %target_type, target_id, "report filed");
        Ok(report)
    }

    /// Pending reports, or every report with `include_closed`, newest first.
    #[instrument(skip(self, moderator), fields(moderator = %moderator.id))]
    pub async fn moderation_queue(
        &self,
        moderator: &User,
        include_closed: bool,
    ) -> Result<Vec<Report>> {
        require_moderator(moderator)?;
        let filter = ReportFilter {
            status: (!include_closed).then_some(ReportStatus::Pending),
        };
        let query = ReportQuery {
            filter,
            sort: ReportSortKey::CreatedAt,
            direction: SortDirection::Desc,
            limit: Some(MODERATION_QUEUE_LIMIT),
        };
        let candidates = self.repo.query_reports(filter.status).await?;
        Ok(assemble(candidates, &query))
    }

    #[instrument(skip(self, moderator), fields(moderator = %moderator.id))]
    pub async fn review_report(
        &self,
        moderator: &User,
        report_id: &str,
        action: ReviewAction,
    ) -> Result<Report> {
        require_moderator(moderator)?;
        let review = ReportReview {
            report_id: report_id.to_string(),
            moderator_id: moderator.id.clone(),
            action,
            reviewed_at: Utc::now(),
        };
        let report = self.repo.review_report(&review).await?;
        info!(report_id, status = %report.status, ?action, "report reviewed");
        Ok(report)
    }

    // ── Profiles ───────────────────────────────────────────────────────────

    /// Returns the stored profile, provisioning one on first sign-in.
    pub async fn ensure_profile(&self, session: &Session) -> Result<User> {
        let fresh = User::from_session(session, Utc::now());
        Ok(self.repo.insert_user_if_absent(fresh).await?)
    }

    pub async fn user(&self, user_id: &str) -> Result<User> {
        self.repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))
    }

    #[instrument(skip(self, user, form), fields(user = %user.id))]
    pub async fn update_profile(&self, user: &User, form: &ProfileForm) -> Result<User> {
        let valid = validation::validate_profile(form)?;
        let updated = User {
            display_name: valid.display_name,
            bio: valid.bio,
            avatar_url: valid.avatar_url,
            updated_at: Some(Utc::now()),
            ..user.clone()
        };
        self.repo.update_user(&updated).await?;
        Ok(updated)
    }

    pub async fn profile(&self, user_id: &str, viewer: Option<&User>) -> Result<ProfilePage> {
        let user = self.user(user_id).await?;
        let query = ThreadQuery::newest(ThreadFilter::by_author(&user.id), PROFILE_THREAD_LIMIT);
        let threads = degrade("profile.threads", async {
            let candidates = self.repo.query_threads(query.filter.pushdown().as_ref()).await?;
            anyhow::Ok(assemble(candidates, &query))
        })
        .await;
        let favorite_teams = degrade("profile.favorites", self.favorite_teams(&user)).await;
        let is_self = viewer.is_some_and(|v| v.id == user.id);

        Ok(ProfilePage {
            user,
            favorite_teams,
            threads,
            is_self,
        })
    }

    #[instrument(skip(self, user), fields(user = %user.id))]
    pub async fn add_favorite_team(&self, user: &User, team_id: &str) -> Result<User> {
        if self.repo.get_team(team_id).await?.is_none() {
            return Err(AppError::not_found("Team", team_id));
        }
        let mut updated = user.clone();
        if updated.add_favorite_team(team_id)? {
            updated.updated_at = Some(Utc::now());
            self.repo.update_user(&updated).await?;
        }
        Ok(updated)
    }

    #[instrument(skip(self, user), fields(user = %user.id))]
    pub async fn remove_favorite_team(&self, user: &User, team_id: &str) -> Result<User> {
        let mut updated = user.clone();
        if updated.remove_favorite_team(team_id) {
            updated.updated_at = Some(Utc::now());
            self.repo.update_user(&updated).await?;
        }
        Ok(updated)
    }

    /// The user's favourite teams in their chosen order; missing teams are skipped.
    pub async fn favorite_teams(&self, user: &User) -> Result<Vec<Team>> {
        let mut teams = Vec::with_capacity(user.favorite_teams.len());
        for id in &user.favorite_teams {
            if let Some(team) = self.repo.get_team(id).await? {
                teams.push(team);
            }
        }
        Ok(teams)
    }

    // ── Matches ────────────────────────────────────────────────────────────

    /// Matches starting on the JST calendar day containing `now`, earliest first.
    pub async fn today_matches(&self, now: DateTime<Utc>) -> Result<Vec<MatchCard>> {
        let (start, end) = jst_day_window(now);
        let mut games = self.repo.list_matches_between(start, end).await?;
        games.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

        let teams: HashMap<String, Team> = self
            .repo
            .list_teams()
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        Ok(games
            .into_iter()
            .map(|game| MatchCard {
                home: teams.get(&game.home_team_id).cloned(),
                away: teams.get(&game.away_team_id).cloned(),
                game,
            })
            .collect())
    }

    /// Upserts a game from the schedule feed. Returns `None` when either
    /// team is unknown.
    #[instrument(skip(self, game), fields(external_id = %game.external_id))]
    pub async fn sync_game(&self, game: FeedGame) -> Result<Option<String>> {
        let home = self.repo.find_team_by_abbreviation(&game.home_abbreviation).await?;
        let away = self.repo.find_team_by_abbreviation(&game.away_abbreviation).await?;
        let (Some(home), Some(away)) = (home, away) else {
            warn!(
                home = %game.home_abbreviation,
                away = %game.away_abbreviation,
                "skipping game with unknown team"
            );
            return Ok(None);
        };
        let id = self.repo.upsert_match(game.into_match(home.id, away.id, Utc::now())).await?;
        Ok(Some(id))
    }

    pub async fn get_match(&self, match_id: &str) -> Result<Match> {
        self.repo
            .get_match(match_id)
            .await?
            .ok_or_else(|| AppError::not_found("Match", match_id))
    }

    // ── Teams ──────────────────────────────────────────────────────────────

    /// Inserts every NBA team not already present (matched by abbreviation).
    pub async fn seed_teams(&self) -> Result<usize> {
        let now = Utc::now();
        let mut inserted = 0;
        for seed in NBA_TEAMS {
            if self.repo.find_team_by_abbreviation(seed.abbreviation).await?.is_some() {
                continue;
            }
            self.repo.upsert_team(seed.into_team(now)).await?;
            inserted += 1;
        }
        info!(inserted, "teams seeded");
        Ok(inserted)
    }

    /// Gives every team without a slug one. Returns how many were updated.
    pub async fn backfill_slugs(&self) -> Result<usize> {
        let mut updated = 0;
        for mut team in self.repo.list_teams().await? {
            if backfill_slug(&mut team) {
                info!(team_id = %team.id, slug = %team.slug, "slug added");
                self.repo.upsert_team(team).await?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    // ── Notifications ──────────────────────────────────────────────────────

    pub async fn notifications(&self, user: &User, unread_only: bool) -> Result<Vec<Notification>> {
        let query = NotificationQuery {
            filter: NotificationFilter { unread_only },
            sort: NotificationSortKey,
            direction: SortDirection::Desc,
            limit: Some(NOTIFICATION_LIMIT),
        };
        let candidates = self.repo.query_notifications(&user.id).await?;
        Ok(assemble(candidates, &query))
    }

    pub async fn mark_notification_read(&self, user: &User, notification_id: &str) -> Result<()> {
        if self.repo.mark_notification_read(&user.id, notification_id).await? {
            Ok(())
        } else {
            Err(AppError::not_found("Notification", notification_id))
        }
    }
}

fn require_moderator(user: &User) -> Result<()> {
    if user.is_moderator() {
        Ok(())
    } else {
        Err(AppError::Forbidden("moderator role required".into()))
    }
}
