//! # bt-store-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `bt-core` domain models.
//!
//! Every composite write (post + thread counter, like + post counter,
//! report review + post removal) runs in one transaction.

mod rows;

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use bt_core::counters;
use bt_core::error::AppError;
use bt_core::feed::{PostClause, ThreadClause};
use bt_core::likes::{self, LikeOutcome, LikeState};
use bt_core::models::{new_id, Match, Notification, Post, Report, ReportStatus, Team, Thread, User};
use bt_core::moderation::{self, ReportReview};
use bt_core::traits::{CommunityRepo, UserDirectory};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection};
use tokio::sync::Mutex;
use tracing::{debug, info};

use rows::{millis, opt_millis};

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

fn missing(entity: &str, id: &str) -> anyhow::Error {
    anyhow::Error::new(AppError::not_found(entity, id))
}

pub struct SqliteCommunityRepo {
    pool: SqlitePool,
    /// SQLite has a single writer. Composite writes queue here rather than
    /// failing with `SQLITE_BUSY` when a read lock is upgraded mid-transaction.
    write_gate: Mutex<()>,
}

impl SqliteCommunityRepo {
    /// Connects to `url` (e.g. `sqlite:basket_talk.db`), creating the file
    /// and the schema when missing.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// A private in-memory database. The pool holds exactly one connection
    /// that is never recycled, since each connection would see its own database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        info!("sqlite schema ready");
        Ok(Self {
            pool,
            write_gate: Mutex::new(()),
        })
    }

    /// Number of stored likes for `post_id`.
    pub async fn like_count(&self, post_id: &str) -> anyhow::Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(n)?)
    }

    /// Stores `user` as given, replacing any existing profile. Roles can
    /// only be granted this way.
    pub async fn set_user(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, display_name, email, bio, avatar_url, roles, favorite_teams, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                display_name = excluded.display_name, email = excluded.email, bio = excluded.bio,
                avatar_url = excluded.avatar_url, roles = excluded.roles,
                favorite_teams = excluded.favorite_teams, updated_at = excluded.updated_at",
        )
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.bio)
        .bind(&user.avatar_url)
        .bind(serde_json::to_string(&user.roles)?)
        .bind(serde_json::to_string(&user.favorite_teams)?)
        .bind(millis(user.created_at))
        .bind(opt_millis(user.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn fetch_post(conn: &mut SqliteConnection, id: &str) -> anyhow::Result<Option<Post>> {
    sqlx::query("SELECT * FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(|row| rows::post(&row))
        .transpose()
}

async fn adjust_posts_count(
    conn: &mut SqliteConnection,
    thread_id: &str,
    delta: i64,
) -> anyhow::Result<()> {
    let current: Option<i64> = sqlx::query_scalar("SELECT posts_count FROM threads WHERE id = ?")
        .bind(thread_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(current) = current else {
        return Ok(());
    };
    let next = counters::adjust(u32::try_from(current)?, delta);
    sqlx::query("UPDATE threads SET posts_count = ? WHERE id = ?")
        .bind(i64::from(next))
        .bind(thread_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Flags the post deleted and decrements its thread's counter.
async fn soft_delete(
    conn: &mut SqliteConnection,
    post_id: &str,
    at: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let Some(post) = fetch_post(&mut *conn, post_id).await? else {
        return Ok(false);
    };
    if post.deleted_flag {
        return Ok(false);
    }
    sqlx::query("UPDATE posts SET deleted_flag = 1, deleted_at = ? WHERE id = ?")
        .bind(millis(at))
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    adjust_posts_count(conn, &post.thread_id, -1).await?;
    Ok(true)
}

async fn insert_post(conn: &mut SqliteConnection, post: &Post) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO posts (id, thread_id, author_id, parent_post_id, content, likes_count, deleted_flag, deleted_at, created_at, edited_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&post.id)
    .bind(&post.thread_id)
    .bind(&post.author_id)
    .bind(&post.parent_post_id)
    .bind(&post.content)
    .bind(i64::from(post.likes_count))
    .bind(post.deleted_flag)
    .bind(opt_millis(post.deleted_at))
    .bind(millis(post.created_at))
    .bind(opt_millis(post.edited_at))
    .execute(conn)
    .await?;
    Ok(())
}

async fn store_report(conn: &mut SqliteConnection, report: &Report) -> anyhow::Result<()> {
    sqlx::query("UPDATE reports SET status = ?, reviewed_at = ?, reviewed_by = ? WHERE id = ?")
        .bind(report.status.as_str())
        .bind(opt_millis(report.reviewed_at))
        .bind(&report.reviewed_by)
        .bind(&report.id)
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl UserDirectory for SqliteCommunityRepo {
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| rows::user(&row))
            .transpose()
    }
}

#[async_trait]
impl CommunityRepo for SqliteCommunityRepo {
    async fn insert_user_if_absent(&self, user: User) -> anyhow::Result<User> {
        sqlx::query(
            "INSERT INTO users (id, display_name, email, bio, avatar_url, roles, favorite_teams, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.bio)
        .bind(&user.avatar_url)
        .bind(serde_json::to_string(&user.roles)?)
        .bind(serde_json::to_string(&user.favorite_teams)?)
        .bind(millis(user.created_at))
        .bind(opt_millis(user.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_user(&user.id)
            .await?
            .ok_or_else(|| missing("User", &user.id))
    }

    async fn update_user(&self, user: &User) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE users SET display_name = ?, bio = ?, avatar_url = ?, favorite_teams = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&user.display_name)
        .bind(&user.bio)
        .bind(&user.avatar_url)
        .bind(serde_json::to_string(&user.favorite_teams)?)
        .bind(opt_millis(user.updated_at))
        .bind(&user.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(missing("User", &user.id));
        }
        Ok(())
    }

    async fn get_team(&self, id: &str) -> anyhow::Result<Option<Team>> {
        sqlx::query("SELECT * FROM teams WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| rows::team(&row))
            .transpose()
    }

    async fn find_team_by_slug(&self, slug: &str) -> anyhow::Result<Option<Team>> {
        sqlx::query("SELECT * FROM teams WHERE slug = ? LIMIT 1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| rows::team(&row))
            .transpose()
    }

    async fn find_team_by_abbreviation(&self, abbreviation: &str) -> anyhow::Result<Option<Team>> {
        sqlx::query("SELECT * FROM teams WHERE abbreviation = ? LIMIT 1")
            .bind(abbreviation)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| rows::team(&row))
            .transpose()
    }

    async fn list_teams(&self) -> anyhow::Result<Vec<Team>> {
        sqlx::query("SELECT * FROM teams")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::team)
            .collect()
    }

    async fn upsert_team(&self, team: Team) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO teams (id, name, abbreviation, slug, region, logo_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                name = excluded.name, abbreviation = excluded.abbreviation, slug = excluded.slug,
                region = excluded.region, logo_url = excluded.logo_url",
        )
        .bind(&team.id)
        .bind(&team.name)
        .bind(&team.abbreviation)
        .bind(&team.slug)
        .bind(team.region.as_str())
        .bind(&team.logo_url)
        .bind(millis(team.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_match(&self, id: &str) -> anyhow::Result<Option<Match>> {
        sqlx::query("SELECT * FROM matches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| rows::game(&row))
            .transpose()
    }

    async fn list_matches_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Match>> {
        sqlx::query("SELECT * FROM matches WHERE start_time >= ? AND start_time < ?")
            .bind(millis(start))
            .bind(millis(end))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::game)
            .collect()
    }

    async fn upsert_match(&self, m: Match) -> anyhow::Result<String> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = match &m.external_id {
            Some(ext) => {
                sqlx::query_scalar("SELECT id FROM matches WHERE external_id = ?")
                    .bind(ext)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };

        let id = match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE matches SET home_team_id = ?, away_team_id = ?, start_time = ?, status = ?,
                        score_home = ?, score_away = ?, boxscore_url = ?, updated_at = ?
                     WHERE id = ?",
                )
                .bind(&m.home_team_id)
                .bind(&m.away_team_id)
                .bind(millis(m.start_time))
                .bind(m.status.as_str())
                .bind(m.score_home.map(i64::from))
                .bind(m.score_away.map(i64::from))
                .bind(&m.boxscore_url)
                .bind(opt_millis(m.updated_at))
                .bind(&id)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                sqlx::query(
                    "INSERT INTO matches (id, home_team_id, away_team_id, start_time, status, score_home,
                        score_away, boxscore_url, external_id, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&m.id)
                .bind(&m.home_team_id)
                .bind(&m.away_team_id)
                .bind(millis(m.start_time))
                .bind(m.status.as_str())
                .bind(m.score_home.map(i64::from))
                .bind(m.score_away.map(i64::from))
                .bind(&m.boxscore_url)
                .bind(&m.external_id)
                .bind(millis(m.created_at))
                .bind(opt_millis(m.updated_at))
                .execute(&mut *tx)
                .await?;
                m.id.clone()
            }
        };

        tx.commit().await?;
        Ok(id)
    }

    async fn get_thread(&self, id: &str) -> anyhow::Result<Option<Thread>> {
        sqlx::query("SELECT * FROM threads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| rows::thread(&row))
            .transpose()
    }

    async fn query_threads(&self, clause: Option<&ThreadClause>) -> anyhow::Result<Vec<Thread>> {
        let query = match clause {
            None => sqlx::query("SELECT * FROM threads"),
            Some(ThreadClause::Kind(kind)) => {
                sqlx::query("SELECT * FROM threads WHERE kind = ?").bind(kind.as_str())
            }
            Some(ThreadClause::TeamId(id)) => {
                sqlx::query("SELECT * FROM threads WHERE team_id = ?").bind(id.as_str())
            }
            Some(ThreadClause::MatchId(id)) => {
                sqlx::query("SELECT * FROM threads WHERE match_id = ?").bind(id.as_str())
            }
            Some(ThreadClause::AuthorId(id)) => {
                sqlx::query("SELECT * FROM threads WHERE author_id = ?").bind(id.as_str())
            }
        };
        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::thread)
            .collect()
    }

    /// Atomic operation to create a thread and its first post.
    async fn create_thread(&self, thread: Thread, opening_post: Post) -> anyhow::Result<()> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO threads (id, title, kind, match_id, team_id, author_id, tags, pinned,
                likes_count, posts_count, views_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&thread.id)
        .bind(&thread.title)
        .bind(thread.kind.as_str())
        .bind(&thread.match_id)
        .bind(&thread.team_id)
        .bind(&thread.author_id)
        .bind(serde_json::to_string(&thread.tags)?)
        .bind(thread.pinned)
        .bind(i64::from(thread.likes_count))
        .bind(i64::from(thread.posts_count))
        .bind(thread.views_count.map(i64::from))
        .bind(millis(thread.created_at))
        .bind(millis(thread.updated_at))
        .execute(&mut *tx)
        .await?;

        insert_post(&mut tx, &opening_post).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_post(&self, id: &str) -> anyhow::Result<Option<Post>> {
        let mut conn = self.pool.acquire().await?;
        fetch_post(&mut conn, id).await
    }

    async fn query_posts(&self, clause: Option<&PostClause>) -> anyhow::Result<Vec<Post>> {
        let query = match clause {
            None => sqlx::query("SELECT * FROM posts"),
            Some(PostClause::ThreadId(id)) => {
                sqlx::query("SELECT * FROM posts WHERE thread_id = ?").bind(id.as_str())
            }
            Some(PostClause::AuthorId(id)) => {
                sqlx::query("SELECT * FROM posts WHERE author_id = ?").bind(id.as_str())
            }
        };
        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::post)
            .collect()
    }

    async fn create_post(&self, post: Post) -> anyhow::Result<()> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query("UPDATE threads SET updated_at = ? WHERE id = ?")
            .bind(millis(post.created_at))
            .bind(&post.thread_id)
            .execute(&mut *tx)
            .await?;
        if bumped.rows_affected() == 0 {
            return Err(missing("Thread", &post.thread_id));
        }
        insert_post(&mut tx, &post).await?;
        adjust_posts_count(&mut tx, &post.thread_id, 1).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn soft_delete_post(&self, post_id: &str, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        let deleted = soft_delete(&mut tx, post_id, at).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn toggle_like(
        &self,
        user_id: &str,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<LikeOutcome> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let likes_count = match fetch_post(&mut tx, post_id).await? {
            Some(post) if !post.deleted_flag => post.likes_count,
            _ => return Err(missing("Post", post_id)),
        };
        let present: Option<String> =
            sqlx::query_scalar("SELECT id FROM likes WHERE user_id = ? AND post_id = ?")
                .bind(user_id)
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await?;

        let transition = likes::toggle(LikeState::from_present(present.is_some()));
        if transition.to.is_liked() {
            sqlx::query("INSERT INTO likes (id, user_id, post_id, created_at) VALUES (?, ?, ?, ?)")
                .bind(new_id())
                .bind(user_id)
                .bind(post_id)
                .bind(millis(at))
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("DELETE FROM likes WHERE user_id = ? AND post_id = ?")
                .bind(user_id)
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }

        let likes_count = transition.apply_to(likes_count);
        sqlx::query("UPDATE posts SET likes_count = ? WHERE id = ?")
            .bind(i64::from(likes_count))
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
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
        if post_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let liked: Vec<String> = sqlx::query_scalar("SELECT post_id FROM likes WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let wanted: HashSet<&String> = post_ids.iter().collect();
        Ok(liked.into_iter().filter(|id| wanted.contains(id)).collect())
    }

    async fn insert_report(&self, report: Report) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO reports (id, reporter_id, target_type, target_id, reason, status, created_at, reviewed_at, reviewed_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.id)
        .bind(&report.reporter_id)
        .bind(report.target_type.as_str())
        .bind(&report.target_id)
        .bind(&report.reason)
        .bind(report.status.as_str())
        .bind(millis(report.created_at))
        .bind(opt_millis(report.reviewed_at))
        .bind(&report.reviewed_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_report(&self, id: &str) -> anyhow::Result<Option<Report>> {
        sqlx::query("SELECT * FROM reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| rows::report(&row))
            .transpose()
    }

    async fn query_reports(&self, status: Option<ReportStatus>) -> anyhow::Result<Vec<Report>> {
        let query = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM reports WHERE status = ?").bind(status.as_str())
            }
            None => sqlx::query("SELECT * FROM reports"),
        };
        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::report)
            .collect()
    }

    async fn review_report(&self, review: &ReportReview) -> anyhow::Result<Report> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let report = sqlx::query("SELECT * FROM reports WHERE id = ?")
            .bind(&review.report_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| rows::report(&row))
            .transpose()?
            .ok_or_else(|| missing("Report", &review.report_id))?;
        let reviewed = moderation::review(&report, review)?;

        if review.removes_post() {
            if fetch_post(&mut tx, &reviewed.target_id).await?.is_none() {
                return Err(missing("Post", &reviewed.target_id));
            }
            let siblings =
                sqlx::query("SELECT * FROM reports WHERE target_type = ? AND target_id = ?")
                    .bind(reviewed.target_type.as_str())
                    .bind(&reviewed.target_id)
                    .fetch_all(&mut *tx)
                    .await?
                    .iter()
                    .map(rows::report)
                    .collect::<anyhow::Result<Vec<_>>>()?;

            soft_delete(&mut tx, &reviewed.target_id, review.reviewed_at).await?;
            for sibling in siblings
                .iter()
                .filter_map(|other| moderation::resolve_sibling(&reviewed, other, review))
            {
                store_report(&mut tx, &sibling).await?;
            }
        }
        store_report(&mut tx, &reviewed).await?;

        // Dropping `tx` on any early return above rolls everything back.
        tx.commit().await?;
        Ok(reviewed)
    }

    async fn insert_notification(&self, notification: Notification) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, payload, read_flag, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(notification.kind.as_str())
        .bind(serde_json::to_string(&notification.payload)?)
        .bind(notification.read_flag)
        .bind(millis(notification.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_notifications(&self, user_id: &str) -> anyhow::Result<Vec<Notification>> {
        sqlx::query("SELECT * FROM notifications WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::notification)
            .collect()
    }

    async fn mark_notification_read(&self, user_id: &str, id: &str) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE notifications SET read_flag = 1 WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}
