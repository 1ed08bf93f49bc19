//! Mapping between SQLite rows and the `bt-core` domain models.

use bt_core::models::{Match, Notification, Post, Report, Team, Thread, User};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub(crate) fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn opt_millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(millis)
}

fn time(row: &SqliteRow, column: &str) -> anyhow::Result<DateTime<Utc>> {
    let ms: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("{column} out of range: {ms}"))
}

fn opt_time(row: &SqliteRow, column: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
    match row.try_get::<Option<i64>, _>(column)? {
        Some(_) => time(row, column).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn count(row: &SqliteRow, column: &str) -> anyhow::Result<u32> {
    Ok(u32::try_from(row.try_get::<i64, _>(column)?)?)
}

fn opt_count(row: &SqliteRow, column: &str) -> anyhow::Result<Option<u32>> {
    row.try_get::<Option<i64>, _>(column)?
        .map(u32::try_from)
        .transpose()
        .map_err(Into::into)
}

fn json<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> anyhow::Result<T> {
    Ok(serde_json::from_str(&row.try_get::<String, _>(column)?)?)
}

fn tag<T>(row: &SqliteRow, column: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr<Err = bt_core::AppError>,
{
    Ok(row.try_get::<String, _>(column)?.parse()?)
}

pub(crate) fn user(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
        avatar_url: row.try_get("avatar_url")?,
        roles: json(row, "roles")?,
        favorite_teams: json(row, "favorite_teams")?,
        created_at: time(row, "created_at")?,
        updated_at: opt_time(row, "updated_at")?,
    })
}

pub(crate) fn team(row: &SqliteRow) -> anyhow::Result<Team> {
    Ok(Team {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        abbreviation: row.try_get("abbreviation")?,
        slug: row.try_get("slug")?,
        region: tag(row, "region")?,
        logo_url: row.try_get("logo_url")?,
        created_at: time(row, "created_at")?,
    })
}

pub(crate) fn game(row: &SqliteRow) -> anyhow::Result<Match> {
    Ok(Match {
        id: row.try_get("id")?,
        home_team_id: row.try_get("home_team_id")?,
        away_team_id: row.try_get("away_team_id")?,
        start_time: time(row, "start_time")?,
        status: tag(row, "status")?,
        score_home: opt_count(row, "score_home")?,
        score_away: opt_count(row, "score_away")?,
        boxscore_url: row.try_get("boxscore_url")?,
        external_id: row.try_get("external_id")?,
        created_at: time(row, "created_at")?,
        updated_at: opt_time(row, "updated_at")?,
    })
}

pub(crate) fn thread(row: &SqliteRow) -> anyhow::Result<Thread> {
    Ok(Thread {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        kind: tag(row, "kind")?,
        match_id: row.try_get("match_id")?,
        team_id: row.try_get("team_id")?,
        author_id: row.try_get("author_id")?,
        tags: json(row, "tags")?,
        pinned: row.try_get("pinned")?,
        likes_count: count(row, "likes_count")?,
        posts_count: count(row, "posts_count")?,
        views_count: opt_count(row, "views_count")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

pub(crate) fn post(row: &SqliteRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        thread_id: row.try_get("thread_id")?,
        author_id: row.try_get("author_id")?,
        parent_post_id: row.try_get("parent_post_id")?,
        content: row.try_get("content")?,
        likes_count: count(row, "likes_count")?,
        deleted_flag: row.try_get("deleted_flag")?,
        deleted_at: opt_time(row, "deleted_at")?,
        created_at: time(row, "created_at")?,
        edited_at: opt_time(row, "edited_at")?,
    })
}

pub(crate) fn report(row: &SqliteRow) -> anyhow::Result<Report> {
    Ok(Report {
        id: row.try_get("id")?,
        reporter_id: row.try_get("reporter_id")?,
        target_type: tag(row, "target_type")?,
        target_id: row.try_get("target_id")?,
        reason: row.try_get("reason")?,
        status: tag(row, "status")?,
        created_at: time(row, "created_at")?,
        reviewed_at: opt_time(row, "reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
    })
}

pub(crate) fn notification(row: &SqliteRow) -> anyhow::Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: tag(row, "kind")?,
        payload: json(row, "payload")?,
        read_flag: row.try_get("read_flag")?,
        created_at: time(row, "created_at")?,
    })
}
