//! # Feed Assembler
//!
//! The document store only answers single-equality queries efficiently, so a
//! feed is built in two stages: one clause is pushed down to the store, then
//! the full predicate, the sort and the limit are applied here in memory.
//!
//! Ordering is total: the sort key in the requested direction, then the
//! record id ascending. A record without a value for the sort key ranks
//! lowest, so it comes first ascending and last descending.

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Notification, Post, Report, ReportStatus, Thread, ThreadKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// A comparable sort value borrowed from a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue<'a> {
    Count(u64),
    Time(DateTime<Utc>),
    Text(&'a str),
}

/// A record the assembler can order.
pub trait FeedRecord {
    type SortKey: Copy;

    fn record_id(&self) -> &str;

    /// `None` when the record carries no value for `key`.
    fn sort_value(&self, key: Self::SortKey) -> Option<SortValue<'_>>;
}

/// The residual predicate evaluated in memory.
pub trait Predicate<R> {
    fn matches(&self, record: &R) -> bool;
}

/// Everything the assembler needs besides the candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedQuery<F, K> {
    pub filter: F,
    pub sort: K,
    pub direction: SortDirection,
    pub limit: Option<usize>,
}

/// Filters, orders and truncates `candidates`.
///
/// The result holds exactly `min(limit, matching)` records.
pub fn assemble<R, F>(candidates: Vec<R>, query: &FeedQuery<F, R::SortKey>) -> Vec<R>
where
    R: FeedRecord,
    F: Predicate<R>,
{
    let mut records: Vec<R> = candidates
        .into_iter()
        .filter(|record| query.filter.matches(record))
        .collect();

    records.sort_by(|a, b| compare(a, b, query.sort, query.direction));

    if let Some(limit) = query.limit {
        records.truncate(limit);
    }
    records
}

fn compare<R: FeedRecord>(a: &R, b: &R, key: R::SortKey, direction: SortDirection) -> Ordering {
    // Option orders None before Some, which gives "absent ranks lowest".
    let primary = a.sort_value(key).cmp(&b.sort_value(key));
    let primary = match direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary.then_with(|| a.record_id().cmp(b.record_id()))
}

/// Runs one independent page-section fetch. On failure the error is logged
/// and the section renders its empty state instead of failing the page.
pub async fn degrade<T, E, Fut>(section: &'static str, fetch: Fut) -> T
where
    T: Default,
    E: fmt::Display,
    Fut: Future<Output = Result<T, E>>,
{
    match fetch.await {
        Ok(value) => value,
        Err(err) => {
            warn!(section, error = %err, "section fetch failed, rendering empty");
            T::default()
        }
    }
}

// ── Threads ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    PostsCount,
    LikesCount,
    ViewsCount,
}

impl FeedRecord for Thread {
    type SortKey = ThreadSortKey;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn sort_value(&self, key: ThreadSortKey) -> Option<SortValue<'_>> {
        match key {
            ThreadSortKey::CreatedAt => Some(SortValue::Time(self.created_at)),
            ThreadSortKey::UpdatedAt => Some(SortValue::Time(self.updated_at)),
            ThreadSortKey::PostsCount => Some(SortValue::Count(self.posts_count.into())),
            ThreadSortKey::LikesCount => Some(SortValue::Count(self.likes_count.into())),
            ThreadSortKey::ViewsCount => self.views_count.map(|v| SortValue::Count(v.into())),
        }
    }
}

/// A single equality clause a store can evaluate natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadClause {
    Kind(ThreadKind),
    TeamId(String),
    MatchId(String),
    AuthorId(String),
}

impl ThreadClause {
    pub fn matches(&self, thread: &Thread) -> bool {
        match self {
            Self::Kind(kind) => thread.kind == *kind,
            Self::TeamId(id) => thread.team_id.as_deref() == Some(id.as_str()),
            Self::MatchId(id) => thread.match_id.as_deref() == Some(id.as_str()),
            Self::AuthorId(id) => thread.author_id == *id,
        }
    }
}

/// Conjunction of optional equality constraints on threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadFilter {
    pub kind: Option<ThreadKind>,
    pub team_id: Option<String>,
    pub match_id: Option<String>,
    pub author_id: Option<String>,
}

impl ThreadFilter {
    pub fn team_board(team_id: impl Into<String>) -> Self {
        Self {
            kind: Some(ThreadKind::Team),
            team_id: Some(team_id.into()),
            ..Self::default()
        }
    }

    pub fn by_author(author_id: impl Into<String>) -> Self {
        Self {
            author_id: Some(author_id.into()),
            ..Self::default()
        }
    }

    /// The clause handed to the store: the most selective one present.
    pub fn pushdown(&self) -> Option<ThreadClause> {
        self.clauses().into_iter().next()
    }

    fn clauses(&self) -> Vec<ThreadClause> {
        let mut clauses = Vec::with_capacity(4);
        if let Some(id) = &self.match_id {
            clauses.push(ThreadClause::MatchId(id.clone()));
        }
        if let Some(id) = &self.team_id {
            clauses.push(ThreadClause::TeamId(id.clone()));
        }
        if let Some(id) = &self.author_id {
            clauses.push(ThreadClause::AuthorId(id.clone()));
        }
        if let Some(kind) = self.kind {
            clauses.push(ThreadClause::Kind(kind));
        }
        clauses
    }
}

impl Predicate<Thread> for ThreadFilter {
    fn matches(&self, thread: &Thread) -> bool {
        self.kind.is_none_or(|kind| thread.kind == kind)
            && self
                .team_id
                .as_deref()
                .is_none_or(|id| thread.team_id.as_deref() == Some(id))
            && self
                .match_id
                .as_deref()
                .is_none_or(|id| thread.match_id.as_deref() == Some(id))
            && self
                .author_id
                .as_deref()
                .is_none_or(|id| thread.author_id == id)
    }
}

pub type ThreadQuery = FeedQuery<ThreadFilter, ThreadSortKey>;

impl ThreadQuery {
    /// Newest threads first.
    pub fn newest(filter: ThreadFilter, limit: usize) -> Self {
        Self {
            filter,
            sort: ThreadSortKey::CreatedAt,
            direction: SortDirection::Desc,
            limit: Some(limit),
        }
    }
}

// ── Posts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostSortKey {
    #[default]
    CreatedAt,
    LikesCount,
    EditedAt,
}

impl FeedRecord for Post {
    type SortKey = PostSortKey;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn sort_value(&self, key: PostSortKey) -> Option<SortValue<'_>> {
        match key {
            PostSortKey::CreatedAt => Some(SortValue::Time(self.created_at)),
            PostSortKey::LikesCount => Some(SortValue::Count(self.likes_count.into())),
            PostSortKey::EditedAt => self.edited_at.map(SortValue::Time),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostClause {
    ThreadId(String),
    AuthorId(String),
}

impl PostClause {
    pub fn matches(&self, post: &Post) -> bool {
        match self {
            Self::ThreadId(id) => post.thread_id == *id,
            Self::AuthorId(id) => post.author_id == *id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub thread_id: Option<String>,
    pub author_id: Option<String>,
    /// Soft-deleted posts are kept (rendered as placeholders) when set.
    pub include_deleted: bool,
}

impl PostFilter {
    pub fn in_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            include_deleted: true,
            ..Self::default()
        }
    }

    pub fn pushdown(&self) -> Option<PostClause> {
        if let Some(id) = &self.thread_id {
            return Some(PostClause::ThreadId(id.clone()));
        }
        self.author_id.clone().map(PostClause::AuthorId)
    }
}

impl Predicate<Post> for PostFilter {
    fn matches(&self, post: &Post) -> bool {
        (self.include_deleted || !post.deleted_flag)
            && self
                .thread_id
                .as_deref()
                .is_none_or(|id| post.thread_id == id)
            && self
                .author_id
                .as_deref()
                .is_none_or(|id| post.author_id == id)
    }
}

pub type PostQuery = FeedQuery<PostFilter, PostSortKey>;

// ── Reports ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportSortKey {
    #[default]
    CreatedAt,
    ReviewedAt,
}

impl FeedRecord for Report {
    type SortKey = ReportSortKey;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn sort_value(&self, key: ReportSortKey) -> Option<SortValue<'_>> {
        match key {
            ReportSortKey::CreatedAt => Some(SortValue::Time(self.created_at)),
            ReportSortKey::ReviewedAt => self.reviewed_at.map(SortValue::Time),
        }
    }
}

/// Moderation queue filter; `None` means every status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
}

impl Predicate<Report> for ReportFilter {
    fn matches(&self, report: &Report) -> bool {
        self.status.is_none_or(|status| report.status == status)
    }
}

pub type ReportQuery = FeedQuery<ReportFilter, ReportSortKey>;

// ── Notifications ──────────────────────────────────────────────────────────

/// The inbox is only ever ordered by arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationSortKey;

impl FeedRecord for Notification {
    type SortKey = NotificationSortKey;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn sort_value(&self, _: NotificationSortKey) -> Option<SortValue<'_>> {
        Some(SortValue::Time(self.created_at))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub unread_only: bool,
}

impl Predicate<Notification> for NotificationFilter {
    fn matches(&self, notification: &Notification) -> bool {
        !(self.unread_only && notification.read_flag)
    }
}

pub type NotificationQuery = FeedQuery<NotificationFilter, NotificationSortKey>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn thread(id: &str, kind: ThreadKind, team: Option<&str>, minutes: i64) -> Thread {
        Thread {
            id: id.into(),
            title: format!("thread {id}"),
            kind,
            match_id: (kind == ThreadKind::Match).then(|| "m1".to_string()),
            team_id: team.map(str::to_string),
            author_id: "u1".into(),
            tags: vec![],
            pinned: false,
            likes_count: 0,
            posts_count: 0,
            views_count: None,
            created_at: at(minutes),
            updated_at: at(minutes),
        }
    }

    fn ids<R: FeedRecord>(records: &[R]) -> Vec<&str> {
        records.iter().map(|r| r.record_id()).collect()
    }

    #[test]
    fn residual_filter_keeps_only_matching_team_threads() {
        let candidates = vec![
            thread("a", ThreadKind::Team, Some("lal"), 1),
            thread("b", ThreadKind::Team, Some("bos"), 2),
            thread("c", ThreadKind::Match, None, 3),
            thread("d", ThreadKind::Free, None, 4),
            thread("e", ThreadKind::Team, Some("lal"), 5),
        ];
        let query = ThreadQuery::newest(ThreadFilter::team_board("lal"), 20);

        let feed = assemble(candidates, &query);

        assert_eq!(ids(&feed), vec!["e", "a"]);
        assert!(feed
            .iter()
            .all(|t| t.kind == ThreadKind::Team && t.team_id.as_deref() == Some("lal")));
    }

    #[test]
    fn limit_applies_after_filtering() {
        let mut candidates: Vec<Thread> = (0..30)
            .map(|i| thread(&format!("x{i:02}"), ThreadKind::Team, Some("bos"), i))
            .collect();
        candidates.extend(
            (0..5).map(|i| thread(&format!("l{i}"), ThreadKind::Team, Some("lal"), i)),
        );

        let three = assemble(
            candidates.clone(),
            &ThreadQuery::newest(ThreadFilter::team_board("lal"), 3),
        );
        assert_eq!(three.len(), 3);

        let all = assemble(
            candidates,
            &ThreadQuery::newest(ThreadFilter::team_board("lal"), 100),
        );
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn empty_candidates_give_empty_feed() {
        let feed = assemble(
            Vec::<Thread>::new(),
            &ThreadQuery::newest(ThreadFilter::default(), 10),
        );
        assert!(feed.is_empty());
    }

    #[test]
    fn ties_break_on_id_in_both_directions() {
        let candidates = vec![
            thread("b", ThreadKind::Free, None, 0),
            thread("c", ThreadKind::Free, None, 0),
            thread("a", ThreadKind::Free, None, 0),
        ];
        let mut query = ThreadQuery::newest(ThreadFilter::default(), 10);
        assert_eq!(ids(&assemble(candidates.clone(), &query)), vec!["a", "b", "c"]);

        query.direction = SortDirection::Asc;
        assert_eq!(ids(&assemble(candidates, &query)), vec!["a", "b", "c"]);
    }

    #[test]
    fn absent_sort_values_rank_lowest() {
        let mut viewed = thread("viewed", ThreadKind::Free, None, 0);
        viewed.views_count = Some(3);
        let mut zero = thread("zero", ThreadKind::Free, None, 0);
        zero.views_count = Some(0);
        let unviewed = thread("unviewed", ThreadKind::Free, None, 0);

        let candidates = vec![viewed, unviewed, zero];
        let mut query = ThreadQuery {
            filter: ThreadFilter::default(),
            sort: ThreadSortKey::ViewsCount,
            direction: SortDirection::Desc,
            limit: None,
        };
        assert_eq!(
            ids(&assemble(candidates.clone(), &query)),
            vec!["viewed", "zero", "unviewed"]
        );

        query.direction = SortDirection::Asc;
        assert_eq!(
            ids(&assemble(candidates, &query)),
            vec!["unviewed", "zero", "viewed"]
        );
    }

    #[test]
    fn pushdown_prefers_the_most_selective_clause() {
        assert_eq!(
            ThreadFilter::team_board("lal").pushdown(),
            Some(ThreadClause::TeamId("lal".into()))
        );
        let by_kind = ThreadFilter {
            kind: Some(ThreadKind::Match),
            ..ThreadFilter::default()
        };
        assert_eq!(by_kind.pushdown(), Some(ThreadClause::Kind(ThreadKind::Match)));
        assert_eq!(ThreadFilter::default().pushdown(), None);
    }

    #[test]
    fn deleted_posts_are_excluded_unless_requested() {
        let post = |id: &str, deleted: bool| Post {
            id: id.into(),
            thread_id: "t1".into(),
            author_id: "u1".into(),
            parent_post_id: None,
            content: "hi".into(),
            likes_count: 0,
            deleted_flag: deleted,
            deleted_at: None,
            created_at: at(0),
            edited_at: None,
        };
        let candidates = vec![post("live", false), post("gone", true)];

        let mut query = PostQuery {
            filter: PostFilter::in_thread("t1"),
            sort: PostSortKey::CreatedAt,
            direction: SortDirection::Desc,
            limit: None,
        };
        assert_eq!(assemble(candidates.clone(), &query).len(), 2);

        query.filter.include_deleted = false;
        assert_eq!(ids(&assemble(candidates, &query)), vec!["live"]);
    }

    #[tokio::test]
    async fn degrade_substitutes_default_on_failure() {
        let failed: Vec<Thread> =
            degrade("test.section", async { Err::<Vec<Thread>, _>("index required") }).await;
        assert!(failed.is_empty());

        let ok: Vec<u8> = degrade("test.section", async { Ok::<_, String>(vec![1, 2]) }).await;
        assert_eq!(ok, vec![1, 2]);
    }
}
