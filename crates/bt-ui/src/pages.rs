//! Template contexts. Every page owns plain, pre-formatted rows so the
//! templates stay free of logic beyond loops and conditionals.

use askama::Template;
use bt_core::models::{
    Article, ArticleCategory, Notification, NotificationKind, Report, ReportStatus, ReportTarget,
    Team, Thread, ThreadKind, User,
};
use bt_core::moderation::REPORT_REASONS;
use bt_core::views::{MatchCard, PostView, ProfilePage, ThreadCard, ThreadDetail};
use chrono::{DateTime, Utc};

use crate::format::{
    date_label, excerpt, jst_clock_label, jst_date_label, match_status_label, relative_time,
    strip_tags, team_colors, thread_kind_label,
};

const SITE_NAME: &str = "Basket Talk";
const ARTICLE_EXCERPT_CHARS: usize = 100;

// ── Shared pieces ──────────────────────────────────────────────────────────

pub struct Viewer {
    pub id: String,
    pub display_name: String,
    pub is_moderator: bool,
}

pub struct Layout {
    pub title: String,
    pub viewer: Option<Viewer>,
}

impl Layout {
    pub fn new(title: &str, viewer: Option<&User>) -> Self {
        let title = if title.is_empty() {
            SITE_NAME.to_string()
        } else {
            format!("{title} | {SITE_NAME}")
        };
        Self {
            title,
            viewer: viewer.map(|user| Viewer {
                id: user.id.clone(),
                display_name: user.display_name.clone(),
                is_moderator: user.is_moderator(),
            }),
        }
    }
}

pub struct TeamChip {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
    pub url: String,
    pub primary: &'static str,
    pub secondary: &'static str,
}

impl From<&Team> for TeamChip {
    fn from(team: &Team) -> Self {
        let colors = team_colors(&team.abbreviation);
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            abbreviation: team.abbreviation.clone(),
            url: format!("/community/team/{}", team.route_key()),
            primary: colors.primary,
            secondary: colors.secondary,
        }
    }
}

pub struct ThreadRow {
    pub url: String,
    pub title: String,
    pub kind_label: &'static str,
    pub author_name: Option<String>,
    pub author_url: String,
    pub tags: Vec<String>,
    pub posts_count: u32,
    pub likes_count: u32,
    pub pinned: bool,
    pub updated_label: String,
}

impl ThreadRow {
    pub fn from_thread(thread: &Thread, now: DateTime<Utc>) -> Self {
        Self {
            url: format!("/community/thread/{}", thread.id),
            title: thread.title.clone(),
            kind_label: thread_kind_label(thread.kind),
            author_name: None,
            author_url: format!("/community/user/{}", thread.author_id),
            tags: thread.tags.clone(),
            posts_count: thread.posts_count,
            likes_count: thread.likes_count,
            pinned: thread.pinned,
            updated_label: relative_time(thread.updated_at, now),
        }
    }

    pub fn from_card(card: &ThreadCard, now: DateTime<Utc>) -> Self {
        Self {
            author_name: Some(card.author.display_name.clone()),
            ..Self::from_thread(&card.record, now)
        }
    }
}

fn thread_rows(cards: &[ThreadCard], now: DateTime<Utc>) -> Vec<ThreadRow> {
    cards.iter().map(|card| ThreadRow::from_card(card, now)).collect()
}

pub struct MatchRow {
    pub id: String,
    pub home_name: String,
    pub away_name: String,
    pub home_color: &'static str,
    pub away_color: &'static str,
    pub status_label: &'static str,
    pub start_label: String,
    pub score: Option<String>,
}

impl From<&MatchCard> for MatchRow {
    fn from(card: &MatchCard) -> Self {
        let name = |team: &Option<Team>| {
            team.as_ref()
                .map_or_else(|| "未定".to_string(), |t| t.name.clone())
        };
        let color = |team: &Option<Team>| {
            team_colors(team.as_ref().map_or("", |t| t.abbreviation.as_str())).primary
        };
        let game = &card.game;
        Self {
            id: game.id.clone(),
            home_name: name(&card.home),
            away_name: name(&card.away),
            home_color: color(&card.home),
            away_color: color(&card.away),
            status_label: match_status_label(game.status),
            start_label: jst_clock_label(game.start_time),
            score: game
                .score_home
                .zip(game.score_away)
                .map(|(home, away)| format!("{home} - {away}")),
        }
    }
}

pub struct ArticleRow {
    pub url: String,
    pub title_html: String,
    pub excerpt: String,
    pub content_html: String,
    pub date_label: String,
    pub author_name: Option<String>,
    pub image_url: Option<String>,
    pub image_alt: String,
}

impl From<&Article> for ArticleRow {
    fn from(article: &Article) -> Self {
        Self {
            url: format!("/articles/{}", article.slug),
            title_html: article.title.clone(),
            excerpt: excerpt(&strip_tags(&article.excerpt_html), ARTICLE_EXCERPT_CHARS),
            content_html: article.content_html.clone(),
            // CMS dates are already site-local.
            date_label: date_label(article.published_at.date()),
            author_name: article.author_name.clone(),
            image_url: article.featured_image_url.clone(),
            image_alt: article
                .featured_image_alt
                .clone()
                .unwrap_or_else(|| strip_tags(&article.title)),
        }
    }
}

// ── Pages ──────────────────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub layout: Layout,
    pub matches: Vec<MatchRow>,
    pub threads: Vec<ThreadRow>,
    pub articles: Vec<ArticleRow>,
    pub teams: Vec<TeamChip>,
}

impl HomeTemplate {
    pub fn new(
        viewer: Option<&User>,
        matches: &[MatchCard],
        threads: &[ThreadCard],
        articles: &[Article],
        teams: &[Team],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            layout: Layout::new("", viewer),
            matches: matches.iter().map(MatchRow::from).collect(),
            threads: thread_rows(threads, now),
            articles: articles.iter().map(ArticleRow::from).collect(),
            teams: teams.iter().map(TeamChip::from).collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "community.html")]
pub struct CommunityTemplate {
    pub layout: Layout,
    /// "" for every kind.
    pub selected_kind: String,
    pub threads: Vec<ThreadRow>,
    pub teams: Vec<TeamChip>,
}

impl CommunityTemplate {
    pub fn new(
        viewer: Option<&User>,
        kind: Option<ThreadKind>,
        threads: &[ThreadCard],
        teams: &[Team],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            layout: Layout::new("コミュニティ", viewer),
            selected_kind: kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
            threads: thread_rows(threads, now),
            teams: teams.iter().map(TeamChip::from).collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "team.html")]
pub struct TeamBoardTemplate {
    pub layout: Layout,
    pub team: TeamChip,
    pub threads: Vec<ThreadRow>,
    pub is_favorite: bool,
}

impl TeamBoardTemplate {
    pub fn new(
        viewer: Option<&User>,
        team: &Team,
        threads: &[ThreadCard],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            layout: Layout::new(&format!("{} 掲示板", team.name), viewer),
            team: TeamChip::from(team),
            threads: thread_rows(threads, now),
            is_favorite: viewer.is_some_and(|v| v.favorite_teams.contains(&team.id)),
        }
    }
}

pub struct PostRow {
    pub id: String,
    pub author_name: String,
    pub author_url: String,
    pub body: String,
    pub deleted: bool,
    pub likes_count: u32,
    pub liked: bool,
    pub can_delete: bool,
    pub reply_to: Option<String>,
    pub time_label: String,
    pub edited: bool,
}

impl PostRow {
    fn new(view: &PostView, now: DateTime<Utc>) -> Self {
        Self {
            id: view.id.clone(),
            author_name: view.author.display_name.clone(),
            author_url: format!("/community/user/{}", view.author.id),
            body: view.body.clone(),
            deleted: view.deleted,
            likes_count: view.likes_count,
            liked: view.liked_by_viewer,
            can_delete: view.can_delete,
            reply_to: view.parent_post_id.clone(),
            time_label: relative_time(view.created_at, now),
            edited: view.edited_at.is_some(),
        }
    }
}

#[derive(Template)]
#[template(path = "thread.html")]
pub struct ThreadTemplate {
    pub layout: Layout,
    pub id: String,
    pub title: String,
    pub kind_label: &'static str,
    pub author_name: Option<String>,
    pub author_url: String,
    pub tags: Vec<String>,
    pub created_label: String,
    pub team: Option<TeamChip>,
    pub game: Option<MatchRow>,
    pub posts: Vec<PostRow>,
    pub report_reasons: &'static [&'static str],
}

impl ThreadTemplate {
    pub fn new(viewer: Option<&User>, detail: &ThreadDetail, now: DateTime<Utc>) -> Self {
        let thread = &detail.thread;
        Self {
            layout: Layout::new(&thread.title, viewer),
            id: thread.id.clone(),
            title: thread.title.clone(),
            kind_label: thread_kind_label(thread.kind),
            author_name: detail.author.as_ref().map(|a| a.display_name.clone()),
            author_url: format!("/community/user/{}", thread.author_id),
            tags: thread.tags.clone(),
            created_label: relative_time(thread.created_at, now),
            team: detail.team.as_ref().map(TeamChip::from),
            game: detail.game.as_ref().map(MatchRow::from),
            posts: detail.posts.iter().map(|p| PostRow::new(p, now)).collect(),
            report_reasons: &REPORT_REASONS,
        }
    }
}

/// The values a failed submission is re-rendered with.
#[derive(Default)]
pub struct ThreadFormValues {
    pub title: String,
    pub content: String,
    pub tags: String,
    pub kind: String,
    pub team_id: String,
    pub match_id: String,
}

#[derive(Template)]
#[template(path = "new_thread.html")]
pub struct NewThreadTemplate {
    pub layout: Layout,
    pub error: Option<String>,
    pub form: ThreadFormValues,
    pub teams: Vec<TeamChip>,
    pub matches: Vec<MatchRow>,
}

impl NewThreadTemplate {
    pub fn new(
        viewer: Option<&User>,
        form: ThreadFormValues,
        error: Option<String>,
        teams: &[Team],
        matches: &[MatchCard],
    ) -> Self {
        Self {
            layout: Layout::new("スレッドを作成", viewer),
            error,
            form,
            teams: teams.iter().map(TeamChip::from).collect(),
            matches: matches.iter().map(MatchRow::from).collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub layout: Layout,
    pub user_id: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub joined_label: String,
    pub favorites: Vec<TeamChip>,
    pub threads: Vec<ThreadRow>,
    pub is_self: bool,
    pub report_reasons: &'static [&'static str],
}

impl ProfileTemplate {
    pub fn new(viewer: Option<&User>, page: &ProfilePage, now: DateTime<Utc>) -> Self {
        let user = &page.user;
        Self {
            layout: Layout::new(&user.display_name, viewer),
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            joined_label: jst_date_label(user.created_at),
            favorites: page.favorite_teams.iter().map(TeamChip::from).collect(),
            threads: page
                .threads
                .iter()
                .map(|t| ThreadRow {
                    author_name: Some(user.display_name.clone()),
                    ..ThreadRow::from_thread(t, now)
                })
                .collect(),
            is_self: page.is_self,
            report_reasons: &REPORT_REASONS,
        }
    }
}

pub struct NotificationRow {
    pub id: String,
    pub text: String,
    pub url: Option<String>,
    pub read: bool,
    pub time_label: String,
}

impl NotificationRow {
    fn new(notification: &Notification, now: DateTime<Utc>) -> Self {
        let field = |key: &str| {
            notification
                .payload
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let (text, url) = match notification.kind {
            NotificationKind::Reply => (
                format!("{}さんが「{}」に返信しました", field("actor_name"), field("thread_title")),
                Some(format!(
                    "/community/thread/{}#post-{}",
                    field("thread_id"),
                    field("post_id")
                )),
            ),
            _ => (field("message"), None),
        };
        Self {
            id: notification.id.clone(),
            text,
            url,
            read: notification.read_flag,
            time_label: relative_time(notification.created_at, now),
        }
    }
}

#[derive(Template)]
#[template(path = "notifications.html")]
pub struct NotificationsTemplate {
    pub layout: Layout,
    pub items: Vec<NotificationRow>,
    pub unread_only: bool,
}

impl NotificationsTemplate {
    pub fn new(
        viewer: &User,
        items: &[Notification],
        unread_only: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            layout: Layout::new("通知", Some(viewer)),
            items: items.iter().map(|n| NotificationRow::new(n, now)).collect(),
            unread_only,
        }
    }
}

pub struct ReportRow {
    pub id: String,
    pub target_label: &'static str,
    pub target_id: String,
    pub target_url: String,
    pub is_post: bool,
    pub reason: String,
    pub status: String,
    pub open: bool,
    pub pending: bool,
    pub created_label: String,
}

impl ReportRow {
    fn new(report: &Report, now: DateTime<Utc>) -> Self {
        let (target_label, target_url) = match report.target_type {
            ReportTarget::Post => ("投稿", format!("/community/posts/{}", report.target_id)),
            ReportTarget::User => ("ユーザー", format!("/community/user/{}", report.target_id)),
        };
        Self {
            id: report.id.clone(),
            target_label,
            target_id: report.target_id.clone(),
            target_url,
            is_post: report.target_type == ReportTarget::Post,
            reason: report.reason.clone(),
            status: report.status.as_str().to_string(),
            open: !report.status.is_terminal(),
            pending: report.status == ReportStatus::Pending,
            created_label: relative_time(report.created_at, now),
        }
    }
}

#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminTemplate {
    pub layout: Layout,
    pub reports: Vec<ReportRow>,
    pub include_closed: bool,
}

impl AdminTemplate {
    pub fn new(
        viewer: &User,
        reports: &[Report],
        include_closed: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            layout: Layout::new("通報管理", Some(viewer)),
            reports: reports.iter().map(|r| ReportRow::new(r, now)).collect(),
            include_closed,
        }
    }
}

pub struct CategoryRow {
    pub id: u64,
    pub name: String,
    pub count: u64,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "articles.html")]
pub struct ArticlesTemplate {
    pub layout: Layout,
    pub articles: Vec<ArticleRow>,
    pub categories: Vec<CategoryRow>,
    pub category_query: String,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

impl ArticlesTemplate {
    pub fn new(
        viewer: Option<&User>,
        articles: &[Article],
        categories: &[ArticleCategory],
        selected_category: Option<u64>,
        page: u32,
        per_page: u32,
    ) -> Self {
        let full_page = u32::try_from(articles.len()).is_ok_and(|n| n >= per_page);
        Self {
            layout: Layout::new("記事", viewer),
            articles: articles.iter().map(ArticleRow::from).collect(),
            categories: categories
                .iter()
                .map(|c| CategoryRow {
                    id: c.id,
                    name: c.name.clone(),
                    count: c.count,
                    selected: selected_category == Some(c.id),
                })
                .collect(),
            category_query: selected_category
                .map(|id| format!("&category={id}"))
                .unwrap_or_default(),
            prev_page: (page > 1).then(|| page - 1),
            next_page: full_page.then(|| page + 1),
        }
    }
}

#[derive(Template)]
#[template(path = "article.html")]
pub struct ArticleTemplate {
    pub layout: Layout,
    pub article: ArticleRow,
}

impl ArticleTemplate {
    pub fn new(viewer: Option<&User>, article: &Article) -> Self {
        Self {
            layout: Layout::new(&strip_tags(&article.title), viewer),
            article: ArticleRow::from(article),
        }
    }
}

/// The fixed pages: about, rules, privacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticPage {
    About,
    Rules,
    Privacy,
}

#[derive(Template)]
#[template(path = "static.html")]
pub struct StaticTemplate {
    pub layout: Layout,
    pub page: &'static str,
}

impl StaticTemplate {
    pub fn new(viewer: Option<&User>, page: StaticPage) -> Self {
        let (title, key) = match page {
            StaticPage::About => ("Basket Talkについて", "about"),
            StaticPage::Rules => ("利用規約", "rules"),
            StaticPage::Privacy => ("プライバシーポリシー", "privacy"),
        };
        Self {
            layout: Layout::new(title, viewer),
            page: key,
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub layout: Layout,
    pub status: u16,
    pub message: String,
}

impl ErrorTemplate {
    pub fn new(status: u16, message: &str) -> Self {
        let heading = match status {
            400 => "入力内容を確認してください",
            403 => "この操作は許可されていません",
            404 => "ページが見つかりません",
            409 => "この操作はすでに完了しています",
            _ => "エラーが発生しました",
        };
        Self {
            layout: Layout::new(heading, None),
            status,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_core::join::WithAuthor;
    use bt_core::models::{Conference, MatchStatus, Session};
    use bt_core::models::Match;
    use chrono::Duration;

    fn user(id: &str, name: &str) -> User {
        User::from_session(
            &Session {
                uid: id.into(),
                email: format!("{id}@example.com"),
                display_name: Some(name.into()),
            },
            Utc::now(),
        )
    }

    fn team() -> Team {
        Team {
            id: "lal".into(),
            name: "ロサンゼルス・レイカーズ".into(),
            abbreviation: "LAL".into(),
            slug: "la-lakers".into(),
            region: Conference::West,
            logo_url: None,
            created_at: Utc::now(),
        }
    }

    fn thread(title: &str) -> Thread {
        let now = Utc::now();
        Thread {
            id: "t1".into(),
            title: title.into(),
            kind: ThreadKind::Free,
            match_id: None,
            team_id: None,
            author_id: "u1".into(),
            tags: vec!["雑談".into()],
            pinned: false,
            likes_count: 0,
            posts_count: 1,
            views_count: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn user_content_is_escaped() {
        let card = WithAuthor {
            record: thread("<script>alert(1)</script>"),
            author: user("u1", "ハチ"),
        };
        let html = CommunityTemplate::new(None, None, &[card], &[team()], Utc::now())
            .render()
            .unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("/community/team/la-lakers"));
    }

    #[test]
    fn match_row_formats_score_and_tip_off() {
        let start = Utc::now();
        let card = MatchCard {
            game: Match {
                id: "m1".into(),
                home_team_id: "lal".into(),
                away_team_id: "bos".into(),
                start_time: start,
                status: MatchStatus::Finished,
                score_home: Some(112),
                score_away: Some(108),
                boxscore_url: None,
                external_id: None,
                created_at: start,
                updated_at: None,
            },
            home: Some(team()),
            away: None,
        };
        let row = MatchRow::from(&card);
        assert_eq!(row.home_name, "ロサンゼルス・レイカーズ");
        assert_eq!(row.away_name, "未定");
        assert_eq!(row.away_color, "#6B7280");
        assert_eq!(row.score.as_deref(), Some("112 - 108"));
        assert_eq!(row.status_label, "試合終了");
    }

    #[test]
    fn reply_notification_links_to_the_post() {
        let notification = Notification {
            id: "n1".into(),
            user_id: "u1".into(),
            kind: NotificationKind::Reply,
            payload: serde_json::json!({
                "thread_id": "t1",
                "thread_title": "今日の試合",
                "post_id": "p9",
                "actor_name": "ハチ",
            }),
            read_flag: false,
            created_at: Utc::now() - Duration::minutes(3),
        };
        let row = NotificationRow::new(&notification, Utc::now());
        assert_eq!(row.text, "ハチさんが「今日の試合」に返信しました");
        assert_eq!(row.url.as_deref(), Some("/community/thread/t1#post-p9"));
        assert_eq!(row.time_label, "3分前");
    }

    #[test]
    fn articles_page_offers_next_only_for_full_pages() {
        let page = ArticlesTemplate::new(None, &[], &[], Some(4), 2, 12);
        assert_eq!(page.prev_page, Some(1));
        assert_eq!(page.next_page, None);
        assert_eq!(page.category_query, "&category=4");
    }

    #[test]
    fn every_static_page_renders() {
        for page in [StaticPage::About, StaticPage::Rules, StaticPage::Privacy] {
            assert!(StaticTemplate::new(None, page).render().is_ok());
        }
        let html = ErrorTemplate::new(404, "Thread not found with ID x").render().unwrap();
        assert!(html.contains("ページが見つかりません"));
    }
}
