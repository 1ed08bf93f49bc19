//! # Domain Models
//!
//! These structs represent the records the community keeps in its document
//! store. Ids are opaque strings: users carry the identity provider's uid,
//! everything we create ourselves gets a UUID v7 (time-ordered).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// A user may follow at most this many teams.
pub const MAX_FAVORITE_TEAMS: usize = 3;

/// Display name used when the identity provider does not supply one.
pub const DEFAULT_DISPLAY_NAME: &str = "ユーザー";

/// Generates a fresh, time-ordered record id.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Declares a closed set of lowercase tags that round-trip through
/// serde, `Display` and `FromStr` with the same spelling.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(AppError::ValidationError(format!(
                        "unknown {} `{}`",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Role tags stored on the user record. Authorization is decided from
    /// these, never from anything the identity provider says.
    Role { User => "user", Moderator => "moderator", Admin => "admin" }
}

string_enum! {
    Conference { East => "East", West => "West" }
}

string_enum! {
    MatchStatus {
        Scheduled => "scheduled",
        Live => "live",
        Finished => "finished",
        Cancelled => "cancelled",
    }
}

string_enum! {
    /// What a thread is attached to.
    ThreadKind { Match => "match", Team => "team", Free => "free" }
}

string_enum! {
    ReportTarget { Post => "post", User => "user" }
}

string_enum! {
    ReportStatus {
        Pending => "pending",
        Reviewed => "reviewed",
        Resolved => "resolved",
        Dismissed => "dismissed",
    }
}

string_enum! {
    NotificationKind {
        Reply => "reply",
        Like => "like",
        Mention => "mention",
        Admin => "admin",
        System => "system",
    }
}

/// The authenticated principal as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub roles: BTreeSet<Role>,
    /// Team ids in the order they were added. Unique, at most three.
    pub favorite_teams: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Builds the profile provisioned on a user's first authenticated visit.
    pub fn from_session(session: &Session, now: DateTime<Utc>) -> Self {
        let display_name = session
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
            .to_string();

        Self {
            id: session.uid.clone(),
            display_name,
            email: session.email.clone(),
            bio: None,
            avatar_url: None,
            roles: BTreeSet::from([Role::User]),
            favorite_teams: Vec::new(),
            created_at: now,
            updated_at: None,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Moderators and admins may review reports and remove any post.
    pub fn is_moderator(&self) -> bool {
        self.has_role(Role::Moderator) || self.has_role(Role::Admin)
    }

    /// Adds a team to the favourites.
    ///
    /// Returns `Ok(false)` when the team is already a favourite. Fails
    /// without touching the list when it is already full.
    pub fn add_favorite_team(&mut self, team_id: &str) -> Result<bool, AppError> {
        if self.favorite_teams.iter().any(|id| id == team_id) {
            return Ok(false);
        }
        if self.favorite_teams.len() >= MAX_FAVORITE_TEAMS {
            return Err(AppError::ValidationError(format!(
                "お気に入りチームは最大{MAX_FAVORITE_TEAMS}つまで登録できます"
            )));
        }
        self.favorite_teams.push(team_id.to_string());
        Ok(true)
    }

    /// Returns whether the team was present.
    pub fn remove_favorite_team(&mut self, team_id: &str) -> bool {
        let before = self.favorite_teams.len();
        self.favorite_teams.retain(|id| id != team_id);
        self.favorite_teams.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    /// Three-letter code, e.g. "LAL".
    pub abbreviation: String,
    /// URL slug, e.g. "la-lakers". May be empty on records that predate slugs.
    pub slug: String,
    pub region: Conference,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    /// The path segment used in `/community/team/{key}` links.
    pub fn route_key(&self) -> &str {
        if self.slug.is_empty() {
            &self.id
        } else {
            &self.slug
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub start_time: DateTime<Utc>,
    pub status: MatchStatus,
    pub score_home: Option<u32>,
    pub score_away: Option<u32>,
    pub boxscore_url: Option<String>,
    /// Game id of the schedule feed the match was synced from.
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub kind: ThreadKind,
    pub match_id: Option<String>,
    pub team_id: Option<String>,
    pub author_id: String,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub likes_count: u32,
    /// Denormalized count of live (not soft-deleted) posts.
    pub posts_count: u32,
    pub views_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// A match thread names its match, a team thread its team, a free
    /// thread neither.
    pub fn check_scope(&self) -> Result<(), AppError> {
        let ok = match self.kind {
            ThreadKind::Match => self.match_id.is_some() && self.team_id.is_none(),
            ThreadKind::Team => self.team_id.is_some() && self.match_id.is_none(),
            ThreadKind::Free => self.match_id.is_none() && self.team_id.is_none(),
        };
        if ok {
            Ok(())
        } else {
            Err(AppError::ValidationError(format!(
                "{} thread has an inconsistent scope",
                self.kind
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub thread_id: String,
    pub author_id: String,
    pub parent_post_id: Option<String>,
    pub content: String,
    pub likes_count: u32,
    /// Soft delete: the record stays for count integrity, the content is never shown.
    pub deleted_flag: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub reporter_id: String,
    pub target_type: ReportTarget,
    pub target_id: String,
    pub reason: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub read_flag: bool,
    pub created_at: DateTime<Utc>,
}

/// A published article from the headless CMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: u64,
    pub slug: String,
    pub title: String,
    /// Rendered HTML as returned by the CMS.
    pub content_html: String,
    pub excerpt_html: String,
    pub published_at: chrono::NaiveDateTime,
    pub author_name: Option<String>,
    pub featured_image_url: Option<String>,
    pub featured_image_alt: Option<String>,
    pub category_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCategory {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub count: u64,
}

/// Paging and category filter for article listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleQuery {
    pub page: u32,
    pub per_page: u32,
    pub category_ids: Vec<u64>,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 12,
            category_ids: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::from_session(
            &Session {
                uid: "u1".into(),
                email: "fan@example.com".into(),
                display_name: Some("  ".into()),
            },
            Utc::now(),
        )
    }

    #[test]
    fn blank_display_name_falls_back() {
        let u = user();
        assert_eq!(u.display_name, DEFAULT_DISPLAY_NAME);
        assert!(u.has_role(Role::User));
        assert!(!u.is_moderator());
    }

    #[test]
    fn fourth_favorite_is_rejected_and_list_unchanged() {
        let mut u = user();
        for team in ["a", "b", "c"] {
            assert!(u.add_favorite_team(team).unwrap());
        }
        assert!(!u.add_favorite_team("b").unwrap());

        let err = u.add_favorite_team("d").unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(u.favorite_teams, vec!["a", "b", "c"]);

        assert!(u.remove_favorite_team("b"));
        assert!(!u.remove_favorite_team("b"));
        assert_eq!(u.favorite_teams, vec!["a", "c"]);
    }

    #[test]
    fn string_enums_round_trip() {
        assert_eq!("team".parse::<ThreadKind>().unwrap(), ThreadKind::Team);
        assert_eq!(ReportStatus::Dismissed.to_string(), "dismissed");
        assert_eq!(
            serde_json::to_string(&Conference::West).unwrap(),
            "\"West\""
        );
        assert!("closed".parse::<MatchStatus>().is_err());
    }

    #[test]
    fn thread_scope_must_match_kind() {
        let now = Utc::now();
        let mut thread = Thread {
            id: new_id(),
            title: "t".into(),
            kind: ThreadKind::Team,
            match_id: None,
            team_id: Some("lal".into()),
            author_id: "u1".into(),
            tags: vec![],
            pinned: false,
            likes_count: 0,
            posts_count: 0,
            views_count: None,
            created_at: now,
            updated_at: now,
        };
        assert!(thread.check_scope().is_ok());
        thread.kind = ThreadKind::Free;
        assert!(thread.check_scope().is_err());
    }

    #[test]
    fn team_route_key_falls_back_to_id() {
        let mut team = Team {
            id: "team-1".into(),
            name: "LAレイカーズ".into(),
            abbreviation: "LAL".into(),
            slug: String::new(),
            region: Conference::West,
            logo_url: None,
            created_at: Utc::now(),
        };
        assert_eq!(team.route_key(), "team-1");
        team.slug = "la-lakers".into();
        assert_eq!(team.route_key(), "la-lakers");
    }
}
