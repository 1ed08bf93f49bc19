//! View models handed to the templates. Anything here is safe to render:
//! a soft-deleted post never carries its content past this module.

use serde::Serialize;

use crate::join::WithAuthor;
use crate::models::{Match, Post, Team, Thread, User};

/// Shown in place of a soft-deleted post.
pub const DELETED_POST_PLACEHOLDER: &str = "この投稿は削除されました";

pub type ThreadCard = WithAuthor<Thread>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostView {
    pub id: String,
    pub thread_id: String,
    pub parent_post_id: Option<String>,
    pub author: User,
    pub body: String,
    pub deleted: bool,
    pub likes_count: u32,
    pub liked_by_viewer: bool,
    pub can_delete: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub edited_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PostView {
    /// `viewer` is the signed-in user, if any; `liked` whether they liked the post.
    pub fn new(joined: WithAuthor<Post>, viewer: Option<&User>, liked: bool) -> Self {
        let WithAuthor { record: post, author } = joined;
        let deleted = post.deleted_flag;
        let can_delete = !deleted
            && viewer.is_some_and(|v| v.id == post.author_id || v.is_moderator());

        Self {
            body: if deleted {
                DELETED_POST_PLACEHOLDER.to_string()
            } else {
                post.content
            },
            id: post.id,
            thread_id: post.thread_id,
            parent_post_id: post.parent_post_id,
            author,
            deleted,
            likes_count: post.likes_count,
            liked_by_viewer: liked && !deleted,
            can_delete,
            created_at: post.created_at,
            edited_at: post.edited_at,
        }
    }
}

/// A match with both teams resolved where possible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCard {
    pub game: Match,
    pub home: Option<Team>,
    pub away: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadDetail {
    pub thread: Thread,
    /// `None` when the author could not be resolved; the thread still renders.
    pub author: Option<User>,
    pub team: Option<Team>,
    pub game: Option<MatchCard>,
    pub posts: Vec<PostView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamBoard {
    pub team: Team,
    pub threads: Vec<ThreadCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePage {
    pub user: User,
    pub favorite_teams: Vec<Team>,
    pub threads: Vec<Thread>,
    pub is_self: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, Session};
    use chrono::Utc;

    fn user(id: &str) -> User {
        User::from_session(
            &Session {
                uid: id.into(),
                email: format!("{id}@example.com"),
                display_name: None,
            },
            Utc::now(),
        )
    }

    fn post(deleted: bool) -> WithAuthor<Post> {
        WithAuthor {
            record: Post {
                id: "p1".into(),
                thread_id: "t1".into(),
                author_id: "alice".into(),
                parent_post_id: None,
                content: "secret words".into(),
                likes_count: 4,
                deleted_flag: deleted,
                deleted_at: deleted.then(Utc::now),
                created_at: Utc::now(),
                edited_at: None,
            },
            author: user("alice"),
        }
    }

    #[test]
    fn deleted_content_never_reaches_the_view() {
        let view = PostView::new(post(true), Some(&user("alice")), true);
        assert_eq!(view.body, DELETED_POST_PLACEHOLDER);
        assert!(!view.can_delete);
        assert!(!view.liked_by_viewer);
        assert!(!serde_json::to_string(&view).unwrap().contains("secret"));
    }

    #[test]
    fn only_author_or_moderator_may_delete() {
        assert!(PostView::new(post(false), Some(&user("alice")), false).can_delete);
        assert!(!PostView::new(post(false), Some(&user("bob")), false).can_delete);
        assert!(!PostView::new(post(false), None, false).can_delete);

        let mut moderator = user("mod");
        moderator.roles.insert(Role::Moderator);
        assert!(PostView::new(post(false), Some(&moderator), false).can_delete);
    }
}
