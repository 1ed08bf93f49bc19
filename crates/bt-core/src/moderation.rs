//! # Report Workflow
//!
//! ```text
//! pending ──► reviewed ──► resolved | dismissed
//!    └────────────────────► resolved | dismissed
//! ```
//!
//! Resolved and dismissed are terminal. `RemovePost` resolves a post report,
//! every other open report on the same post, and soft-deletes the post;
//! adapters apply all of it in one transaction so no report stays pending
//! against a deleted post.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{new_id, Report, ReportStatus, ReportTarget};

/// Reasons offered by the report form.
pub const REPORT_REASONS: [&str; 5] = ["スパム", "誹謗中傷", "不適切な内容", "荒らし", "その他"];

pub const MAX_REPORT_DETAILS_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    MarkReviewed,
    Resolve,
    Dismiss,
    /// Resolve and soft-delete the reported post.
    RemovePost,
}

impl ReportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }

    /// The status after `action`, or a conflict if the move is illegal.
    pub fn apply(self, action: ReviewAction) -> Result<ReportStatus, AppError> {
        use ReportStatus::*;
        use ReviewAction::*;

        match (self, action) {
            (Pending, MarkReviewed) => Ok(Reviewed),
            (Pending | Reviewed, Resolve | RemovePost) => Ok(Resolved),
            (Pending | Reviewed, Dismiss) => Ok(Dismissed),
            (from, action) => Err(AppError::Conflict(format!(
                "cannot {action:?} a report that is {from}"
            ))),
        }
    }
}

/// A moderator's decision on one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportReview {
    pub report_id: String,
    pub moderator_id: String,
    pub action: ReviewAction,
    pub reviewed_at: DateTime<Utc>,
}

impl ReportReview {
    /// Whether applying this review also removes the reported post.
    pub fn removes_post(&self) -> bool {
        self.action == ReviewAction::RemovePost
    }
}

/// Applies `review` to `report` without touching storage.
pub fn review(report: &Report, review: &ReportReview) -> Result<Report, AppError> {
    if review.removes_post() && report.target_type != ReportTarget::Post {
        return Err(AppError::ValidationError(
            "only post reports can remove their target".into(),
        ));
    }

    let status = report.status.apply(review.action)?;
    Ok(Report {
        status,
        reviewed_at: Some(review.reviewed_at),
        reviewed_by: Some(review.moderator_id.clone()),
        ..report.clone()
    })
}

/// Other open reports against the post a `RemovePost` review deletes are
/// resolved with it. Returns the resolved copy, or `None` when `sibling`
/// is unaffected.
pub fn resolve_sibling(
    removed: &Report,
    sibling: &Report,
    review: &ReportReview,
) -> Option<Report> {
    let affected = review.removes_post()
        && sibling.id != removed.id
        && sibling.target_type == ReportTarget::Post
        && sibling.target_id == removed.target_id
        && !sibling.status.is_terminal();
    affected.then(|| Report {
        status: ReportStatus::Resolved,
        reviewed_at: Some(review.reviewed_at),
        reviewed_by: Some(review.moderator_id.clone()),
        ..sibling.clone()
    })
}

/// Builds the stored reason: the chosen reason, with details appended when given.
pub fn compose_reason(reason: &str, details: Option<&str>) -> Result<String, AppError> {
    let reason = reason.trim();
    if !REPORT_REASONS.contains(&reason) {
        return Err(AppError::ValidationError("通報理由を選択してください".into()));
    }

    match details.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(reason.to_string()),
        Some(details) if details.chars().count() > MAX_REPORT_DETAILS_CHARS => {
            Err(AppError::ValidationError(format!(
                "詳細は{MAX_REPORT_DETAILS_CHARS}文字以内で入力してください"
            )))
        }
        Some(details) => Ok(format!("{reason}: {details}")),
    }
}

/// A new, pending report.
pub fn new_report(
    reporter_id: &str,
    target_type: ReportTarget,
    target_id: &str,
    reason: String,
    now: DateTime<Utc>,
) -> Report {
    Report {
        id: new_id(),
        reporter_id: reporter_id.to_string(),
        target_type,
        target_id: target_id.to_string(),
        reason,
        status: ReportStatus::Pending,
        created_at: now,
        reviewed_at: None,
        reviewed_by: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_post_report() -> Report {
        new_report("u1", ReportTarget::Post, "p1", "スパム".into(), Utc::now())
    }

    fn decision(action: ReviewAction) -> ReportReview {
        ReportReview {
            report_id: "r1".into(),
            moderator_id: "mod".into(),
            action,
            reviewed_at: Utc::now(),
        }
    }

    #[test]
    fn spam_report_without_details_keeps_reason_verbatim() {
        let reason = compose_reason("スパム", None).unwrap();
        let report = new_report("u1", ReportTarget::Post, "p1", reason, Utc::now());
        assert_eq!(report.reason, "スパム");
        assert_eq!(report.status, ReportStatus::Pending);

        assert_eq!(
            compose_reason("荒らし", Some("  連投  ")).unwrap(),
            "荒らし: 連投"
        );
        assert!(compose_reason("気に入らない", None).is_err());
        assert!(compose_reason("その他", Some(&"あ".repeat(501))).is_err());
    }

    #[test]
    fn transitions_follow_the_workflow() {
        use ReportStatus::*;
        use ReviewAction::*;

        assert_eq!(Pending.apply(MarkReviewed).unwrap(), Reviewed);
        assert_eq!(Reviewed.apply(Dismiss).unwrap(), Dismissed);
        assert_eq!(Pending.apply(RemovePost).unwrap(), Resolved);
        assert!(matches!(Reviewed.apply(MarkReviewed), Err(AppError::Conflict(_))));

        for terminal in [Resolved, Dismissed] {
            assert!(terminal.is_terminal());
            for action in [MarkReviewed, Resolve, Dismiss, RemovePost] {
                assert!(matches!(terminal.apply(action), Err(AppError::Conflict(_))));
            }
        }
    }

    #[test]
    fn review_stamps_the_moderator() {
        let reviewed = review(&pending_post_report(), &decision(ReviewAction::Resolve)).unwrap();
        assert_eq!(reviewed.status, ReportStatus::Resolved);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("mod"));
        assert!(reviewed.reviewed_at.is_some());
    }

    #[test]
    fn removal_resolves_open_siblings_only() {
        let removed = pending_post_report();
        let sibling = new_report("u2", ReportTarget::Post, "p1", "荒らし".into(), Utc::now());
        let other_post = new_report("u2", ReportTarget::Post, "p2", "荒らし".into(), Utc::now());
        let mut closed = sibling.clone();
        closed.id = new_id();
        closed.status = ReportStatus::Dismissed;

        let removal = decision(ReviewAction::RemovePost);
        let resolved = resolve_sibling(&removed, &sibling, &removal).unwrap();
        assert_eq!(resolved.status, ReportStatus::Resolved);
        assert!(resolve_sibling(&removed, &other_post, &removal).is_none());
        assert!(resolve_sibling(&removed, &closed, &removal).is_none());
        assert!(resolve_sibling(&removed, &removed, &removal).is_none());
        assert!(resolve_sibling(&removed, &sibling, &decision(ReviewAction::Resolve)).is_none());
    }

    #[test]
    fn user_reports_cannot_remove_posts() {
        let mut report = pending_post_report();
        report.target_type = ReportTarget::User;
        assert!(matches!(
            review(&report, &decision(ReviewAction::RemovePost)),
            Err(AppError::ValidationError(_))
        ));
    }
}
