//! Input validation for user-submitted forms. Failures are surfaced inline
//! and never reach the store.

use serde::Deserialize;

use crate::error::AppError;
use crate::models::ThreadKind;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_POST_CHARS: usize = 10_000;
pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_CHARS: usize = 30;
pub const MAX_DISPLAY_NAME_CHARS: usize = 50;
pub const MAX_BIO_CHARS: usize = 500;

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::ValidationError(msg.into())
}

/// The new-thread form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewThreadForm {
    pub title: String,
    pub content: String,
    pub kind: Option<ThreadKind>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub match_id: Option<String>,
    /// Comma-separated.
    #[serde(default)]
    pub tags: String,
    /// Checkbox: present only when ticked.
    #[serde(default)]
    pub agree_to_terms: Option<String>,
}

/// A thread request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidThread {
    pub title: String,
    pub content: String,
    pub kind: ThreadKind,
    pub team_id: Option<String>,
    pub match_id: Option<String>,
    pub tags: Vec<String>,
}

pub fn validate_thread(form: &NewThreadForm) -> Result<ValidThread, AppError> {
    let title = form.title.trim();
    let content = form.content.trim();
    if title.is_empty() || content.is_empty() {
        return Err(invalid("タイトルと本文を入力してください"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(invalid(format!(
            "タイトルは{MAX_TITLE_CHARS}文字以内で入力してください"
        )));
    }
    check_post_length(content)?;
    if form.agree_to_terms.is_none() {
        return Err(invalid("利用規約に同意してください"));
    }

    let kind = form.kind.unwrap_or(ThreadKind::Free);
    let team_id = non_blank(form.team_id.as_deref());
    let match_id = non_blank(form.match_id.as_deref());
    let (team_id, match_id) = match kind {
        ThreadKind::Team => (
            Some(team_id.ok_or_else(|| invalid("チームを選択してください"))?),
            None,
        ),
        ThreadKind::Match => (
            None,
            Some(match_id.ok_or_else(|| invalid("試合を選択してください"))?),
        ),
        ThreadKind::Free => (None, None),
    };

    Ok(ValidThread {
        title: title.to_string(),
        content: content.to_string(),
        kind,
        team_id,
        match_id,
        tags: parse_tags(&form.tags)?,
    })
}

/// Splits a comma-separated tag string: trimmed, empties dropped,
/// duplicates removed keeping the first occurrence.
pub fn parse_tags(raw: &str) -> Result<Vec<String>, AppError> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split([',', '、']).map(str::trim).filter(|t| !t.is_empty()) {
        if tag.chars().count() > MAX_TAG_CHARS {
            return Err(invalid(format!(
                "タグは{MAX_TAG_CHARS}文字以内で入力してください"
            )));
        }
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    if tags.len() > MAX_TAGS {
        return Err(invalid(format!("タグは{MAX_TAGS}個までです")));
    }
    Ok(tags)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPostForm {
    pub content: String,
    #[serde(default)]
    pub parent_post_id: Option<String>,
}

/// Returns the trimmed content.
pub fn validate_post(form: &NewPostForm) -> Result<String, AppError> {
    let content = form.content.trim();
    if content.is_empty() {
        return Err(invalid("本文を入力してください"));
    }
    check_post_length(content)?;
    Ok(content.to_string())
}

fn check_post_length(content: &str) -> Result<(), AppError> {
    if content.chars().count() > MAX_POST_CHARS {
        return Err(invalid(format!(
            "本文は{MAX_POST_CHARS}文字以内で入力してください"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidProfile {
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

pub fn validate_profile(form: &ProfileForm) -> Result<ValidProfile, AppError> {
    let display_name = form.display_name.trim();
    if display_name.is_empty() {
        return Err(invalid("表示名を入力してください"));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(invalid(format!(
            "表示名は{MAX_DISPLAY_NAME_CHARS}文字以内で入力してください"
        )));
    }
    let bio = form.bio.trim();
    if bio.chars().count() > MAX_BIO_CHARS {
        return Err(invalid(format!(
            "自己紹介は{MAX_BIO_CHARS}文字以内で入力してください"
        )));
    }

    Ok(ValidProfile {
        display_name: display_name.to_string(),
        bio: (!bio.is_empty()).then(|| bio.to_string()),
        avatar_url: non_blank(form.avatar_url.as_deref()),
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread_form() -> NewThreadForm {
        NewThreadForm {
            title: "  八村選手について  ".into(),
            content: "語りましょう".into(),
            kind: Some(ThreadKind::Team),
            team_id: Some("lal".into()),
            tags: "八村, レイカーズ,,八村 ".into(),
            agree_to_terms: Some("on".into()),
            ..NewThreadForm::default()
        }
    }

    #[test]
    fn valid_team_thread_is_normalized() {
        let valid = validate_thread(&thread_form()).unwrap();
        assert_eq!(valid.title, "八村選手について");
        assert_eq!(valid.tags, vec!["八村", "レイカーズ"]);
        assert_eq!(valid.team_id.as_deref(), Some("lal"));
        assert_eq!(valid.match_id, None);
    }

    #[test]
    fn thread_rules() {
        let mut form = thread_form();
        form.title = "   ".into();
        assert!(validate_thread(&form).is_err());

        let mut form = thread_form();
        form.agree_to_terms = None;
        assert!(validate_thread(&form).is_err());

        let mut form = thread_form();
        form.team_id = Some(" ".into());
        assert!(validate_thread(&form).is_err());

        let mut form = thread_form();
        form.kind = Some(ThreadKind::Free);
        assert_eq!(validate_thread(&form).unwrap().team_id, None);
    }

    #[test]
    fn post_length_is_counted_in_chars() {
        let at_limit = NewPostForm {
            content: "あ".repeat(MAX_POST_CHARS),
            parent_post_id: None,
        };
        assert!(validate_post(&at_limit).is_ok());

        let over = NewPostForm {
            content: "あ".repeat(MAX_POST_CHARS + 1),
            parent_post_id: None,
        };
        assert!(validate_post(&over).is_err());
        assert!(validate_post(&NewPostForm::default()).is_err());
    }

    #[test]
    fn profile_rules() {
        let ok = validate_profile(&ProfileForm {
            display_name: " ハチ ".into(),
            bio: "   ".into(),
            avatar_url: None,
        })
        .unwrap();
        assert_eq!(ok.display_name, "ハチ");
        assert_eq!(ok.bio, None);

        assert!(validate_profile(&ProfileForm {
            display_name: "x".repeat(51),
            ..ProfileForm::default()
        })
        .is_err());
    }

    #[test]
    fn too_many_tags() {
        let raw = (0..11).map(|i| format!("t{i}")).collect::<Vec<_>>().join(",");
        assert!(parse_tags(&raw).is_err());
    }
}
