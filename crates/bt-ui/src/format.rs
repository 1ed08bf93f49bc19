//! Presentation helpers shared by every page.

use bt_core::models::{MatchStatus, ThreadKind};
use bt_core::schedule::JST_OFFSET_HOURS;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// "たった今", "5分前", "3時間前", "2日前", then the JST calendar date.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    let seconds = elapsed.num_seconds();
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if seconds < 60 {
        "たった今".to_string()
    } else if minutes < 60 {
        format!("{minutes}分前")
    } else if hours < 24 {
        format!("{hours}時間前")
    } else if days < 7 {
        format!("{days}日前")
    } else {
        jst_date_label(at)
    }
}

pub fn jst_date_label(at: DateTime<Utc>) -> String {
    date_label((at + Duration::hours(JST_OFFSET_HOURS)).date_naive())
}

/// "2024年3月1日".
pub fn date_label(date: NaiveDate) -> String {
    format!("{}年{}月{}日", date.year(), date.month(), date.day())
}

/// Tip-off time on the JST clock, e.g. "09:30".
pub fn jst_clock_label(at: DateTime<Utc>) -> String {
    (at + Duration::hours(JST_OFFSET_HOURS))
        .format("%H:%M")
        .to_string()
}

/// The first `max_chars` characters, with "..." when anything was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", &text[..cut]),
    }
}

/// Plain text of a CMS HTML fragment: tags dropped, whitespace collapsed.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn thread_kind_label(kind: ThreadKind) -> &'static str {
    match kind {
        ThreadKind::Match => "試合スレ",
        ThreadKind::Team => "チーム掲示板",
        ThreadKind::Free => "自由スレ",
    }
}

pub fn match_status_label(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Scheduled => "試合前",
        MatchStatus::Live => "試合中",
        MatchStatus::Finished => "試合終了",
        MatchStatus::Cancelled => "中止",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamColors {
    pub primary: &'static str,
    pub secondary: &'static str,
}

const DEFAULT_COLORS: TeamColors = TeamColors {
    primary: "#6B7280",
    secondary: "#9CA3AF",
};

const TEAM_COLORS: [(&str, &str, &str); 30] = [
    ("ATL", "#E03A3E", "#C1D32F"),
    ("BOS", "#007A33", "#BA9653"),
    ("BKN", "#000000", "#FFFFFF"),
    ("CHA", "#1D1160", "#00788C"),
    ("CHI", "#CE1141", "#000000"),
    ("CLE", "#860038", "#FDBB30"),
    ("DAL", "#00538C", "#002B5C"),
    ("DEN", "#0E2240", "#FEC524"),
    ("DET", "#C8102E", "#1D42BA"),
    ("GSW", "#1D428A", "#FFC72C"),
    ("HOU", "#CE1141", "#000000"),
    ("IND", "#002D62", "#FDBB30"),
    ("LAC", "#C8102E", "#1D42BA"),
    ("LAL", "#552583", "#FDB927"),
    ("MEM", "#5D76A9", "#12173F"),
    ("MIA", "#98002E", "#F9A01B"),
    ("MIL", "#00471B", "#EEE1C6"),
    ("MIN", "#0C2340", "#236192"),
    ("NOP", "#0C2340", "#C8102E"),
    ("NYK", "#006BB6", "#F58426"),
    ("OKC", "#007AC1", "#EF3B24"),
    ("ORL", "#0077C0", "#C4CED4"),
    ("PHI", "#006BB6", "#ED174C"),
    ("PHX", "#1D1160", "#E56020"),
    ("POR", "#E03A3E", "#000000"),
    ("SAC", "#5A2D81", "#63727A"),
    ("SAS", "#C4CED4", "#000000"),
    ("TOR", "#CE1141", "#000000"),
    ("UTA", "#002B5C", "#F9A01B"),
    ("WAS", "#002B5C", "#E31837"),
];

/// Colours by three-letter abbreviation; grey for anything unknown.
pub fn team_colors(abbreviation: &str) -> TeamColors {
    TEAM_COLORS
        .iter()
        .find(|(abbr, _, _)| abbr.eq_ignore_ascii_case(abbreviation))
        .map(|&(_, primary, secondary)| TeamColors { primary, secondary })
        .unwrap_or(DEFAULT_COLORS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let ago = |d: Duration| relative_time(now - d, now);

        assert_eq!(ago(Duration::seconds(59)), "たった今");
        assert_eq!(ago(Duration::minutes(5)), "5分前");
        assert_eq!(ago(Duration::minutes(60)), "1時間前");
        assert_eq!(ago(Duration::hours(23)), "23時間前");
        assert_eq!(ago(Duration::days(6)), "6日前");
        // 2024-03-03 12:00 UTC is 21:00 the same day in Japan.
        assert_eq!(ago(Duration::days(7)), "2024年3月3日");
    }

    #[test]
    fn jst_labels_cross_midnight() {
        let late = Utc.with_ymd_and_hms(2024, 12, 31, 16, 30, 0).unwrap();
        assert_eq!(jst_date_label(late), "2025年1月1日");
        assert_eq!(jst_clock_label(late), "01:30");
    }

    #[test]
    fn excerpt_counts_characters() {
        assert_eq!(excerpt("八村塁", 3), "八村塁");
        assert_eq!(excerpt("八村塁がダンク", 3), "八村塁...");
        assert_eq!(excerpt("", 100), "");
    }

    #[test]
    fn strip_tags_keeps_text_only() {
        assert_eq!(strip_tags("<p>八村が<b>30得点</b></p>\n"), "八村が 30得点");
    }

    #[test]
    fn labels_and_colours() {
        assert_eq!(thread_kind_label(ThreadKind::Team), "チーム掲示板");
        assert_eq!(match_status_label(MatchStatus::Live), "試合中");
        assert_eq!(team_colors("LAL").primary, "#552583");
        assert_eq!(team_colors("lal"), team_colors("LAL"));
        assert_eq!(team_colors("XXX"), DEFAULT_COLORS);
    }
}
