//! Match-day helpers: the JST calendar day and the schedule feed mapping.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::models::{new_id, Match, MatchStatus};

/// Japan Standard Time has no daylight saving.
pub const JST_OFFSET_HOURS: i64 = 9;

/// The JST calendar date containing `now`.
pub fn jst_date(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::hours(JST_OFFSET_HOURS)).date_naive()
}

/// The JST day `date` as a half-open UTC window `[start, end)`.
pub fn jst_date_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = (date.and_time(NaiveTime::MIN) - Duration::hours(JST_OFFSET_HOURS)).and_utc();
    (start, start + Duration::days(1))
}

/// The window of the JST day containing `now`.
pub fn jst_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    jst_date_window(jst_date(now))
}

impl MatchStatus {
    /// Maps a schedule feed status string and period to a match status.
    pub fn from_feed(status: &str, period: u32) -> Self {
        match status {
            "Final" | "Final/OT" => Self::Finished,
            "In Progress" => Self::Live,
            _ if period > 0 => Self::Live,
            "Cancelled" | "Postponed" => Self::Cancelled,
            _ => Self::Scheduled,
        }
    }
}

/// A game as reported by the external schedule feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedGame {
    pub external_id: String,
    pub home_abbreviation: String,
    pub away_abbreviation: String,
    pub start_time: DateTime<Utc>,
    pub status: String,
    pub period: u32,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
}

impl FeedGame {
    /// Builds the match record once both team ids are known. The store keeps
    /// the existing id when a match with the same `external_id` exists.
    pub fn into_match(
        self,
        home_team_id: String,
        away_team_id: String,
        now: DateTime<Utc>,
    ) -> Match {
        Match {
            id: new_id(),
            home_team_id,
            away_team_id,
            start_time: self.start_time,
            status: MatchStatus::from_feed(&self.status, self.period),
            score_home: self.home_score,
            score_away: self.away_score,
            boxscore_url: None,
            external_id: Some(self.external_id),
            created_at: now,
            updated_at: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn late_utc_evening_is_the_next_jst_day() {
        // 2025-01-10 16:30 UTC is 2025-01-11 01:30 JST.
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 16, 30, 0).unwrap();
        let (start, end) = jst_day_window(now);

        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 11, 15, 0, 0).unwrap());
        assert!(start <= now && now < end);
    }

    #[test]
    fn window_edges_are_half_open() {
        let (start, end) = jst_date_window(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(jst_date(start), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(jst_date(end), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!(jst_day_window(start), (start, end));
    }

    #[test]
    fn feed_status_mapping() {
        assert_eq!(MatchStatus::from_feed("Final", 4), MatchStatus::Finished);
        assert_eq!(MatchStatus::from_feed("Final/OT", 5), MatchStatus::Finished);
        assert_eq!(MatchStatus::from_feed("In Progress", 0), MatchStatus::Live);
        assert_eq!(MatchStatus::from_feed("2nd Qtr", 2), MatchStatus::Live);
        assert_eq!(MatchStatus::from_feed("Postponed", 0), MatchStatus::Cancelled);
        assert_eq!(
            MatchStatus::from_feed("2025-01-11T00:30:00Z", 0),
            MatchStatus::Scheduled
        );
    }
}
