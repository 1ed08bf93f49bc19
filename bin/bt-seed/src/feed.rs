//! Client for the balldontlie schedule API.

use std::time::Duration;

use anyhow::Context;
use bt_core::schedule::FeedGame;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const USER_AGENT: &str = "BasketTalk/1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct GamesResponse {
    #[serde(default)]
    data: Vec<ApiGame>,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiGame {
    id: u64,
    /// Calendar date of the game, `YYYY-MM-DD`.
    date: String,
    /// Tip-off instant; absent for games without a scheduled time.
    #[serde(default)]
    datetime: Option<DateTime<Utc>>,
    status: String,
    #[serde(default)]
    period: u32,
    home_team: ApiTeam,
    visitor_team: ApiTeam,
    #[serde(default)]
    home_team_score: Option<u32>,
    #[serde(default)]
    visitor_team_score: Option<u32>,
}

impl ApiGame {
    fn start_time(&self) -> anyhow::Result<DateTime<Utc>> {
        if let Some(at) = self.datetime {
            return Ok(at);
        }
        // Some payloads carry a full timestamp in `date`.
        if let Ok(at) = self.date.parse::<DateTime<Utc>>() {
            return Ok(at);
        }
        let day = self
            .date
            .get(..10)
            .unwrap_or(&self.date)
            .parse::<NaiveDate>()
            .with_context(|| format!("game {} has an unreadable date `{}`", self.id, self.date))?;
        Ok(day.and_time(NaiveTime::MIN).and_utc())
    }

    pub(crate) fn into_feed_game(self) -> anyhow::Result<FeedGame> {
        let start_time = self.start_time()?;
        // A game that has not tipped off reports 0-0; keep the scores unset.
        let started = self.period > 0;
        Ok(FeedGame {
            external_id: self.id.to_string(),
            home_abbreviation: self.home_team.abbreviation,
            away_abbreviation: self.visitor_team.abbreviation,
            start_time,
            status: self.status,
            period: self.period,
            home_score: self.home_team_score.filter(|_| started),
            away_score: self.visitor_team_score.filter(|_| started),
        })
    }
}

pub struct ScheduleClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ScheduleClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// Every game played on `date` (US calendar day).
    pub async fn games_on(&self, date: NaiveDate) -> anyhow::Result<Vec<FeedGame>> {
        let url = format!("{}/games", self.base_url);
        let day = date.format("%Y-%m-%d").to_string();
        let mut request = self.client.get(&url).query(&[("dates[]", day.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: GamesResponse = response.json().await.context("unreadable schedule response")?;
        debug!(date = %day, games = body.data.len(), "schedule fetched");

        body.data.into_iter().map(ApiGame::into_feed_game).collect()
    }
}
