//! # bt-seed
//!
//! Operational tasks against the SQLite store: team seeding, slug backfill,
//! schedule sync, and development session tokens.

mod feed;

use std::sync::Arc;

use anyhow::Context;
use bt_auth_jwt::JwtIdentityProvider;
use bt_core::models::Session;
use bt_core::schedule::jst_date;
use bt_core::{Community, FeedLimits};
use bt_store_sqlite::SqliteCommunityRepo;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::feed::ScheduleClient;

#[derive(Debug, Parser)]
#[command(name = "bt-seed", about = "Basket Talk data tasks")]
struct Cli {
    /// SQLite database URL.
    #[arg(long, env = "BASKET_TALK__STORE__URL", default_value = "sqlite:basket_talk.db")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inserts the 30 NBA teams that are not stored yet.
    Teams,
    /// Generates slugs for teams stored without one.
    BackfillSlugs,
    /// Upserts one day of games from the schedule feed.
    SyncGames {
        /// US calendar date, `YYYY-MM-DD`. Defaults to today in Japan.
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, env = "NBA_API_BASE_URL", default_value = "https://api.balldontlie.io/v1")]
        api_base_url: String,
        #[arg(long, env = "NBA_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Prints a signed session token for local sign-in.
    DevToken {
        #[arg(long)]
        uid: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 24)]
        hours: i64,
        #[arg(long, env = "BASKET_TALK__AUTH__JWT_SECRET", hide_env_values = true)]
        secret: String,
    },
}

async fn open_community(database_url: &str) -> anyhow::Result<Community> {
    let repo = SqliteCommunityRepo::connect(database_url, 1)
        .await
        .with_context(|| format!("failed to open {database_url}"))?;
    Ok(Community::new(Arc::new(repo), FeedLimits::default()))
}

async fn sync_games(
    community: &Community,
    client: &ScheduleClient,
    date: NaiveDate,
) -> anyhow::Result<(usize, usize)> {
    let games = client.games_on(date).await?;
    let (mut synced, mut skipped) = (0, 0);
    for game in games {
        match community.sync_game(game).await? {
            Some(match_id) => {
                info!(%match_id, "match synced");
                synced += 1;
            }
            None => skipped += 1,
        }
    }
    Ok((synced, skipped))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Teams => {
            let community = open_community(&cli.database_url).await?;
            let inserted = community.seed_teams().await?;
            info!(inserted, "teams seeded");
        }
        Command::BackfillSlugs => {
            let community = open_community(&cli.database_url).await?;
            let updated = community.backfill_slugs().await?;
            info!(updated, "slugs backfilled");
        }
        Command::SyncGames { date, api_base_url, api_key } => {
            let community = open_community(&cli.database_url).await?;
            let client = ScheduleClient::new(&api_base_url, api_key)?;
            let date = date.unwrap_or_else(|| jst_date(Utc::now()));
            let (synced, skipped) = sync_games(&community, &client, date).await?;
            if skipped > 0 {
                warn!(skipped, "games skipped; run `bt-seed teams` first?");
            }
            info!(%date, synced, "schedule sync finished");
        }
        Command::DevToken { uid, email, name, hours, secret } => {
            let provider = JwtIdentityProvider::new(SecretString::from(secret));
            let session = Session {
                uid,
                email,
                display_name: name,
            };
            let token = provider.issue(&session, Duration::hours(hours))?;
            println!("{token}");
        }
    }
    Ok(())
}
