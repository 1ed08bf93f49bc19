//! The thirty NBA teams and their URL slugs.

use chrono::{DateTime, Utc};

use crate::models::{Conference, Team};

use Conference::{East, West};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamSeed {
    pub name: &'static str,
    pub abbreviation: &'static str,
    pub slug: &'static str,
    pub region: Conference,
}

const fn seed(
    name: &'static str,
    abbreviation: &'static str,
    slug: &'static str,
    region: Conference,
) -> TeamSeed {
    TeamSeed {
        name,
        abbreviation,
        slug,
        region,
    }
}

pub const NBA_TEAMS: [TeamSeed; 30] = [
    seed("アトランタ・ホークス", "ATL", "atlanta-hawks", East),
    seed("ボストン・セルティックス", "BOS", "boston-celtics", East),
    seed("ブルックリン・ネッツ", "BKN", "brooklyn-nets", East),
    seed("シャーロット・ホーネッツ", "CHA", "charlotte-hornets", East),
    seed("シカゴ・ブルズ", "CHI", "chicago-bulls", East),
    seed("クリーブランド・キャバリアーズ", "CLE", "cleveland-cavaliers", East),
    seed("ダラス・マーベリックス", "DAL", "dallas-mavericks", West),
    seed("デンバー・ナゲッツ", "DEN", "denver-nuggets", West),
    seed("デトロイト・ピストンズ", "DET", "detroit-pistons", East),
    seed("ゴールデンステート・ウォリアーズ", "GSW", "golden-state-warriors", West),
    seed("ヒューストン・ロケッツ", "HOU", "houston-rockets", West),
    seed("インディアナ・ペイサーズ", "IND", "indiana-pacers", East),
    seed("LAクリッパーズ", "LAC", "la-clippers", West),
    seed("LAレイカーズ", "LAL", "la-lakers", West),
    seed("メンフィス・グリズリーズ", "MEM", "memphis-grizzlies", West),
    seed("マイアミ・ヒート", "MIA", "miami-heat", East),
    seed("ミルウォーキー・バックス", "MIL", "milwaukee-bucks", East),
    seed("ミネソタ・ティンバーウルブズ", "MIN", "minnesota-timberwolves", West),
    seed("ニューオーリンズ・ペリカンズ", "NOP", "new-orleans-pelicans", West),
    seed("ニューヨーク・ニックス", "NYK", "new-york-knicks", East),
    seed("オクラホマシティ・サンダー", "OKC", "oklahoma-city-thunder", West),
    seed("オーランド・マジック", "ORL", "orlando-magic", East),
    seed("フィラデルフィア・76ers", "PHI", "philadelphia-76ers", East),
    seed("フェニックス・サンズ", "PHX", "phoenix-suns", West),
    seed("ポートランド・トレイルブレイザーズ", "POR", "portland-trail-blazers", West),
    seed("サクラメント・キングス", "SAC", "sacramento-kings", West),
    seed("サンアントニオ・スパーズ", "SAS", "san-antonio-spurs", West),
    seed("トロント・ラプターズ", "TOR", "toronto-raptors", East),
    seed("ユタ・ジャズ", "UTA", "utah-jazz", West),
    seed("ワシントン・ウィザーズ", "WAS", "washington-wizards", East),
];

impl TeamSeed {
    /// Seeded teams use the lowercase abbreviation as their id.
    pub fn into_team(self, now: DateTime<Utc>) -> Team {
        Team {
            id: self.abbreviation.to_ascii_lowercase(),
            name: self.name.to_string(),
            abbreviation: self.abbreviation.to_string(),
            slug: self.slug.to_string(),
            region: self.region,
            logo_url: None,
            created_at: now,
        }
    }
}

/// Lowercase, `・` and whitespace become `-`, anything outside `[a-z0-9-]`
/// is dropped, dash runs collapse and edge dashes are trimmed.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = if c == '・' || c.is_whitespace() { '-' } else { c };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            continue;
        }
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.trim_matches('-').to_string()
}

/// The slug a team without one should get: the known slug for its name,
/// else a generated one, else its id.
pub fn slug_for(team: &Team) -> String {
    if let Some(known) = NBA_TEAMS.iter().find(|s| s.name == team.name) {
        return known.slug.to_string();
    }
    let generated = slugify(&team.name);
    if generated.is_empty() {
        team.id.clone()
    } else {
        generated
    }
}

/// Fills in a missing slug. Returns `false` when the team already had one.
pub fn backfill_slug(team: &mut Team) -> bool {
    if !team.slug.is_empty() {
        return false;
    }
    team.slug = slug_for(team);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn slugify_rules() {
        assert_eq!(slugify("Golden State  Warriors"), "golden-state-warriors");
        assert_eq!(slugify("フィラデルフィア・76ers"), "76ers");
        assert_eq!(slugify("--LA・Lakers--"), "la-lakers");
        assert_eq!(slugify("レイカーズ"), "");
    }

    #[test]
    fn seed_table_is_consistent() {
        let slugs: HashSet<_> = NBA_TEAMS.iter().map(|t| t.slug).collect();
        let abbrs: HashSet<_> = NBA_TEAMS.iter().map(|t| t.abbreviation).collect();
        assert_eq!(slugs.len(), 30);
        assert_eq!(abbrs.len(), 30);
        assert_eq!(NBA_TEAMS.iter().filter(|t| t.region == Conference::East).count(), 15);
    }

    #[test]
    fn backfill_uses_known_slug_then_generated_then_id() {
        let now = Utc::now();
        let mut lakers = NBA_TEAMS[13].into_team(now);
        lakers.slug.clear();
        assert!(backfill_slug(&mut lakers));
        assert_eq!(lakers.slug, "la-lakers");
        assert!(!backfill_slug(&mut lakers));

        let mut unknown = lakers.clone();
        unknown.id = "exp".into();
        unknown.name = "Expansion Team".into();
        unknown.slug.clear();
        backfill_slug(&mut unknown);
        assert_eq!(unknown.slug, "expansion-team");

        unknown.name = "拡張チーム".into();
        unknown.slug.clear();
        backfill_slug(&mut unknown);
        assert_eq!(unknown.slug, "exp");
    }
}
