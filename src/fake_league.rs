use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::club_mapping::ClubMapping;
use crate::ingest::{LeagueBatch, RawMatchRecord, RawRosterRecord};

const CLUBS: &[&str] = &[
    "Lifesportlshire",
    "Hinsdale PC",
    "Evanston",
    "Winnetka",
    "Glen View",
    "Lake Forest",
    "Oak Park",
    "North Shore",
];

// Spellings the scraper has been seen to produce for the same club.
const ALIASES: &[(&str, &str)] = &[
    ("Lifesportlshire", "Lifesport Lshire"),
    ("Hinsdale PC", "Hinsdale P.C."),
    ("Glen View", "Glenview"),
];

#[derive(Debug, Clone, Copy)]
pub struct FakeLeagueConfig {
    pub league_id: u32,
    pub seed: u64,
    pub clubs: usize,
    pub teams_per_club: usize,
    pub players_per_team: usize,
    pub matches: usize,
    // Chance a match side carries another club's team name.
    pub mislabel_rate: f64,
    // Chance one listed player is borrowed from another team.
    pub substitute_rate: f64,
    // Chance a roster line spells its club with an alias.
    pub alias_rate: f64,
}

impl Default for FakeLeagueConfig {
    fn default() -> Self {
        Self {
            league_id: 900,
            seed: 26,
            clubs: 6,
            teams_per_club: 3,
            players_per_team: 6,
            matches: 60,
            mislabel_rate: 0.1,
            substitute_rate: 0.1,
            alias_rate: 0.15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeLeague {
    pub batch: LeagueBatch,
    /// External ids of matches with at least one mislabelled side.
    pub mislabeled: Vec<String>,
    /// Aliases that actually made it into the roster.
    pub aliases_used: BTreeSet<String>,
}

impl FakeLeague {
    pub fn alias_mapping(&self) -> ClubMapping {
        ALIASES
            .iter()
            .filter(|(_, alias)| self.aliases_used.contains(*alias))
            .fold(ClubMapping::new(), |mapping, (canonical, alias)| {
                mapping.with(alias, canonical)
            })
    }
}

#[derive(Debug, Clone)]
struct FakeTeam {
    club: &'static str,
    series: usize,
    sw_style: bool,
    players: Vec<String>,
}

impl FakeTeam {
    fn raw_name(&self, club: &str, rng: &mut StdRng) -> String {
        let n = self.series;
        let variants = if self.sw_style {
            vec![
                format!("{club} - {n} SW"),
                format!("{club} {n} SW"),
                format!("{club} -{n} sw"),
            ]
        } else {
            vec![format!("{club} - {n}"), format!("{club} {n}")]
        };
        variants
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| format!("{club} {n}"))
    }
}

pub fn generate(cfg: &FakeLeagueConfig) -> FakeLeague {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let clubs = &CLUBS[..cfg.clubs.clamp(2, CLUBS.len())];

    let mut teams = Vec::new();
    for (club_idx, club) in clubs.iter().enumerate() {
        for series in 1..=cfg.teams_per_club.max(1) {
            let players = (0..cfg.players_per_team.max(2))
                .map(|i| format!("p{}-{club_idx}-{series}-{i}", cfg.league_id))
                .collect();
            teams.push(FakeTeam {
                club: *club,
                series,
                sw_style: club_idx % 2 == 0,
                players,
            });
        }
    }

    let mut aliases_used = BTreeSet::new();
    let mut roster = Vec::new();
    for team in &teams {
        let alias = ALIASES
            .iter()
            .find(|(canonical, _)| *canonical == team.club)
            .map(|(_, alias)| *alias);
        for (i, player) in team.players.iter().enumerate() {
            let club = match alias {
                // Never the first player, so the canonical club always exists.
                Some(alias) if i > 0 && rng.gen_bool(cfg.alias_rate) => {
                    aliases_used.insert(alias.to_string());
                    alias
                }
                _ => team.club,
            };
            roster.push(RawRosterRecord {
                raw_team_name: team.raw_name(club, &mut rng),
                player_external_id: player.clone(),
                player_name: Some(format!("Player {player}")),
                season: Some("2025".to_string()),
            });
        }
    }

    let mut matches = Vec::new();
    let mut mislabeled = Vec::new();
    let start = chrono::NaiveDate::from_ymd_opt(2025, 9, 6).unwrap_or_default();
    for idx in 0..cfg.matches {
        let pair = teams.choose_multiple(&mut rng, 2).collect::<Vec<_>>();
        let [home, away] = pair.as_slice() else {
            continue;
        };
        let mut was_mislabeled = false;
        let mut side_name = |team: &FakeTeam, rng: &mut StdRng| {
            if rng.gen_bool(cfg.mislabel_rate) {
                let other = teams
                    .iter()
                    .filter(|t| t.club != home.club && t.club != away.club)
                    .collect::<Vec<_>>();
                if let Some(other) = other.choose(rng) {
                    was_mislabeled = true;
                    return other.raw_name(other.club, rng);
                }
            }
            team.raw_name(team.club, rng)
        };
        let home_raw_name = side_name(*home, &mut rng);
        let away_raw_name = side_name(*away, &mut rng);
        let home_player_ids = pick_players(*home, &teams, cfg.substitute_rate, &mut rng);
        let away_player_ids = pick_players(*away, &teams, cfg.substitute_rate, &mut rng);

        let external_id = format!("m{}-{idx:04}", cfg.league_id);
        if was_mislabeled {
            mislabeled.push(external_id.clone());
        }
        let date = start + chrono::Duration::days((idx / 4) as i64 * 7);
        matches.push(RawMatchRecord {
            external_id,
            home_raw_name,
            away_raw_name,
            home_player_ids,
            away_player_ids,
            score: Some(format!("{}-{}", rng.gen_range(0..=6), rng.gen_range(0..=6))),
            date: Some(date.format("%Y-%m-%d").to_string()),
        });
    }

    FakeLeague {
        batch: LeagueBatch {
            league_id: cfg.league_id,
            league_name: Some(format!("Fake League {}", cfg.league_id)),
            roster,
            matches,
        },
        mislabeled,
        aliases_used,
    }
}

fn pick_players(
    team: &FakeTeam,
    teams: &[FakeTeam],
    substitute_rate: f64,
    rng: &mut StdRng,
) -> Vec<String> {
    let mut picked = team
        .players
        .choose_multiple(rng, 2)
        .cloned()
        .collect::<Vec<_>>();
    if rng.gen_bool(substitute_rate)
        && let Some(other) = teams.choose(rng)
        && let Some(sub) = other.players.choose(rng)
        && let Some(slot) = picked.last_mut()
    {
        *slot = sub.clone();
    }
    picked
}
