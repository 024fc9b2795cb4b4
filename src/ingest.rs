use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::club_mapping::ClubMapping;
use crate::consolidator::{self, ConsolidationSummary};
use crate::membership_cache::MembershipCache;
use crate::name_parser::{self, NamePattern};
use crate::resolver::{self, ResolveSummary, ResolverConfig};
use crate::store::{self, NewMatch};

const PLAYERS_PER_SIDE: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRosterRecord {
    pub raw_team_name: String,
    pub player_external_id: String,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMatchRecord {
    pub external_id: String,
    pub home_raw_name: String,
    pub away_raw_name: String,
    #[serde(default)]
    pub home_player_ids: Vec<String>,
    #[serde(default)]
    pub away_player_ids: Vec<String>,
    #[serde(default)]
    pub score: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// One league's scraped records, as handed over by the scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueBatch {
    pub league_id: u32,
    #[serde(default)]
    pub league_name: Option<String>,
    #[serde(default)]
    pub roster: Vec<RawRosterRecord>,
    #[serde(default)]
    pub matches: Vec<RawMatchRecord>,
}

impl LeagueBatch {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read league batch {}", path.display()))?;
        serde_json::from_str(raw.trim())
            .with_context(|| format!("parse league batch {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub resolver: ResolverConfig,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub roster_records: usize,
    pub match_records: usize,
    pub clubs_seen: usize,
    pub teams_seen: usize,
    pub memberships_added: usize,
    pub matches_inserted: usize,
    pub matches_existing: usize,
    // Players beyond two on one side of a match.
    pub player_slots_dropped: usize,
    // Raw names no suffix rule accepted.
    pub unparsed_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub league_id: u32,
    pub import: ImportSummary,
    pub resolve: ResolveSummary,
    pub consolidate: ConsolidationSummary,
}

#[derive(Debug, Clone)]
pub struct ResolvedTeam {
    pub club_id: i64,
    pub team_id: i64,
    pub team_name: String,
}

/// Raw-name -> team memo for one run, so each distinct string is parsed and
/// looked up once.
pub struct TeamIndex<'a> {
    league_id: u32,
    mapping: &'a ClubMapping,
    teams: HashMap<String, ResolvedTeam>,
    clubs: HashSet<i64>,
    unparsed: Vec<String>,
}

impl<'a> TeamIndex<'a> {
    pub fn new(league_id: u32, mapping: &'a ClubMapping) -> Self {
        Self {
            league_id,
            mapping,
            teams: HashMap::new(),
            clubs: HashSet::new(),
            unparsed: Vec::new(),
        }
    }

    pub fn resolve(&mut self, conn: &Connection, raw_name: &str) -> Result<ResolvedTeam> {
        if let Some(team) = self.teams.get(raw_name) {
            return Ok(team.clone());
        }
        let parsed = name_parser::parse(raw_name);
        if parsed.pattern == NamePattern::Fallback {
            self.unparsed.push(raw_name.to_string());
        }
        // Known duplicates are filed under their canonical club straight away.
        let club_name = self
            .mapping
            .canonical_for(&parsed.club_name)
            .unwrap_or(parsed.club_name.as_str());
        let club_id = store::ensure_club(conn, club_name)?;
        store::ensure_club_league(conn, club_id, self.league_id)?;
        let team_id = store::ensure_team(
            conn,
            club_id,
            self.league_id,
            &parsed.team_name,
            parsed.series_suffix.as_deref(),
        )?;
        let team_name = store::team_name(conn, team_id)?.unwrap_or(parsed.team_name);
        debug!(
            raw = raw_name,
            club = club_name,
            team = team_name.as_str(),
            pattern = ?parsed.pattern,
            "parsed team name"
        );

        let team = ResolvedTeam {
            club_id,
            team_id,
            team_name,
        };
        self.clubs.insert(club_id);
        self.teams.insert(raw_name.to_string(), team.clone());
        Ok(team)
    }
}

pub fn import_roster(
    conn: &Connection,
    index: &mut TeamIndex<'_>,
    records: &[RawRosterRecord],
    summary: &mut ImportSummary,
) -> Result<()> {
    for record in records {
        let team = index.resolve(conn, &record.raw_team_name)?;
        let player_id = store::ensure_player(
            conn,
            &record.player_external_id,
            record.player_name.as_deref(),
            Some(team.club_id),
        )?;
        if store::add_membership(conn, player_id, team.team_id, record.season.as_deref())? {
            summary.memberships_added += 1;
        }
        summary.roster_records += 1;
    }
    Ok(())
}

pub fn import_matches(
    conn: &Connection,
    index: &mut TeamIndex<'_>,
    records: &[RawMatchRecord],
    summary: &mut ImportSummary,
) -> Result<()> {
    for record in records {
        summary.match_records += 1;
        // Rerun: the stored row already went through the resolver.
        if store::match_exists(conn, index.league_id, &record.external_id)? {
            summary.matches_existing += 1;
            continue;
        }
        let home = index.resolve(conn, &record.home_raw_name)?;
        let away = index.resolve(conn, &record.away_raw_name)?;
        let home_players = side_players(conn, &record.home_player_ids, summary)?;
        let away_players = side_players(conn, &record.away_player_ids, summary)?;

        let inserted = store::insert_match(
            conn,
            &NewMatch {
                league_id: index.league_id,
                external_id: &record.external_id,
                match_date: record.date.as_deref(),
                home_team_id: home.team_id,
                away_team_id: away.team_id,
                home_team_name: &home.team_name,
                away_team_name: &away.team_name,
                home_raw_name: &record.home_raw_name,
                away_raw_name: &record.away_raw_name,
                home_player_ids: &home_players,
                away_player_ids: &away_players,
                score: record.score.as_deref(),
            },
        )?;
        if inserted {
            summary.matches_inserted += 1;
        } else {
            summary.matches_existing += 1;
        }
    }
    Ok(())
}

fn side_players(
    conn: &Connection,
    external_ids: &[String],
    summary: &mut ImportSummary,
) -> Result<Vec<i64>> {
    let mut out = Vec::with_capacity(PLAYERS_PER_SIDE);
    for external_id in external_ids.iter().filter(|id| !id.trim().is_empty()) {
        if out.len() == PLAYERS_PER_SIDE {
            summary.player_slots_dropped += 1;
            continue;
        }
        out.push(store::ensure_player(conn, external_id.trim(), None, None)?);
    }
    Ok(out)
}

/// Imports one league batch, then resolves match teams and consolidates
/// duplicate clubs, all in one transaction. Any error rolls the run back.
pub fn run_league(
    conn: &mut Connection,
    batch: &LeagueBatch,
    mapping: &ClubMapping,
    opts: &RunOptions,
) -> Result<RunSummary> {
    let league_id = batch.league_id;
    let tx = conn.transaction().context("begin league run transaction")?;

    store::ensure_league(&tx, league_id, batch.league_name.as_deref())?;
    tx.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, league_id, roster_records, match_records, summary_json)
         VALUES (?1, NULL, ?2, ?3, ?4, NULL)",
        params![
            store::now_stamp(),
            league_id as i64,
            batch.roster.len() as i64,
            batch.matches.len() as i64
        ],
    )
    .context("insert ingest run")?;
    let run_id = tx.last_insert_rowid();
    info!(
        run_id,
        league_id,
        roster = batch.roster.len(),
        matches = batch.matches.len(),
        dry_run = opts.dry_run,
        "league run started"
    );

    let mut import = ImportSummary::default();
    let mut index = TeamIndex::new(league_id, mapping);
    import_roster(&tx, &mut index, &batch.roster, &mut import)?;
    import_matches(&tx, &mut index, &batch.matches, &mut import)?;
    import.clubs_seen = index.clubs.len();
    import.teams_seen = index
        .teams
        .values()
        .map(|t| t.team_id)
        .collect::<HashSet<_>>()
        .len();
    import.unparsed_names = std::mem::take(&mut index.unparsed);

    let cache = MembershipCache::build(&tx, league_id)?;
    let matches = store::load_matches(&tx, league_id)?;
    let resolve = resolver::resolve(&tx, &matches, &cache, &opts.resolver)?;
    let consolidate = consolidator::consolidate(&tx, mapping, opts.dry_run)?;

    let summary = RunSummary {
        run_id,
        league_id,
        import,
        resolve,
        consolidate,
    };
    let summary_json = serde_json::json!({
        "import": &summary.import,
        "resolve": {
            "updated": summary.resolve.updated,
            "skipped": summary.resolve.skipped,
            "errors": summary.resolve.errors,
            "unchanged": summary.resolve.unchanged,
        },
        "consolidate": &summary.consolidate,
    });
    tx.execute(
        "UPDATE ingest_runs SET finished_at = ?1, summary_json = ?2 WHERE run_id = ?3",
        params![store::now_stamp(), summary_json.to_string(), run_id],
    )
    .context("update ingest run")?;
    tx.commit().context("commit league run")?;

    info!(
        run_id,
        league_id,
        matches_inserted = summary.import.matches_inserted,
        resolved = summary.resolve.updated,
        consolidated = summary.consolidate.consolidations_applied,
        "league run finished"
    );
    Ok(summary)
}
