use rusqlite::Connection;

use league_ingest::club_mapping::ClubMapping;
use league_ingest::fake_league::{self, FakeLeagueConfig};
use league_ingest::ingest::{self, LeagueBatch, RawMatchRecord, RawRosterRecord, RunOptions};
use league_ingest::store;

const LEAGUE: u32 = 5;

fn roster(raw_team_name: &str, players: &[&str]) -> Vec<RawRosterRecord> {
    players
        .iter()
        .map(|id| RawRosterRecord {
            raw_team_name: raw_team_name.to_string(),
            player_external_id: id.to_string(),
            player_name: None,
            season: Some("2025".to_string()),
        })
        .collect()
}

fn ids(players: &[&str]) -> Vec<String> {
    players.iter().map(|p| p.to_string()).collect()
}

fn fixture_match(
    external_id: &str,
    home: &str,
    home_players: &[&str],
    away: &str,
    away_players: &[&str],
) -> RawMatchRecord {
    RawMatchRecord {
        external_id: external_id.to_string(),
        home_raw_name: home.to_string(),
        away_raw_name: away.to_string(),
        home_player_ids: ids(home_players),
        away_player_ids: ids(away_players),
        score: Some("6-4".to_string()),
        date: Some("2025-11-06".to_string()),
    }
}

fn batch() -> LeagueBatch {
    let mut roster_records = roster("Lifesportlshire - 1 SW", &["a1", "a2"]);
    roster_records.extend(roster("Lifesport Lshire - 2 SW", &["b1", "b2"]));
    roster_records.extend(roster("Hinsdale PC II - 9 SW", &["h1", "h2"]));
    LeagueBatch {
        league_id: LEAGUE,
        league_name: Some("Thursday Night".to_string()),
        roster: roster_records,
        matches: vec![
            fixture_match(
                "m1",
                "Lifesportlshire -1 sw",
                &["a1", "a2"],
                "Hinsdale PC II - 9 SW",
                &["h1", "h2", "h3"],
            ),
            // Home side scraped with the wrong team name.
            fixture_match(
                "m2",
                "Hinsdale PC II - 9 SW",
                &["a1", "a2"],
                "Lifesport Lshire - 2 SW",
                &["b1", "b2"],
            ),
        ],
    }
}

fn alias_mapping() -> ClubMapping {
    ClubMapping::new().with("Lifesport Lshire", "Lifesportlshire")
}

fn club_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn.prepare("SELECT name FROM clubs ORDER BY name").unwrap();
    let names = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap();
    names
}

fn home_team_of(conn: &Connection, external_id: &str) -> String {
    conn.query_row(
        "SELECT home_team_name FROM matches WHERE external_id = ?1",
        [external_id],
        |r| r.get(0),
    )
    .unwrap()
}

#[test]
fn rerunning_a_league_converges() {
    let mut conn = store::open_in_memory().unwrap();
    let opts = RunOptions::default();

    let first = ingest::run_league(&mut conn, &batch(), &ClubMapping::new(), &opts).unwrap();
    assert_eq!(first.import.matches_inserted, 2);
    assert_eq!(first.import.player_slots_dropped, 1);
    assert_eq!(first.import.clubs_seen, 3);
    assert_eq!(first.import.teams_seen, 3);
    assert!(first.import.unparsed_names.is_empty());
    assert_eq!(first.resolve.updated, 1);
    assert_eq!(home_team_of(&conn, "m2"), "Lifesportlshire 1 SW");
    assert!(club_names(&conn).contains(&"Lifesport Lshire".to_string()));

    let second = ingest::run_league(&mut conn, &batch(), &alias_mapping(), &opts).unwrap();
    assert_eq!(second.import.matches_inserted, 0);
    assert_eq!(second.import.matches_existing, 2);
    assert_eq!(second.resolve.updated, 0);
    assert_eq!(second.consolidate.consolidations_applied, 1);
    assert_eq!(club_names(&conn), vec!["Hinsdale PC", "Lifesportlshire"]);

    let third = ingest::run_league(&mut conn, &batch(), &alias_mapping(), &opts).unwrap();
    assert_eq!(third.resolve.updated, 0);
    assert_eq!(third.consolidate.consolidations_applied, 0);
    assert_eq!(third.consolidate.skipped, 1);
    assert_eq!(club_names(&conn).len(), 2);
    assert_eq!(home_team_of(&conn, "m2"), "Lifesportlshire 1 SW");

    let (runs, finished): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COUNT(summary_json) FROM ingest_runs WHERE league_id = ?1",
            [LEAGUE],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!((runs, finished), (3, 3));
}

#[test]
fn mapped_alias_is_never_created() {
    let mut conn = store::open_in_memory().unwrap();
    let summary =
        ingest::run_league(&mut conn, &batch(), &alias_mapping(), &RunOptions::default()).unwrap();
    assert_eq!(summary.import.clubs_seen, 2);
    // Nothing to migrate: the alias never made it into storage.
    assert_eq!(summary.consolidate.skipped, 1);
    assert_eq!(club_names(&conn), vec!["Hinsdale PC", "Lifesportlshire"]);
}

#[test]
fn dry_run_keeps_duplicate_club() {
    let mut conn = store::open_in_memory().unwrap();
    ingest::run_league(&mut conn, &batch(), &ClubMapping::new(), &RunOptions::default()).unwrap();

    let opts = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let summary = ingest::run_league(&mut conn, &batch(), &alias_mapping(), &opts).unwrap();
    assert!(summary.consolidate.dry_run);
    assert_eq!(summary.consolidate.consolidations_applied, 1);
    assert!(club_names(&conn).contains(&"Lifesport Lshire".to_string()));
}

#[test]
fn batch_json_defaults_optional_fields() {
    let batch: LeagueBatch = serde_json::from_str(
        r#"{"league_id": 8, "matches": [{"external_id": "x", "home_raw_name": "A 1", "away_raw_name": "B 2"}]}"#,
    )
    .unwrap();
    assert!(batch.roster.is_empty());
    assert!(batch.matches[0].home_player_ids.is_empty());

    let mut conn = store::open_in_memory().unwrap();
    let summary =
        ingest::run_league(&mut conn, &batch, &ClubMapping::new(), &RunOptions::default())
            .unwrap();
    assert_eq!(summary.import.matches_inserted, 1);
    assert_eq!(summary.resolve.skipped, 1);
}

#[test]
fn synthetic_league_settles_after_consolidation() {
    let league = fake_league::generate(&FakeLeagueConfig {
        alias_rate: 0.3,
        ..Default::default()
    });
    assert!(!league.aliases_used.is_empty());
    let mapping = league.alias_mapping();
    let opts = RunOptions::default();
    let mut conn = store::open_in_memory().unwrap();

    let first = ingest::run_league(&mut conn, &league.batch, &ClubMapping::new(), &opts).unwrap();
    assert!(first.import.unparsed_names.is_empty());
    assert_eq!(first.import.matches_inserted, league.batch.matches.len());
    if !league.mislabeled.is_empty() {
        assert!(first.resolve.updated > 0);
    }

    let second = ingest::run_league(&mut conn, &league.batch, &mapping, &opts).unwrap();
    assert_eq!(second.consolidate.consolidations_applied, mapping.len());
    assert_eq!(second.consolidate.errors, 0);
    let names = club_names(&conn);
    for alias in &league.aliases_used {
        assert!(!names.contains(alias), "{alias}");
    }

    // Merged memberships can settle sides that were split across alias teams,
    // so the run after consolidation may still move matches. The next one not.
    let third = ingest::run_league(&mut conn, &league.batch, &mapping, &opts).unwrap();
    assert_eq!(third.resolve.errors, 0);
    assert_eq!(third.consolidate.consolidations_applied, 0);
    let fourth = ingest::run_league(&mut conn, &league.batch, &mapping, &opts).unwrap();
    assert_eq!(fourth.resolve.updated, 0);
    assert_eq!(fourth.import.matches_inserted, 0);
    assert_eq!(club_names(&conn), names);
}
