use rusqlite::Connection;

use league_ingest::club_mapping::ClubMapping;
use league_ingest::consolidator::{self, EntryError, EntryStatus};
use league_ingest::store::{self, NewMatch};

const DUPLICATE: &str = "Lifesport Lshire";
const CANONICAL: &str = "Lifesportlshire";

fn mapping() -> ClubMapping {
    ClubMapping::new().with(DUPLICATE, CANONICAL)
}

struct Fixture {
    conn: Connection,
    duplicate: i64,
    canonical: i64,
    duplicate_teams: Vec<i64>,
}

/// Duplicate club with 15 players over two teams in league 1; the canonical
/// club already plays league 1 with a 3 SW team.
fn fixture() -> Fixture {
    let conn = store::open_in_memory().unwrap();
    store::ensure_league(&conn, 1, None).unwrap();
    let canonical = store::ensure_club(&conn, CANONICAL).unwrap();
    store::ensure_club_league(&conn, canonical, 1).unwrap();
    let own = store::ensure_team(&conn, canonical, 1, "Lifesportlshire 3 SW", Some("3 SW")).unwrap();
    let regular = store::ensure_player(&conn, "c-0", None, Some(canonical)).unwrap();
    store::add_membership(&conn, regular, own, None).unwrap();

    let duplicate = store::ensure_club(&conn, DUPLICATE).unwrap();
    store::ensure_club_league(&conn, duplicate, 1).unwrap();
    let duplicate_teams = vec![
        store::ensure_team(&conn, duplicate, 1, "Lifesport Lshire 1 SW", Some("1 SW")).unwrap(),
        store::ensure_team(&conn, duplicate, 1, "Lifesport Lshire 2 SW", Some("2 SW")).unwrap(),
    ];
    for idx in 0..15 {
        let player = store::ensure_player(&conn, &format!("d-{idx}"), None, Some(duplicate)).unwrap();
        store::add_membership(&conn, player, duplicate_teams[idx % 2], None).unwrap();
    }
    Fixture {
        conn,
        duplicate,
        canonical,
        duplicate_teams,
    }
}

fn count(conn: &Connection, sql: &str, id: i64) -> i64 {
    conn.query_row(sql, [id], |r| r.get(0)).unwrap()
}

fn players_of(conn: &Connection, club: i64) -> i64 {
    count(conn, "SELECT COUNT(*) FROM players WHERE club_id = ?1", club)
}

fn teams_of(conn: &Connection, club: i64) -> i64 {
    count(conn, "SELECT COUNT(*) FROM teams WHERE club_id = ?1", club)
}

fn club_exists(conn: &Connection, name: &str) -> bool {
    store::club_id_by_name(conn, name).unwrap().is_some()
}

#[test]
fn duplicate_club_is_folded_into_canonical() {
    let fx = fixture();
    let summary = consolidator::consolidate(&fx.conn, &mapping(), false).unwrap();

    assert_eq!(summary.consolidations_applied, 1);
    assert_eq!(summary.errors, 0);
    let entry = &summary.entries[0];
    assert_eq!(entry.status, EntryStatus::Applied);
    assert_eq!(entry.counts.players, 15);
    assert_eq!(entry.counts.teams, 2);
    assert_eq!(entry.counts.teams_merged, 0);
    // Canonical already plays league 1.
    assert_eq!(entry.counts.associations, 0);
    assert_eq!(entry.counts.associations_discarded, 1);
    assert_eq!(summary.records_updated, entry.counts.records_updated());
    assert_eq!(entry.remaining.total(), 0);

    assert!(!club_exists(&fx.conn, DUPLICATE));
    assert_eq!(players_of(&fx.conn, fx.canonical), 16);
    assert_eq!(teams_of(&fx.conn, fx.canonical), 3);
    for team in &fx.duplicate_teams {
        let club = count(&fx.conn, "SELECT club_id FROM teams WHERE team_id = ?1", *team);
        assert_eq!(club, fx.canonical);
    }
    assert_eq!(
        count(&fx.conn, "SELECT COUNT(*) FROM club_leagues WHERE club_id = ?1", fx.canonical),
        1
    );
    assert_eq!(
        count(&fx.conn, "SELECT COUNT(*) FROM club_leagues WHERE club_id = ?1", fx.duplicate),
        0
    );
}

#[test]
fn rerun_after_apply_is_a_no_op() {
    let fx = fixture();
    consolidator::consolidate(&fx.conn, &mapping(), false).unwrap();
    let again = consolidator::consolidate(&fx.conn, &mapping(), false).unwrap();
    assert_eq!(again.consolidations_applied, 0);
    assert_eq!(again.records_updated, 0);
    assert_eq!(again.skipped, 1);
    assert_eq!(again.entries[0].status, EntryStatus::Skipped);
    assert_eq!(players_of(&fx.conn, fx.canonical), 16);
}

#[test]
fn dry_run_reports_without_touching_rows() {
    let fx = fixture();
    let snapshot = |conn: &Connection| {
        let mut stmt = conn
            .prepare(
                "SELECT 'p', player_id, club_id FROM players
                 UNION ALL SELECT 't', team_id, club_id FROM teams
                 UNION ALL SELECT 'a', club_id, league_id FROM club_leagues
                 UNION ALL SELECT 'c', club_id, 0 FROM clubs
                 ORDER BY 1, 2, 3",
            )
            .unwrap();
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, r.get::<_, Option<i64>>(2)?))
            })
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    };
    let before = snapshot(&fx.conn);

    let summary = consolidator::consolidate(&fx.conn, &mapping(), true).unwrap();
    assert!(summary.dry_run);
    assert_eq!(summary.consolidations_applied, 1);
    assert_eq!(summary.entries[0].status, EntryStatus::WouldApply);
    assert_eq!(summary.entries[0].counts.players, 15);

    assert_eq!(snapshot(&fx.conn), before);
    assert!(club_exists(&fx.conn, DUPLICATE));
    assert_eq!(players_of(&fx.conn, fx.duplicate), 15);
}

#[test]
fn missing_canonical_is_an_entry_error() {
    let fx = fixture();
    let mapping = ClubMapping::new()
        .with("Hinsdale P.C.", "Hinsdale PC")
        .with(DUPLICATE, "Lifesport Shire");
    store::ensure_club(&fx.conn, "Hinsdale P.C.").unwrap();
    store::ensure_club(&fx.conn, "Hinsdale PC").unwrap();

    let summary = consolidator::consolidate(&fx.conn, &mapping, false).unwrap();
    assert_eq!(summary.errors, 1);
    // The other entry still goes through.
    assert_eq!(summary.consolidations_applied, 1);
    let failed = summary
        .entries
        .iter()
        .find(|e| e.duplicate == DUPLICATE)
        .unwrap();
    assert_eq!(
        failed.status,
        EntryStatus::Error {
            error: EntryError::MissingCanonical
        }
    );
    assert!(club_exists(&fx.conn, DUPLICATE));
    assert!(!club_exists(&fx.conn, "Hinsdale P.C."));
}

#[test]
fn self_mapping_never_deletes() {
    let fx = fixture();
    let mapping = ClubMapping::new().with(CANONICAL, CANONICAL);
    let summary = consolidator::consolidate(&fx.conn, &mapping, false).unwrap();
    assert_eq!(
        summary.entries[0].status,
        EntryStatus::Error {
            error: EntryError::SelfMapping
        }
    );
    assert!(club_exists(&fx.conn, CANONICAL));
}

#[test]
fn failed_verification_keeps_duplicate_and_rolls_back() {
    let fx = fixture();
    let stuck = store::ensure_player(&fx.conn, "d-7", None, None).unwrap();
    fx.conn
        .execute_batch(&format!(
            "CREATE TRIGGER pin_player BEFORE UPDATE OF club_id ON players
             WHEN OLD.player_id = {stuck}
             BEGIN SELECT RAISE(IGNORE); END;"
        ))
        .unwrap();

    let summary = consolidator::consolidate(&fx.conn, &mapping(), false).unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.consolidations_applied, 0);
    let entry = &summary.entries[0];
    assert_eq!(
        entry.status,
        EntryStatus::Error {
            error: EntryError::VerificationFailed
        }
    );
    assert_eq!(entry.remaining.players, 1);

    assert!(club_exists(&fx.conn, DUPLICATE));
    assert_eq!(players_of(&fx.conn, fx.duplicate), 15);
    assert_eq!(teams_of(&fx.conn, fx.duplicate), 2);
    assert_eq!(
        count(&fx.conn, "SELECT COUNT(*) FROM club_leagues WHERE club_id = ?1", fx.duplicate),
        1
    );
}

#[test]
fn same_series_team_is_merged() {
    let fx = fixture();
    let conn = &fx.conn;
    // Canonical also fields a 1 SW team; one player is listed on both.
    let canonical_team =
        store::ensure_team(conn, fx.canonical, 1, "Lifesportlshire 1 SW", Some("1 SW")).unwrap();
    let both = store::ensure_player(conn, "d-0", None, None).unwrap();
    store::add_membership(conn, both, canonical_team, None).unwrap();
    let other = store::ensure_team(conn, fx.canonical, 1, "Lifesportlshire 3 SW", Some("3 SW")).unwrap();
    let dup_team = fx.duplicate_teams[0];
    store::insert_match(
        conn,
        &NewMatch {
            league_id: 1,
            external_id: "m1",
            match_date: None,
            home_team_id: dup_team,
            away_team_id: other,
            home_team_name: "Lifesport Lshire 1 SW",
            away_team_name: "Lifesportlshire 3 SW",
            home_raw_name: "Lifesport Lshire - 1 SW",
            away_raw_name: "Lifesportlshire - 3 SW",
            home_player_ids: &[both],
            away_player_ids: &[],
            score: Some("7-5"),
        },
    )
    .unwrap();

    let summary = consolidator::consolidate(conn, &mapping(), false).unwrap();
    let entry = &summary.entries[0];
    assert_eq!(entry.status, EntryStatus::Applied);
    assert_eq!(entry.counts.teams_merged, 1);
    assert_eq!(entry.counts.teams, 1);
    assert_eq!(entry.counts.match_refs, 1);
    // d-2 .. d-14 move; d-0 already has a row on the canonical team.
    assert_eq!(entry.counts.memberships, 7);

    assert_eq!(store::team_name(conn, dup_team).unwrap(), None);
    assert_eq!(
        count(conn, "SELECT COUNT(*) FROM team_memberships WHERE team_id = ?1", canonical_team),
        8
    );
    let (home_id, home_name): (i64, String) = conn
        .query_row(
            "SELECT home_team_id, home_team_name FROM matches WHERE external_id = 'm1'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(home_id, canonical_team);
    assert_eq!(home_name, "Lifesportlshire 1 SW");
}

#[test]
fn association_for_new_league_is_moved() {
    let fx = fixture();
    store::ensure_league(&fx.conn, 2, None).unwrap();
    store::ensure_club_league(&fx.conn, fx.duplicate, 2).unwrap();

    let summary = consolidator::consolidate(&fx.conn, &mapping(), false).unwrap();
    let counts = summary.entries[0].counts;
    assert_eq!(counts.associations, 1);
    assert_eq!(counts.associations_discarded, 1);
    let leagues: Vec<i64> = fx
        .conn
        .prepare("SELECT league_id FROM club_leagues WHERE club_id = ?1 ORDER BY league_id")
        .unwrap()
        .query_map([fx.canonical], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(leagues, vec![1, 2]);
}

#[test]
fn moved_team_takes_canonical_name() {
    let fx = fixture();
    let conn = &fx.conn;
    let other = store::team_id_by_name(conn, 1, "Lifesportlshire 3 SW").unwrap().unwrap();
    let moved = fx.duplicate_teams[1];
    store::insert_match(
        conn,
        &NewMatch {
            league_id: 1,
            external_id: "m2",
            match_date: None,
            home_team_id: other,
            away_team_id: moved,
            home_team_name: "Lifesportlshire 3 SW",
            away_team_name: "Lifesport Lshire 2 SW",
            home_raw_name: "Lifesportlshire - 3 SW",
            away_raw_name: "Lifesport Lshire - 2 SW",
            home_player_ids: &[],
            away_player_ids: &[],
            score: None,
        },
    )
    .unwrap();
    // Another club already holds the 1 SW display name in league 1.
    let taken = store::ensure_club(conn, "Lifesport").unwrap();
    store::ensure_team(conn, taken, 1, "Lifesportlshire 1 SW", None).unwrap();

    let summary = consolidator::consolidate(conn, &mapping(), false).unwrap();
    let entry = &summary.entries[0];
    assert_eq!(entry.status, EntryStatus::Applied);
    assert_eq!(entry.counts.teams, 2);
    assert_eq!(entry.counts.match_refs, 1);

    assert_eq!(
        store::team_name(conn, moved).unwrap().as_deref(),
        Some("Lifesportlshire 2 SW")
    );
    assert_eq!(
        store::team_name(conn, fx.duplicate_teams[0]).unwrap().as_deref(),
        Some("Lifesport Lshire 1 SW")
    );
    let (away_id, away_name): (i64, String) = conn
        .query_row(
            "SELECT away_team_id, away_team_name FROM matches WHERE external_id = 'm2'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(away_id, moved);
    assert_eq!(away_name, "Lifesportlshire 2 SW");
}
