use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

const APP_DIR: &str = "league_ingest";
const DB_FILE: &str = "league.sqlite";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Home, Side::Away];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub match_id: i64,
    pub league_id: u32,
    pub external_id: String,
    pub match_date: Option<String>,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_team_name: String,
    pub away_team_name: String,
    pub home_raw_name: String,
    pub away_raw_name: String,
    pub home_player_ids: Vec<i64>,
    pub away_player_ids: Vec<i64>,
    pub score: Option<String>,
}

impl MatchRecord {
    pub fn team_id(&self, side: Side) -> i64 {
        match side {
            Side::Home => self.home_team_id,
            Side::Away => self.away_team_id,
        }
    }

    pub fn player_ids(&self, side: Side) -> &[i64] {
        match side {
            Side::Home => &self.home_player_ids,
            Side::Away => &self.away_player_ids,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMatch<'a> {
    pub league_id: u32,
    pub external_id: &'a str,
    pub match_date: Option<&'a str>,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_team_name: &'a str,
    pub away_team_name: &'a str,
    pub home_raw_name: &'a str,
    pub away_raw_name: &'a str,
    pub home_player_ids: &'a [i64],
    pub away_player_ids: &'a [i64],
    pub score: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClubDependents {
    pub players: usize,
    pub teams: usize,
    pub associations: usize,
}

impl ClubDependents {
    pub fn total(&self) -> usize {
        self.players + self.teams + self.associations
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRow {
    pub team_id: i64,
    pub club_id: i64,
    pub league_id: u32,
    pub name: String,
    pub series: Option<String>,
}

/// Fixed-width UTC timestamp, so stored stamps order correctly as text.
pub fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DB_FILE))
}

pub fn app_data_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable wal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS leagues (
            league_id INTEGER PRIMARY KEY,
            name TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS clubs (
            club_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS club_leagues (
            club_id INTEGER NOT NULL REFERENCES clubs(club_id),
            league_id INTEGER NOT NULL REFERENCES leagues(league_id),
            PRIMARY KEY (club_id, league_id)
        );

        CREATE TABLE IF NOT EXISTS teams (
            team_id INTEGER PRIMARY KEY AUTOINCREMENT,
            club_id INTEGER NOT NULL REFERENCES clubs(club_id),
            league_id INTEGER NOT NULL REFERENCES leagues(league_id),
            name TEXT NOT NULL,
            series TEXT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (name, league_id)
        );
        CREATE INDEX IF NOT EXISTS idx_teams_club ON teams(club_id);

        CREATE TABLE IF NOT EXISTS players (
            player_id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL UNIQUE,
            name TEXT NULL,
            club_id INTEGER NULL REFERENCES clubs(club_id),
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_club ON players(club_id);

        CREATE TABLE IF NOT EXISTS team_memberships (
            membership_id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id INTEGER NOT NULL REFERENCES players(player_id),
            team_id INTEGER NOT NULL REFERENCES teams(team_id),
            season TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            UNIQUE (player_id, team_id, season)
        );
        CREATE INDEX IF NOT EXISTS idx_memberships_team ON team_memberships(team_id);

        CREATE TABLE IF NOT EXISTS matches (
            match_id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES leagues(league_id),
            external_id TEXT NOT NULL,
            match_date TEXT NULL,
            home_team_id INTEGER NOT NULL REFERENCES teams(team_id),
            away_team_id INTEGER NOT NULL REFERENCES teams(team_id),
            home_team_name TEXT NOT NULL,
            away_team_name TEXT NOT NULL,
            home_raw_name TEXT NOT NULL,
            away_raw_name TEXT NOT NULL,
            home_player1_id INTEGER NULL REFERENCES players(player_id),
            home_player2_id INTEGER NULL REFERENCES players(player_id),
            away_player1_id INTEGER NULL REFERENCES players(player_id),
            away_player2_id INTEGER NULL REFERENCES players(player_id),
            score TEXT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (league_id, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_league ON matches(league_id);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            league_id INTEGER NOT NULL,
            roster_records INTEGER NOT NULL,
            match_records INTEGER NOT NULL,
            summary_json TEXT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn ensure_league(conn: &Connection, league_id: u32, name: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT INTO leagues(league_id, name) VALUES (?1, ?2)
         ON CONFLICT(league_id) DO UPDATE SET name = COALESCE(excluded.name, leagues.name)",
        params![league_id as i64, name],
    )
    .context("upsert league")?;
    Ok(())
}

pub fn club_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT club_id FROM clubs WHERE name = ?1",
        params![name],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .context("query club by name")
}

pub fn ensure_club(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO clubs(name, created_at) VALUES (?1, ?2)",
        params![name, now_stamp()],
    )
    .context("insert club")?;
    club_id_by_name(conn, name)?.with_context(|| format!("club {name:?} missing after insert"))
}

/// Returns true when the association row was new.
pub fn ensure_club_league(conn: &Connection, club_id: i64, league_id: u32) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO club_leagues(club_id, league_id) VALUES (?1, ?2)",
            params![club_id, league_id as i64],
        )
        .context("insert club league association")?;
    Ok(inserted > 0)
}

/// Looks the team up by display name, then by (club, series), and creates it
/// only when neither exists.
pub fn ensure_team(
    conn: &Connection,
    club_id: i64,
    league_id: u32,
    name: &str,
    series: Option<&str>,
) -> Result<i64> {
    if let Some(team_id) = team_id_by_name(conn, league_id, name)? {
        return Ok(team_id);
    }
    if let Some(team_id) = find_team_by_series(conn, club_id, league_id, series)? {
        return Ok(team_id);
    }
    conn.execute(
        "INSERT INTO teams(club_id, league_id, name, series, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![club_id, league_id as i64, name, series, now_stamp()],
    )
    .context("insert team")?;
    Ok(conn.last_insert_rowid())
}

pub fn team_id_by_name(conn: &Connection, league_id: u32, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT team_id FROM teams WHERE name = ?1 AND league_id = ?2",
        params![name, league_id as i64],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .context("query team by name")
}

pub fn find_team_by_series(
    conn: &Connection,
    club_id: i64,
    league_id: u32,
    series: Option<&str>,
) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT team_id FROM teams WHERE club_id = ?1 AND league_id = ?2 AND series IS ?3
         ORDER BY team_id ASC LIMIT 1",
        params![club_id, league_id as i64, series],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .context("query team by series")
}

pub fn team_name(conn: &Connection, team_id: i64) -> Result<Option<String>> {
    conn.query_row(
        "SELECT name FROM teams WHERE team_id = ?1",
        params![team_id],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .context("query team name")
}

pub fn teams_for_club(conn: &Connection, club_id: i64) -> Result<Vec<TeamRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT team_id, club_id, league_id, name, series FROM teams
             WHERE club_id = ?1 ORDER BY team_id ASC",
        )
        .context("prepare club teams query")?;
    let rows = stmt
        .query_map(params![club_id], |row| {
            Ok(TeamRow {
                team_id: row.get(0)?,
                club_id: row.get(1)?,
                league_id: row.get::<_, u32>(2)?,
                name: row.get(3)?,
                series: row.get(4)?,
            })
        })
        .context("query club teams")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team row")?);
    }
    Ok(out)
}

pub fn ensure_player(
    conn: &Connection,
    external_id: &str,
    name: Option<&str>,
    club_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO players(external_id, name, club_id, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(external_id) DO UPDATE SET
            name = COALESCE(excluded.name, players.name),
            club_id = COALESCE(excluded.club_id, players.club_id)",
        params![external_id, name, club_id, now_stamp()],
    )
    .context("upsert player")?;
    conn.query_row(
        "SELECT player_id FROM players WHERE external_id = ?1",
        params![external_id],
        |row| row.get::<_, i64>(0),
    )
    .context("query player id")
}

/// One membership row per (player, team, season); returns true when new.
pub fn add_membership(
    conn: &Connection,
    player_id: i64,
    team_id: i64,
    season: Option<&str>,
) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO team_memberships(player_id, team_id, season, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                player_id,
                team_id,
                season.unwrap_or_default(),
                now_stamp()
            ],
        )
        .context("insert team membership")?;
    Ok(inserted > 0)
}

/// Returns true when the match was new. Rows already imported are left alone:
/// scores and players are immutable and team references belong to the resolver.
pub fn insert_match(conn: &Connection, m: &NewMatch<'_>) -> Result<bool> {
    let player = |ids: &[i64], idx: usize| ids.get(idx).copied();
    let inserted = conn
        .execute(
            r#"
            INSERT OR IGNORE INTO matches (
                league_id, external_id, match_date,
                home_team_id, away_team_id, home_team_name, away_team_name,
                home_raw_name, away_raw_name,
                home_player1_id, home_player2_id, away_player1_id, away_player2_id,
                score, updated_at
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6, ?7,
                ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15
            )
            "#,
            params![
                m.league_id as i64,
                m.external_id,
                m.match_date,
                m.home_team_id,
                m.away_team_id,
                m.home_team_name,
                m.away_team_name,
                m.home_raw_name,
                m.away_raw_name,
                player(m.home_player_ids, 0),
                player(m.home_player_ids, 1),
                player(m.away_player_ids, 0),
                player(m.away_player_ids, 1),
                m.score,
                now_stamp(),
            ],
        )
        .context("insert match")?;
    Ok(inserted > 0)
}

pub fn match_exists(conn: &Connection, league_id: u32, external_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM matches WHERE league_id = ?1 AND external_id = ?2",
        params![league_id as i64, external_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .context("query match existence")
}

pub fn load_matches(conn: &Connection, league_id: u32) -> Result<Vec<MatchRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                match_id, league_id, external_id, match_date,
                home_team_id, away_team_id, home_team_name, away_team_name,
                home_raw_name, away_raw_name,
                home_player1_id, home_player2_id, away_player1_id, away_player2_id,
                score
            FROM matches
            WHERE league_id = ?1
            ORDER BY match_date ASC, match_id ASC
            "#,
        )
        .context("prepare load matches query")?;

    let rows = stmt
        .query_map(params![league_id as i64], |row| {
            let home = [row.get::<_, Option<i64>>(10)?, row.get::<_, Option<i64>>(11)?];
            let away = [row.get::<_, Option<i64>>(12)?, row.get::<_, Option<i64>>(13)?];
            Ok(MatchRecord {
                match_id: row.get(0)?,
                league_id: row.get::<_, u32>(1)?,
                external_id: row.get(2)?,
                match_date: row.get(3)?,
                home_team_id: row.get(4)?,
                away_team_id: row.get(5)?,
                home_team_name: row.get(6)?,
                away_team_name: row.get(7)?,
                home_raw_name: row.get(8)?,
                away_raw_name: row.get(9)?,
                home_player_ids: home.into_iter().flatten().collect(),
                away_player_ids: away.into_iter().flatten().collect(),
                score: row.get(14)?,
            })
        })
        .context("query load matches")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode match row")?);
    }
    Ok(out)
}

pub fn set_match_team(
    conn: &Connection,
    match_id: i64,
    side: Side,
    team_id: i64,
    team_name: &str,
) -> Result<()> {
    let sql = match side {
        Side::Home => {
            "UPDATE matches SET home_team_id = ?1, home_team_name = ?2, updated_at = ?3
             WHERE match_id = ?4"
        }
        Side::Away => {
            "UPDATE matches SET away_team_id = ?1, away_team_name = ?2, updated_at = ?3
             WHERE match_id = ?4"
        }
    };
    conn.execute(
        sql,
        params![team_id, team_name, now_stamp(), match_id],
    )
    .with_context(|| format!("update {} team of match {match_id}", side.as_str()))?;
    Ok(())
}

pub fn count_club_dependents(conn: &Connection, club_id: i64) -> Result<ClubDependents> {
    let count = |sql: &str| -> Result<usize> {
        let n = conn
            .query_row(sql, params![club_id], |row| row.get::<_, i64>(0))
            .with_context(|| format!("count dependents: {sql}"))?;
        Ok(usize::try_from(n).unwrap_or_default())
    };
    Ok(ClubDependents {
        players: count("SELECT COUNT(*) FROM players WHERE club_id = ?1")?,
        teams: count("SELECT COUNT(*) FROM teams WHERE club_id = ?1")?,
        associations: count("SELECT COUNT(*) FROM club_leagues WHERE club_id = ?1")?,
    })
}
