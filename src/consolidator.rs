use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{info, warn};

use crate::club_mapping::ClubMapping;
use crate::store::{self, ClubDependents};

const SAVEPOINT: &str = "consolidate_club";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryError {
    MissingCanonical,
    SelfMapping,
    VerificationFailed,
}

impl EntryError {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryError::MissingCanonical => "missing_canonical",
            EntryError::SelfMapping => "self_mapping",
            EntryError::VerificationFailed => "verification_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Applied,
    WouldApply,
    Skipped,
    Error { error: EntryError },
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Applied => "applied",
            EntryStatus::WouldApply => "would_apply",
            EntryStatus::Skipped => "skipped",
            EntryStatus::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationCounts {
    pub players: usize,
    pub teams: usize,
    // Teams folded into the canonical club's team of the same series.
    pub teams_merged: usize,
    pub memberships: usize,
    pub match_refs: usize,
    pub associations: usize,
    pub associations_discarded: usize,
}

impl MigrationCounts {
    pub fn records_updated(&self) -> usize {
        self.players
            + self.teams
            + self.teams_merged
            + self.memberships
            + self.match_refs
            + self.associations
            + self.associations_discarded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub duplicate: String,
    pub canonical: String,
    pub status: EntryStatus,
    pub counts: MigrationCounts,
    pub remaining: ClubDependents,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationSummary {
    pub dry_run: bool,
    // In a dry run these count what would have been applied.
    pub consolidations_applied: usize,
    pub records_updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub entries: Vec<EntryReport>,
}

/// Merges every mapped duplicate club into its canonical club. Entry-level
/// problems are reported and the run moves on; storage errors propagate.
pub fn consolidate(
    conn: &Connection,
    mapping: &ClubMapping,
    dry_run: bool,
) -> Result<ConsolidationSummary> {
    let mut summary = ConsolidationSummary {
        dry_run,
        ..Default::default()
    };
    for (duplicate, canonical) in mapping.iter() {
        let report = consolidate_entry(conn, duplicate, canonical, dry_run)?;
        match &report.status {
            EntryStatus::Applied | EntryStatus::WouldApply => {
                summary.consolidations_applied += 1;
                summary.records_updated += report.counts.records_updated();
            }
            EntryStatus::Skipped => summary.skipped += 1,
            EntryStatus::Error { .. } => summary.errors += 1,
        }
        summary.entries.push(report);
    }
    info!(
        dry_run,
        entries = mapping.len(),
        applied = summary.consolidations_applied,
        records_updated = summary.records_updated,
        skipped = summary.skipped,
        errors = summary.errors,
        "club consolidation finished"
    );
    Ok(summary)
}

pub fn consolidate_entry(
    conn: &Connection,
    duplicate: &str,
    canonical: &str,
    dry_run: bool,
) -> Result<EntryReport> {
    let mut report = EntryReport {
        duplicate: duplicate.to_string(),
        canonical: canonical.to_string(),
        status: EntryStatus::Skipped,
        counts: MigrationCounts::default(),
        remaining: ClubDependents::default(),
    };

    let Some(duplicate_id) = store::club_id_by_name(conn, duplicate)? else {
        info!(duplicate, canonical, "duplicate club absent, skipping");
        return Ok(report);
    };
    let Some(canonical_id) = store::club_id_by_name(conn, canonical)? else {
        report.status = EntryStatus::Error {
            error: EntryError::MissingCanonical,
        };
        log_entry(&report);
        return Ok(report);
    };
    if duplicate_id == canonical_id {
        report.status = EntryStatus::Error {
            error: EntryError::SelfMapping,
        };
        log_entry(&report);
        return Ok(report);
    }

    conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))
        .context("open consolidation savepoint")?;
    let migrated = migrate_dependents(conn, duplicate_id, canonical_id, canonical).and_then(|counts| {
        let remaining = store::count_club_dependents(conn, duplicate_id)?;
        Ok((counts, remaining))
    });
    let (counts, remaining) = match migrated {
        Ok(v) => v,
        Err(err) => {
            let _ = rollback_savepoint(conn);
            return Err(err);
        }
    };
    report.counts = counts;
    report.remaining = remaining;

    if remaining.total() > 0 {
        rollback_savepoint(conn)?;
        report.status = EntryStatus::Error {
            error: EntryError::VerificationFailed,
        };
    } else if dry_run {
        rollback_savepoint(conn)?;
        report.status = EntryStatus::WouldApply;
    } else {
        if let Err(err) = conn
            .execute("DELETE FROM clubs WHERE club_id = ?1", params![duplicate_id])
            .context("delete duplicate club")
        {
            let _ = rollback_savepoint(conn);
            return Err(err);
        }
        conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))
            .context("release consolidation savepoint")?;
        report.status = EntryStatus::Applied;
    }
    log_entry(&report);
    Ok(report)
}

fn rollback_savepoint(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT};"))
        .context("roll back consolidation savepoint")
}

fn migrate_dependents(
    conn: &Connection,
    duplicate_id: i64,
    canonical_id: i64,
    canonical: &str,
) -> Result<MigrationCounts> {
    let mut counts = MigrationCounts::default();

    for team in store::teams_for_club(conn, duplicate_id)? {
        let target = store::find_team_by_series(
            conn,
            canonical_id,
            team.league_id,
            team.series.as_deref(),
        )?;
        match target {
            Some(target_id) => {
                merge_team(conn, team.team_id, target_id, &mut counts)?;
                counts.teams_merged += 1;
            }
            None => {
                counts.teams += conn
                    .execute(
                        "UPDATE teams SET club_id = ?1 WHERE team_id = ?2",
                        params![canonical_id, team.team_id],
                    )
                    .context("re-point team")?;
                rename_team(conn, &team, canonical, &mut counts)?;
            }
        }
    }

    counts.players = conn
        .execute(
            "UPDATE players SET club_id = ?1 WHERE club_id = ?2",
            params![canonical_id, duplicate_id],
        )
        .context("re-point players")?;

    // Canonical keeps its own association for a league both clubs play in.
    counts.associations = conn
        .execute(
            "INSERT OR IGNORE INTO club_leagues(club_id, league_id)
             SELECT ?1, league_id FROM club_leagues WHERE club_id = ?2",
            params![canonical_id, duplicate_id],
        )
        .context("copy league associations")?;
    let removed = conn
        .execute(
            "DELETE FROM club_leagues WHERE club_id = ?1",
            params![duplicate_id],
        )
        .context("drop duplicate league associations")?;
    counts.associations_discarded = removed.saturating_sub(counts.associations);

    Ok(counts)
}

/// Gives a re-pointed team its canonical display name and carries the new
/// name onto the matches that reference it. An existing team of that name in
/// the league keeps it, and the moved team keeps its old name.
fn rename_team(
    conn: &Connection,
    team: &store::TeamRow,
    canonical: &str,
    counts: &mut MigrationCounts,
) -> Result<()> {
    let name = match team.series.as_deref() {
        Some(series) => format!("{canonical} {series}"),
        None => canonical.to_string(),
    };
    if name == team.name || store::team_id_by_name(conn, team.league_id, &name)?.is_some() {
        return Ok(());
    }

    conn.execute(
        "UPDATE teams SET name = ?1 WHERE team_id = ?2",
        params![name, team.team_id],
    )
    .context("rename re-pointed team")?;
    let stamp = store::now_stamp();
    counts.match_refs += conn
        .execute(
            "UPDATE matches SET home_team_name = ?1, updated_at = ?2 WHERE home_team_id = ?3",
            params![name, stamp, team.team_id],
        )
        .context("rename home match refs")?;
    counts.match_refs += conn
        .execute(
            "UPDATE matches SET away_team_name = ?1, updated_at = ?2 WHERE away_team_id = ?3",
            params![name, stamp, team.team_id],
        )
        .context("rename away match refs")?;
    Ok(())
}

fn merge_team(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    counts: &mut MigrationCounts,
) -> Result<()> {
    let target_name = store::team_name(conn, target_id)?
        .with_context(|| format!("merge target team {target_id} vanished"))?;

    counts.memberships += conn
        .execute(
            "UPDATE OR IGNORE team_memberships SET team_id = ?1 WHERE team_id = ?2",
            params![target_id, source_id],
        )
        .context("re-point memberships")?;
    // Rows left behind duplicate a (player, team, season) the target already has.
    conn.execute(
        "DELETE FROM team_memberships WHERE team_id = ?1",
        params![source_id],
    )
    .context("drop duplicate memberships")?;

    let stamp = store::now_stamp();
    counts.match_refs += conn
        .execute(
            "UPDATE matches SET home_team_id = ?1, home_team_name = ?2, updated_at = ?3
             WHERE home_team_id = ?4",
            params![target_id, target_name, stamp, source_id],
        )
        .context("re-point home match refs")?;
    counts.match_refs += conn
        .execute(
            "UPDATE matches SET away_team_id = ?1, away_team_name = ?2, updated_at = ?3
             WHERE away_team_id = ?4",
            params![target_id, target_name, stamp, source_id],
        )
        .context("re-point away match refs")?;

    conn.execute("DELETE FROM teams WHERE team_id = ?1", params![source_id])
        .context("delete merged team")?;
    Ok(())
}

fn log_entry(report: &EntryReport) {
    let c = &report.counts;
    match &report.status {
        EntryStatus::Error { error } => warn!(
            duplicate = report.duplicate.as_str(),
            canonical = report.canonical.as_str(),
            error = error.as_str(),
            remaining = report.remaining.total(),
            "club consolidation entry failed"
        ),
        status => info!(
            duplicate = report.duplicate.as_str(),
            canonical = report.canonical.as_str(),
            status = status.as_str(),
            players = c.players,
            teams = c.teams + c.teams_merged,
            associations = c.associations,
            "club consolidation entry"
        ),
    }
}
