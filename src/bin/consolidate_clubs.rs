use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use league_ingest::config::{self, PipelineConfig};
use league_ingest::consolidator::{self, EntryStatus};
use league_ingest::{logging, store};

fn main() -> Result<()> {
    logging::init();
    let mut cfg = PipelineConfig::from_env();
    if let Some(path) = parse_path_arg("--db") {
        cfg.db_path = Some(path);
    }
    if let Some(path) = parse_path_arg("--mapping") {
        cfg.mapping_path = Some(path);
    }
    if std::env::args().skip(1).any(|arg| arg == "--dry-run") {
        cfg.dry_run = true;
    } else if let Some(raw) = std::env::args()
        .skip(1)
        .find_map(|arg| arg.strip_prefix("--dry-run=").map(str::to_string))
    {
        cfg.dry_run = config::parse_flag(&raw);
    }

    let mapping = cfg.mapping()?;
    if mapping.is_empty() {
        return Err(anyhow!(
            "club mapping is empty (set CLUB_MAPPING_PATH or pass --mapping)"
        ));
    }
    let db_path = cfg.db_path()?;
    let mut conn = store::open_db(&db_path)?;

    // Dry runs roll back per entry, so one transaction serves both modes.
    let tx = conn.transaction().context("begin consolidation transaction")?;
    let summary = consolidator::consolidate(&tx, &mapping, cfg.dry_run)?;
    tx.commit().context("commit consolidation")?;

    println!(
        "Club consolidation{}",
        if summary.dry_run { " (dry run)" } else { "" }
    );
    println!("DB: {}", db_path.display());
    println!(
        "Applied: {}  Records updated: {}  Skipped: {}  Errors: {}",
        summary.consolidations_applied, summary.records_updated, summary.skipped, summary.errors
    );
    for entry in &summary.entries {
        let detail = match &entry.status {
            EntryStatus::Error { error } => error.as_str().to_string(),
            status => format!(
                "{} players={} teams={} associations={}",
                status.as_str(),
                entry.counts.players,
                entry.counts.teams + entry.counts.teams_merged,
                entry.counts.associations
            ),
        };
        println!("  {} -> {}: {detail}", entry.duplicate, entry.canonical);
    }
    Ok(())
}

fn parse_path_arg(flag: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg
            .strip_prefix(flag)
            .and_then(|rest| rest.strip_prefix('='))
        {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
