use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use league_ingest::club_mapping::ClubMapping;
use league_ingest::config::{self, PipelineConfig};
use league_ingest::fake_league::{self, FakeLeagueConfig};
use league_ingest::ingest::{self, LeagueBatch, RunOptions, RunSummary};
use league_ingest::resolver::ResolverConfig;
use league_ingest::{logging, store};

fn main() -> Result<()> {
    logging::init();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut cfg = PipelineConfig::from_env();
    apply_args(&mut cfg, &args);

    let league_filter = arg_value(&args, "--league").and_then(|raw| raw.parse::<u32>().ok());
    let mut batches = Vec::new();
    let mut demo_aliases = ClubMapping::new();
    if let Some(seed) = arg_value(&args, "--demo-seed") {
        let seed = seed
            .parse::<u64>()
            .with_context(|| format!("invalid --demo-seed {seed:?}"))?;
        let mut demo = FakeLeagueConfig {
            seed,
            ..Default::default()
        };
        if let Some(league_id) = league_filter {
            demo.league_id = league_id;
        }
        let league = fake_league::generate(&demo);
        demo_aliases = league.alias_mapping();
        batches.push(league.batch);
    }
    for path in batch_paths(&args) {
        batches.push(LeagueBatch::load(&path)?);
    }
    if let Some(league_id) = league_filter {
        batches.retain(|batch| batch.league_id == league_id);
    }
    if batches.is_empty() {
        return Err(anyhow!(
            "no league batches to run (pass batch json files or --demo-seed N)"
        ));
    }

    let mut mapping = cfg.mapping()?;
    // Demo aliases only fill gaps in the curated mapping.
    for (duplicate, canonical) in demo_aliases.iter() {
        if mapping.canonical_for(duplicate).is_none() {
            mapping = mapping.with(duplicate, canonical);
        }
    }
    mapping.validate()?;

    let db_path = cfg.db_path()?;
    let mut conn = store::open_db(&db_path)?;
    let opts = RunOptions {
        resolver: cfg.resolver(),
        dry_run: cfg.dry_run,
    };

    println!("League ingest");
    println!("DB: {}", db_path.display());
    println!(
        "Threshold: {:.2}  Mapping entries: {}  Dry run: {}",
        opts.resolver.confidence_threshold,
        mapping.len(),
        opts.dry_run
    );
    for batch in &batches {
        let summary = ingest::run_league(&mut conn, batch, &mapping, &opts)?;
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let import = &summary.import;
    let resolve = &summary.resolve;
    let consolidate = &summary.consolidate;
    println!("league {} (run {})", summary.league_id, summary.run_id);
    println!(
        "  import: roster={} matches={} inserted={} existing={} clubs={} teams={}",
        import.roster_records,
        import.match_records,
        import.matches_inserted,
        import.matches_existing,
        import.clubs_seen,
        import.teams_seen
    );
    if import.player_slots_dropped > 0 {
        println!("  dropped player slots: {}", import.player_slots_dropped);
    }
    if !import.unparsed_names.is_empty() {
        println!("  unparsed names: {}", import.unparsed_names.len());
        for name in import.unparsed_names.iter().take(6) {
            println!("   - {name}");
        }
    }
    println!(
        "  resolve: updated={} skipped={} errors={} unchanged={}",
        resolve.updated, resolve.skipped, resolve.errors, resolve.unchanged
    );
    println!(
        "  consolidate{}: applied={} records={} skipped={} errors={}",
        if consolidate.dry_run { " (dry run)" } else { "" },
        consolidate.consolidations_applied,
        consolidate.records_updated,
        consolidate.skipped,
        consolidate.errors
    );
}

fn apply_args(cfg: &mut PipelineConfig, args: &[String]) {
    if let Some(path) = arg_value(args, "--db") {
        cfg.db_path = Some(PathBuf::from(path));
    }
    if let Some(path) = arg_value(args, "--mapping") {
        cfg.mapping_path = Some(PathBuf::from(path));
    }
    if let Some(raw) = arg_value(args, "--threshold")
        && let Ok(val) = raw.parse::<f64>()
    {
        cfg.confidence_threshold = ResolverConfig::with_threshold(val).confidence_threshold;
    }
    if let Some(raw) = arg_value(args, "--dry-run=") {
        cfg.dry_run = config::parse_flag(&raw);
    } else if args.iter().any(|arg| arg == "--dry-run") {
        cfg.dry_run = true;
    }
}

const VALUE_FLAGS: &[&str] = &["--db", "--mapping", "--threshold", "--league", "--demo-seed"];

/// `--flag=value` or `--flag value`. A trailing `=` in `flag` accepts only the
/// first form.
fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let (name, inline_only) = match flag.strip_suffix('=') {
        Some(name) => (name, true),
        None => (flag, false),
    };
    for (idx, arg) in args.iter().enumerate() {
        if let Some(val) = arg
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
        {
            let trimmed = val.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if !inline_only
            && arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn batch_paths(args: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        out.push(PathBuf::from(arg));
    }
    out
}
