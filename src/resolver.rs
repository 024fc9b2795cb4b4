use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::membership_cache::MembershipCache;
use crate::store::{self, MatchRecord, Side};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    // Share of a side's votes the top team needs before the match is touched.
    pub confidence_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ResolverConfig {
    /// Out-of-range or non-finite thresholds fall back to the default.
    pub fn with_threshold(threshold: f64) -> Self {
        if threshold.is_finite() && threshold > 0.0 && threshold <= 1.0 {
            Self {
                confidence_threshold: threshold,
            }
        } else {
            Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NoVotes,
    LowConfidence,
    LookupFailed,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::NoVotes => "no_votes",
            ReasonCode::LowConfidence => "low_confidence",
            ReasonCode::LookupFailed => "lookup_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideTally {
    pub top_team_id: Option<i64>,
    pub top_votes: usize,
    pub total_votes: usize,
    // Another team has as many votes as the top one.
    pub tied: bool,
}

impl SideTally {
    pub fn confidence(&self) -> f64 {
        if self.total_votes == 0 {
            return 0.0;
        }
        self.top_votes as f64 / self.total_votes as f64
    }
}

/// Votes of one side's players. Players missing from the cache cast no vote
/// and a player listed twice votes once.
pub fn tally_side(player_ids: &[i64], cache: &MembershipCache) -> SideTally {
    let mut seen = Vec::with_capacity(player_ids.len());
    let mut votes: HashMap<i64, usize> = HashMap::new();
    for player_id in player_ids {
        if seen.contains(player_id) {
            continue;
        }
        seen.push(*player_id);
        if let Some(team_id) = cache.team_for(*player_id) {
            *votes.entry(team_id).or_default() += 1;
        }
    }

    let total_votes: usize = votes.values().sum();
    // Lowest team id among equals keeps the result deterministic.
    let top = votes
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(team, n)| (*team, *n));
    let Some((top_team_id, top_votes)) = top else {
        return SideTally {
            top_team_id: None,
            top_votes: 0,
            total_votes,
            tied: false,
        };
    };
    let tied = votes
        .iter()
        .any(|(team, n)| *team != top_team_id && *n == top_votes);
    SideTally {
        top_team_id: Some(top_team_id),
        top_votes,
        total_votes,
        tied,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SideOutcome {
    Unchanged,
    Updated {
        from_team_id: i64,
        to_team_id: i64,
        to_team_name: String,
    },
    Skipped {
        reason: ReasonCode,
    },
    Failed {
        reason: ReasonCode,
        team_id: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideDecision {
    pub match_id: i64,
    pub side: Side,
    pub confidence: f64,
    pub votes: usize,
    pub outcome: SideOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveSummary {
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub unchanged: usize,
    pub decisions: Vec<SideDecision>,
}

/// Decides one side of one match. Reads only; storage errors propagate.
pub fn decide_side(
    conn: &Connection,
    m: &MatchRecord,
    side: Side,
    cache: &MembershipCache,
    cfg: &ResolverConfig,
) -> Result<SideDecision> {
    let tally = tally_side(m.player_ids(side), cache);
    let confidence = tally.confidence();
    let decision = |outcome| SideDecision {
        match_id: m.match_id,
        side,
        confidence,
        votes: tally.total_votes,
        outcome,
    };

    let Some(winner) = tally.top_team_id else {
        return Ok(decision(SideOutcome::Skipped {
            reason: ReasonCode::NoVotes,
        }));
    };
    // A tie is never guessed, whatever the threshold.
    if tally.tied || confidence < cfg.confidence_threshold {
        return Ok(decision(SideOutcome::Skipped {
            reason: ReasonCode::LowConfidence,
        }));
    }
    let current = m.team_id(side);
    if winner == current {
        return Ok(decision(SideOutcome::Unchanged));
    }
    let outcome = match store::team_name(conn, winner)? {
        Some(name) => SideOutcome::Updated {
            from_team_id: current,
            to_team_id: winner,
            to_team_name: name,
        },
        None => SideOutcome::Failed {
            reason: ReasonCode::LookupFailed,
            team_id: winner,
        },
    };
    Ok(decision(outcome))
}

/// Re-derives each side's team from its players' memberships and writes the
/// corrections. A match with a failed lookup on either side is left as is.
pub fn resolve(
    conn: &Connection,
    matches: &[MatchRecord],
    cache: &MembershipCache,
    cfg: &ResolverConfig,
) -> Result<ResolveSummary> {
    let mut summary = ResolveSummary::default();

    for m in matches {
        let mut decisions = Side::BOTH
            .into_iter()
            .map(|side| decide_side(conn, m, side, cache, cfg))
            .collect::<Result<Vec<_>>>()?;

        let failed = decisions
            .iter()
            .any(|d| matches!(d.outcome, SideOutcome::Failed { .. }));
        if failed {
            // The match is not written, so no side may report a reassignment.
            for d in &mut decisions {
                if matches!(d.outcome, SideOutcome::Updated { .. }) {
                    d.outcome = SideOutcome::Skipped {
                        reason: ReasonCode::LookupFailed,
                    };
                }
            }
        }
        for d in &decisions {
            log_decision(d);
        }

        let skipped = decisions
            .iter()
            .any(|d| matches!(d.outcome, SideOutcome::Skipped { .. }));
        let mut changed = false;
        if failed {
            summary.errors += 1;
        } else {
            for d in &decisions {
                if let SideOutcome::Updated {
                    to_team_id,
                    to_team_name,
                    ..
                } = &d.outcome
                {
                    store::set_match_team(conn, m.match_id, d.side, *to_team_id, to_team_name)?;
                    changed = true;
                }
            }
            if changed {
                summary.updated += 1;
            } else if skipped {
                summary.skipped += 1;
            } else {
                summary.unchanged += 1;
            }
        }
        summary.decisions.extend(decisions);
    }

    info!(
        matches = matches.len(),
        updated = summary.updated,
        skipped = summary.skipped,
        errors = summary.errors,
        unchanged = summary.unchanged,
        threshold = cfg.confidence_threshold,
        "team assignment resolve finished"
    );
    Ok(summary)
}

fn log_decision(d: &SideDecision) {
    let side = d.side.as_str();
    match &d.outcome {
        SideOutcome::Unchanged => {}
        SideOutcome::Updated {
            from_team_id,
            to_team_id,
            to_team_name,
        } => info!(
            match_id = d.match_id,
            side,
            confidence = d.confidence,
            from_team = from_team_id,
            to_team = to_team_id,
            to_team_name = to_team_name.as_str(),
            "match team reassigned"
        ),
        SideOutcome::Skipped { reason } => info!(
            match_id = d.match_id,
            side,
            confidence = d.confidence,
            votes = d.votes,
            reason = reason.as_str(),
            "match side skipped"
        ),
        SideOutcome::Failed { reason, team_id } => warn!(
            match_id = d.match_id,
            side,
            confidence = d.confidence,
            team_id,
            reason = reason.as_str(),
            "match side not updated"
        ),
    }
}
