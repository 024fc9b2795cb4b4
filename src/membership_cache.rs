use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::debug;

/// Aggregated memberships of one player on one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipCandidate {
    pub team_id: i64,
    pub memberships: u32,
    pub latest_created_at: String,
    pub latest_membership_id: i64,
}

/// Orders candidates so the preferred team compares `Greater`: more
/// membership rows first, then the most recently created membership. The
/// membership id settles rows created within the same microsecond.
pub fn compare_candidates(a: &MembershipCandidate, b: &MembershipCandidate) -> Ordering {
    a.memberships
        .cmp(&b.memberships)
        .then_with(|| a.latest_created_at.cmp(&b.latest_created_at))
        .then_with(|| a.latest_membership_id.cmp(&b.latest_membership_id))
}

/// Read-only player -> team snapshot for one league. Players without any
/// membership are absent, which is not the same as belonging to a team.
#[derive(Debug, Clone, Default)]
pub struct MembershipCache {
    league_id: u32,
    teams: HashMap<i64, i64>,
}

impl MembershipCache {
    pub fn build(conn: &Connection, league_id: u32) -> Result<Self> {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT m.player_id, m.team_id, COUNT(*),
                       MAX(m.created_at), MAX(m.membership_id)
                FROM team_memberships m
                JOIN teams t ON t.team_id = m.team_id
                WHERE t.league_id = ?1
                GROUP BY m.player_id, m.team_id
                "#,
            )
            .context("prepare membership query")?;
        let rows = stmt
            .query_map(params![league_id as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    MembershipCandidate {
                        team_id: row.get(1)?,
                        memberships: row.get::<_, u32>(2)?,
                        latest_created_at: row.get(3)?,
                        latest_membership_id: row.get(4)?,
                    },
                ))
            })
            .context("query memberships")?;

        let mut candidates = Vec::new();
        for row in rows {
            candidates.push(row.context("decode membership row")?);
        }
        let cache = Self::from_candidates(league_id, candidates);
        debug!(
            league_id,
            players = cache.len(),
            "membership cache built"
        );
        Ok(cache)
    }

    pub fn from_candidates(
        league_id: u32,
        candidates: impl IntoIterator<Item = (i64, MembershipCandidate)>,
    ) -> Self {
        let mut best: HashMap<i64, MembershipCandidate> = HashMap::new();
        for (player_id, candidate) in candidates {
            match best.get(&player_id) {
                Some(current) if compare_candidates(&candidate, current) != Ordering::Greater => {}
                _ => {
                    best.insert(player_id, candidate);
                }
            }
        }
        Self {
            league_id,
            teams: best
                .into_iter()
                .map(|(player_id, candidate)| (player_id, candidate.team_id))
                .collect(),
        }
    }

    /// Direct player -> team pairs, for callers that already resolved teams.
    pub fn from_pairs(league_id: u32, pairs: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self {
            league_id,
            teams: pairs.into_iter().collect(),
        }
    }

    pub fn team_for(&self, player_id: i64) -> Option<i64> {
        self.teams.get(&player_id).copied()
    }

    pub fn league_id(&self) -> u32 {
        self.league_id
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    fn candidate(team_id: i64, memberships: u32, at: &str, id: i64) -> MembershipCandidate {
        MembershipCandidate {
            team_id,
            memberships,
            latest_created_at: at.to_string(),
            latest_membership_id: id,
        }
    }

    #[test]
    fn count_beats_recency() {
        let older_but_more = candidate(1, 3, "2024-01-01T00:00:00.000000Z", 1);
        let newer = candidate(2, 2, "2025-01-01T00:00:00.000000Z", 9);
        assert_eq!(compare_candidates(&older_but_more, &newer), Ordering::Greater);
    }

    #[test]
    fn recency_breaks_count_ties() {
        let a = candidate(1, 2, "2024-01-01T00:00:00.000000Z", 5);
        let b = candidate(2, 2, "2025-01-01T00:00:00.000000Z", 1);
        assert_eq!(compare_candidates(&a, &b), Ordering::Less);

        let same_stamp = candidate(3, 2, "2025-01-01T00:00:00.000000Z", 4);
        assert_eq!(compare_candidates(&same_stamp, &b), Ordering::Greater);
    }

    #[test]
    fn from_candidates_is_order_independent() {
        let rows = vec![
            (10, candidate(1, 1, "2024-01-01T00:00:00.000000Z", 1)),
            (10, candidate(2, 2, "2023-01-01T00:00:00.000000Z", 2)),
            (11, candidate(3, 1, "2024-01-01T00:00:00.000000Z", 3)),
        ];
        let forward = MembershipCache::from_candidates(1, rows.clone());
        let backward = MembershipCache::from_candidates(1, rows.into_iter().rev());
        for cache in [forward, backward] {
            assert_eq!(cache.team_for(10), Some(2));
            assert_eq!(cache.team_for(11), Some(3));
            assert_eq!(cache.team_for(12), None);
        }
    }

    #[test]
    fn build_scopes_to_league_and_picks_most_frequent() {
        let conn = store::open_in_memory().unwrap();
        store::ensure_league(&conn, 1, None).unwrap();
        store::ensure_league(&conn, 2, None).unwrap();
        let club = store::ensure_club(&conn, "Glen View").unwrap();
        let t4 = store::ensure_team(&conn, club, 1, "Glen View 4", Some("4")).unwrap();
        let t5 = store::ensure_team(&conn, club, 1, "Glen View 5", Some("5")).unwrap();
        let other = store::ensure_team(&conn, club, 2, "Glen View 1", Some("1")).unwrap();

        let regular = store::ensure_player(&conn, "reg", None, Some(club)).unwrap();
        let newcomer = store::ensure_player(&conn, "new", None, Some(club)).unwrap();
        let elsewhere = store::ensure_player(&conn, "away", None, Some(club)).unwrap();
        let _idle = store::ensure_player(&conn, "idle", None, None).unwrap();

        store::add_membership(&conn, regular, t4, Some("2024")).unwrap();
        store::add_membership(&conn, regular, t4, Some("2025")).unwrap();
        store::add_membership(&conn, regular, t5, Some("2025")).unwrap();
        store::add_membership(&conn, newcomer, t5, Some("2025")).unwrap();
        store::add_membership(&conn, newcomer, t4, Some("2025")).unwrap();
        store::add_membership(&conn, elsewhere, other, None).unwrap();

        let cache = MembershipCache::build(&conn, 1).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.team_for(regular), Some(t4));
        // One row each: the later insert wins.
        assert_eq!(cache.team_for(newcomer), Some(t4));
        assert_eq!(cache.team_for(elsewhere), None);
    }
}
