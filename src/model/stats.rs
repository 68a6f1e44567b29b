//! Career statistics: merging the manual rows of an approved match into each player's totals.

use super::matches::{MATCH_COMPLETED, MATCH_PENDING_APPROVAL};
use super::scoring::{format_overs, ManualScore, BALLS_PER_OVER, ENTRY_BATTING, ENTRY_OPPONENT};
use super::util::{safe_ratio, ServiceError};
use chrono::{DateTime, Utc};
use log::info;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct PlayerStats {
    pub player_id: i64,
    pub matches: i32,
    pub innings: i32,
    pub runs: i32,
    pub balls_faced: i32,
    pub fours: i32,
    pub sixes: i32,
    pub outs: i32,
    pub highest_score: i32,
    pub fifties: i32,
    pub hundreds: i32,
    pub balls_bowled: i32,
    pub runs_conceded: i32,
    pub wickets: i32,
    pub best_wickets: i32,
    pub best_runs: i32,
    pub catches: i32,
    pub drops: i32,
    pub saves: i32,
    pub updated_at: DateTime<Utc>,
}

/// What one player did in one match, summed over all their manual rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchContribution {
    pub player_id: i64,
    pub batted: bool,
    pub runs: i32,
    pub balls_faced: i32,
    pub fours: i32,
    pub sixes: i32,
    pub outs: i32,
    pub balls_bowled: i32,
    pub runs_conceded: i32,
    pub wickets: i32,
    pub catches: i32,
    pub drops: i32,
    pub saves: i32,
}

impl MatchContribution {
    fn add_row(&mut self, row: &ManualScore) {
        if row.entry_kind == ENTRY_BATTING {
            self.batted = true;
        }
        self.runs = self.runs.saturating_add(row.runs);
        self.balls_faced = self.balls_faced.saturating_add(row.balls_faced);
        self.fours = self.fours.saturating_add(row.fours);
        self.sixes = self.sixes.saturating_add(row.sixes);
        if row.is_out {
            self.outs += 1;
        }
        self.balls_bowled = self.balls_bowled.saturating_add(row.balls_bowled);
        self.runs_conceded = self.runs_conceded.saturating_add(row.runs_conceded);
        self.wickets = self.wickets.saturating_add(row.wickets);
        self.catches = self.catches.saturating_add(row.catches);
        self.drops = self.drops.saturating_add(row.drops);
        self.saves = self.saves.saturating_add(row.saves);
    }

    fn bowled(&self) -> bool {
        self.balls_bowled > 0 || self.wickets > 0
    }
}

/// Group the player rows of a match by player, in the order the players first appear.
pub fn collect_contributions(rows: &[ManualScore]) -> Vec<MatchContribution> {
    let mut contributions: Vec<MatchContribution> = vec![];
    for row in rows.iter().filter(|r| r.entry_kind != ENTRY_OPPONENT) {
        let player_id = match row.player_id {
            Some(id) => id,
            None => continue,
        };

        match contributions.iter_mut().find(|c| c.player_id == player_id) {
            Some(c) => c.add_row(row),
            None => {
                let mut c = MatchContribution {
                    player_id,
                    ..Default::default()
                };
                c.add_row(row);
                contributions.push(c);
            }
        }
    }
    contributions
}

impl PlayerStats {
    pub fn empty(player_id: i64) -> Self {
        PlayerStats {
            player_id,
            matches: 0,
            innings: 0,
            runs: 0,
            balls_faced: 0,
            fours: 0,
            sixes: 0,
            outs: 0,
            highest_score: 0,
            fifties: 0,
            hundreds: 0,
            balls_bowled: 0,
            runs_conceded: 0,
            wickets: 0,
            best_wickets: 0,
            best_runs: 0,
            catches: 0,
            drops: 0,
            saves: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn absorb(&mut self, c: &MatchContribution) {
        let had_bowled = self.balls_bowled > 0 || self.wickets > 0;

        self.matches += 1;
        if c.batted {
            self.innings += 1;
            self.highest_score = self.highest_score.max(c.runs);
            if (50..100).contains(&c.runs) {
                self.fifties += 1;
            } else if c.runs >= 100 {
                self.hundreds += 1;
            }
        }

        self.runs = self.runs.saturating_add(c.runs);
        self.balls_faced = self.balls_faced.saturating_add(c.balls_faced);
        self.fours = self.fours.saturating_add(c.fours);
        self.sixes = self.sixes.saturating_add(c.sixes);
        self.outs = self.outs.saturating_add(c.outs);
        self.balls_bowled = self.balls_bowled.saturating_add(c.balls_bowled);
        self.runs_conceded = self.runs_conceded.saturating_add(c.runs_conceded);
        self.wickets = self.wickets.saturating_add(c.wickets);
        self.catches = self.catches.saturating_add(c.catches);
        self.drops = self.drops.saturating_add(c.drops);
        self.saves = self.saves.saturating_add(c.saves);

        if c.bowled() {
            let better = c.wickets > self.best_wickets
                || (c.wickets == self.best_wickets && c.runs_conceded < self.best_runs);
            if !had_bowled || better {
                self.best_wickets = c.wickets;
                self.best_runs = c.runs_conceded;
            }
        }
        self.updated_at = Utc::now();
    }

    pub async fn get_by_player(
        pool: &sqlx::PgPool,
        player_id: i64,
    ) -> Result<PlayerStats, ServiceError> {
        let record = sqlx::query_as::<_, PlayerStats>(
            "SELECT * FROM cricpro_player_stats WHERE player_id = $1",
        )
        .bind(player_id)
        .fetch_optional(pool)
        .await?;

        Ok(record.unwrap_or_else(|| PlayerStats::empty(player_id)))
    }

    async fn save(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO cricpro_player_stats (player_id, matches, innings, runs, balls_faced, fours, sixes, outs, highest_score, fifties, hundreds, balls_bowled, runs_conceded, wickets, best_wickets, best_runs, catches, drops, saves, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
             ON CONFLICT (player_id) DO UPDATE SET matches = EXCLUDED.matches, innings = EXCLUDED.innings, runs = EXCLUDED.runs,
               balls_faced = EXCLUDED.balls_faced, fours = EXCLUDED.fours, sixes = EXCLUDED.sixes, outs = EXCLUDED.outs,
               highest_score = EXCLUDED.highest_score, fifties = EXCLUDED.fifties, hundreds = EXCLUDED.hundreds,
               balls_bowled = EXCLUDED.balls_bowled, runs_conceded = EXCLUDED.runs_conceded, wickets = EXCLUDED.wickets,
               best_wickets = EXCLUDED.best_wickets, best_runs = EXCLUDED.best_runs, catches = EXCLUDED.catches,
               drops = EXCLUDED.drops, saves = EXCLUDED.saves, updated_at = EXCLUDED.updated_at",
        )
        .bind(self.player_id)
        .bind(self.matches)
        .bind(self.innings)
        .bind(self.runs)
        .bind(self.balls_faced)
        .bind(self.fours)
        .bind(self.sixes)
        .bind(self.outs)
        .bind(self.highest_score)
        .bind(self.fifties)
        .bind(self.hundreds)
        .bind(self.balls_bowled)
        .bind(self.runs_conceded)
        .bind(self.wickets)
        .bind(self.best_wickets)
        .bind(self.best_runs)
        .bind(self.catches)
        .bind(self.drops)
        .bind(self.saves)
        .bind(self.updated_at)
        .execute(&mut *tx)
        .await?;
        Ok(())
    }
}

/// Merge the manual scores of a match into career stats and close the match.
/// Only a match waiting for approval can be merged, so a match never counts twice.
pub async fn approve_match(pool: &sqlx::PgPool, match_id: i64) -> Result<usize, ServiceError> {
    let mut tx = pool.begin().await?;

    let status: Option<(String,)> =
        sqlx::query_as("SELECT status FROM cricpro_match WHERE id = $1 FOR UPDATE")
            .bind(match_id)
            .fetch_optional(&mut tx)
            .await?;

    match status {
        None => return Err(ServiceError::not_found("Match", match_id)),
        Some((status,)) if status != MATCH_PENDING_APPROVAL => {
            return Err(ServiceError::invalid(&format!(
                "Only matches pending approval can be approved, the match is {}.",
                status
            )))
        }
        Some(_) => {}
    }

    let rows = sqlx::query_as::<_, ManualScore>(
        "SELECT * FROM cricpro_manual_score WHERE match_id = $1 ORDER BY id ASC",
    )
    .bind(match_id)
    .fetch_all(&mut tx)
    .await?;

    let contributions = collect_contributions(&rows);
    for c in &contributions {
        let existing = sqlx::query_as::<_, PlayerStats>(
            "SELECT * FROM cricpro_player_stats WHERE player_id = $1 FOR UPDATE",
        )
        .bind(c.player_id)
        .fetch_optional(&mut tx)
        .await?;

        let mut stats = existing.unwrap_or_else(|| PlayerStats::empty(c.player_id));
        stats.absorb(c);
        stats.save(&mut tx).await?;
    }

    sqlx::query("DELETE FROM cricpro_opponent_temp_player WHERE match_id = $1")
        .bind(match_id)
        .execute(&mut tx)
        .await?;

    sqlx::query("UPDATE cricpro_match SET status = $1 WHERE id = $2")
        .bind(MATCH_COMPLETED)
        .bind(match_id)
        .execute(&mut tx)
        .await?;

    tx.commit().await?;
    info!(
        "Match {} approved, career stats updated for {} players.",
        match_id,
        contributions.len()
    );

    Ok(contributions.len())
}

/// Career stats plus the figures derived from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct CareerStats {
    pub stats: PlayerStats,
    #[oai(skip_serializing_if_is_none)]
    pub batting_average: Option<f64>,
    #[oai(skip_serializing_if_is_none)]
    pub strike_rate: Option<f64>,
    pub overs_bowled: String,
    #[oai(skip_serializing_if_is_none)]
    pub economy: Option<f64>,
    #[oai(skip_serializing_if_is_none)]
    pub bowling_average: Option<f64>,
    #[oai(skip_serializing_if_is_none)]
    pub best_bowling: Option<String>,
}

impl From<PlayerStats> for CareerStats {
    fn from(stats: PlayerStats) -> Self {
        let best_bowling = if stats.balls_bowled > 0 || stats.wickets > 0 {
            Some(format!("{}/{}", stats.best_wickets, stats.best_runs))
        } else {
            None
        };

        CareerStats {
            batting_average: safe_ratio(stats.runs as f64, stats.outs as f64),
            strike_rate: safe_ratio(stats.runs as f64 * 100.0, stats.balls_faced as f64),
            overs_bowled: format_overs(stats.balls_bowled),
            economy: safe_ratio(
                stats.runs_conceded as f64 * BALLS_PER_OVER as f64,
                stats.balls_bowled as f64,
            ),
            bowling_average: safe_ratio(stats.runs_conceded as f64, stats.wickets as f64),
            best_bowling,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scoring::{ENTRY_BOWLING, ENTRY_FIELDING};

    fn row(player_id: Option<i64>, entry_kind: &str) -> ManualScore {
        ManualScore {
            id: 0,
            match_id: 1,
            player_id,
            entry_kind: entry_kind.to_string(),
            runs: 0,
            balls_faced: 0,
            fours: 0,
            sixes: 0,
            is_out: false,
            wicket_over: None,
            wicket_ball: None,
            dismissal_type: None,
            balls_bowled: 0,
            runs_conceded: 0,
            wickets: 0,
            catches: 0,
            drops: 0,
            saves: 0,
        }
    }

    fn sample_rows() -> Vec<ManualScore> {
        let mut batting = row(Some(7), ENTRY_BATTING);
        batting.runs = 64;
        batting.balls_faced = 50;
        batting.fours = 6;
        batting.sixes = 2;
        batting.is_out = true;

        let mut bowling = row(Some(7), ENTRY_BOWLING);
        bowling.balls_bowled = 24;
        bowling.runs_conceded = 31;
        bowling.wickets = 2;

        let mut fielding = row(Some(8), ENTRY_FIELDING);
        fielding.catches = 2;
        fielding.drops = 1;

        let mut opponent = row(None, ENTRY_OPPONENT);
        opponent.runs = 151;

        vec![batting, bowling, fielding, opponent]
    }

    #[test]
    fn test_collect_contributions() {
        let contributions = collect_contributions(&sample_rows());
        assert_eq!(contributions.len(), 2);

        let first = &contributions[0];
        assert_eq!(first.player_id, 7);
        assert!(first.batted);
        assert_eq!(first.runs, 64);
        assert_eq!(first.outs, 1);
        assert_eq!(first.balls_bowled, 24);
        assert_eq!(first.wickets, 2);

        let second = &contributions[1];
        assert_eq!(second.player_id, 8);
        assert!(!second.batted);
        assert_eq!(second.catches, 2);
    }

    #[test]
    fn test_absorb_milestones_and_best_bowling() {
        let contributions = collect_contributions(&sample_rows());
        let mut stats = PlayerStats::empty(7);
        stats.absorb(&contributions[0]);

        assert_eq!(stats.matches, 1);
        assert_eq!(stats.innings, 1);
        assert_eq!(stats.highest_score, 64);
        assert_eq!(stats.fifties, 1);
        assert_eq!(stats.hundreds, 0);
        assert_eq!((stats.best_wickets, stats.best_runs), (2, 31));

        // Same wickets for fewer runs is a better spell.
        let next = MatchContribution {
            player_id: 7,
            batted: true,
            runs: 112,
            balls_faced: 80,
            balls_bowled: 18,
            runs_conceded: 20,
            wickets: 2,
            ..Default::default()
        };
        stats.absorb(&next);
        assert_eq!(stats.matches, 2);
        assert_eq!(stats.hundreds, 1);
        assert_eq!(stats.highest_score, 112);
        assert_eq!(stats.runs, 176);
        assert_eq!((stats.best_wickets, stats.best_runs), (2, 20));

        // A worse spell leaves the best figures alone.
        let worse = MatchContribution {
            player_id: 7,
            balls_bowled: 24,
            runs_conceded: 45,
            wickets: 1,
            ..Default::default()
        };
        stats.absorb(&worse);
        assert_eq!(stats.innings, 2);
        assert_eq!((stats.best_wickets, stats.best_runs), (2, 20));
    }

    #[test]
    fn test_first_spell_without_wickets_is_best() {
        let mut stats = PlayerStats::empty(3);
        stats.absorb(&MatchContribution {
            player_id: 3,
            balls_bowled: 12,
            runs_conceded: 18,
            ..Default::default()
        });
        assert_eq!((stats.best_wickets, stats.best_runs), (0, 18));
    }

    #[test]
    fn test_career_stats_derived() {
        let mut stats = PlayerStats::empty(7);
        stats.runs = 150;
        stats.outs = 3;
        stats.balls_faced = 120;
        stats.balls_bowled = 60;
        stats.runs_conceded = 70;
        stats.wickets = 4;
        stats.best_wickets = 3;
        stats.best_runs = 22;

        let career = CareerStats::from(stats);
        assert_eq!(career.batting_average, Some(50.0));
        assert_eq!(career.strike_rate, Some(125.0));
        assert_eq!(career.overs_bowled, "10.0");
        assert_eq!(career.economy, Some(7.0));
        assert_eq!(career.bowling_average, Some(17.5));
        assert_eq!(career.best_bowling.as_deref(), Some("3/22"));

        let career = CareerStats::from(PlayerStats::empty(9));
        assert_eq!(career.batting_average, None);
        assert_eq!(career.economy, None);
        assert_eq!(career.best_bowling, None);
    }

    #[test]
    fn test_large_totals_do_not_overflow() {
        let mut stats = PlayerStats::empty(7);
        stats.runs = 30_000_000;
        stats.balls_faced = 10;
        stats.runs_conceded = 900_000_000;
        stats.balls_bowled = 6;

        let career = CareerStats::from(stats.clone());
        assert_eq!(career.strike_rate, Some(300_000_000.0));
        assert_eq!(career.economy, Some(900_000_000.0));

        stats.runs = i32::MAX - 5;
        stats.absorb(&MatchContribution {
            player_id: 7,
            batted: true,
            runs: 64,
            ..Default::default()
        });
        assert_eq!(stats.runs, i32::MAX);
    }
}
