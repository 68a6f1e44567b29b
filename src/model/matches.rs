//! The match model: creation with toss resolution, listing, squads, opponents and the innings lifecycle.

use super::core::{paginate, Actor, RecordResponse, STATUS_APPROVED};
use super::util::ServiceError;
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use log::{debug, info};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

pub const MATCH_ONGOING: &str = "ongoing";
pub const MATCH_PENDING_APPROVAL: &str = "pending_approval";
pub const MATCH_COMPLETED: &str = "completed";

pub const MIN_SQUAD_SIZE: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum TossDecision {
    Bat,
    Bowl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum BattingSide {
    Team,
    Opponent,
}

impl BattingSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattingSide::Team => "team",
            BattingSide::Opponent => "opponent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum ScoringMode {
    Live,
    Manual,
}

impl ScoringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringMode::Live => "live",
            ScoringMode::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum ScorerType {
    Coach,
    Player,
}

/// The side that bats first follows from who won the toss and what they chose.
pub fn resolve_batting_side(
    team_name: &str,
    toss_winner: &str,
    decision: TossDecision,
) -> BattingSide {
    let we_won = toss_winner == team_name;
    match (we_won, decision) {
        (true, TossDecision::Bat) | (false, TossDecision::Bowl) => BattingSide::Team,
        (true, TossDecision::Bowl) | (false, TossDecision::Bat) => BattingSide::Opponent,
    }
}

/// Innings 1 when nothing has started yet, otherwise move on to the second innings at most.
pub fn next_innings(current: i32) -> i32 {
    if current != 1 && current != 2 {
        1
    } else {
        (current + 1).min(2)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct Match {
    pub id: i64,
    pub title: String,
    pub match_date: NaiveDate,
    pub format: String,
    pub venue: String,
    pub scoring_mode: String,
    pub team_name: String,
    pub opponent_name: String,
    pub toss_winner: String,
    pub toss_decision: String,
    pub batting_side: String,
    #[oai(skip_serializing_if_is_none)]
    pub scorer_coach_id: Option<i64>,
    #[oai(skip_serializing_if_is_none)]
    pub scorer_player_id: Option<i64>,
    pub status: String,
    pub current_innings: i32,
    #[oai(skip_serializing_if_is_none)]
    pub started_at: Option<DateTime<Utc>>,
    #[oai(skip_serializing_if_is_none)]
    pub completed_at: Option<DateTime<Utc>>,
    #[oai(skip_serializing_if_is_none)]
    pub team_runs: Option<i32>,
    #[oai(skip_serializing_if_is_none)]
    pub team_wkts: Option<i32>,
    #[oai(skip_serializing_if_is_none)]
    pub team_overs: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub opp_runs: Option<i32>,
    #[oai(skip_serializing_if_is_none)]
    pub opp_wkts: Option<i32>,
    #[oai(skip_serializing_if_is_none)]
    pub opp_overs: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to store a new match, already checked by the api layer.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub title: String,
    pub match_date: NaiveDate,
    pub format: String,
    pub venue: String,
    pub scoring_mode: ScoringMode,
    pub team_name: String,
    pub opponent_name: String,
    pub toss_winner: String,
    pub toss_decision: TossDecision,
    pub scorer_coach_id: Option<i64>,
    pub scorer_player_id: Option<i64>,
}

impl NewMatch {
    pub fn check_toss(&self) -> Result<(), ServiceError> {
        if self.toss_winner != self.team_name && self.toss_winner != self.opponent_name {
            return Err(ServiceError::invalid(&format!(
                "The toss winner should be {} or {}.",
                self.team_name, self.opponent_name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct OpponentTempPlayer {
    pub id: i64,
    pub match_id: i64,
    pub name: String,
    pub role: String,
}

impl Match {
    pub fn is_completed(&self) -> bool {
        self.status == MATCH_COMPLETED
    }

    pub fn is_manual(&self) -> bool {
        self.scoring_mode == ScoringMode::Manual.as_str()
    }

    /// Only the assigned scorer, a coach or a player, may enter scores.
    pub fn can_score(&self, actor: &Actor) -> bool {
        match actor {
            Actor::Coach(coach_id) => self.scorer_coach_id == Some(*coach_id),
            Actor::Player(player_id) => self.scorer_player_id == Some(*player_id),
        }
    }

    /// Live balls are stored against the running innings, the first innings before any start.
    pub fn scoring_innings(&self) -> i32 {
        if self.current_innings < 1 {
            1
        } else {
            self.current_innings
        }
    }

    pub async fn insert(pool: &sqlx::PgPool, new_match: &NewMatch) -> Result<Match, ServiceError> {
        new_match.check_toss()?;
        let batting_side = resolve_batting_side(
            &new_match.team_name,
            &new_match.toss_winner,
            new_match.toss_decision,
        );
        let toss_decision = match new_match.toss_decision {
            TossDecision::Bat => "bat",
            TossDecision::Bowl => "bowl",
        };

        let sql_str = "INSERT INTO cricpro_match (title, match_date, format, venue, scoring_mode, team_name, opponent_name, toss_winner, toss_decision, batting_side, scorer_coach_id, scorer_player_id, status)
                       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *";
        let record = sqlx::query_as::<_, Match>(sql_str)
            .bind(&new_match.title)
            .bind(new_match.match_date)
            .bind(&new_match.format)
            .bind(&new_match.venue)
            .bind(new_match.scoring_mode.as_str())
            .bind(&new_match.team_name)
            .bind(&new_match.opponent_name)
            .bind(&new_match.toss_winner)
            .bind(toss_decision)
            .bind(batting_side.as_str())
            .bind(new_match.scorer_coach_id)
            .bind(new_match.scorer_player_id)
            .bind(MATCH_ONGOING)
            .fetch_one(pool)
            .await?;

        info!("Match {} ({}) created.", record.id, record.title);
        Ok(record)
    }

    pub async fn get_by_id(pool: &sqlx::PgPool, id: i64) -> Result<Match, ServiceError> {
        sqlx::query_as::<_, Match>("SELECT * FROM cricpro_match WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Match", id))
    }

    pub async fn get_records(
        pool: &sqlx::PgPool,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> Result<RecordResponse<Match>, ServiceError> {
        let (page, page_size, limit, offset) = paginate(page, page_size);
        let records = sqlx::query_as::<_, Match>(
            "SELECT * FROM cricpro_match ORDER BY match_date ASC, id ASC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cricpro_match")
            .fetch_one(pool)
            .await?;

        Ok(RecordResponse {
            records,
            total: total.0 as u64,
            page,
            page_size,
        })
    }

    pub async fn get_all(pool: &sqlx::PgPool) -> Result<Vec<Match>, ServiceError> {
        let records = sqlx::query_as::<_, Match>(
            "SELECT * FROM cricpro_match ORDER BY match_date ASC, id ASC",
        )
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn get_records_on(
        pool: &sqlx::PgPool,
        date: NaiveDate,
    ) -> Result<Vec<Match>, ServiceError> {
        let records = sqlx::query_as::<_, Match>(
            "SELECT * FROM cricpro_match WHERE match_date = $1 ORDER BY id ASC",
        )
        .bind(date)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn get_pending_for_coach(
        pool: &sqlx::PgPool,
        coach_id: i64,
    ) -> Result<Vec<Match>, ServiceError> {
        let records = sqlx::query_as::<_, Match>(
            "SELECT * FROM cricpro_match WHERE status = $1 AND scorer_coach_id = $2 ORDER BY match_date ASC",
        )
        .bind(MATCH_PENDING_APPROVAL)
        .bind(coach_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn update_result(
        pool: &sqlx::PgPool,
        id: i64,
        result: &str,
    ) -> Result<Match, ServiceError> {
        sqlx::query_as::<_, Match>("UPDATE cricpro_match SET result = $1 WHERE id = $2 RETURNING *")
            .bind(result)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Match", id))
    }

    pub async fn start_innings(
        pool: &sqlx::PgPool,
        id: i64,
        batting_side: Option<BattingSide>,
    ) -> Result<Match, ServiceError> {
        let current = Self::get_by_id(pool, id).await?;
        if current.is_completed() {
            return Err(ServiceError::invalid("The match is already completed."));
        }

        let innings = next_innings(current.current_innings);
        let batting_side = batting_side
            .map(|side| side.as_str().to_string())
            .unwrap_or(current.batting_side);

        let record = sqlx::query_as::<_, Match>(
            "UPDATE cricpro_match SET current_innings = $1, batting_side = $2, started_at = now() WHERE id = $3 RETURNING *",
        )
        .bind(innings)
        .bind(batting_side)
        .bind(id)
        .fetch_one(pool)
        .await?;

        info!("Innings {} of match {} started.", record.current_innings, id);
        Ok(record)
    }

    pub async fn end_innings(pool: &sqlx::PgPool, id: i64) -> Result<Match, ServiceError> {
        let record = sqlx::query_as::<_, Match>(
            "UPDATE cricpro_match SET completed_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Match", id))?;

        info!("Innings {} of match {} ended.", record.current_innings, id);
        Ok(record)
    }

    pub async fn get_squad_ids(pool: &sqlx::PgPool, id: i64) -> Result<Vec<i64>, ServiceError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT player_id FROM cricpro_match_assignment WHERE match_id = $1 ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn get_opponents(
        pool: &sqlx::PgPool,
        id: i64,
    ) -> Result<Vec<OpponentTempPlayer>, ServiceError> {
        let records = sqlx::query_as::<_, OpponentTempPlayer>(
            "SELECT * FROM cricpro_opponent_temp_player WHERE match_id = $1 ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    /// Replace the squad and the opponent list of a match in one transaction.
    pub async fn replace_squad(
        pool: &sqlx::PgPool,
        id: i64,
        selection: &SquadSelection,
    ) -> Result<(), ServiceError> {
        let player_ids = selection.unique_player_ids()?;

        let approved: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM cricpro_player p JOIN cricpro_user u ON u.id = p.user_id WHERE p.id = ANY($1) AND u.status = $2",
        )
        .bind(player_ids.clone())
        .bind(STATUS_APPROVED)
        .fetch_one(pool)
        .await?;

        if approved.0 as usize != player_ids.len() {
            return Err(ServiceError::invalid(
                "Only approved players can be selected for a match.",
            ));
        }

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM cricpro_match_assignment WHERE match_id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;
        sqlx::query("DELETE FROM cricpro_opponent_temp_player WHERE match_id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;

        for player_id in &player_ids {
            sqlx::query(
                "INSERT INTO cricpro_match_assignment (match_id, player_id) VALUES ($1, $2)",
            )
            .bind(id)
            .bind(player_id)
            .execute(&mut tx)
            .await?;
        }

        for opponent in selection.named_opponents() {
            sqlx::query(
                "INSERT INTO cricpro_opponent_temp_player (match_id, name, role) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(opponent.name.trim())
            .bind(opponent.role.clone().unwrap_or_default())
            .execute(&mut tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            "Squad of match {} replaced with {} players.",
            id,
            player_ids.len()
        );

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct OpponentEntry {
    #[serde(default)]
    #[oai(default)]
    pub name: String,
    #[oai(skip_serializing_if_is_none)]
    pub role: Option<String>,
}

/// The squad selection sent by the squad page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct SquadSelection {
    #[serde(default)]
    #[oai(default)]
    pub selected_players: Vec<i64>,
    #[serde(default)]
    #[oai(default)]
    pub opponents: Vec<OpponentEntry>,
}

impl SquadSelection {
    /// Selected ids without duplicates, in the order they were picked.
    pub fn unique_player_ids(&self) -> Result<Vec<i64>, ServiceError> {
        let ids: Vec<i64> = self.selected_players.iter().copied().unique().collect();
        if ids.len() < MIN_SQUAD_SIZE {
            return Err(ServiceError::invalid("Select at least 11 players"));
        }
        Ok(ids)
    }

    pub fn named_opponents(&self) -> impl Iterator<Item = &OpponentEntry> {
        self.opponents.iter().filter(|o| !o.name.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_match() -> Match {
        Match {
            id: 1,
            title: "Sunday League".to_string(),
            match_date: NaiveDate::from_ymd_opt(2024, 7, 7).unwrap(),
            format: "T20".to_string(),
            venue: "Oval".to_string(),
            scoring_mode: "live".to_string(),
            team_name: "Falcons".to_string(),
            opponent_name: "Hawks".to_string(),
            toss_winner: "Falcons".to_string(),
            toss_decision: "bat".to_string(),
            batting_side: "team".to_string(),
            scorer_coach_id: Some(3),
            scorer_player_id: None,
            status: MATCH_ONGOING.to_string(),
            current_innings: 0,
            started_at: None,
            completed_at: None,
            team_runs: None,
            team_wkts: None,
            team_overs: None,
            opp_runs: None,
            opp_wkts: None,
            opp_overs: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolve_batting_side() {
        assert_eq!(
            resolve_batting_side("Falcons", "Falcons", TossDecision::Bat),
            BattingSide::Team
        );
        assert_eq!(
            resolve_batting_side("Falcons", "Falcons", TossDecision::Bowl),
            BattingSide::Opponent
        );
        assert_eq!(
            resolve_batting_side("Falcons", "Hawks", TossDecision::Bat),
            BattingSide::Opponent
        );
        assert_eq!(
            resolve_batting_side("Falcons", "Hawks", TossDecision::Bowl),
            BattingSide::Team
        );
    }

    #[test]
    fn test_next_innings() {
        assert_eq!(next_innings(0), 1);
        assert_eq!(next_innings(1), 2);
        assert_eq!(next_innings(2), 2);
        assert_eq!(next_innings(5), 1);
    }

    #[test]
    fn test_can_score() {
        let mut m = sample_match();
        assert!(m.can_score(&Actor::Coach(3)));
        assert!(!m.can_score(&Actor::Coach(4)));
        assert!(!m.can_score(&Actor::Player(3)));

        m.scorer_coach_id = None;
        m.scorer_player_id = Some(9);
        assert!(m.can_score(&Actor::Player(9)));
        assert!(!m.can_score(&Actor::Coach(3)));
    }

    #[test]
    fn test_scoring_innings() {
        let mut m = sample_match();
        assert_eq!(m.scoring_innings(), 1);
        m.current_innings = 2;
        assert_eq!(m.scoring_innings(), 2);
    }

    #[test]
    fn test_check_toss() {
        let mut new_match = NewMatch {
            title: "Friendly".to_string(),
            match_date: NaiveDate::from_ymd_opt(2024, 7, 7).unwrap(),
            format: "ODI".to_string(),
            venue: "Oval".to_string(),
            scoring_mode: ScoringMode::Manual,
            team_name: "Falcons".to_string(),
            opponent_name: "Hawks".to_string(),
            toss_winner: "Hawks".to_string(),
            toss_decision: TossDecision::Bowl,
            scorer_coach_id: None,
            scorer_player_id: None,
        };
        assert!(new_match.check_toss().is_ok());

        new_match.toss_winner = "Eagles".to_string();
        assert!(new_match.check_toss().is_err());
    }

    #[test]
    fn test_squad_selection() {
        let mut selection = SquadSelection {
            selected_players: (1..=10).collect(),
            opponents: vec![
                OpponentEntry {
                    name: "R. Sharma".to_string(),
                    role: Some("batter".to_string()),
                },
                OpponentEntry {
                    name: "  ".to_string(),
                    role: None,
                },
            ],
        };

        let err = selection.unique_player_ids().unwrap_err();
        assert_eq!(err.to_string(), "Select at least 11 players");

        // Duplicates do not count twice.
        selection.selected_players.push(10);
        assert!(selection.unique_player_ids().is_err());

        selection.selected_players.push(11);
        assert_eq!(selection.unique_player_ids().unwrap().len(), 11);
        assert_eq!(selection.named_opponents().count(), 1);
    }
}
