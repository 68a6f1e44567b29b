//! Manual and ball-by-ball scoring: overs notation, the manual score sheet, live balls and the scoreboard built from them.

use super::matches::{Match, MATCH_COMPLETED, MATCH_PENDING_APPROVAL};
use super::util::{safe_ratio, ServiceError};
use chrono::{DateTime, Utc};
use log::{debug, info};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

pub const ENTRY_BATTING: &str = "batting";
pub const ENTRY_BOWLING: &str = "bowling";
pub const ENTRY_FIELDING: &str = "fielding";
pub const ENTRY_OPPONENT: &str = "opponent";

pub const BALLS_PER_OVER: i32 = 6;
/// Upper bound for every overs value a client sends, long enough for a five day game.
pub const MAX_OVERS: f64 = 999.5;
pub const NO_WICKET: &str = "none";
pub const RUN_OUT: &str = "runout";

/// Convert overs notation such as `3.4` into legal balls (22).
pub fn balls_from_overs(overs: f64) -> Result<i32, ServiceError> {
    if !overs.is_finite() || !(0.0..=MAX_OVERS).contains(&overs) {
        return Err(ServiceError::invalid(&format!("Invalid overs: {}", overs)));
    }

    let tenths = (overs * 10.0).round();
    if (overs * 10.0 - tenths).abs() > 1e-6 {
        return Err(ServiceError::invalid(&format!(
            "Invalid overs: {}, only one digit is allowed after the point.",
            overs
        )));
    }

    let tenths = tenths as i32;
    let (whole, part) = (tenths / 10, tenths % 10);
    if part >= BALLS_PER_OVER {
        return Err(ServiceError::invalid(&format!(
            "Invalid overs: {}, an over has only {} balls.",
            overs, BALLS_PER_OVER
        )));
    }

    Ok(whole * BALLS_PER_OVER + part)
}

pub fn format_overs(balls: i32) -> String {
    let balls = balls.max(0);
    format!("{}.{}", balls / BALLS_PER_OVER, balls % BALLS_PER_OVER)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct ManualScore {
    pub id: i64,
    pub match_id: i64,
    #[oai(skip_serializing_if_is_none)]
    pub player_id: Option<i64>,
    pub entry_kind: String,
    pub runs: i32,
    pub balls_faced: i32,
    pub fours: i32,
    pub sixes: i32,
    pub is_out: bool,
    #[oai(skip_serializing_if_is_none)]
    pub wicket_over: Option<i32>,
    #[oai(skip_serializing_if_is_none)]
    pub wicket_ball: Option<i32>,
    #[oai(skip_serializing_if_is_none)]
    pub dismissal_type: Option<String>,
    pub balls_bowled: i32,
    pub runs_conceded: i32,
    pub wickets: i32,
    pub catches: i32,
    pub drops: i32,
    pub saves: i32,
}

impl ManualScore {
    pub fn is_opponent(&self) -> bool {
        self.entry_kind == ENTRY_OPPONENT
    }

    pub async fn get_records(
        pool: &sqlx::PgPool,
        match_id: i64,
    ) -> Result<Vec<ManualScore>, ServiceError> {
        let records = sqlx::query_as::<_, ManualScore>(
            "SELECT * FROM cricpro_manual_score WHERE match_id = $1 ORDER BY id ASC",
        )
        .bind(match_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct BattingEntry {
    pub player_id: i64,
    #[validate(range(min = 0, max = 999))]
    #[serde(default)]
    #[oai(default)]
    pub runs: i32,
    #[validate(range(min = 0, max = 999))]
    #[serde(default)]
    #[oai(default)]
    pub balls: i32,
    #[validate(range(min = 0, max = 250))]
    #[serde(default)]
    #[oai(default)]
    pub fours: i32,
    #[validate(range(min = 0, max = 250))]
    #[serde(default)]
    #[oai(default)]
    pub sixes: i32,
    #[serde(default)]
    #[oai(default)]
    pub is_out: bool,
    #[validate(range(min = 0, max = 999))]
    #[oai(skip_serializing_if_is_none)]
    pub wicket_over: Option<i32>,
    #[validate(range(min = 1, max = 6))]
    #[oai(skip_serializing_if_is_none)]
    pub wicket_ball: Option<i32>,
    #[oai(skip_serializing_if_is_none)]
    pub dismissal_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct BowlingEntry {
    pub player_id: i64,
    /// Overs notation, e.g. 3.4
    #[serde(default)]
    #[oai(default)]
    pub overs: f64,
    #[validate(range(min = 0, max = 999))]
    #[serde(default)]
    #[oai(default)]
    pub runs_conceded: i32,
    #[validate(range(min = 0, max = 10))]
    #[serde(default)]
    #[oai(default)]
    pub wickets: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct FieldingEntry {
    pub player_id: i64,
    #[validate(range(min = 0, max = 99))]
    #[serde(default)]
    #[oai(default)]
    pub catches: i32,
    #[validate(range(min = 0, max = 99))]
    #[serde(default)]
    #[oai(default)]
    pub drops: i32,
    #[validate(range(min = 0, max = 999))]
    #[serde(default)]
    #[oai(default)]
    pub saves: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct WagonEntry {
    #[oai(skip_serializing_if_is_none)]
    pub player_id: Option<i64>,
    #[validate(range(min = 0.0, max = 360.0))]
    #[oai(skip_serializing_if_is_none)]
    pub angle: Option<f64>,
    #[validate(range(min = 0.0, max = 1000.0))]
    #[serde(default)]
    #[oai(default)]
    pub distance: f64,
    #[validate(range(min = 0, max = 7))]
    #[serde(default)]
    #[oai(default)]
    pub runs: i32,
    #[oai(skip_serializing_if_is_none)]
    pub shot_type: Option<String>,
    #[serde(default)]
    #[oai(default)]
    pub is_opponent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct OpponentSummary {
    #[validate(range(min = 0, max = 9999))]
    #[serde(default)]
    #[oai(default)]
    pub runs: i32,
    #[validate(range(min = 0, max = 10))]
    #[serde(default)]
    #[oai(default)]
    pub wickets: i32,
    #[serde(default)]
    #[oai(default)]
    pub overs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct TeamSummary {
    #[validate(range(min = 0, max = 9999))]
    #[serde(default)]
    #[oai(default)]
    pub runs: i32,
    #[validate(range(min = 0, max = 10))]
    #[serde(default)]
    #[oai(default)]
    pub wkts: i32,
    #[serde(default)]
    #[oai(default)]
    pub overs: f64,
    #[oai(skip_serializing_if_is_none)]
    pub result: Option<String>,
}

/// Everything the manual score sheet submits in one go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct ManualSavePayload {
    #[validate]
    #[serde(default)]
    #[oai(default)]
    pub batting: Vec<BattingEntry>,
    #[validate]
    #[serde(default)]
    #[oai(default)]
    pub bowling: Vec<BowlingEntry>,
    #[validate]
    #[serde(default)]
    #[oai(default)]
    pub fielding: Vec<FieldingEntry>,
    #[validate]
    #[serde(default)]
    #[oai(default)]
    pub wagon: Vec<WagonEntry>,
    #[validate]
    #[oai(skip_serializing_if_is_none)]
    pub opponent_simple: Option<OpponentSummary>,
    #[validate]
    #[oai(skip_serializing_if_is_none)]
    pub team_summary: Option<TeamSummary>,
}

/// The status of a match as read under its row lock; a completed match takes no more scores.
pub fn ensure_scoreable(match_id: i64, status: Option<&str>) -> Result<(), ServiceError> {
    match status {
        None => Err(ServiceError::not_found("Match", match_id)),
        Some(MATCH_COMPLETED) => Err(ServiceError::invalid(
            "The match is already completed and cannot be scored again.",
        )),
        Some(_) => Ok(()),
    }
}

impl ManualSavePayload {
    /// Replace the manual rows, the wagon wheel and the summaries of a match, then leave it for the coach to approve.
    pub async fn save(&self, pool: &sqlx::PgPool, scored: &Match) -> Result<(), ServiceError> {
        if scored.is_completed() {
            return ensure_scoreable(scored.id, Some(MATCH_COMPLETED));
        }
        self.validate()?;

        // Convert every overs value before touching the database.
        let bowling_balls = self
            .bowling
            .iter()
            .map(|b| balls_from_overs(b.overs))
            .collect::<Result<Vec<i32>, ServiceError>>()?;
        let opponent_balls = match &self.opponent_simple {
            Some(o) => Some(balls_from_overs(o.overs)?),
            None => None,
        };
        let team_balls = match &self.team_summary {
            Some(t) => Some(balls_from_overs(t.overs)?),
            None => None,
        };

        let match_id = scored.id;
        let mut tx = pool.begin().await?;

        // An approval may have landed since the match was read.
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM cricpro_match WHERE id = $1 FOR UPDATE")
                .bind(match_id)
                .fetch_optional(&mut tx)
                .await?;
        ensure_scoreable(match_id, status.as_ref().map(|(s,)| s.as_str()))?;

        sqlx::query("DELETE FROM cricpro_manual_score WHERE match_id = $1")
            .bind(match_id)
            .execute(&mut tx)
            .await?;
        sqlx::query("DELETE FROM cricpro_wagon_wheel WHERE match_id = $1")
            .bind(match_id)
            .execute(&mut tx)
            .await?;

        for b in &self.batting {
            sqlx::query(
                "INSERT INTO cricpro_manual_score (match_id, player_id, entry_kind, runs, balls_faced, fours, sixes, is_out, wicket_over, wicket_ball, dismissal_type)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(match_id)
            .bind(b.player_id)
            .bind(ENTRY_BATTING)
            .bind(b.runs)
            .bind(b.balls)
            .bind(b.fours)
            .bind(b.sixes)
            .bind(b.is_out)
            .bind(b.wicket_over)
            .bind(b.wicket_ball)
            .bind(&b.dismissal_type)
            .execute(&mut tx)
            .await?;
        }

        for (b, balls) in self.bowling.iter().zip(bowling_balls) {
            sqlx::query(
                "INSERT INTO cricpro_manual_score (match_id, player_id, entry_kind, balls_bowled, runs_conceded, wickets)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(match_id)
            .bind(b.player_id)
            .bind(ENTRY_BOWLING)
            .bind(balls)
            .bind(b.runs_conceded)
            .bind(b.wickets)
            .execute(&mut tx)
            .await?;
        }

        for f in &self.fielding {
            sqlx::query(
                "INSERT INTO cricpro_manual_score (match_id, player_id, entry_kind, catches, drops, saves)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(match_id)
            .bind(f.player_id)
            .bind(ENTRY_FIELDING)
            .bind(f.catches)
            .bind(f.drops)
            .bind(f.saves)
            .execute(&mut tx)
            .await?;
        }

        for w in &self.wagon {
            sqlx::query(
                "INSERT INTO cricpro_wagon_wheel (match_id, player_id, angle, distance, runs, shot_type, is_opponent)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(match_id)
            .bind(w.player_id)
            .bind(w.angle)
            .bind(w.distance)
            .bind(w.runs)
            .bind(&w.shot_type)
            .bind(w.is_opponent)
            .execute(&mut tx)
            .await?;
        }

        if let (Some(o), Some(balls)) = (&self.opponent_simple, opponent_balls) {
            sqlx::query(
                "INSERT INTO cricpro_manual_score (match_id, player_id, entry_kind, runs, wickets, balls_bowled)
                 VALUES ($1, NULL, $2, $3, $4, $5)",
            )
            .bind(match_id)
            .bind(ENTRY_OPPONENT)
            .bind(o.runs)
            .bind(o.wickets)
            .bind(balls)
            .execute(&mut tx)
            .await?;

            sqlx::query(
                "UPDATE cricpro_match SET opp_runs = $1, opp_wkts = $2, opp_overs = $3 WHERE id = $4",
            )
            .bind(o.runs)
            .bind(o.wickets)
            .bind(format_overs(balls))
            .bind(match_id)
            .execute(&mut tx)
            .await?;
        }

        if let (Some(t), Some(balls)) = (&self.team_summary, team_balls) {
            sqlx::query(
                "UPDATE cricpro_match SET team_runs = $1, team_wkts = $2, team_overs = $3, result = COALESCE($4, result) WHERE id = $5",
            )
            .bind(t.runs)
            .bind(t.wkts)
            .bind(format_overs(balls))
            .bind(&t.result)
            .bind(match_id)
            .execute(&mut tx)
            .await?;
        }

        sqlx::query("UPDATE cricpro_match SET status = $1 WHERE id = $2")
            .bind(MATCH_PENDING_APPROVAL)
            .bind(match_id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;
        info!(
            "Manual scores of match {} saved: {} batting, {} bowling, {} fielding rows.",
            match_id,
            self.batting.len(),
            self.bowling.len(),
            self.fielding.len()
        );

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum Extras {
    None,
    Wide,
    NoBall,
    Bye,
    LegBye,
}

impl Default for Extras {
    fn default() -> Self {
        Extras::None
    }
}

impl Extras {
    pub fn as_str(&self) -> &'static str {
        match self {
            Extras::None => "none",
            Extras::Wide => "wide",
            Extras::NoBall => "noball",
            Extras::Bye => "bye",
            Extras::LegBye => "legbye",
        }
    }

    /// Wides and no-balls are bowled again and carry a one run penalty.
    pub fn is_legal(&self) -> bool {
        !matches!(self, Extras::Wide | Extras::NoBall)
    }
}

impl FromStr for Extras {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(Extras::None),
            "wide" => Ok(Extras::Wide),
            "noball" => Ok(Extras::NoBall),
            "bye" => Ok(Extras::Bye),
            "legbye" => Ok(Extras::LegBye),
            _ => Err(ServiceError::invalid(&format!("Unknown extras: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct LiveBall {
    pub id: i64,
    pub match_id: i64,
    pub innings: i32,
    pub over_no: i32,
    pub ball_no: i32,
    #[oai(skip_serializing_if_is_none)]
    pub striker: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub non_striker: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub bowler: Option<String>,
    pub runs: i32,
    pub extras: String,
    pub wicket: String,
    pub commentary: String,
    #[oai(skip_serializing_if_is_none)]
    pub angle: Option<f64>,
    #[oai(skip_serializing_if_is_none)]
    pub shot_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct LiveBallPayload {
    #[validate(range(min = 1, max = 999))]
    pub over_no: i32,
    #[validate(range(min = 1, max = 6))]
    pub ball_no: i32,
    #[oai(skip_serializing_if_is_none)]
    pub striker: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub non_striker: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub bowler: Option<String>,
    #[validate(range(min = 0, max = 7))]
    #[serde(default)]
    #[oai(default)]
    pub runs: i32,
    #[serde(default)]
    #[oai(default)]
    pub extras: Extras,
    #[validate(length(min = 1, max = 32))]
    #[serde(default = "default_wicket")]
    #[oai(default = "default_wicket")]
    pub wicket: String,
    #[serde(default)]
    #[oai(default)]
    pub commentary: String,
    #[validate(range(min = 0.0, max = 360.0))]
    #[oai(skip_serializing_if_is_none)]
    pub angle: Option<f64>,
    #[oai(skip_serializing_if_is_none)]
    pub shot_type: Option<String>,
}

fn default_wicket() -> String {
    NO_WICKET.to_string()
}

impl LiveBall {
    pub fn extras_kind(&self) -> Extras {
        Extras::from_str(&self.extras).unwrap_or_default()
    }

    pub fn is_wicket(&self) -> bool {
        !self.wicket.is_empty() && self.wicket != NO_WICKET
    }

    pub async fn insert(
        pool: &sqlx::PgPool,
        match_id: i64,
        innings: i32,
        payload: &LiveBallPayload,
    ) -> Result<LiveBall, ServiceError> {
        payload.validate()?;

        let sql_str = "INSERT INTO cricpro_live_ball (match_id, innings, over_no, ball_no, striker, non_striker, bowler, runs, extras, wicket, commentary, angle, shot_type)
                       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *";
        let record = sqlx::query_as::<_, LiveBall>(sql_str)
            .bind(match_id)
            .bind(innings)
            .bind(payload.over_no)
            .bind(payload.ball_no)
            .bind(&payload.striker)
            .bind(&payload.non_striker)
            .bind(&payload.bowler)
            .bind(payload.runs)
            .bind(payload.extras.as_str())
            .bind(payload.wicket.trim())
            .bind(&payload.commentary)
            .bind(payload.angle)
            .bind(&payload.shot_type)
            .fetch_one(pool)
            .await?;

        debug!(
            "Ball {}.{} of innings {} recorded for match {}.",
            record.over_no, record.ball_no, innings, match_id
        );
        Ok(record)
    }

    pub async fn get_records(
        pool: &sqlx::PgPool,
        match_id: i64,
    ) -> Result<Vec<LiveBall>, ServiceError> {
        let records = sqlx::query_as::<_, LiveBall>(
            "SELECT * FROM cricpro_live_ball WHERE match_id = $1 ORDER BY id ASC",
        )
        .bind(match_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn get_last(
        pool: &sqlx::PgPool,
        match_id: i64,
        innings: i32,
    ) -> Result<Option<LiveBall>, ServiceError> {
        let record = sqlx::query_as::<_, LiveBall>(
            "SELECT * FROM cricpro_live_ball WHERE match_id = $1 AND innings = $2 ORDER BY id DESC LIMIT 1",
        )
        .bind(match_id)
        .bind(innings)
        .fetch_optional(pool)
        .await?;
        Ok(record)
    }
}

/// The (over, ball) the scorer should enter next, given the last ball of the innings.
pub fn next_ball(last: Option<&LiveBall>) -> (i32, i32) {
    match last {
        None => (1, 1),
        Some(ball) if !ball.extras_kind().is_legal() => (ball.over_no, ball.ball_no),
        Some(ball) if ball.ball_no >= BALLS_PER_OVER => (ball.over_no + 1, 1),
        Some(ball) => (ball.over_no, ball.ball_no + 1),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct BatterLine {
    pub name: String,
    pub runs: i32,
    pub balls: i32,
    pub fours: i32,
    pub sixes: i32,
    #[oai(skip_serializing_if_is_none)]
    pub strike_rate: Option<f64>,
    #[oai(skip_serializing_if_is_none)]
    pub dismissal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct BowlerLine {
    pub name: String,
    pub legal_balls: i32,
    pub overs: String,
    pub runs_conceded: i32,
    pub wickets: i32,
    #[oai(skip_serializing_if_is_none)]
    pub economy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct InningsScore {
    pub innings: i32,
    pub runs: i32,
    pub wickets: i32,
    pub legal_balls: i32,
    pub overs: String,
    #[oai(skip_serializing_if_is_none)]
    pub run_rate: Option<f64>,
    pub extras: i32,
    pub batters: Vec<BatterLine>,
    pub bowlers: Vec<BowlerLine>,
}

impl InningsScore {
    fn new(innings: i32) -> Self {
        InningsScore {
            innings,
            runs: 0,
            wickets: 0,
            legal_balls: 0,
            overs: format_overs(0),
            run_rate: None,
            extras: 0,
            batters: vec![],
            bowlers: vec![],
        }
    }

    fn batter(&mut self, name: &str) -> &mut BatterLine {
        let idx = match self.batters.iter().position(|b| b.name == name) {
            Some(idx) => idx,
            None => {
                self.batters.push(BatterLine {
                    name: name.to_string(),
                    runs: 0,
                    balls: 0,
                    fours: 0,
                    sixes: 0,
                    strike_rate: None,
                    dismissal: None,
                });
                self.batters.len() - 1
            }
        };
        &mut self.batters[idx]
    }

    fn bowler(&mut self, name: &str) -> &mut BowlerLine {
        let idx = match self.bowlers.iter().position(|b| b.name == name) {
            Some(idx) => idx,
            None => {
                self.bowlers.push(BowlerLine {
                    name: name.to_string(),
                    legal_balls: 0,
                    overs: format_overs(0),
                    runs_conceded: 0,
                    wickets: 0,
                    economy: None,
                });
                self.bowlers.len() - 1
            }
        };
        &mut self.bowlers[idx]
    }

    fn add_ball(&mut self, ball: &LiveBall) {
        let extras = ball.extras_kind();
        let runs = ball.runs.max(0);

        let (team_runs, extra_runs, batter_runs, conceded) = match extras {
            Extras::None => (runs, 0, runs, runs),
            Extras::Wide => (runs + 1, runs + 1, 0, runs + 1),
            Extras::NoBall => (runs + 1, 1, runs, runs + 1),
            Extras::Bye | Extras::LegBye => (runs, runs, 0, 0),
        };

        self.runs += team_runs;
        self.extras += extra_runs;
        if extras.is_legal() {
            self.legal_balls += 1;
        }

        if let Some(name) = ball.striker.as_deref().filter(|n| !n.is_empty()) {
            let batter = self.batter(name);
            if extras != Extras::Wide {
                batter.balls += 1;
            }
            batter.runs += batter_runs;
            if batter_runs == 4 {
                batter.fours += 1;
            } else if batter_runs == 6 {
                batter.sixes += 1;
            }
            if ball.is_wicket() {
                batter.dismissal = Some(ball.wicket.clone());
            }
        }

        if ball.is_wicket() {
            self.wickets += 1;
        }

        if let Some(name) = ball.bowler.as_deref().filter(|n| !n.is_empty()) {
            let bowler = self.bowler(name);
            bowler.runs_conceded += conceded;
            if extras.is_legal() {
                bowler.legal_balls += 1;
            }
            if ball.is_wicket() && ball.wicket != RUN_OUT {
                bowler.wickets += 1;
            }
        }
    }

    fn finish(&mut self) {
        self.overs = format_overs(self.legal_balls);
        self.run_rate = safe_ratio(
            self.runs as f64 * BALLS_PER_OVER as f64,
            self.legal_balls as f64,
        );
        for b in self.batters.iter_mut() {
            b.strike_rate = safe_ratio(b.runs as f64 * 100.0, b.balls as f64);
        }
        for b in self.bowlers.iter_mut() {
            b.overs = format_overs(b.legal_balls);
            b.economy = safe_ratio(
                b.runs_conceded as f64 * BALLS_PER_OVER as f64,
                b.legal_balls as f64,
            );
        }
    }
}

/// One scoreboard per innings, in innings order, from the balls in the order they were bowled.
pub fn build_scoreboard(balls: &[LiveBall]) -> Vec<InningsScore> {
    let mut innings: Vec<InningsScore> = vec![];
    for ball in balls {
        let idx = match innings.iter().position(|i| i.innings == ball.innings) {
            Some(idx) => idx,
            None => {
                innings.push(InningsScore::new(ball.innings));
                innings.len() - 1
            }
        };
        innings[idx].add_ball(ball);
    }

    innings.sort_by_key(|i| i.innings);
    innings.iter_mut().for_each(|i| i.finish());
    innings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball(
        innings: i32,
        over_no: i32,
        ball_no: i32,
        runs: i32,
        extras: &str,
        wicket: &str,
    ) -> LiveBall {
        LiveBall {
            id: 0,
            match_id: 1,
            innings,
            over_no,
            ball_no,
            striker: Some("Rohan".to_string()),
            non_striker: Some("Ishaan".to_string()),
            bowler: Some("Kabir".to_string()),
            runs,
            extras: extras.to_string(),
            wicket: wicket.to_string(),
            commentary: String::new(),
            angle: None,
            shot_type: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_overs_notation() {
        assert_eq!(balls_from_overs(3.4).unwrap(), 22);
        assert_eq!(balls_from_overs(0.0).unwrap(), 0);
        assert_eq!(balls_from_overs(20.0).unwrap(), 120);
        assert!(balls_from_overs(3.6).is_err());
        assert!(balls_from_overs(-1.0).is_err());
        assert!(balls_from_overs(2.55).is_err());

        assert_eq!(format_overs(22), "3.4");
        assert_eq!(format_overs(120), "20.0");
        assert_eq!(format_overs(0), "0.0");
    }

    #[test]
    fn test_next_ball() {
        assert_eq!(next_ball(None), (1, 1));
        assert_eq!(next_ball(Some(&ball(1, 1, 3, 1, "none", "none"))), (1, 4));
        assert_eq!(next_ball(Some(&ball(1, 2, 6, 0, "none", "none"))), (3, 1));
        assert_eq!(next_ball(Some(&ball(1, 2, 4, 0, "wide", "none"))), (2, 4));
        assert_eq!(next_ball(Some(&ball(1, 2, 6, 0, "noball", "none"))), (2, 6));
        assert_eq!(next_ball(Some(&ball(1, 4, 6, 1, "legbye", "none"))), (5, 1));
    }

    #[test]
    fn test_extras_parsing() {
        assert_eq!(Extras::from_str("noball").unwrap(), Extras::NoBall);
        assert_eq!(Extras::from_str("").unwrap(), Extras::None);
        assert!(Extras::from_str("penalty").is_err());
        assert!(Extras::Bye.is_legal());
        assert!(!Extras::Wide.is_legal());
    }

    #[test]
    fn test_build_scoreboard() {
        let balls = vec![
            ball(1, 1, 1, 4, "none", "none"),
            ball(1, 1, 2, 0, "wide", "none"),
            ball(1, 1, 2, 2, "noball", "none"),
            ball(1, 1, 2, 1, "legbye", "none"),
            ball(1, 1, 3, 6, "none", "none"),
            ball(1, 1, 4, 0, "none", "bowled"),
        ];

        let board = build_scoreboard(&balls);
        assert_eq!(board.len(), 1);

        let first = &board[0];
        // 4 + (1) + (2 + 1) + 1 + 6
        assert_eq!(first.runs, 15);
        assert_eq!(first.extras, 3);
        assert_eq!(first.wickets, 1);
        assert_eq!(first.legal_balls, 4);
        assert_eq!(first.overs, "0.4");
        assert_eq!(first.run_rate, Some(22.5));

        let batter = &first.batters[0];
        assert_eq!(batter.runs, 12);
        assert_eq!(batter.balls, 5);
        assert_eq!(batter.fours, 1);
        assert_eq!(batter.sixes, 1);
        assert_eq!(batter.dismissal.as_deref(), Some("bowled"));
        assert_eq!(batter.strike_rate, Some(240.0));

        let bowler = &first.bowlers[0];
        assert_eq!(bowler.runs_conceded, 14);
        assert_eq!(bowler.wickets, 1);
        assert_eq!(bowler.legal_balls, 4);
        assert_eq!(bowler.economy, Some(21.0));
    }

    #[test]
    fn test_run_out_not_credited_to_bowler() {
        let balls = vec![
            ball(2, 1, 1, 1, "none", "runout"),
            ball(1, 1, 1, 0, "none", "caught"),
        ];

        let board = build_scoreboard(&balls);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].innings, 1);
        assert_eq!(board[0].bowlers[0].wickets, 1);
        assert_eq!(board[1].innings, 2);
        assert_eq!(board[1].wickets, 1);
        assert_eq!(board[1].bowlers[0].wickets, 0);
    }

    #[test]
    fn test_empty_scoreboard() {
        assert!(build_scoreboard(&[]).is_empty());
    }

    #[test]
    fn test_manual_payload_validation() {
        let payload: ManualSavePayload = serde_json::from_str(
            r#"{"batting": [{"player_id": 1, "runs": -4}], "bowling": []}"#,
        )
        .unwrap();
        assert!(payload.validate().is_err());

        let payload: ManualSavePayload = serde_json::from_str(
            r#"{"batting": [{"player_id": 1, "runs": 42, "balls": 30}],
                "bowling": [{"player_id": 2, "overs": 4.0, "runs_conceded": 28, "wickets": 2}],
                "opponent_simple": {"runs": 140, "wickets": 8, "overs": 20.0}}"#,
        )
        .unwrap();
        assert!(payload.validate().is_ok());
        assert!(payload.fielding.is_empty());
        assert!(payload.team_summary.is_none());
    }

    #[test]
    fn test_manual_payload_wire_names() {
        let payload: ManualSavePayload = serde_json::from_str(
            r#"{"batting": [{"player_id": 1, "runs": 42, "balls": 30, "fours": 5, "sixes": 1,
                             "is_out": true, "wicket_over": 14, "wicket_ball": 3, "dismissal_type": "caught"}],
                "bowling": [{"player_id": 2, "overs": 4.0, "runs_conceded": 28, "wickets": 2}],
                "fielding": [{"player_id": 3, "catches": 2, "drops": 1, "saves": 4}],
                "wagon": [{"player_id": 1, "angle": 45.0, "distance": 60.0, "runs": 4, "shot_type": "drive"}],
                "opponent_simple": {"runs": 140, "wickets": 8, "overs": 20.0},
                "team_summary": {"runs": 141, "wkts": 6, "overs": 19.2, "result": "Won by 4 wickets"}}"#,
        )
        .unwrap();
        assert!(payload.validate().is_ok());

        assert_eq!(payload.batting[0].balls, 30);
        assert_eq!(payload.batting[0].wicket_ball, Some(3));
        assert_eq!(payload.bowling[0].runs_conceded, 28);
        assert_eq!(payload.fielding[0].saves, 4);
        assert_eq!(payload.wagon[0].shot_type.as_deref(), Some("drive"));
        assert_eq!(payload.opponent_simple.as_ref().unwrap().wickets, 8);

        let team = payload.team_summary.unwrap();
        assert_eq!(team.wkts, 6);
        assert_eq!(balls_from_overs(team.overs).unwrap(), 116);
    }

    #[test]
    fn test_manual_payload_upper_bounds() {
        let payload: ManualSavePayload = serde_json::from_str(
            r#"{"batting": [{"player_id": 1, "runs": 30000000, "balls": 10}]}"#,
        )
        .unwrap();
        assert!(payload.validate().is_err());

        let payload: ManualSavePayload = serde_json::from_str(
            r#"{"bowling": [{"player_id": 2, "overs": 4.0, "runs_conceded": 30000000}]}"#,
        )
        .unwrap();
        assert!(payload.validate().is_err());

        let payload: ManualSavePayload =
            serde_json::from_str(r#"{"team_summary": {"runs": 2147483647, "wkts": 3}}"#).unwrap();
        assert!(payload.validate().is_err());

        assert!(balls_from_overs(1.0e12).is_err());
        assert!(balls_from_overs(MAX_OVERS + 1.0).is_err());
        assert_eq!(balls_from_overs(999.5).unwrap(), 5999);
    }

    #[test]
    fn test_completed_match_is_not_scoreable() {
        assert!(ensure_scoreable(4, Some(MATCH_PENDING_APPROVAL)).is_ok());
        assert!(ensure_scoreable(4, Some("ongoing")).is_ok());

        let err = ensure_scoreable(4, Some(MATCH_COMPLETED)).unwrap_err();
        assert!(matches!(err, ServiceError::Invalid { .. }));

        let err = ensure_scoreable(4, None).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[test]
    fn test_live_ball_wire_names() {
        let payload: LiveBallPayload = serde_json::from_str(
            r#"{"over_no": 7, "ball_no": 4, "striker": "Rohan", "non_striker": "Ishaan",
                "bowler": "Kabir", "runs": 2, "extras": "legbye", "wicket": "none",
                "commentary": "Off the pads", "angle": 210.5, "shot_type": "flick"}"#,
        )
        .unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.non_striker.as_deref(), Some("Ishaan"));
        assert_eq!(payload.extras, Extras::LegBye);
        assert_eq!(payload.angle, Some(210.5));
        assert_eq!(payload.shot_type.as_deref(), Some("flick"));
    }

    #[test]
    fn test_strike_rate_of_a_huge_score_does_not_overflow() {
        let mut balls = vec![];
        for n in 0..3 {
            let mut b = ball(1, 1, n + 1, 6, "none", "none");
            b.runs = i32::MAX / 3;
            balls.push(b);
        }
        let board = build_scoreboard(&balls);
        assert!(board[0].batters[0].strike_rate.unwrap() > 0.0);
        assert!(board[0].run_rate.unwrap() > 0.0);
    }

    #[test]
    fn test_live_ball_payload_validation() {
        let payload: LiveBallPayload =
            serde_json::from_str(r#"{"over_no": 1, "ball_no": 7, "runs": 1}"#).unwrap();
        assert!(payload.validate().is_err());

        let payload: LiveBallPayload =
            serde_json::from_str(r#"{"over_no": 3, "ball_no": 2, "runs": 4, "extras": "noball"}"#)
                .unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.extras, Extras::NoBall);
        assert_eq!(payload.wicket, "none");
    }
}
