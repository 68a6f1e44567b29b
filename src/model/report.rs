//! Report data for a match: per-player aggregates, top performers, the team lines and coach suggestions.
//! The same data backs the review page and the PDF report.

use super::core::Player;
use super::matches::Match;
use super::scoring::{
    ManualScore, BALLS_PER_OVER, ENTRY_BATTING, ENTRY_BOWLING, ENTRY_FIELDING, ENTRY_OPPONENT,
};
use super::util::{safe_ratio, ServiceError};
use chrono::NaiveDate;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const TEAM_SUGGESTIONS: [&str; 3] = [
    "Top-order should focus on rotating strike in the middle overs.",
    "Bowling unit needs to work on death-over yorker consistency.",
    "Fielders should practice direct-hit drills to convert half-chances.",
];

const LOW_STRIKE_RATE: f64 = 70.0;
const HIGH_ECONOMY: f64 = 7.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct PlayerAggregate {
    pub player_id: i64,
    pub name: String,
    pub runs: i32,
    pub balls: i32,
    pub outs: i32,
    pub fours: i32,
    pub sixes: i32,
    pub wickets: i32,
    pub balls_bowled: i32,
    pub runs_conceded: i32,
    pub catches: i32,
}

impl PlayerAggregate {
    fn new(player_id: i64, name: String) -> Self {
        PlayerAggregate {
            player_id,
            name,
            runs: 0,
            balls: 0,
            outs: 0,
            fours: 0,
            sixes: 0,
            wickets: 0,
            balls_bowled: 0,
            runs_conceded: 0,
            catches: 0,
        }
    }

    pub fn strike_rate(&self) -> Option<f64> {
        safe_ratio(self.runs as f64 * 100.0, self.balls as f64)
    }

    /// Runs conceded per over.
    pub fn economy(&self) -> Option<f64> {
        safe_ratio(
            self.runs_conceded as f64 * BALLS_PER_OVER as f64,
            self.balls_bowled as f64,
        )
    }
}

/// Sum the player rows of a match per player. Opponent rows and rows without a player are skipped.
pub fn aggregate_players(
    rows: &[ManualScore],
    names: &HashMap<i64, String>,
) -> Vec<PlayerAggregate> {
    let mut aggregates: Vec<PlayerAggregate> = vec![];
    for row in rows.iter().filter(|r| r.entry_kind != ENTRY_OPPONENT) {
        let player_id = match row.player_id {
            Some(id) => id,
            None => continue,
        };

        let idx = match aggregates.iter().position(|a| a.player_id == player_id) {
            Some(idx) => idx,
            None => {
                let name = names
                    .get(&player_id)
                    .cloned()
                    .unwrap_or_else(|| format!("Player {}", player_id));
                aggregates.push(PlayerAggregate::new(player_id, name));
                aggregates.len() - 1
            }
        };

        let a = &mut aggregates[idx];
        a.runs = a.runs.saturating_add(row.runs);
        a.balls = a.balls.saturating_add(row.balls_faced);
        if row.is_out {
            a.outs += 1;
        }
        a.fours = a.fours.saturating_add(row.fours);
        a.sixes = a.sixes.saturating_add(row.sixes);
        a.wickets = a.wickets.saturating_add(row.wickets);
        a.balls_bowled = a.balls_bowled.saturating_add(row.balls_bowled);
        a.runs_conceded = a.runs_conceded.saturating_add(row.runs_conceded);
        a.catches = a.catches.saturating_add(row.catches);
    }
    aggregates
}

/// The first aggregate with the highest key, so ties go to whoever appears first.
fn top_by<F>(aggregates: &[PlayerAggregate], key: F) -> Option<PlayerAggregate>
where
    F: Fn(&PlayerAggregate) -> i32,
{
    let mut best: Option<&PlayerAggregate> = None;
    for a in aggregates {
        match best {
            Some(b) if key(a) <= key(b) => {}
            _ => best = Some(a),
        }
    }
    best.cloned()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct TeamLine {
    pub team: String,
    pub runs: i32,
    pub wkts: i32,
    pub overs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct Performer {
    pub category: String,
    pub player: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct MatchReport {
    pub match_id: i64,
    pub title: String,
    pub team_name: String,
    pub opponent_name: String,
    pub match_date: NaiveDate,
    pub team_lines: Vec<TeamLine>,
    #[oai(skip_serializing_if_is_none)]
    pub top_batter: Option<PlayerAggregate>,
    #[oai(skip_serializing_if_is_none)]
    pub top_bowler: Option<PlayerAggregate>,
    #[oai(skip_serializing_if_is_none)]
    pub top_fielder: Option<PlayerAggregate>,
    pub suggestions: Vec<String>,
}

fn coach_suggestions(
    batter: Option<&PlayerAggregate>,
    bowler: Option<&PlayerAggregate>,
    fielder: Option<&PlayerAggregate>,
) -> Vec<String> {
    let mut suggestions = vec![];

    match batter {
        Some(b) if b.strike_rate().unwrap_or(0.0) < LOW_STRIKE_RATE => suggestions.push(format!(
            "{}: Strike rotation improvement - practice strike-rotation drills and running between wickets to increase SR.",
            b.name
        )),
        Some(b) => suggestions.push(format!(
            "{}: Good power and scoring rate - focus on placement in middle overs.",
            b.name
        )),
        None => suggestions
            .push("No significant batting contributions found to analyse.".to_string()),
    }

    match bowler {
        Some(b) if b.wickets >= 3 => suggestions.push(format!(
            "{}: Excellent wicket taking - work on variations to increase consistency.",
            b.name
        )),
        Some(b) => {
            if let Some(econ) = b.economy().filter(|e| *e > HIGH_ECONOMY) {
                suggestions.push(format!(
                    "{}: High economy ({:.2}) - focus on line/length and slower ball control.",
                    b.name, econ
                ));
            }
        }
        None => suggestions.push("No notable bowling performance found.".to_string()),
    }

    match fielder {
        Some(f) if f.catches >= 2 => suggestions.push(format!(
            "{}: Strong fielding - practice direct-hit accuracy for run-outs.",
            f.name
        )),
        Some(_) => suggestions.push(
            "Fielding: Encourage improved ground-fielding drills (reaction and diving).".to_string(),
        ),
        None => {}
    }

    suggestions
}

impl MatchReport {
    /// Assemble the report from the match and its manual rows.
    pub fn build(m: &Match, rows: &[ManualScore], names: &HashMap<i64, String>) -> MatchReport {
        let aggregates = aggregate_players(rows, names);
        let top_batter = top_by(&aggregates, |a| a.runs);
        let top_bowler = top_by(&aggregates, |a| a.wickets);
        let top_fielder = top_by(&aggregates, |a| a.catches);

        let team_runs = m.team_runs.unwrap_or_else(|| {
            rows.iter()
                .filter(|r| r.entry_kind != ENTRY_OPPONENT)
                .fold(0i32, |acc, r| acc.saturating_add(r.runs))
        });
        let opp_runs = m.opp_runs.unwrap_or_else(|| {
            rows.iter()
                .find(|r| r.entry_kind == ENTRY_OPPONENT)
                .map(|r| r.runs)
                .unwrap_or(0)
        });

        let team_lines = vec![
            TeamLine {
                team: m.team_name.clone(),
                runs: team_runs,
                wkts: m.team_wkts.unwrap_or(0),
                overs: m.team_overs.clone().unwrap_or_else(|| "0.0".to_string()),
            },
            TeamLine {
                team: m.opponent_name.clone(),
                runs: opp_runs,
                wkts: m.opp_wkts.unwrap_or(0),
                overs: m.opp_overs.clone().unwrap_or_else(|| "0.0".to_string()),
            },
        ];

        let suggestions = coach_suggestions(
            top_batter.as_ref(),
            top_bowler.as_ref(),
            top_fielder.as_ref(),
        );

        MatchReport {
            match_id: m.id,
            title: m.title.clone(),
            team_name: m.team_name.clone(),
            opponent_name: m.opponent_name.clone(),
            match_date: m.match_date,
            team_lines,
            top_batter,
            top_bowler,
            top_fielder,
            suggestions,
        }
    }

    pub async fn load(pool: &sqlx::PgPool, match_id: i64) -> Result<MatchReport, ServiceError> {
        let m = Match::get_by_id(pool, match_id).await?;
        let rows = ManualScore::get_records(pool, match_id).await?;
        let names = player_names(pool, &rows).await?;
        Ok(MatchReport::build(&m, &rows, &names))
    }

    /// One row per category for the top performers table, "-" when nobody qualifies.
    pub fn performers(&self) -> Vec<Performer> {
        let batting = match &self.top_batter {
            Some(b) => Performer {
                category: "Batting".to_string(),
                player: b.name.clone(),
                detail: format!(
                    "{} ({}b) SR: {:.2}",
                    b.runs,
                    b.balls,
                    b.strike_rate().unwrap_or(0.0)
                ),
            },
            None => Performer::empty("Batting"),
        };
        let bowling = match &self.top_bowler {
            Some(b) => Performer {
                category: "Bowling".to_string(),
                player: b.name.clone(),
                detail: format!(
                    "{} wickets, {} overs",
                    b.wickets,
                    super::scoring::format_overs(b.balls_bowled)
                ),
            },
            None => Performer::empty("Bowling"),
        };
        let fielding = match &self.top_fielder {
            Some(f) => Performer {
                category: "Fielding".to_string(),
                player: f.name.clone(),
                detail: format!("{} catches", f.catches),
            },
            None => Performer::empty("Fielding"),
        };

        vec![batting, bowling, fielding]
    }

    pub fn file_name(&self) -> String {
        format!("match_report_{}.pdf", self.match_id)
    }
}

impl Performer {
    fn empty(category: &str) -> Self {
        Performer {
            category: category.to_string(),
            player: "-".to_string(),
            detail: "-".to_string(),
        }
    }
}

async fn player_names(
    pool: &sqlx::PgPool,
    rows: &[ManualScore],
) -> Result<HashMap<i64, String>, ServiceError> {
    let ids: Vec<i64> = rows.iter().filter_map(|r| r.player_id).collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let players = Player::get_records_by_ids(pool, &ids).await?;
    Ok(players.into_iter().map(|p| (p.id, p.username)).collect())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct ScoreLine {
    pub player_name: String,
    pub entry: ManualScore,
}

/// Everything the coach looks at before approving a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct MatchReview {
    #[oai(rename = "match")]
    #[serde(rename = "match")]
    pub scored_match: Match,
    pub batting: Vec<ScoreLine>,
    pub bowling: Vec<ScoreLine>,
    pub fielding: Vec<ScoreLine>,
    pub suggestions: Vec<String>,
    pub team_suggestions: Vec<String>,
}

pub fn review_suggestions(batting: &[ScoreLine], bowling: &[ScoreLine]) -> Vec<String> {
    let mut suggestions = vec![];
    for b in batting {
        if b.entry.runs < 10 {
            suggestions.push(format!("{}: Needs to build longer innings.", b.player_name));
        } else if b.entry.runs >= 30 {
            suggestions.push(format!("{}: Good batting performance.", b.player_name));
        }
    }

    for b in bowling.iter().filter(|b| b.entry.wickets >= 3) {
        suggestions.push(format!("{}: Excellent wicket-taking spell.", b.player_name));
    }
    suggestions
}

impl MatchReview {
    pub fn build(m: Match, rows: Vec<ManualScore>, names: &HashMap<i64, String>) -> MatchReview {
        let mut batting = vec![];
        let mut bowling = vec![];
        let mut fielding = vec![];

        for row in rows {
            let player_name = match row.player_id {
                Some(id) => names
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| format!("Player {}", id)),
                None => continue,
            };
            let line = ScoreLine {
                player_name,
                entry: row,
            };
            match line.entry.entry_kind.as_str() {
                ENTRY_BATTING => batting.push(line),
                ENTRY_BOWLING => bowling.push(line),
                ENTRY_FIELDING => fielding.push(line),
                _ => {}
            }
        }

        let suggestions = review_suggestions(&batting, &bowling);
        MatchReview {
            scored_match: m,
            batting,
            bowling,
            fielding,
            suggestions,
            team_suggestions: TEAM_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub async fn load(pool: &sqlx::PgPool, match_id: i64) -> Result<MatchReview, ServiceError> {
        let m = Match::get_by_id(pool, match_id).await?;
        let rows = ManualScore::get_records(pool, match_id).await?;
        let names = player_names(pool, &rows).await?;
        Ok(MatchReview::build(m, rows, &names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_match() -> Match {
        Match {
            id: 42,
            title: "Cup Final".to_string(),
            match_date: NaiveDate::from_ymd_opt(2024, 8, 18).unwrap(),
            format: "T20".to_string(),
            venue: "Wankhede".to_string(),
            scoring_mode: "manual".to_string(),
            team_name: "Falcons".to_string(),
            opponent_name: "Hawks".to_string(),
            toss_winner: "Hawks".to_string(),
            toss_decision: "bowl".to_string(),
            batting_side: "team".to_string(),
            scorer_coach_id: Some(1),
            scorer_player_id: None,
            status: "pending_approval".to_string(),
            current_innings: 0,
            started_at: None,
            completed_at: None,
            team_runs: None,
            team_wkts: Some(6),
            team_overs: Some("20.0".to_string()),
            opp_runs: None,
            opp_wkts: None,
            opp_overs: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    fn row(player_id: Option<i64>, entry_kind: &str) -> ManualScore {
        ManualScore {
            id: 0,
            match_id: 42,
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

    fn names() -> HashMap<i64, String> {
        vec![(1, "arjun".to_string()), (2, "dev".to_string()), (3, "kiran".to_string())]
            .into_iter()
            .collect()
    }

    fn sample_rows() -> Vec<ManualScore> {
        let mut a = row(Some(1), ENTRY_BATTING);
        a.runs = 30;
        a.balls_faced = 50;
        let mut b = row(Some(2), ENTRY_BATTING);
        b.runs = 30;
        b.balls_faced = 20;
        let mut c = row(Some(3), ENTRY_BOWLING);
        c.balls_bowled = 24;
        c.runs_conceded = 40;
        c.wickets = 2;
        let mut d = row(Some(2), ENTRY_FIELDING);
        d.catches = 2;
        let mut opp = row(None, ENTRY_OPPONENT);
        opp.runs = 145;
        vec![a, b, c, d, opp]
    }

    #[test]
    fn test_report_top_performers_and_ties() {
        let report = MatchReport::build(&sample_match(), &sample_rows(), &names());

        // Equal runs, the first row wins.
        assert_eq!(report.top_batter.as_ref().unwrap().name, "arjun");
        assert_eq!(report.top_bowler.as_ref().unwrap().name, "kiran");
        assert_eq!(report.top_fielder.as_ref().unwrap().name, "dev");

        assert_eq!(report.team_lines[0].runs, 60);
        assert_eq!(report.team_lines[0].wkts, 6);
        assert_eq!(report.team_lines[1].runs, 145);
        assert_eq!(report.team_lines[1].overs, "0.0");
        assert_eq!(report.file_name(), "match_report_42.pdf");
    }

    #[test]
    fn test_report_suggestions() {
        let report = MatchReport::build(&sample_match(), &sample_rows(), &names());
        assert_eq!(report.suggestions.len(), 3);
        // SR 60 for the top batter.
        assert!(report.suggestions[0].starts_with("arjun: Strike rotation improvement"));
        // Economy 10.00 for two wickets.
        assert!(report.suggestions[1].contains("High economy (10.00)"));
        assert!(report.suggestions[2].starts_with("dev: Strong fielding"));
    }

    #[test]
    fn test_report_without_rows() {
        let mut m = sample_match();
        m.team_runs = Some(170);
        m.opp_runs = Some(168);
        let report = MatchReport::build(&m, &[], &names());

        assert!(report.top_batter.is_none());
        assert!(report.top_bowler.is_none());
        assert!(report.top_fielder.is_none());
        assert_eq!(
            report.suggestions,
            vec![
                "No significant batting contributions found to analyse.".to_string(),
                "No notable bowling performance found.".to_string(),
            ]
        );
        assert_eq!(report.team_lines[0].runs, 170);
        assert_eq!(report.team_lines[1].runs, 168);

        let performers = report.performers();
        assert_eq!(performers.len(), 3);
        assert!(performers.iter().all(|p| p.player == "-"));
    }

    #[test]
    fn test_review_suggestions() {
        let mut rows = sample_rows();
        rows[2].wickets = 4;
        let mut low = row(Some(3), ENTRY_BATTING);
        low.runs = 4;
        rows.push(low);

        let review = MatchReview::build(sample_match(), rows, &names());
        assert_eq!(review.batting.len(), 3);
        assert_eq!(review.bowling.len(), 1);
        assert_eq!(review.fielding.len(), 1);
        assert_eq!(
            review.suggestions,
            vec![
                "arjun: Good batting performance.".to_string(),
                "dev: Good batting performance.".to_string(),
                "kiran: Needs to build longer innings.".to_string(),
                "kiran: Excellent wicket-taking spell.".to_string(),
            ]
        );
        assert_eq!(review.team_suggestions.len(), TEAM_SUGGESTIONS.len());
    }

    #[test]
    fn test_aggregate_ratios_of_large_totals() {
        let mut a = PlayerAggregate::new(5, "arjun".to_string());
        a.runs = 30_000_000;
        a.balls = 10;
        a.runs_conceded = 900_000_000;
        a.balls_bowled = 6;
        assert_eq!(a.strike_rate(), Some(300_000_000.0));
        assert_eq!(a.economy(), Some(900_000_000.0));
    }
}
