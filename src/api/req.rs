//! Request payloads of the JSON API.

use crate::model::core::{ProfileUpdate, Role};
use crate::model::matches::{BattingSide, NewMatch, ScorerType, ScoringMode, TossDecision};
use crate::model::payment::Availability;
use crate::model::util::{ServiceError, USERNAME_REGEX};
use chrono::NaiveDate;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 3, max = 64, message = "The username should be 3-64 characters."),
        regex(
            path = "USERNAME_REGEX",
            message = "The username may only contain letters, digits, '_', '.' and '-'."
        )
    )]
    pub username: String,
    #[validate(email(message = "The email is invalid."))]
    pub email: String,
    #[validate(length(min = 6, max = 128, message = "The password should be 6-128 characters."))]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct LoginRequest {
    /// Username or email.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct ProfileRequest {
    #[oai(skip_serializing_if_is_none)]
    pub dob: Option<NaiveDate>,
    #[validate(length(max = 64))]
    #[oai(skip_serializing_if_is_none)]
    pub batting_style: Option<String>,
    #[validate(length(max = 64))]
    #[oai(skip_serializing_if_is_none)]
    pub bowling_style: Option<String>,
    #[validate(length(max = 64))]
    #[oai(skip_serializing_if_is_none)]
    pub role_in_team: Option<String>,
    #[validate(length(max = 2000))]
    #[oai(skip_serializing_if_is_none)]
    pub bio: Option<String>,
}

impl From<ProfileRequest> for ProfileUpdate {
    fn from(req: ProfileRequest) -> Self {
        ProfileUpdate {
            dob: req.dob,
            batting_style: req.batting_style,
            bowling_style: req.bowling_style,
            role_in_team: req.role_in_team,
            bio: req.bio,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct NewBatchRequest {
    #[validate(length(min = 1, max = 64, message = "The batch name should be 1-64 characters."))]
    pub name: String,
    #[validate(range(min = 0, max = 120))]
    pub min_age: i32,
    #[validate(range(min = 0, max = 120))]
    pub max_age: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct NewMatchRequest {
    #[validate(length(min = 1, max = 150, message = "The title should be 1-150 characters."))]
    pub title: String,
    pub match_date: NaiveDate,
    #[validate(length(min = 1, max = 32))]
    pub format: String,
    #[validate(length(min = 1, max = 120))]
    pub venue: String,
    #[serde(default = "default_scoring_mode")]
    #[oai(default = "default_scoring_mode")]
    pub scoring_mode: ScoringMode,
    #[validate(length(min = 1, max = 100))]
    pub team_name: String,
    #[validate(length(min = 1, max = 100))]
    pub opponent_name: String,
    pub toss_winner: String,
    pub toss_decision: TossDecision,
    pub scorer_type: ScorerType,
    /// Used when the scorer is a player, 0 means nobody.
    #[oai(skip_serializing_if_is_none)]
    pub scorer_player_id: Option<i64>,
}

fn default_scoring_mode() -> ScoringMode {
    ScoringMode::Live
}

impl NewMatchRequest {
    /// Resolve the scorer against the coach creating the match.
    pub fn into_new_match(self, coach_id: i64) -> Result<NewMatch, ServiceError> {
        self.validate()?;

        let (scorer_coach_id, scorer_player_id) = match self.scorer_type {
            ScorerType::Coach => (Some(coach_id), None),
            ScorerType::Player => (None, self.scorer_player_id.filter(|id| *id > 0)),
        };

        let new_match = NewMatch {
            title: self.title.trim().to_string(),
            match_date: self.match_date,
            format: self.format,
            venue: self.venue,
            scoring_mode: self.scoring_mode,
            team_name: self.team_name.trim().to_string(),
            opponent_name: self.opponent_name.trim().to_string(),
            toss_winner: self.toss_winner.trim().to_string(),
            toss_decision: self.toss_decision,
            scorer_coach_id,
            scorer_player_id,
        };
        new_match.check_toss()?;
        Ok(new_match)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct ResultRequest {
    pub result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct InningsRequest {
    #[oai(skip_serializing_if_is_none)]
    pub batting_side: Option<BattingSide>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct RespondRequest {
    pub status: Availability,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct PaymentSuccessRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct NewGroupRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct AddMemberRequest {
    pub user_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_match_request() -> NewMatchRequest {
        NewMatchRequest {
            title: "League Round 3".to_string(),
            match_date: NaiveDate::from_ymd_opt(2024, 11, 3).unwrap(),
            format: "T20".to_string(),
            venue: "Chepauk".to_string(),
            scoring_mode: ScoringMode::Manual,
            team_name: "Falcons".to_string(),
            opponent_name: "Hawks".to_string(),
            toss_winner: "Hawks".to_string(),
            toss_decision: TossDecision::Bat,
            scorer_type: ScorerType::Player,
            scorer_player_id: Some(0),
        }
    }

    #[test]
    fn test_register_request_validation() {
        let mut req = RegisterRequest {
            username: "rahul_d".to_string(),
            email: "rahul@example.com".to_string(),
            password: "wall1234".to_string(),
            role: Role::Player,
        };
        assert!(req.validate().is_ok());

        req.username = "rahul d".to_string();
        assert!(req.validate().is_err());

        req.username = "rahul_d".to_string();
        req.email = "not-an-email".to_string();
        assert!(req.validate().is_err());

        req.email = "rahul@example.com".to_string();
        req.password = "123".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_scorer_resolution() {
        let new_match = new_match_request().into_new_match(4).unwrap();
        assert_eq!(new_match.scorer_coach_id, None);
        assert_eq!(new_match.scorer_player_id, None);

        let mut req = new_match_request();
        req.scorer_player_id = Some(17);
        let new_match = req.into_new_match(4).unwrap();
        assert_eq!(new_match.scorer_player_id, Some(17));

        let mut req = new_match_request();
        req.scorer_type = ScorerType::Coach;
        let new_match = req.into_new_match(4).unwrap();
        assert_eq!(new_match.scorer_coach_id, Some(4));
    }

    #[test]
    fn test_bad_toss_winner() {
        let mut req = new_match_request();
        req.toss_winner = "Eagles".to_string();
        assert!(req.into_new_match(4).is_err());
    }
}
