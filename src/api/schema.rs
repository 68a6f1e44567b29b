//! Response types shared by all the routes, plus the view objects returned by the page endpoints.

use crate::model::core::{Coach, Player, Role};
use crate::model::matches::{Match, OpponentTempPlayer};
use crate::model::payment::PreMatchAvailability;
use crate::model::scoring::InningsScore;
use crate::model::stats::CareerStats;
use crate::model::util::ServiceError;
use log::warn;
use poem_openapi::payload::{Binary, Json};
use poem_openapi::types::ToJSON;
use poem_openapi::{ApiResponse, Object, Tags};
use serde::{Deserialize, Serialize};

#[derive(Tags)]
pub enum ApiTags {
    Accounts,
    Matches,
    Scoring,
    Reports,
    Payments,
    Nutrition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct ErrorMessage {
    pub msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct StatusMessage {
    pub msg: String,
}

impl StatusMessage {
    pub fn new(msg: &str) -> Self {
        StatusMessage {
            msg: msg.to_string(),
        }
    }
}

/// Status code a model error maps to.
pub fn status_of(e: &ServiceError) -> u16 {
    match e {
        ServiceError::NotFound { .. } => 404,
        ServiceError::Forbidden { .. } => 403,
        ServiceError::Gateway { .. } | ServiceError::Render { .. } => 500,
        ServiceError::Invalid { .. }
        | ServiceError::Conflict { .. }
        | ServiceError::Database { .. } => 400,
    }
}

#[derive(ApiResponse)]
pub enum GetRecordResponse<T: ToJSON> {
    #[oai(status = 200)]
    Ok(Json<T>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorMessage>),

    #[oai(status = 403)]
    Forbidden(Json<ErrorMessage>),

    #[oai(status = 404)]
    NotFound(Json<ErrorMessage>),

    #[oai(status = 500)]
    InternalError(Json<ErrorMessage>),
}

impl<T: ToJSON> GetRecordResponse<T> {
    pub fn ok(record: T) -> Self {
        Self::Ok(Json(record))
    }

    pub fn bad_request(msg: String) -> Self {
        Self::BadRequest(Json(ErrorMessage { msg }))
    }

    pub fn forbidden(msg: String) -> Self {
        Self::Forbidden(Json(ErrorMessage { msg }))
    }

    pub fn not_found(msg: String) -> Self {
        Self::NotFound(Json(ErrorMessage { msg }))
    }

    pub fn from_error(e: ServiceError) -> Self {
        let msg = e.to_string();
        warn!("{}", msg);
        match status_of(&e) {
            403 => Self::forbidden(msg),
            404 => Self::not_found(msg),
            500 => Self::InternalError(Json(ErrorMessage { msg })),
            _ => Self::bad_request(msg),
        }
    }
}

impl<T: ToJSON> From<Result<T, ServiceError>> for GetRecordResponse<T> {
    fn from(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(record) => Self::ok(record),
            Err(e) => Self::from_error(e),
        }
    }
}

#[derive(ApiResponse)]
pub enum PostResponse<T: ToJSON> {
    #[oai(status = 201)]
    Created(Json<T>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorMessage>),

    #[oai(status = 403)]
    Forbidden(Json<ErrorMessage>),

    #[oai(status = 404)]
    NotFound(Json<ErrorMessage>),

    #[oai(status = 500)]
    InternalError(Json<ErrorMessage>),
}

impl<T: ToJSON> PostResponse<T> {
    pub fn created(record: T) -> Self {
        Self::Created(Json(record))
    }

    pub fn bad_request(msg: String) -> Self {
        Self::BadRequest(Json(ErrorMessage { msg }))
    }

    pub fn forbidden(msg: String) -> Self {
        Self::Forbidden(Json(ErrorMessage { msg }))
    }

    pub fn from_error(e: ServiceError) -> Self {
        let msg = e.to_string();
        warn!("{}", msg);
        match status_of(&e) {
            403 => Self::forbidden(msg),
            404 => Self::NotFound(Json(ErrorMessage { msg })),
            500 => Self::InternalError(Json(ErrorMessage { msg })),
            _ => Self::bad_request(msg),
        }
    }
}

impl<T: ToJSON> From<Result<T, ServiceError>> for PostResponse<T> {
    fn from(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(record) => Self::created(record),
            Err(e) => Self::from_error(e),
        }
    }
}

#[derive(ApiResponse)]
pub enum PdfResponse {
    #[oai(status = 200, content_type = "application/pdf")]
    Ok(
        Binary<Vec<u8>>,
        #[oai(header = "Content-Disposition")] String,
    ),

    #[oai(status = 404)]
    NotFound(Json<ErrorMessage>),

    #[oai(status = 500)]
    InternalError(Json<ErrorMessage>),
}

impl PdfResponse {
    pub fn attachment(bytes: Vec<u8>, file_name: &str) -> Self {
        Self::Ok(
            Binary(bytes),
            format!("attachment; filename=\"{}\"", file_name),
        )
    }

    pub fn from_error(e: ServiceError) -> Self {
        let msg = e.to_string();
        warn!("{}", msg);
        match status_of(&e) {
            404 => Self::NotFound(Json(ErrorMessage { msg })),
            _ => Self::InternalError(Json(ErrorMessage { msg })),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub username: String,
    pub role: Role,
    /// Where the web client should go after logging in.
    pub redirect: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct CoachDashboard {
    pub coach: Coach,
    pub pending_players: Vec<Player>,
    pub today_matches: Vec<Match>,
    pub pending_approvals: Vec<Match>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct PlayerDashboard {
    pub player: Player,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct PlayerView {
    pub player: Player,
    pub stats: CareerStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct MatchCreated {
    pub record: Match,
    pub redirect: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct MatchDetail {
    pub record: Match,
    pub can_score: bool,
    pub squad_count: u64,
    pub opponent_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct SquadView {
    pub record: Match,
    /// Every approved player that can be picked.
    pub players: Vec<Player>,
    pub selected: Vec<i64>,
    pub opponents: Vec<OpponentTempPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct ScoringSheet {
    pub record: Match,
    pub players: Vec<Player>,
    pub opponents: Vec<OpponentTempPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct ScoringPanel {
    pub record: Match,
    pub players: Vec<Player>,
    pub opponents: Vec<OpponentTempPlayer>,
    pub innings: i32,
    pub next_over: i32,
    pub next_ball: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct LiveView {
    pub record: Match,
    pub scoreboard: Vec<InningsScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct ApprovalSummary {
    pub match_id: i64,
    pub players_updated: u64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct PaymentPage {
    pub availability: PreMatchAvailability,
    pub already_paid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct OrderCreated {
    pub order_id: String,
    /// Amount in paise.
    pub amount: i64,
    /// The public Razorpay key for the checkout.
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of() {
        assert_eq!(status_of(&ServiceError::not_found("Match", 1)), 404);
        assert_eq!(status_of(&ServiceError::forbidden("no")), 403);
        assert_eq!(status_of(&ServiceError::invalid("bad")), 400);
        assert_eq!(
            status_of(&ServiceError::Gateway {
                reason: "timeout".to_string()
            }),
            500
        );
        assert_eq!(
            status_of(&ServiceError::Database {
                source: sqlx::Error::RowNotFound
            }),
            400
        );
    }

    #[test]
    fn test_from_result() {
        let resp: GetRecordResponse<StatusMessage> =
            Err(ServiceError::forbidden("Only the assigned scorer can score this match.")).into();
        assert!(matches!(resp, GetRecordResponse::Forbidden(_)));

        let resp: PostResponse<StatusMessage> = Ok(StatusMessage::new("ok")).into();
        assert!(matches!(resp, PostResponse::Created(_)));
    }
}
