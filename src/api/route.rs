//! This module defines the match routes: creation, squads, manual and live scoring, approval and reports.

use super::auth::{CurrentUser, CustomSecurityScheme};
use super::req::{InningsRequest, NewMatchRequest, ResultRequest};
use super::schema::{
    ApiTags, ApprovalSummary, GetRecordResponse, LiveView, MatchCreated, MatchDetail,
    PdfResponse, PostResponse, ScoringPanel, ScoringSheet, SquadView, StatusMessage,
};
use crate::model::core::{Actor, Coach, Player, RecordResponse, Role, STATUS_APPROVED};
use crate::model::matches::{Match, OpponentTempPlayer, SquadSelection, MATCH_COMPLETED};
use crate::model::pdf::render_report_pdf;
use crate::model::report::{MatchReport, MatchReview};
use crate::model::scoring::{
    build_scoreboard, next_ball, LiveBall, LiveBallPayload, ManualSavePayload,
};
use crate::model::stats::approve_match;
use crate::model::util::ServiceError;
use log::{debug, info};
use poem::web::Data;
use poem_openapi::{param::Path, param::Query, payload::Json, OpenApi};
use std::sync::Arc;

/// The match, provided the user is its assigned scorer.
async fn scorer_match(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<Match, ServiceError> {
    let m = Match::get_by_id(pool, id).await?;
    let actor = Actor::resolve(pool, user.id, user.role).await?;
    if !m.can_score(&actor) {
        return Err(ServiceError::forbidden(
            "Only the assigned scorer can score this match.",
        ));
    }
    Ok(m)
}

/// The squad when one is picked, otherwise every approved player.
async fn scoring_players(pool: &sqlx::PgPool, id: i64) -> Result<Vec<Player>, ServiceError> {
    let squad = Match::get_squad_ids(pool, id).await?;
    if squad.is_empty() {
        Player::get_records_by_status(pool, STATUS_APPROVED).await
    } else {
        Player::get_records_by_ids(pool, &squad).await
    }
}

async fn create_match(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    req: NewMatchRequest,
) -> Result<MatchCreated, ServiceError> {
    user.require(Role::Coach)?;
    let coach = Coach::get_by_user_id(pool, user.id).await?;
    let new_match = req.into_new_match(coach.id)?;
    let record = Match::insert(pool, &new_match).await?;

    let redirect = if record.is_manual() {
        format!("/matches/{}/manual", record.id)
    } else {
        format!("/matches/{}", record.id)
    };
    Ok(MatchCreated { record, redirect })
}

async fn match_detail(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<MatchDetail, ServiceError> {
    let record = Match::get_by_id(pool, id).await?;
    let can_score = match Actor::resolve(pool, user.id, user.role).await {
        Ok(actor) => record.can_score(&actor),
        Err(ServiceError::NotFound { .. }) => false,
        Err(e) => return Err(e),
    };
    let squad_count = Match::get_squad_ids(pool, id).await?.len() as u64;
    let opponent_count = Match::get_opponents(pool, id).await?.len() as u64;

    Ok(MatchDetail {
        record,
        can_score,
        squad_count,
        opponent_count,
    })
}

async fn squad_view(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<SquadView, ServiceError> {
    user.require(Role::Coach)?;
    Ok(SquadView {
        record: Match::get_by_id(pool, id).await?,
        players: Player::get_records_by_status(pool, STATUS_APPROVED).await?,
        selected: Match::get_squad_ids(pool, id).await?,
        opponents: Match::get_opponents(pool, id).await?,
    })
}

async fn select_squad(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
    selection: SquadSelection,
) -> Result<StatusMessage, ServiceError> {
    user.require(Role::Coach)?;
    Match::get_by_id(pool, id).await?;
    Match::replace_squad(pool, id, &selection).await?;
    Ok(StatusMessage::new("Squad saved."))
}

async fn scoring_sheet(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<ScoringSheet, ServiceError> {
    let record = scorer_match(pool, user, id).await?;
    Ok(ScoringSheet {
        players: scoring_players(pool, id).await?,
        opponents: Match::get_opponents(pool, id).await?,
        record,
    })
}

async fn save_manual(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
    payload: ManualSavePayload,
) -> Result<StatusMessage, ServiceError> {
    let record = scorer_match(pool, user, id).await?;
    payload.save(pool, &record).await?;
    Ok(StatusMessage::new(
        "Scores saved. The match is waiting for the coach's approval.",
    ))
}

async fn scoring_panel(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<ScoringPanel, ServiceError> {
    let record = scorer_match(pool, user, id).await?;
    let innings = record.scoring_innings();
    let last = LiveBall::get_last(pool, id, innings).await?;
    let (next_over, next_ball) = next_ball(last.as_ref());

    Ok(ScoringPanel {
        players: scoring_players(pool, id).await?,
        opponents: Match::get_opponents(pool, id).await?,
        record,
        innings,
        next_over,
        next_ball,
    })
}

async fn add_ball(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
    payload: LiveBallPayload,
) -> Result<LiveBall, ServiceError> {
    let record = scorer_match(pool, user, id).await?;
    if record.is_completed() {
        return Err(ServiceError::invalid(
            "The match is already completed and cannot be scored again.",
        ));
    }
    LiveBall::insert(pool, id, record.scoring_innings(), &payload).await
}

async fn live_view(pool: &sqlx::PgPool, id: i64) -> Result<LiveView, ServiceError> {
    let record = Match::get_by_id(pool, id).await?;
    let balls = LiveBall::get_records(pool, id).await?;
    debug!("Building the scoreboard of match {} from {} balls.", id, balls.len());

    Ok(LiveView {
        record,
        scoreboard: build_scoreboard(&balls),
    })
}

async fn approve(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<ApprovalSummary, ServiceError> {
    user.require(Role::Coach)?;
    let players_updated = approve_match(pool, id).await?;
    Ok(ApprovalSummary {
        match_id: id,
        players_updated: players_updated as u64,
        status: MATCH_COMPLETED.to_string(),
    })
}

async fn report_pdf(pool: &sqlx::PgPool, id: i64) -> Result<(Vec<u8>, String), ServiceError> {
    let report = MatchReport::load(pool, id).await?;
    let bytes = render_report_pdf(&report)?;
    info!("Report of match {} rendered ({} bytes).", id, bytes.len());
    Ok((bytes, report.file_name()))
}

pub struct MatchApi;

#[OpenApi]
impl MatchApi {
    /// Call `/api/v1/matches` with a json payload to create a match. The toss decides who bats first.
    #[oai(
        path = "/api/v1/matches",
        method = "post",
        tag = "ApiTags::Matches",
        operation_id = "createMatch"
    )]
    async fn create_match(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
        payload: Json<NewMatchRequest>,
    ) -> PostResponse<MatchCreated> {
        let pool_arc = pool.clone();
        create_match(&pool_arc, &token.0, payload.0).await.into()
    }

    /// Call `/api/v1/matches` with query params to fetch matches ordered by date.
    #[oai(
        path = "/api/v1/matches",
        method = "get",
        tag = "ApiTags::Matches",
        operation_id = "fetchMatches"
    )]
    async fn fetch_matches(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        page: Query<Option<u64>>,
        page_size: Query<Option<u64>>,
        _token: CustomSecurityScheme,
    ) -> GetRecordResponse<RecordResponse<Match>> {
        let pool_arc = pool.clone();
        Match::get_records(&pool_arc, page.0, page_size.0)
            .await
            .into()
    }

    #[oai(
        path = "/api/v1/matches/:id",
        method = "get",
        tag = "ApiTags::Matches",
        operation_id = "fetchMatch"
    )]
    async fn fetch_match(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<MatchDetail> {
        let pool_arc = pool.clone();
        match_detail(&pool_arc, &token.0, id.0).await.into()
    }

    #[oai(
        path = "/api/v1/matches/:id/result",
        method = "post",
        tag = "ApiTags::Matches",
        operation_id = "updateMatchResult"
    )]
    async fn update_result(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
        payload: Json<ResultRequest>,
    ) -> GetRecordResponse<Match> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        Match::update_result(&pool_arc, id.0, payload.result.trim())
            .await
            .into()
    }

    #[oai(
        path = "/api/v1/matches/:id/squad",
        method = "get",
        tag = "ApiTags::Matches",
        operation_id = "fetchSquad"
    )]
    async fn fetch_squad(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<SquadView> {
        let pool_arc = pool.clone();
        squad_view(&pool_arc, &token.0, id.0).await.into()
    }

    /// Call `/api/v1/matches/:id/squad` with the selected players and the opponents. At least 11 approved players are needed.
    #[oai(
        path = "/api/v1/matches/:id/squad",
        method = "post",
        tag = "ApiTags::Matches",
        operation_id = "selectSquad"
    )]
    async fn select_squad(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
        payload: Json<SquadSelection>,
    ) -> GetRecordResponse<StatusMessage> {
        // The size check needs no database.
        if let Err(e) = token
            .0
            .require(Role::Coach)
            .and_then(|_| payload.unique_player_ids())
        {
            return GetRecordResponse::from_error(e);
        }

        let pool_arc = pool.clone();
        select_squad(&pool_arc, &token.0, id.0, payload.0).await.into()
    }

    #[oai(
        path = "/api/v1/matches/:id/opponents",
        method = "get",
        tag = "ApiTags::Matches",
        operation_id = "fetchOpponents"
    )]
    async fn fetch_opponents(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        _token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<OpponentTempPlayer>> {
        let pool_arc = pool.clone();
        Match::get_opponents(&pool_arc, id.0).await.into()
    }

    /// Call `/api/v1/matches/:id/manual` to fetch the manual scoring sheet, only for the assigned scorer.
    #[oai(
        path = "/api/v1/matches/:id/manual",
        method = "get",
        tag = "ApiTags::Scoring",
        operation_id = "fetchScoringSheet"
    )]
    async fn fetch_scoring_sheet(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<ScoringSheet> {
        let pool_arc = pool.clone();
        scoring_sheet(&pool_arc, &token.0, id.0).await.into()
    }

    /// Call `/api/v1/matches/:id/manual` with the whole score sheet. Previous manual scores of the match are replaced.
    #[oai(
        path = "/api/v1/matches/:id/manual",
        method = "post",
        tag = "ApiTags::Scoring",
        operation_id = "saveManualScores"
    )]
    async fn save_manual_scores(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
        payload: Json<ManualSavePayload>,
    ) -> GetRecordResponse<StatusMessage> {
        let pool_arc = pool.clone();
        save_manual(&pool_arc, &token.0, id.0, payload.0).await.into()
    }

    /// Call `/api/v1/matches/:id/panel` to fetch the live scoring panel with the next over and ball.
    #[oai(
        path = "/api/v1/matches/:id/panel",
        method = "get",
        tag = "ApiTags::Scoring",
        operation_id = "fetchScoringPanel"
    )]
    async fn fetch_scoring_panel(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<ScoringPanel> {
        let pool_arc = pool.clone();
        scoring_panel(&pool_arc, &token.0, id.0).await.into()
    }

    #[oai(
        path = "/api/v1/matches/:id/balls",
        method = "post",
        tag = "ApiTags::Scoring",
        operation_id = "addLiveBall"
    )]
    async fn add_live_ball(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
        payload: Json<LiveBallPayload>,
    ) -> PostResponse<LiveBall> {
        let pool_arc = pool.clone();
        add_ball(&pool_arc, &token.0, id.0, payload.0).await.into()
    }

    /// Call `/api/v1/matches/:id/balls` to fetch every ball of the match in the order it was recorded.
    #[oai(
        path = "/api/v1/matches/:id/balls",
        method = "get",
        tag = "ApiTags::Scoring",
        operation_id = "fetchLiveBalls"
    )]
    async fn fetch_live_balls(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
    ) -> GetRecordResponse<Vec<LiveBall>> {
        let pool_arc = pool.clone();
        LiveBall::get_records(&pool_arc, id.0).await.into()
    }

    #[oai(
        path = "/api/v1/matches/:id/live",
        method = "get",
        tag = "ApiTags::Scoring",
        operation_id = "fetchLiveView"
    )]
    async fn fetch_live_view(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
    ) -> GetRecordResponse<LiveView> {
        let pool_arc = pool.clone();
        live_view(&pool_arc, id.0).await.into()
    }

    #[oai(
        path = "/api/v1/matches/:id/innings/start",
        method = "post",
        tag = "ApiTags::Scoring",
        operation_id = "startInnings"
    )]
    async fn start_innings(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
        payload: Json<InningsRequest>,
    ) -> GetRecordResponse<Match> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        Match::start_innings(&pool_arc, id.0, payload.batting_side)
            .await
            .into()
    }

    #[oai(
        path = "/api/v1/matches/:id/innings/end",
        method = "post",
        tag = "ApiTags::Scoring",
        operation_id = "endInnings"
    )]
    async fn end_innings(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Match> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        Match::end_innings(&pool_arc, id.0).await.into()
    }

    /// Call `/api/v1/matches/:id/review` to fetch the manual scores with suggestions before approving them.
    #[oai(
        path = "/api/v1/matches/:id/review",
        method = "get",
        tag = "ApiTags::Reports",
        operation_id = "fetchMatchReview"
    )]
    async fn fetch_match_review(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<MatchReview> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        MatchReview::load(&pool_arc, id.0).await.into()
    }

    /// Call `/api/v1/matches/:id/approve` to merge the manual scores into career stats and complete the match.
    #[oai(
        path = "/api/v1/matches/:id/approve",
        method = "post",
        tag = "ApiTags::Reports",
        operation_id = "approveMatch"
    )]
    async fn approve_match(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<ApprovalSummary> {
        let pool_arc = pool.clone();
        approve(&pool_arc, &token.0, id.0).await.into()
    }

    #[oai(
        path = "/api/v1/matches/:id/report",
        method = "get",
        tag = "ApiTags::Reports",
        operation_id = "fetchMatchReport"
    )]
    async fn fetch_match_report(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        _token: CustomSecurityScheme,
    ) -> GetRecordResponse<MatchReport> {
        let pool_arc = pool.clone();
        MatchReport::load(&pool_arc, id.0).await.into()
    }

    /// Call `/api/v1/matches/:id/report.pdf` to download the match report as `match_report_<id>.pdf`.
    #[oai(
        path = "/api/v1/matches/:id/report.pdf",
        method = "get",
        tag = "ApiTags::Reports",
        operation_id = "downloadMatchReport"
    )]
    async fn download_match_report(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        _token: CustomSecurityScheme,
    ) -> PdfResponse {
        let pool_arc = pool.clone();
        match report_pdf(&pool_arc, id.0).await {
            Ok((bytes, file_name)) => PdfResponse::attachment(bytes, &file_name),
            Err(e) => PdfResponse::from_error(e),
        }
    }
}
