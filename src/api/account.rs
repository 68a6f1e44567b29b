//! Account routes: registration, login, dashboards, player profiles and batches.

use super::auth::{hash_password, issue_token, verify_password, CurrentUser, CustomSecurityScheme};
use super::req::{LoginRequest, NewBatchRequest, ProfileRequest, RegisterRequest};
use super::schema::{
    ApiTags, CoachDashboard, GetRecordResponse, PlayerDashboard, PlayerView, PostResponse,
    TokenResponse,
};
use crate::model::core::{
    Batch, Coach, NewAccount, Player, Role, User, STATUS_APPROVED, STATUS_PENDING,
};
use crate::model::matches::Match;
use crate::model::stats::{CareerStats, PlayerStats};
use crate::model::util::ServiceError;
use crate::AppConfig;
use chrono::{NaiveDate, Utc};
use log::{info, warn};
use poem::web::Data;
use poem_openapi::{param::Path, payload::Json, OpenApi};
use std::sync::Arc;
use validator::Validate;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn register_account(pool: &sqlx::PgPool, req: RegisterRequest) -> Result<User, ServiceError> {
    req.validate()?;

    let password = req.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::invalid(&format!("Failed to hash the password: {}", e)))?;

    let account = NewAccount {
        username: req.username.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_hash,
        role: req.role,
    };
    User::register(pool, &account).await
}

async fn login_user(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    req: LoginRequest,
) -> Result<TokenResponse, ServiceError> {
    let invalid = || ServiceError::invalid("Invalid login details");

    let user = User::find_by_login(pool, req.username.trim())
        .await?
        .ok_or_else(invalid)?;

    let stored = user.password_hash.clone();
    let password = req.password;
    let matched = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .unwrap_or(false);
    if !matched {
        warn!("Failed login for {}.", user.username);
        return Err(invalid());
    }

    let role = user.role()?;
    if role == Role::Player && !user.is_approved() {
        return Err(ServiceError::forbidden("Your account is pending approval."));
    }

    let token = issue_token(user.id, &user.username, role, config)?;
    info!("{} {} logged in.", role.as_str(), user.username);

    Ok(TokenResponse {
        token,
        token_type: "Bearer".to_string(),
        username: user.username,
        role,
        redirect: role.dashboard_path().to_string(),
    })
}

async fn coach_dashboard(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
) -> Result<CoachDashboard, ServiceError> {
    user.require(Role::Coach)?;
    let coach = Coach::get_by_user_id(pool, user.id).await?;

    Ok(CoachDashboard {
        pending_players: Player::get_records_by_status(pool, STATUS_PENDING).await?,
        today_matches: Match::get_records_on(pool, today()).await?,
        pending_approvals: Match::get_pending_for_coach(pool, coach.id).await?,
        coach,
    })
}

async fn player_dashboard(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
) -> Result<PlayerDashboard, ServiceError> {
    user.require(Role::Player)?;
    Ok(PlayerDashboard {
        player: Player::get_by_user_id(pool, user.id).await?,
        matches: Match::get_all(pool).await?,
    })
}

async fn update_profile(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    req: ProfileRequest,
) -> Result<Player, ServiceError> {
    user.require(Role::Player)?;
    req.validate()?;
    let player = Player::get_by_user_id(pool, user.id).await?;
    Player::update_profile(pool, player.id, &req.into(), today()).await
}

async fn view_player(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<PlayerView, ServiceError> {
    user.require(Role::Coach)?;
    let player = Player::get_by_id(pool, id).await?;
    let stats = PlayerStats::get_by_player(pool, id).await?;
    Ok(PlayerView {
        player,
        stats: CareerStats::from(stats),
    })
}

pub struct AccountApi;

#[OpenApi]
impl AccountApi {
    /// Call `/api/v1/auth/register` with a json payload to register a player or a coach.
    #[oai(
        path = "/api/v1/auth/register",
        method = "post",
        tag = "ApiTags::Accounts",
        operation_id = "register"
    )]
    async fn register(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        payload: Json<RegisterRequest>,
    ) -> PostResponse<User> {
        let pool_arc = pool.clone();
        register_account(&pool_arc, payload.0).await.into()
    }

    /// Call `/api/v1/auth/login` with a username (or email) and a password to get a bearer token.
    #[oai(
        path = "/api/v1/auth/login",
        method = "post",
        tag = "ApiTags::Accounts",
        operation_id = "login"
    )]
    async fn login(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        config: Data<&Arc<AppConfig>>,
        payload: Json<LoginRequest>,
    ) -> GetRecordResponse<TokenResponse> {
        let pool_arc = pool.clone();
        login_user(&pool_arc, &config, payload.0).await.into()
    }

    /// Call `/api/v1/auth/me` to fetch the logged in user.
    #[oai(
        path = "/api/v1/auth/me",
        method = "get",
        tag = "ApiTags::Accounts",
        operation_id = "fetchCurrentUser"
    )]
    async fn fetch_current_user(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<User> {
        let pool_arc = pool.clone();
        User::get_by_id(&pool_arc, token.0.id).await.into()
    }

    #[oai(
        path = "/api/v1/coach/dashboard",
        method = "get",
        tag = "ApiTags::Accounts",
        operation_id = "fetchCoachDashboard"
    )]
    async fn fetch_coach_dashboard(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<CoachDashboard> {
        let pool_arc = pool.clone();
        coach_dashboard(&pool_arc, &token.0).await.into()
    }

    #[oai(
        path = "/api/v1/player/dashboard",
        method = "get",
        tag = "ApiTags::Accounts",
        operation_id = "fetchPlayerDashboard"
    )]
    async fn fetch_player_dashboard(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<PlayerDashboard> {
        let pool_arc = pool.clone();
        player_dashboard(&pool_arc, &token.0).await.into()
    }

    /// Call `/api/v1/player/profile` to fetch the profile of the logged in player.
    #[oai(
        path = "/api/v1/player/profile",
        method = "get",
        tag = "ApiTags::Accounts",
        operation_id = "fetchPlayerProfile"
    )]
    async fn fetch_player_profile(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Player> {
        if let Err(e) = token.0.require(Role::Player) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        Player::get_by_user_id(&pool_arc, token.0.id).await.into()
    }

    /// Call `/api/v1/player/profile` with a json payload to edit the profile. A date of birth also updates the age and the batch.
    #[oai(
        path = "/api/v1/player/profile",
        method = "put",
        tag = "ApiTags::Accounts",
        operation_id = "updatePlayerProfile"
    )]
    async fn update_player_profile(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
        payload: Json<ProfileRequest>,
    ) -> GetRecordResponse<Player> {
        let pool_arc = pool.clone();
        update_profile(&pool_arc, &token.0, payload.0).await.into()
    }

    /// Call `/api/v1/coach/players` to fetch all the approved players.
    #[oai(
        path = "/api/v1/coach/players",
        method = "get",
        tag = "ApiTags::Accounts",
        operation_id = "fetchPlayers"
    )]
    async fn fetch_players(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<Player>> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        Player::get_records_by_status(&pool_arc, STATUS_APPROVED)
            .await
            .into()
    }

    #[oai(
        path = "/api/v1/coach/players/:id",
        method = "get",
        tag = "ApiTags::Accounts",
        operation_id = "fetchPlayer"
    )]
    async fn fetch_player(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<PlayerView> {
        let pool_arc = pool.clone();
        view_player(&pool_arc, &token.0, id.0).await.into()
    }

    /// Call `/api/v1/coach/players/:id/stats` to fetch the career stats of a player with the derived averages.
    #[oai(
        path = "/api/v1/coach/players/:id/stats",
        method = "get",
        tag = "ApiTags::Accounts",
        operation_id = "fetchPlayerStats"
    )]
    async fn fetch_player_stats(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<CareerStats> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        PlayerStats::get_by_player(&pool_arc, id.0)
            .await
            .map(CareerStats::from)
            .into()
    }

    #[oai(
        path = "/api/v1/coach/players/:id/approve",
        method = "post",
        tag = "ApiTags::Accounts",
        operation_id = "approvePlayer"
    )]
    async fn approve_player(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Player> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        Player::approve(&pool_arc, id.0, today()).await.into()
    }

    #[oai(
        path = "/api/v1/batches",
        method = "get",
        tag = "ApiTags::Accounts",
        operation_id = "fetchBatches"
    )]
    async fn fetch_batches(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        _token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<Batch>> {
        let pool_arc = pool.clone();
        Batch::get_records(&pool_arc).await.into()
    }

    /// Call `/api/v1/batches` with a json payload to create an age batch, or update the ages of an existing one.
    #[oai(
        path = "/api/v1/batches",
        method = "post",
        tag = "ApiTags::Accounts",
        operation_id = "createBatch"
    )]
    async fn create_batch(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
        payload: Json<NewBatchRequest>,
    ) -> PostResponse<Batch> {
        if let Err(e) = token.0.require(Role::Coach) {
            return PostResponse::from_error(e);
        }
        if let Err(e) = payload.validate() {
            return PostResponse::from_error(e.into());
        }

        let pool_arc = pool.clone();
        Batch::insert(&pool_arc, payload.name.trim(), payload.min_age, payload.max_age)
            .await
            .into()
    }
}
