//! Nutrition group and intake log routes.

use super::auth::{CurrentUser, CustomSecurityScheme};
use super::req::{AddMemberRequest, NewGroupRequest};
use super::schema::{ApiTags, GetRecordResponse, PostResponse, StatusMessage};
use crate::model::core::{Role, User};
use crate::model::nutrition::{NewNutritionLog, NutritionGroup, NutritionLog};
use crate::model::util::ServiceError;
use chrono::Utc;
use poem::web::Data;
use poem_openapi::{param::Path, payload::Json, OpenApi};
use std::sync::Arc;

/// The group, provided the user created it.
async fn owned_group(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<NutritionGroup, ServiceError> {
    user.require(Role::Coach)?;
    let group = NutritionGroup::get_by_id(pool, id).await?;
    if group.created_by != user.id {
        return Err(ServiceError::forbidden(
            "Only the coach who created the group can manage it.",
        ));
    }
    Ok(group)
}

async fn add_member(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
    req: AddMemberRequest,
) -> Result<StatusMessage, ServiceError> {
    let group = owned_group(pool, user, id).await?;
    let member = User::get_by_id(pool, req.user_id).await?;
    group.add_member(pool, member.id).await?;
    Ok(StatusMessage::new(&format!(
        "{} joined {}.",
        member.username, group.name
    )))
}

async fn log_intake(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
    new_log: NewNutritionLog,
) -> Result<NutritionLog, ServiceError> {
    let group = NutritionGroup::get_by_id(pool, id).await?;
    if !group.is_member(pool, user.id).await? {
        return Err(ServiceError::forbidden(
            "Only members of the group can log their intake.",
        ));
    }
    NutritionLog::insert(pool, user.id, group.id, &new_log, Utc::now().date_naive()).await
}

async fn group_logs(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<Vec<NutritionLog>, ServiceError> {
    let group = owned_group(pool, user, id).await?;
    NutritionLog::get_records_by_group(pool, group.id).await
}

pub struct NutritionApi;

#[OpenApi]
impl NutritionApi {
    #[oai(
        path = "/api/v1/nutrition/groups",
        method = "post",
        tag = "ApiTags::Nutrition",
        operation_id = "createNutritionGroup"
    )]
    async fn create_group(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
        payload: Json<NewGroupRequest>,
    ) -> PostResponse<NutritionGroup> {
        if let Err(e) = token.0.require(Role::Coach) {
            return PostResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        NutritionGroup::insert(&pool_arc, &payload.name, token.0.id)
            .await
            .into()
    }

    /// Call `/api/v1/nutrition/groups` to fetch the groups a coach created, or the groups a player belongs to.
    #[oai(
        path = "/api/v1/nutrition/groups",
        method = "get",
        tag = "ApiTags::Nutrition",
        operation_id = "fetchNutritionGroups"
    )]
    async fn fetch_groups(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<NutritionGroup>> {
        let pool_arc = pool.clone();
        match token.0.role {
            Role::Coach => NutritionGroup::get_records_by_creator(&pool_arc, token.0.id)
                .await
                .into(),
            Role::Player => NutritionGroup::get_records_by_member(&pool_arc, token.0.id)
                .await
                .into(),
        }
    }

    #[oai(
        path = "/api/v1/nutrition/groups/:id/members",
        method = "post",
        tag = "ApiTags::Nutrition",
        operation_id = "addNutritionGroupMember"
    )]
    async fn add_group_member(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
        payload: Json<AddMemberRequest>,
    ) -> GetRecordResponse<StatusMessage> {
        let pool_arc = pool.clone();
        add_member(&pool_arc, &token.0, id.0, payload.0).await.into()
    }

    /// Call `/api/v1/nutrition/groups/:id/logs` with the food items eaten. Macros are multiplied by the quantity.
    #[oai(
        path = "/api/v1/nutrition/groups/:id/logs",
        method = "post",
        tag = "ApiTags::Nutrition",
        operation_id = "logNutritionIntake"
    )]
    async fn log_intake(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
        payload: Json<NewNutritionLog>,
    ) -> PostResponse<NutritionLog> {
        if let Err(e) = payload.check() {
            return PostResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        log_intake(&pool_arc, &token.0, id.0, payload.0).await.into()
    }

    #[oai(
        path = "/api/v1/nutrition/groups/:id/logs",
        method = "get",
        tag = "ApiTags::Nutrition",
        operation_id = "fetchGroupNutritionLogs"
    )]
    async fn fetch_group_logs(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<NutritionLog>> {
        let pool_arc = pool.clone();
        group_logs(&pool_arc, &token.0, id.0).await.into()
    }

    #[oai(
        path = "/api/v1/nutrition/logs",
        method = "get",
        tag = "ApiTags::Nutrition",
        operation_id = "fetchMyNutritionLogs"
    )]
    async fn fetch_my_logs(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<NutritionLog>> {
        let pool_arc = pool.clone();
        NutritionLog::get_records_by_user(&pool_arc, token.0.id)
            .await
            .into()
    }
}
