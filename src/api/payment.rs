//! Availability polls and match fee routes, paid through Razorpay or in cash.

use super::auth::{CurrentUser, CustomSecurityScheme};
use super::req::{PaymentSuccessRequest, RespondRequest};
use super::schema::{ApiTags, GetRecordResponse, OrderCreated, PaymentPage, PostResponse};
use crate::model::core::Role;
use crate::model::payment::{
    verify_payment_signature, MatchPayment, NewAvailability, PreMatchAvailability,
    PreMatchResponse, RazorpayClient, METHOD_CASH, METHOD_RAZORPAY, PAYMENT_CASH_PENDING,
    PAYMENT_PENDING,
};
use crate::model::util::ServiceError;
use crate::AppConfig;
use log::{error, info};
use poem::web::Data;
use poem_openapi::{param::Path, payload::Json, OpenApi};
use std::sync::Arc;

fn gateway(config: &AppConfig) -> Result<(&str, &str), ServiceError> {
    match (&config.razorpay_key_id, &config.razorpay_key_secret) {
        (Some(key_id), Some(key_secret)) => Ok((key_id.as_str(), key_secret.as_str())),
        _ => {
            error!("RAZORPAY_KEY_ID or RAZORPAY_KEY_SECRET is not set.");
            Err(ServiceError::Gateway {
                reason: "the payment gateway is not configured".to_string(),
            })
        }
    }
}

/// The poll, provided the player answered that they are available.
async fn payable_availability(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<PreMatchAvailability, ServiceError> {
    user.require(Role::Player)?;
    let availability = PreMatchAvailability::get_by_id(pool, id).await?;
    if !PreMatchResponse::is_available(pool, id, user.id).await? {
        return Err(ServiceError::NotFound {
            entity: "Available response for availability".to_string(),
            id,
        });
    }
    Ok(availability)
}

async fn payment_page(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<PaymentPage, ServiceError> {
    let availability = payable_availability(pool, user, id).await?;
    let already_paid = MatchPayment::has_paid(pool, id, user.id).await?;
    Ok(PaymentPage {
        availability,
        already_paid,
    })
}

async fn create_order(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    user: &CurrentUser,
    id: i64,
) -> Result<OrderCreated, ServiceError> {
    let availability = payable_availability(pool, user, id).await?;
    if MatchPayment::has_paid(pool, id, user.id).await? {
        return Err(ServiceError::invalid("Already paid"));
    }

    let (key_id, key_secret) = gateway(config)?;
    let client = RazorpayClient::new(key_id, key_secret);
    let order = client
        .create_order(availability.amount_paise)
        .await
        .map_err(|e| ServiceError::Gateway {
            reason: e.to_string(),
        })?;

    MatchPayment::insert(
        pool,
        &availability,
        user.id,
        METHOD_RAZORPAY,
        PAYMENT_PENDING,
        Some(&order.id),
    )
    .await?;

    Ok(OrderCreated {
        order_id: order.id,
        amount: order.amount,
        key: client.key_id().to_string(),
    })
}

async fn confirm_payment(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    req: PaymentSuccessRequest,
) -> Result<MatchPayment, ServiceError> {
    let (_, key_secret) = gateway(config)?;
    if !verify_payment_signature(
        &req.razorpay_order_id,
        &req.razorpay_payment_id,
        &req.razorpay_signature,
        key_secret,
    ) {
        return Err(ServiceError::invalid("Payment verification failed."));
    }

    let record = MatchPayment::mark_paid(
        pool,
        &req.razorpay_order_id,
        &req.razorpay_payment_id,
        &req.razorpay_signature,
    )
    .await?;
    info!(
        "Payment {} for order {} is paid.",
        record.id, req.razorpay_order_id
    );
    Ok(record)
}

async fn pay_in_cash(
    pool: &sqlx::PgPool,
    user: &CurrentUser,
    id: i64,
) -> Result<MatchPayment, ServiceError> {
    let availability = payable_availability(pool, user, id).await?;
    if MatchPayment::has_paid(pool, id, user.id).await? {
        return Err(ServiceError::invalid("Already paid"));
    }

    MatchPayment::insert(
        pool,
        &availability,
        user.id,
        METHOD_CASH,
        PAYMENT_CASH_PENDING,
        None,
    )
    .await
}

pub struct PaymentApi;

#[OpenApi]
impl PaymentApi {
    /// Call `/api/v1/availability` with a json payload to open an availability poll with a match fee in paise.
    #[oai(
        path = "/api/v1/availability",
        method = "post",
        tag = "ApiTags::Payments",
        operation_id = "createAvailability"
    )]
    async fn create_availability(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
        payload: Json<NewAvailability>,
    ) -> PostResponse<PreMatchAvailability> {
        if let Err(e) = token.0.require(Role::Coach) {
            return PostResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        PreMatchAvailability::insert(&pool_arc, token.0.id, &payload.0)
            .await
            .into()
    }

    #[oai(
        path = "/api/v1/availability",
        method = "get",
        tag = "ApiTags::Payments",
        operation_id = "fetchAvailabilities"
    )]
    async fn fetch_availabilities(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        _token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<PreMatchAvailability>> {
        let pool_arc = pool.clone();
        PreMatchAvailability::get_records(&pool_arc).await.into()
    }

    /// Call `/api/v1/availability/:id/respond` to answer a poll. A new answer replaces the previous one.
    #[oai(
        path = "/api/v1/availability/:id/respond",
        method = "post",
        tag = "ApiTags::Payments",
        operation_id = "respondAvailability"
    )]
    async fn respond_availability(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
        payload: Json<RespondRequest>,
    ) -> GetRecordResponse<PreMatchResponse> {
        if let Err(e) = token.0.require(Role::Player) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        if let Err(e) = PreMatchAvailability::get_by_id(&pool_arc, id.0).await {
            return GetRecordResponse::from_error(e);
        }
        PreMatchResponse::upsert(&pool_arc, id.0, token.0.id, payload.status)
            .await
            .into()
    }

    #[oai(
        path = "/api/v1/availability/:id/responses",
        method = "get",
        tag = "ApiTags::Payments",
        operation_id = "fetchAvailabilityResponses"
    )]
    async fn fetch_responses(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<PreMatchResponse>> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        PreMatchResponse::get_records(&pool_arc, id.0).await.into()
    }

    /// Call `/api/v1/payments/:id` to fetch the fee of a poll the player is available for.
    #[oai(
        path = "/api/v1/payments/:id",
        method = "get",
        tag = "ApiTags::Payments",
        operation_id = "fetchPaymentPage"
    )]
    async fn fetch_payment_page(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<PaymentPage> {
        let pool_arc = pool.clone();
        payment_page(&pool_arc, &token.0, id.0).await.into()
    }

    /// Call `/api/v1/payments/:id/order` to create a Razorpay order for the match fee.
    #[oai(
        path = "/api/v1/payments/:id/order",
        method = "post",
        tag = "ApiTags::Payments",
        operation_id = "createPaymentOrder"
    )]
    async fn create_payment_order(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        config: Data<&Arc<AppConfig>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> PostResponse<OrderCreated> {
        let pool_arc = pool.clone();
        create_order(&pool_arc, &config, &token.0, id.0).await.into()
    }

    /// Call `/api/v1/payments/success` with the ids and the signature the Razorpay checkout returns.
    #[oai(
        path = "/api/v1/payments/success",
        method = "post",
        tag = "ApiTags::Payments",
        operation_id = "confirmPayment"
    )]
    async fn confirm_payment(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        config: Data<&Arc<AppConfig>>,
        _token: CustomSecurityScheme,
        payload: Json<PaymentSuccessRequest>,
    ) -> GetRecordResponse<MatchPayment> {
        let pool_arc = pool.clone();
        confirm_payment(&pool_arc, &config, payload.0).await.into()
    }

    #[oai(
        path = "/api/v1/payments/:id/cash",
        method = "post",
        tag = "ApiTags::Payments",
        operation_id = "payInCash"
    )]
    async fn pay_in_cash(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> PostResponse<MatchPayment> {
        let pool_arc = pool.clone();
        pay_in_cash(&pool_arc, &token.0, id.0).await.into()
    }

    /// Call `/api/v1/payments/cash/:id/approve` with a payment id to confirm the cash was received.
    #[oai(
        path = "/api/v1/payments/cash/:id/approve",
        method = "post",
        tag = "ApiTags::Payments",
        operation_id = "approveCashPayment"
    )]
    async fn approve_cash_payment(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        id: Path<i64>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<MatchPayment> {
        if let Err(e) = token.0.require(Role::Coach) {
            return GetRecordResponse::from_error(e);
        }
        let pool_arc = pool.clone();
        MatchPayment::approve_cash(&pool_arc, id.0).await.into()
    }

    /// Call `/api/v1/payments` to fetch the payment history, newest first. Coaches see every payment.
    #[oai(
        path = "/api/v1/payments",
        method = "get",
        tag = "ApiTags::Payments",
        operation_id = "fetchPaymentHistory"
    )]
    async fn fetch_payment_history(
        &self,
        pool: Data<&Arc<sqlx::PgPool>>,
        token: CustomSecurityScheme,
    ) -> GetRecordResponse<Vec<MatchPayment>> {
        let pool_arc = pool.clone();
        match token.0.role {
            Role::Coach => MatchPayment::get_records(&pool_arc).await.into(),
            Role::Player => MatchPayment::get_records_by_user(&pool_arc, token.0.id)
                .await
                .into(),
        }
    }
}
