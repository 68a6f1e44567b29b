//! Pre-match availability polls, match fee payments and the Razorpay client.

use super::util::ServiceError;
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use validator::Validate;

pub const RAZORPAY_API: &str = "https://api.razorpay.com/v1";
pub const CURRENCY: &str = "INR";

pub const METHOD_RAZORPAY: &str = "razorpay";
pub const METHOD_CASH: &str = "cash";

pub const PAYMENT_PENDING: &str = "pending";
pub const PAYMENT_PAID: &str = "paid";
pub const PAYMENT_CASH_PENDING: &str = "cash_pending";
pub const PAYMENT_CASH_APPROVED: &str = "cash_approved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
    Maybe,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Unavailable => "unavailable",
            Availability::Maybe => "maybe",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct PreMatchAvailability {
    pub id: i64,
    pub session_id: i64,
    pub title: String,
    pub match_date: NaiveDate,
    pub venue: String,
    pub amount_paise: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct NewAvailability {
    pub session_id: i64,
    #[validate(length(min = 1, max = 150, message = "The title should be 1-150 characters."))]
    pub title: String,
    pub match_date: NaiveDate,
    #[validate(length(min = 1, max = 120, message = "The venue should be 1-120 characters."))]
    pub venue: String,
    /// Match fee in paise.
    #[validate(range(min = 1, message = "The amount should be greater than 0."))]
    pub amount_paise: i64,
}

impl PreMatchAvailability {
    pub async fn insert(
        pool: &sqlx::PgPool,
        coach_user_id: i64,
        new_availability: &NewAvailability,
    ) -> Result<PreMatchAvailability, ServiceError> {
        new_availability.validate()?;

        let record = sqlx::query_as::<_, PreMatchAvailability>(
            "INSERT INTO cricpro_pre_match_availability (session_id, title, match_date, venue, amount_paise, user_id)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(new_availability.session_id)
        .bind(&new_availability.title)
        .bind(new_availability.match_date)
        .bind(&new_availability.venue)
        .bind(new_availability.amount_paise)
        .bind(coach_user_id)
        .fetch_one(pool)
        .await?;

        info!("Availability poll {} ({}) created.", record.id, record.title);
        Ok(record)
    }

    pub async fn get_by_id(
        pool: &sqlx::PgPool,
        id: i64,
    ) -> Result<PreMatchAvailability, ServiceError> {
        sqlx::query_as::<_, PreMatchAvailability>(
            "SELECT * FROM cricpro_pre_match_availability WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Availability", id))
    }

    pub async fn get_records(
        pool: &sqlx::PgPool,
    ) -> Result<Vec<PreMatchAvailability>, ServiceError> {
        let records = sqlx::query_as::<_, PreMatchAvailability>(
            "SELECT * FROM cricpro_pre_match_availability ORDER BY match_date ASC, id ASC",
        )
        .fetch_all(pool)
        .await?;
        Ok(records)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct PreMatchResponse {
    pub id: i64,
    pub availability_id: i64,
    pub user_id: i64,
    pub status: String,
    pub responded_at: DateTime<Utc>,
}

impl PreMatchResponse {
    /// One answer per player and poll, a new answer replaces the old one.
    pub async fn upsert(
        pool: &sqlx::PgPool,
        availability_id: i64,
        user_id: i64,
        status: Availability,
    ) -> Result<PreMatchResponse, ServiceError> {
        let record = sqlx::query_as::<_, PreMatchResponse>(
            "INSERT INTO cricpro_pre_match_response (availability_id, user_id, status) VALUES ($1, $2, $3)
             ON CONFLICT (availability_id, user_id) DO UPDATE SET status = EXCLUDED.status, responded_at = now()
             RETURNING *",
        )
        .bind(availability_id)
        .bind(user_id)
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    pub async fn get_records(
        pool: &sqlx::PgPool,
        availability_id: i64,
    ) -> Result<Vec<PreMatchResponse>, ServiceError> {
        let records = sqlx::query_as::<_, PreMatchResponse>(
            "SELECT * FROM cricpro_pre_match_response WHERE availability_id = $1 ORDER BY responded_at ASC",
        )
        .bind(availability_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn is_available(
        pool: &sqlx::PgPool,
        availability_id: i64,
        user_id: i64,
    ) -> Result<bool, ServiceError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM cricpro_pre_match_response WHERE availability_id = $1 AND user_id = $2 AND status = $3",
        )
        .bind(availability_id)
        .bind(user_id)
        .bind(Availability::Available.as_str())
        .fetch_one(pool)
        .await?;
        Ok(count.0 > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct MatchPayment {
    pub id: i64,
    pub availability_id: i64,
    pub user_id: i64,
    pub amount_paise: i64,
    pub payment_method: String,
    pub payment_status: String,
    #[oai(skip_serializing_if_is_none)]
    pub razorpay_order_id: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub razorpay_payment_id: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub razorpay_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchPayment {
    pub async fn has_paid(
        pool: &sqlx::PgPool,
        availability_id: i64,
        user_id: i64,
    ) -> Result<bool, ServiceError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM cricpro_match_payment WHERE availability_id = $1 AND user_id = $2 AND payment_status = $3",
        )
        .bind(availability_id)
        .bind(user_id)
        .bind(PAYMENT_PAID)
        .fetch_one(pool)
        .await?;
        Ok(count.0 > 0)
    }

    pub async fn insert(
        pool: &sqlx::PgPool,
        availability: &PreMatchAvailability,
        user_id: i64,
        method: &str,
        status: &str,
        order_id: Option<&str>,
    ) -> Result<MatchPayment, ServiceError> {
        let record = sqlx::query_as::<_, MatchPayment>(
            "INSERT INTO cricpro_match_payment (availability_id, user_id, amount_paise, payment_method, payment_status, razorpay_order_id)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(availability.id)
        .bind(user_id)
        .bind(availability.amount_paise)
        .bind(method)
        .bind(status)
        .bind(order_id)
        .fetch_one(pool)
        .await?;

        info!(
            "Payment {} ({}, {}) recorded for user {}.",
            record.id, method, status, user_id
        );
        Ok(record)
    }

    /// Store the gateway ids of a verified payment and mark it paid.
    pub async fn mark_paid(
        pool: &sqlx::PgPool,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<MatchPayment, ServiceError> {
        let record = sqlx::query_as::<_, MatchPayment>(
            "UPDATE cricpro_match_payment SET razorpay_payment_id = $1, razorpay_signature = $2, payment_status = $3, updated_at = now()
             WHERE razorpay_order_id = $4 RETURNING *",
        )
        .bind(payment_id)
        .bind(signature)
        .bind(PAYMENT_PAID)
        .bind(order_id)
        .fetch_optional(pool)
        .await?;

        match record {
            Some(r) => Ok(r),
            None => Err(ServiceError::NotFound {
                entity: format!("Payment for order {}", order_id),
                id: 0,
            }),
        }
    }

    pub async fn approve_cash(pool: &sqlx::PgPool, id: i64) -> Result<MatchPayment, ServiceError> {
        let current = sqlx::query_as::<_, MatchPayment>(
            "SELECT * FROM cricpro_match_payment WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Payment", id))?;

        if current.payment_status != PAYMENT_CASH_PENDING {
            return Err(ServiceError::invalid(&format!(
                "Only cash payments waiting for approval can be approved, the payment is {}.",
                current.payment_status
            )));
        }

        let record = sqlx::query_as::<_, MatchPayment>(
            "UPDATE cricpro_match_payment SET payment_status = $1, updated_at = now() WHERE id = $2 AND payment_status = $3 RETURNING *",
        )
        .bind(PAYMENT_CASH_APPROVED)
        .bind(id)
        .bind(PAYMENT_CASH_PENDING)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::conflict("The payment was changed by someone else."))?;

        info!("Cash payment {} approved.", id);
        Ok(record)
    }

    pub async fn get_records_by_user(
        pool: &sqlx::PgPool,
        user_id: i64,
    ) -> Result<Vec<MatchPayment>, ServiceError> {
        let records = sqlx::query_as::<_, MatchPayment>(
            "SELECT * FROM cricpro_match_payment WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn get_records(pool: &sqlx::PgPool) -> Result<Vec<MatchPayment>, ServiceError> {
        let records = sqlx::query_as::<_, MatchPayment>(
            "SELECT * FROM cricpro_match_payment ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(pool)
        .await?;
        Ok(records)
    }
}

/// The part of a Razorpay order we keep.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

pub struct RazorpayClient {
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(key_id: &str, key_secret: &str) -> Self {
        RazorpayClient {
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            base_url: RAZORPAY_API.to_string(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub async fn create_order(&self, amount_paise: i64) -> Result<RazorpayOrder, anyhow::Error> {
        let url = format!("{}/orders", self.base_url);
        debug!("Creating a razorpay order of {} paise.", amount_paise);

        let client = reqwest::Client::new();
        let res = client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({
                "amount": amount_paise,
                "currency": CURRENCY,
                "payment_capture": 1,
            }))
            .send()
            .await?;

        if res.status().is_success() {
            let order: RazorpayOrder = res.json().await?;
            info!("Razorpay order {} created.", order.id);
            Ok(order)
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Razorpay rejected the order: {} {}", status, body);
            Err(anyhow::anyhow!(
                "Failed to create the order ({}): {}",
                status,
                body
            ))
        }
    }
}

type HmacSha256 = Hmac<Sha256>;

pub fn payment_signature(
    order_id: &str,
    payment_id: &str,
    key_secret: &str,
) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(key_secret.as_bytes())
        .map_err(|e| ServiceError::invalid(&e.to_string()))?;
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check the signature Razorpay returns to the checkout against HMAC-SHA256("order_id|payment_id").
pub fn verify_payment_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    key_secret: &str,
) -> bool {
    let expected = match hex::decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(key_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_payment_signature() {
        let secret = "rzp_test_secret";
        let signature = payment_signature("order_N5a", "pay_29Q", secret).unwrap();
        assert_eq!(signature.len(), 64);

        assert!(verify_payment_signature("order_N5a", "pay_29Q", &signature, secret));
        assert!(!verify_payment_signature("order_N5a", "pay_29R", &signature, secret));
        assert!(!verify_payment_signature("order_N5a", "pay_29Q", &signature, "other"));
        assert!(!verify_payment_signature("order_N5a", "pay_29Q", "not-hex", secret));
        assert!(!verify_payment_signature("order_N5a", "pay_29Q", "", secret));
    }

    #[test]
    fn test_new_availability_validation() {
        let mut poll = NewAvailability {
            session_id: 3,
            title: "Sunday nets".to_string(),
            match_date: NaiveDate::from_ymd_opt(2024, 10, 6).unwrap(),
            venue: "Club ground".to_string(),
            amount_paise: 25000,
        };
        assert!(poll.validate().is_ok());

        poll.amount_paise = 0;
        assert!(poll.validate().is_err());
    }

    #[test]
    fn test_availability_as_str() {
        assert_eq!(Availability::Available.as_str(), "available");
        assert_eq!(Availability::Maybe.as_str(), "maybe");
    }

    #[test]
    fn test_razorpay_order_from_json() {
        let order: RazorpayOrder = serde_json::from_str(
            r#"{"id": "order_IluGWxBm9U8zJ8", "entity": "order", "amount": 50000, "currency": "INR", "status": "created"}"#,
        )
        .unwrap();
        assert_eq!(order.id, "order_IluGWxBm9U8zJ8");
        assert_eq!(order.amount, 50000);

        let client = RazorpayClient::new("rzp_test_key", "secret");
        assert_eq!(client.key_id(), "rzp_test_key");
    }
}
