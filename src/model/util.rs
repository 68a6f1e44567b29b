//! Utility functions and the error type shared by the model module.

use chrono::{Datelike, NaiveDate};
use custom_error::custom_error;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    pub static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
}

custom_error! {pub ServiceError
    NotFound{entity: String, id: i64} = "{entity} {id} not found",
    Forbidden{reason: String} = "{reason}",
    Invalid{reason: String} = "{reason}",
    Conflict{reason: String} = "{reason}",
    Gateway{reason: String} = "Payment gateway error: {reason}",
    Render{reason: String} = "Failed to render the document: {reason}",
    Database{source: sqlx::Error} = "Database error: {source}"
}

impl ServiceError {
    pub fn not_found(entity: &str, id: i64) -> Self {
        ServiceError::NotFound {
            entity: entity.to_string(),
            id,
        }
    }

    pub fn forbidden(reason: &str) -> Self {
        ServiceError::Forbidden {
            reason: reason.to_string(),
        }
    }

    pub fn invalid(reason: &str) -> Self {
        ServiceError::Invalid {
            reason: reason.to_string(),
        }
    }

    pub fn conflict(reason: &str) -> Self {
        ServiceError::Conflict {
            reason: reason.to_string(),
        }
    }
}

/// Postgres error code for a unique index violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Report a unique index violation as `reason`, any other database error as it is.
pub fn unique_violation_as(err: sqlx::Error, reason: &str) -> ServiceError {
    let is_unique = err
        .as_database_error()
        .and_then(|e| e.code())
        .map_or(false, |code| code == UNIQUE_VIOLATION);

    if is_unique {
        ServiceError::invalid(reason)
    } else {
        ServiceError::Database { source: err }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::Invalid {
            reason: errors.to_string(),
        }
    }
}

/// Whole years between the date of birth and `today`.
pub fn calculate_age(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age.max(0)
}

/// Ratio rounded to two decimals, `None` for a zero denominator.
pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some((numerator / denominator * 100.0).round() / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[derive(Debug)]
    struct PgError(&'static str);

    impl std::fmt::Display for PgError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "pg error {}", self.0)
        }
    }

    impl std::error::Error for PgError {}

    impl sqlx::error::DatabaseError for PgError {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn test_unique_violation_as() {
        let reason = "Username or Email already exists.";

        let err = unique_violation_as(sqlx::Error::Database(Box::new(PgError("23505"))), reason);
        assert!(matches!(err, ServiceError::Invalid { .. }));
        assert_eq!(err.to_string(), reason);

        let err = unique_violation_as(sqlx::Error::Database(Box::new(PgError("23503"))), reason);
        assert!(matches!(err, ServiceError::Database { .. }));

        let err = unique_violation_as(sqlx::Error::RowNotFound, reason);
        assert!(matches!(err, ServiceError::Database { .. }));
    }

    #[test]
    fn test_calculate_age() {
        let dob = NaiveDate::from_ymd_opt(2008, 6, 15).unwrap();
        let before_birthday = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let on_birthday = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        assert_eq!(calculate_age(dob, before_birthday), 15);
        assert_eq!(calculate_age(dob, on_birthday), 16);
        assert_eq!(calculate_age(on_birthday, dob), 0);
    }

    #[test]
    fn test_safe_ratio() {
        assert_eq!(safe_ratio(45.0, 30.0), Some(1.5));
        assert_eq!(safe_ratio(10.0, 3.0), Some(3.33));
        assert_eq!(safe_ratio(10.0, 0.0), None);
    }

    #[test]
    fn test_service_error_messages() {
        assert_eq!(
            ServiceError::not_found("Match", 7).to_string(),
            "Match 7 not found"
        );
        assert_eq!(
            ServiceError::invalid("Select at least 11 players").to_string(),
            "Select at least 11 players"
        );
        assert!(USERNAME_REGEX.is_match("virat_18"));
        assert!(!USERNAME_REGEX.is_match("virat kohli"));
    }
}
