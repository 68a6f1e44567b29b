//! Nutrition groups and daily intake logs.

use super::util::ServiceError;
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct NutritionGroup {
    pub id: i64,
    pub name: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl NutritionGroup {
    pub async fn insert(
        pool: &sqlx::PgPool,
        name: &str,
        created_by: i64,
    ) -> Result<NutritionGroup, ServiceError> {
        let name = name.trim();
        if name.is_empty() || name.len() > 100 {
            return Err(ServiceError::invalid(
                "The group name should be 1-100 characters.",
            ));
        }

        let record = sqlx::query_as::<_, NutritionGroup>(
            "INSERT INTO cricpro_nutrition_group (name, created_by) VALUES ($1, $2) RETURNING *",
        )
        .bind(name)
        .bind(created_by)
        .fetch_one(pool)
        .await?;

        info!("Nutrition group {} ({}) created.", record.id, record.name);
        Ok(record)
    }

    pub async fn get_by_id(pool: &sqlx::PgPool, id: i64) -> Result<NutritionGroup, ServiceError> {
        sqlx::query_as::<_, NutritionGroup>("SELECT * FROM cricpro_nutrition_group WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Nutrition group", id))
    }

    pub async fn get_records_by_creator(
        pool: &sqlx::PgPool,
        user_id: i64,
    ) -> Result<Vec<NutritionGroup>, ServiceError> {
        let records = sqlx::query_as::<_, NutritionGroup>(
            "SELECT * FROM cricpro_nutrition_group WHERE created_by = $1 ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn get_records_by_member(
        pool: &sqlx::PgPool,
        user_id: i64,
    ) -> Result<Vec<NutritionGroup>, ServiceError> {
        let records = sqlx::query_as::<_, NutritionGroup>(
            "SELECT g.* FROM cricpro_nutrition_group g
             JOIN cricpro_nutrition_group_member m ON m.group_id = g.id
             WHERE m.user_id = $1 ORDER BY g.id ASC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn add_member(&self, pool: &sqlx::PgPool, user_id: i64) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO cricpro_nutrition_group_member (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(self.id)
        .bind(user_id)
        .execute(pool)
        .await?;

        info!("User {} joined nutrition group {}.", user_id, self.id);
        Ok(())
    }

    pub async fn is_member(&self, pool: &sqlx::PgPool, user_id: i64) -> Result<bool, ServiceError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM cricpro_nutrition_group_member WHERE group_id = $1 AND user_id = $2",
        )
        .bind(self.id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count.0 > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct LogItemEntry {
    pub food_id: i64,
    #[validate(range(min = 0.0))]
    #[serde(default = "default_quantity")]
    #[oai(default = "default_quantity")]
    pub quantity: f64,
    /// Per unit of quantity.
    #[validate(range(min = 0.0))]
    #[serde(default)]
    #[oai(default)]
    pub calories: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    #[oai(default)]
    pub protein: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    #[oai(default)]
    pub carbs: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    #[oai(default)]
    pub fat: f64,
}

fn default_quantity() -> f64 {
    1.0
}

impl LogItemEntry {
    /// Macros for the whole quantity.
    pub fn scaled(&self) -> Macros {
        Macros {
            calories: self.calories * self.quantity,
            protein: self.protein * self.quantity,
            carbs: self.carbs * self.quantity,
            fat: self.fat * self.quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Macros {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

pub fn compute_totals(items: &[LogItemEntry]) -> Macros {
    items.iter().map(|i| i.scaled()).fold(Macros::default(), |acc, m| Macros {
        calories: acc.calories + m.calories,
        protein: acc.protein + m.protein,
        carbs: acc.carbs + m.carbs,
        fat: acc.fat + m.fat,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, Validate)]
pub struct NewNutritionLog {
    #[oai(skip_serializing_if_is_none)]
    pub log_date: Option<NaiveDate>,
    #[validate]
    pub items: Vec<LogItemEntry>,
}

impl NewNutritionLog {
    pub fn check(&self) -> Result<(), ServiceError> {
        if self.items.is_empty() {
            return Err(ServiceError::invalid("A log needs at least one item."));
        }
        self.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct NutritionLog {
    pub id: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub log_date: NaiveDate,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub created_at: DateTime<Utc>,
}

impl NutritionLog {
    pub async fn insert(
        pool: &sqlx::PgPool,
        user_id: i64,
        group_id: i64,
        new_log: &NewNutritionLog,
        today: NaiveDate,
    ) -> Result<NutritionLog, ServiceError> {
        new_log.check()?;
        let totals = compute_totals(&new_log.items);

        let mut tx = pool.begin().await?;
        let record = sqlx::query_as::<_, NutritionLog>(
            "INSERT INTO cricpro_nutrition_log (user_id, group_id, log_date, total_calories, total_protein, total_carbs, total_fat)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(user_id)
        .bind(group_id)
        .bind(new_log.log_date.unwrap_or(today))
        .bind(totals.calories)
        .bind(totals.protein)
        .bind(totals.carbs)
        .bind(totals.fat)
        .fetch_one(&mut tx)
        .await?;

        for item in &new_log.items {
            let m = item.scaled();
            sqlx::query(
                "INSERT INTO cricpro_nutrition_log_item (log_id, food_id, quantity, calories, protein, carbs, fat)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(record.id)
            .bind(item.food_id)
            .bind(item.quantity)
            .bind(m.calories)
            .bind(m.protein)
            .bind(m.carbs)
            .bind(m.fat)
            .execute(&mut tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            "Nutrition log {} with {} items saved for user {}.",
            record.id,
            new_log.items.len(),
            user_id
        );
        Ok(record)
    }

    pub async fn get_records_by_user(
        pool: &sqlx::PgPool,
        user_id: i64,
    ) -> Result<Vec<NutritionLog>, ServiceError> {
        let records = sqlx::query_as::<_, NutritionLog>(
            "SELECT * FROM cricpro_nutrition_log WHERE user_id = $1 ORDER BY log_date DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn get_records_by_group(
        pool: &sqlx::PgPool,
        group_id: i64,
    ) -> Result<Vec<NutritionLog>, ServiceError> {
        let records = sqlx::query_as::<_, NutritionLog>(
            "SELECT * FROM cricpro_nutrition_log WHERE group_id = $1 ORDER BY log_date DESC, id DESC",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: f64, calories: f64, protein: f64) -> LogItemEntry {
        LogItemEntry {
            food_id: 1,
            quantity,
            calories,
            protein,
            carbs: 10.0,
            fat: 1.5,
        }
    }

    #[test]
    fn test_compute_totals() {
        let totals = compute_totals(&[item(2.0, 120.0, 5.0), item(0.5, 300.0, 20.0)]);
        assert_eq!(totals.calories, 390.0);
        assert_eq!(totals.protein, 20.0);
        assert_eq!(totals.carbs, 25.0);
        assert_eq!(totals.fat, 3.75);

        assert_eq!(compute_totals(&[]), Macros::default());
    }

    #[test]
    fn test_new_log_validation() {
        let log: NewNutritionLog =
            serde_json::from_str(r#"{"items": [{"food_id": 4, "calories": 95.0}]}"#).unwrap();
        assert!(log.check().is_ok());
        assert_eq!(log.items[0].quantity, 1.0);

        let empty = NewNutritionLog {
            log_date: None,
            items: vec![],
        };
        assert!(empty.check().is_err());

        let negative = NewNutritionLog {
            log_date: None,
            items: vec![item(-1.0, 10.0, 1.0)],
        };
        assert!(negative.check().is_err());
    }
}
