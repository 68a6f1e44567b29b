//! The database schema for accounts: users, players, coaches and age batches. These are the models that will be used to interact with the database.

use super::util::{calculate_age, unique_violation_as, ServiceError};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: u64 = 10;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum Role {
    Player,
    Coach,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Player => "player",
            Role::Coach => "coach",
        }
    }

    /// Coaches are trusted on registration, players wait for a coach.
    pub fn initial_status(&self) -> &'static str {
        match self {
            Role::Player => STATUS_PENDING,
            Role::Coach => STATUS_APPROVED,
        }
    }

    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Player => "/player/dashboard",
            Role::Coach => "/coach/dashboard",
        }
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player" => Ok(Role::Player),
            "coach" => Ok(Role::Coach),
            _ => Err(ServiceError::invalid(&format!("Unknown role: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct RecordResponse<S>
where
    S: poem_openapi::types::ParseFromJSON + poem_openapi::types::ToJSON + Send + Sync,
{
    /// data
    pub records: Vec<S>,
    /// total num
    pub total: u64,
    /// current page index
    pub page: u64,
    /// default 10
    pub page_size: u64,
}

/// Pages past this one are clamped, so the offset always fits an i64.
pub const MAX_PAGE: u64 = 1_000_000;

/// Turn optional page parameters into (page, page_size, limit, offset). Pages start from 1.
pub fn paginate(page: Option<u64>, page_size: Option<u64>) -> (u64, u64, i64, i64) {
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100);
    let offset = (page - 1) * page_size;
    (page, page_size, page_size as i64, offset as i64)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,

    #[serde(skip_serializing)]
    #[oai(skip)]
    pub password_hash: String,

    pub role: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

const DUPLICATE_ACCOUNT: &str = "Username or Email already exists.";

/// Emails are stored lowercased, usernames as they were registered.
pub fn normalize_login(login: &str) -> String {
    let login = login.trim();
    if login.contains('@') {
        login.to_lowercase()
    } else {
        login.to_string()
    }
}

/// An account ready to be stored, the password has already been hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl User {
    pub fn role(&self) -> Result<Role, ServiceError> {
        Role::from_str(&self.role)
    }

    pub fn is_approved(&self) -> bool {
        self.status == STATUS_APPROVED
    }

    pub async fn get_by_id(pool: &sqlx::PgPool, id: i64) -> Result<User, ServiceError> {
        sqlx::query_as::<_, User>("SELECT * FROM cricpro_user WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    /// Users can log in with either their username or their email.
    pub async fn find_by_login(
        pool: &sqlx::PgPool,
        login: &str,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM cricpro_user WHERE username = $1 OR email = $1 LIMIT 1",
        )
        .bind(normalize_login(login))
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Create the user together with its player or coach profile in one transaction.
    pub async fn register(pool: &sqlx::PgPool, account: &NewAccount) -> Result<User, ServiceError> {
        let mut tx = pool.begin().await?;

        let existing: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM cricpro_user WHERE username = $1 OR email = $2",
        )
        .bind(&account.username)
        .bind(&account.email)
        .fetch_one(&mut tx)
        .await?;

        if existing.0 > 0 {
            return Err(ServiceError::invalid(DUPLICATE_ACCOUNT));
        }

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO cricpro_user (username, email, password_hash, role, status) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.role.initial_status())
        .fetch_one(&mut tx)
        .await
        .map_err(|e| unique_violation_as(e, DUPLICATE_ACCOUNT))?;

        let profile_sql = match account.role {
            Role::Player => "INSERT INTO cricpro_player (user_id) VALUES ($1)",
            Role::Coach => "INSERT INTO cricpro_coach (user_id) VALUES ($1)",
        };
        sqlx::query(profile_sql)
            .bind(user.id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;
        info!("Registered {} {} ({}).", user.role, user.username, user.status);

        Ok(user)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct Batch {
    pub id: i64,
    pub name: String,
    pub min_age: i32,
    pub max_age: i32,
}

impl Batch {
    pub fn contains(&self, age: i32) -> bool {
        self.min_age <= age && age <= self.max_age
    }

    pub async fn get_records(pool: &sqlx::PgPool) -> Result<Vec<Batch>, ServiceError> {
        let records = sqlx::query_as::<_, Batch>("SELECT * FROM cricpro_batch ORDER BY min_age ASC")
            .fetch_all(pool)
            .await?;

        Ok(records)
    }

    pub async fn insert(
        pool: &sqlx::PgPool,
        name: &str,
        min_age: i32,
        max_age: i32,
    ) -> Result<Batch, ServiceError> {
        if min_age > max_age {
            return Err(ServiceError::invalid(
                "The min_age of a batch should not be greater than its max_age.",
            ));
        }

        let batch = sqlx::query_as::<_, Batch>(
            "INSERT INTO cricpro_batch (name, min_age, max_age) VALUES ($1, $2, $3)
             ON CONFLICT (name) DO UPDATE SET min_age = EXCLUDED.min_age, max_age = EXCLUDED.max_age
             RETURNING *",
        )
        .bind(name)
        .bind(min_age)
        .bind(max_age)
        .fetch_one(pool)
        .await?;

        Ok(batch)
    }
}

/// Pick the first batch (ordered by min_age) whose age range contains the age.
pub fn choose_batch(batches: &[Batch], age: i32) -> Option<&Batch> {
    batches.iter().find(|b| b.contains(age))
}

/// A player joined with its account and batch, which is what every player view shows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct Player {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub status: String,

    #[oai(skip_serializing_if_is_none)]
    pub dob: Option<NaiveDate>,
    #[oai(skip_serializing_if_is_none)]
    pub age: Option<i32>,
    #[oai(skip_serializing_if_is_none)]
    pub batch_id: Option<i64>,
    #[oai(skip_serializing_if_is_none)]
    pub batch_name: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub batting_style: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub bowling_style: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub role_in_team: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub bio: Option<String>,
}

const PLAYER_SELECT: &str = "
    SELECT p.id, p.user_id, u.username, u.email, u.status, p.dob, p.age, p.batch_id,
           b.name AS batch_name, p.batting_style, p.bowling_style, p.role_in_team, p.bio
    FROM cricpro_player p
    JOIN cricpro_user u ON u.id = p.user_id
    LEFT JOIN cricpro_batch b ON b.id = p.batch_id";

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub dob: Option<NaiveDate>,
    pub batting_style: Option<String>,
    pub bowling_style: Option<String>,
    pub role_in_team: Option<String>,
    pub bio: Option<String>,
}

impl Player {
    pub async fn get_by_id(pool: &sqlx::PgPool, id: i64) -> Result<Player, ServiceError> {
        let sql_str = format!("{} WHERE p.id = $1", PLAYER_SELECT);
        sqlx::query_as::<_, Player>(&sql_str)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Player", id))
    }

    pub async fn get_by_user_id(
        pool: &sqlx::PgPool,
        user_id: i64,
    ) -> Result<Player, ServiceError> {
        let sql_str = format!("{} WHERE p.user_id = $1", PLAYER_SELECT);
        sqlx::query_as::<_, Player>(&sql_str)
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Player for user", user_id))
    }

    pub async fn get_records_by_status(
        pool: &sqlx::PgPool,
        status: &str,
    ) -> Result<Vec<Player>, ServiceError> {
        let sql_str = format!("{} WHERE u.status = $1 ORDER BY u.username ASC", PLAYER_SELECT);
        let records = sqlx::query_as::<_, Player>(&sql_str)
            .bind(status)
            .fetch_all(pool)
            .await?;

        Ok(records)
    }

    pub async fn get_records_by_ids(
        pool: &sqlx::PgPool,
        ids: &[i64],
    ) -> Result<Vec<Player>, ServiceError> {
        let sql_str = format!("{} WHERE p.id = ANY($1) ORDER BY u.username ASC", PLAYER_SELECT);
        let records = sqlx::query_as::<_, Player>(&sql_str)
            .bind(ids.to_vec())
            .fetch_all(pool)
            .await?;

        Ok(records)
    }

    /// Age and batch follow the date of birth. Without a matching batch the old batch is kept.
    async fn refresh_age_and_batch(
        pool: &sqlx::PgPool,
        player_id: i64,
        dob: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), ServiceError> {
        let age = calculate_age(dob, today);
        let batches = Batch::get_records(pool).await?;
        let batch_id = choose_batch(&batches, age).map(|b| b.id);
        debug!(
            "Player {} is {} years old, batch: {:?}.",
            player_id, age, batch_id
        );

        sqlx::query(
            "UPDATE cricpro_player SET age = $1, batch_id = COALESCE($2, batch_id) WHERE id = $3",
        )
        .bind(age)
        .bind(batch_id)
        .bind(player_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update_profile(
        pool: &sqlx::PgPool,
        player_id: i64,
        update: &ProfileUpdate,
        today: NaiveDate,
    ) -> Result<Player, ServiceError> {
        sqlx::query(
            "UPDATE cricpro_player SET dob = $1, batting_style = $2, bowling_style = $3, role_in_team = $4, bio = $5 WHERE id = $6",
        )
        .bind(update.dob)
        .bind(&update.batting_style)
        .bind(&update.bowling_style)
        .bind(&update.role_in_team)
        .bind(&update.bio)
        .bind(player_id)
        .execute(pool)
        .await?;

        if let Some(dob) = update.dob {
            Self::refresh_age_and_batch(pool, player_id, dob, today).await?;
        }

        Self::get_by_id(pool, player_id).await
    }

    pub async fn approve(
        pool: &sqlx::PgPool,
        player_id: i64,
        today: NaiveDate,
    ) -> Result<Player, ServiceError> {
        let player = Self::get_by_id(pool, player_id).await?;

        sqlx::query("UPDATE cricpro_user SET status = $1 WHERE id = $2")
            .bind(STATUS_APPROVED)
            .bind(player.user_id)
            .execute(pool)
            .await?;

        if let Some(dob) = player.dob {
            Self::refresh_age_and_batch(pool, player_id, dob, today).await?;
        }

        info!("Player {} ({}) approved.", player.id, player.username);
        Self::get_by_id(pool, player_id).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct Coach {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
}

impl Coach {
    pub async fn get_by_user_id(pool: &sqlx::PgPool, user_id: i64) -> Result<Coach, ServiceError> {
        sqlx::query_as::<_, Coach>(
            "SELECT c.id, c.user_id, u.username FROM cricpro_coach c JOIN cricpro_user u ON u.id = c.user_id WHERE c.user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Coach for user", user_id))
    }
}

/// The profile behind the logged in user, which decides who may score a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Coach(i64),
    Player(i64),
}

impl Actor {
    pub async fn resolve(
        pool: &sqlx::PgPool,
        user_id: i64,
        role: Role,
    ) -> Result<Actor, ServiceError> {
        match role {
            Role::Coach => Ok(Actor::Coach(Coach::get_by_user_id(pool, user_id).await?.id)),
            Role::Player => Ok(Actor::Player(Player::get_by_user_id(pool, user_id).await?.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(id: i64, name: &str, min_age: i32, max_age: i32) -> Batch {
        Batch {
            id,
            name: name.to_string(),
            min_age,
            max_age,
        }
    }

    #[test]
    fn test_choose_batch() {
        let batches = vec![
            batch(1, "Under-14", 0, 14),
            batch(2, "Under-16", 15, 16),
            batch(3, "Under-19", 17, 19),
        ];

        assert_eq!(choose_batch(&batches, 12).map(|b| b.id), Some(1));
        assert_eq!(choose_batch(&batches, 15).map(|b| b.id), Some(2));
        assert_eq!(choose_batch(&batches, 19).map(|b| b.id), Some(3));
        assert!(choose_batch(&batches, 25).is_none());
    }

    #[test]
    fn test_role() {
        assert_eq!(Role::from_str("coach").unwrap(), Role::Coach);
        assert!(Role::from_str("umpire").is_err());
        assert_eq!(Role::Coach.initial_status(), STATUS_APPROVED);
        assert_eq!(Role::Player.initial_status(), STATUS_PENDING);
        assert_eq!(Role::Player.dashboard_path(), "/player/dashboard");
    }

    #[test]
    fn test_normalize_login() {
        assert_eq!(normalize_login(" Rahul@Example.com "), "rahul@example.com");
        assert_eq!(normalize_login("Rahul_D"), "Rahul_D");
    }

    #[test]
    fn test_paginate() {
        assert_eq!(paginate(None, None), (1, 10, 10, 0));
        assert_eq!(paginate(Some(3), Some(20)), (3, 20, 20, 40));
        assert_eq!(paginate(Some(0), Some(1000)), (1, 100, 100, 0));
        assert_eq!(
            paginate(Some(u64::MAX), Some(100)),
            (MAX_PAGE, 100, 100, 99_999_900)
        );
    }
}
