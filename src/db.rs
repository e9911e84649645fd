//! Postgres persistence for location rows and account reads.
//!
//! The `users` table belongs to the account component; only
//! `user_locations` is created here. In-memory state stays authoritative
//! for live matching, the database is the durable mirror and the account
//! source of truth when enabled.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::PresenceError;
use crate::protocol::NearbyUser;
use crate::UserId;

pub async fn connect(database_url: &str) -> Result<PgPool, PresenceError> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<(), PresenceError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_locations (
          user_id BIGINT PRIMARY KEY,
          latitude DOUBLE PRECISION NOT NULL,
          longitude DOUBLE PRECISION NOT NULL,
          last_updated TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_location(
    pool: &PgPool,
    user_id: UserId,
    latitude: f64,
    longitude: f64,
) -> Result<(), PresenceError> {
    sqlx::query(
        r#"
        INSERT INTO user_locations (user_id, latitude, longitude, last_updated)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (user_id) DO UPDATE
        SET latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            last_updated = NOW();
        "#,
    )
    .bind(user_id)
    .bind(latitude)
    .bind(longitude)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_location(pool: &PgPool, user_id: UserId) -> Result<(), PresenceError> {
    sqlx::query("DELETE FROM user_locations WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Reads the durable account flag. Unknown users are inactive.
pub async fn is_active(pool: &PgPool, user_id: UserId) -> Result<bool, PresenceError> {
    let row = sqlx::query("SELECT is_active FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row
        .map(|row| row.get::<bool, _>("is_active"))
        .unwrap_or(false))
}

/// All active users with a location fresher than the staleness window.
/// Per-viewer exclusion and the live-session restriction are applied by
/// the handler, which holds that context.
pub async fn fresh_candidates(
    pool: &PgPool,
    staleness_secs: i64,
) -> Result<Vec<NearbyUser>, PresenceError> {
    let rows = sqlx::query(
        r#"
        SELECT
            u.id::BIGINT AS id,
            u.username,
            u.headline,
            u.avatar_data,
            u.is_active,
            l.latitude,
            l.longitude
        FROM users u
        INNER JOIN user_locations l ON u.id = l.user_id
        WHERE u.is_active = TRUE
          AND l.last_updated > NOW() - INTERVAL '1 second' * $1
        "#,
    )
    .bind(staleness_secs as f64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| NearbyUser {
            user_id: row.get("id"),
            username: row.get("username"),
            headline: row.get("headline"),
            avatar_data: row
                .try_get("avatar_data")
                .unwrap_or(serde_json::Value::Null),
            is_active: row.get("is_active"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
        })
        .collect())
}
