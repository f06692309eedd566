use anyhow::Context;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use time::Date;

use crate::{db, pairs::matcher::Candidate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub profile_url: String,
    pub attendance: i64,
    pub miss_count: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Attendance,
    MissCount,
}

impl Counter {
    fn column(self) -> &'static str {
        match self {
            Counter::Attendance => "attendance",
            Counter::MissCount => "miss_count",
        }
    }

    /// Streak score stamped alongside the counter.
    pub fn score(self) -> i64 {
        match self {
            Counter::Attendance => 1,
            Counter::MissCount => 0,
        }
    }
}

pub async fn get(db_pool: &SqlitePool, id: i64) -> anyhow::Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>(
        "SELECT id,username,profile_url,attendance,miss_count,created_at FROM users WHERE id=?",
    )
    .bind(id)
    .fetch_optional(db_pool)
    .await?;
    Ok(profile)
}

/// Creates the user with zeroed counters, or refreshes name and (when given) avatar.
pub async fn upsert(db_pool: &SqlitePool, id: i64, username: &str, profile_url: Option<&str>) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, username, profile_url, created_at)
        VALUES (?, ?, COALESCE(?, ''), ?)
        ON CONFLICT (id) DO UPDATE SET
            username = excluded.username,
            profile_url = CASE WHEN ? IS NULL THEN users.profile_url ELSE excluded.profile_url END
        "#,
    )
    .bind(id)
    .bind(username)
    .bind(profile_url)
    .bind(db::now_millis())
    .bind(profile_url)
    .execute(db_pool)
    .await
    .with_context(|| format!("failed to upsert user {id}"))?;

    tracing::info!(user_id = id, username, "user upserted");
    Ok(())
}

/// Returns false when the user is unknown to the profile store.
pub async fn increment(conn: &mut SqliteConnection, id: i64, counter: Counter) -> anyhow::Result<bool> {
    let column = counter.column();
    let sql = format!("UPDATE users SET {column} = {column} + 1 WHERE id=?");
    let result = sqlx::query(&sql)
        .bind(id)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to increment {column} for user {id}"))?;

    if result.rows_affected() == 0 {
        tracing::warn!(user_id = id, counter = column, "counter update for unknown user");
        return Ok(false);
    }
    Ok(true)
}

pub async fn stamp_consistency(conn: &mut SqliteConnection, id: i64, date: Date, score: i64) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO consistency (user_id,date,score) VALUES (?,?,?) ON CONFLICT (user_id,date) DO UPDATE SET score=excluded.score",
    )
    .bind(id)
    .bind(date.to_string())
    .bind(score)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn consistency(db_pool: &SqlitePool, id: i64, date: Date) -> anyhow::Result<Option<i64>> {
    let score: Option<(i64,)> = sqlx::query_as("SELECT score FROM consistency WHERE user_id=? AND date=?")
        .bind(id)
        .bind(date.to_string())
        .fetch_optional(db_pool)
        .await?;
    Ok(score.map(|(s,)| s))
}

/// Candidate pool for the next cycle.
pub async fn candidates(db_pool: &SqlitePool) -> anyhow::Result<Vec<Candidate>> {
    let candidates = sqlx::query_as::<_, Candidate>("SELECT id AS user_id,username,profile_url FROM users ORDER BY id")
        .fetch_all(db_pool)
        .await
        .context("failed to load candidate pool")?;
    Ok(candidates)
}
