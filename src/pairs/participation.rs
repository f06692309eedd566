use sqlx::SqlitePool;
use time::Date;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participation {
    Recorded,
    /// No such group for the given date; nothing was written.
    UnknownPair,
    /// The user is not a member of the group; nothing was written.
    NotAMember,
}

/// Upserts a member's opt-in for a group of `date`. Last write wins.
pub async fn set_participation(
    db_pool: &SqlitePool,
    pair_id: i64,
    user_id: i64,
    participating: bool,
    date: Date,
) -> anyhow::Result<Participation> {
    let date = date.to_string();

    let Some((user1, user2, user3)): Option<(i64, i64, Option<i64>)> =
        sqlx::query_as("SELECT user1_id,user2_id,user3_id FROM pairs WHERE id=? AND date=?")
            .bind(pair_id)
            .bind(&date)
            .fetch_optional(db_pool)
            .await?
    else {
        return Ok(Participation::UnknownPair);
    };

    if user_id != user1 && user_id != user2 && Some(user_id) != user3 {
        return Ok(Participation::NotAMember);
    }

    sqlx::query(
        r#"
        INSERT INTO pair_participation (pair_id, user_id, date, is_participating)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (pair_id, user_id) DO UPDATE SET is_participating = excluded.is_participating
        "#,
    )
    .bind(pair_id)
    .bind(user_id)
    .bind(&date)
    .bind(participating)
    .execute(db_pool)
    .await?;

    tracing::debug!(pair_id, user_id, participating, "participation recorded");
    Ok(Participation::Recorded)
}
