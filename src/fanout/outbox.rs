use anyhow::Context;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db;

use super::docs::PairingAnnouncement;

/// Rows that failed this many times are left for inspection.
pub const MAX_RETRIES: i64 = 10;

/// Records an announcement inside the caller's transaction.
pub async fn enqueue(conn: &mut SqliteConnection, announcement: &PairingAnnouncement) -> anyhow::Result<()> {
    let payload = serde_json::to_string(announcement)?;

    sqlx::query(
        r#"
        INSERT INTO fanout_outbox (room_id, payload, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT (room_id) DO UPDATE SET
            payload = excluded.payload,
            created_at = excluded.created_at,
            published_at = NULL,
            retry_count = 0,
            last_error = NULL
        "#,
    )
    .bind(&announcement.room_id)
    .bind(payload)
    .bind(announcement.created_at)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("failed to enqueue fan-out for {}", announcement.room_id))?;

    tracing::debug!(room_id = %announcement.room_id, "fan-out enqueued");
    Ok(())
}

/// Unpublished announcements, fewest failures first, then oldest.
pub async fn pending(db_pool: &SqlitePool, limit: i64) -> anyhow::Result<Vec<PairingAnnouncement>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT room_id, payload FROM fanout_outbox
        WHERE published_at IS NULL AND retry_count < ?
        ORDER BY retry_count ASC, created_at ASC
        LIMIT ?
        "#,
    )
    .bind(MAX_RETRIES)
    .bind(limit)
    .fetch_all(db_pool)
    .await
    .context("failed to fetch pending fan-out")?;

    rows.into_iter()
        .map(|(room_id, payload)| {
            serde_json::from_str(&payload)
                .with_context(|| format!("corrupt fan-out payload for {room_id}"))
        })
        .collect()
}

pub async fn mark_published(db_pool: &SqlitePool, room_id: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE fanout_outbox SET published_at = ?, last_error = NULL WHERE room_id = ?")
        .bind(db::now_millis())
        .bind(room_id)
        .execute(db_pool)
        .await
        .context("failed to mark fan-out published")?;
    Ok(())
}

pub async fn mark_failed(db_pool: &SqlitePool, room_id: &str, error: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE fanout_outbox SET retry_count = retry_count + 1, last_error = ? WHERE room_id = ?")
        .bind(error)
        .bind(room_id)
        .execute(db_pool)
        .await
        .context("failed to mark fan-out failed")?;
    Ok(())
}

/// Number of announcements not yet published.
pub async fn backlog(db_pool: &SqlitePool) -> anyhow::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fanout_outbox WHERE published_at IS NULL")
        .fetch_one(db_pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use crate::fanout::docs::{PairingKind, Participant};

    use super::*;

    fn announcement(ids: [i64; 2], created_at: i64) -> PairingAnnouncement {
        let members = ids
            .iter()
            .map(|&user_id| Participant { user_id, username: format!("u{user_id}"), profile_url: String::new() })
            .collect();
        PairingAnnouncement::new(PairingKind::Daily, members, created_at)
    }

    #[tokio::test]
    async fn failing_rows_do_not_hold_back_newer_ones() {
        let db_pool = db::memory().await.unwrap();
        let mut conn = db_pool.acquire().await.unwrap();
        enqueue(&mut conn, &announcement([1, 2], 100)).await.unwrap();
        enqueue(&mut conn, &announcement([3, 4], 200)).await.unwrap();
        drop(conn);

        mark_failed(&db_pool, "1_2", "store down").await.unwrap();

        let batch = pending(&db_pool, 1).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].room_id, "3_4");
    }

    #[tokio::test]
    async fn retry_ceiling_and_reenqueue() {
        let db_pool = db::memory().await.unwrap();
        let a = announcement([1, 2], 100);
        let mut conn = db_pool.acquire().await.unwrap();
        enqueue(&mut conn, &a).await.unwrap();
        drop(conn);

        for _ in 0..MAX_RETRIES {
            mark_failed(&db_pool, "1_2", "store down").await.unwrap();
        }
        assert!(pending(&db_pool, 10).await.unwrap().is_empty());
        assert_eq!(backlog(&db_pool).await.unwrap(), 1);

        let mut conn = db_pool.acquire().await.unwrap();
        enqueue(&mut conn, &a).await.unwrap();
        drop(conn);
        assert_eq!(pending(&db_pool, 10).await.unwrap(), vec![a]);

        mark_published(&db_pool, "1_2").await.unwrap();
        assert_eq!(backlog(&db_pool).await.unwrap(), 0);
    }
}
