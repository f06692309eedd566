use anyhow::Context;
use sqlx::SqlitePool;
use time::Date;

use crate::{
    db,
    fanout::{
        docs::{PairingAnnouncement, PairingKind},
        outbox,
    },
};

use super::matcher::{Candidate, Group};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedGroup {
    pub pair_id: i64,
    pub date: Date,
    pub announcement: PairingAnnouncement,
}

/// Persists a whole batch in one transaction, together with its fan-out rows.
///
/// Groups with fewer than two members are not persisted. Any failure rolls the
/// batch back so the run can be repeated.
pub async fn write_cycle(db_pool: &SqlitePool, groups: &[Group], date: Date) -> anyhow::Result<Vec<CommittedGroup>> {
    let created_at = db::now_millis();
    let date_str = date.to_string();
    let mut committed = Vec::with_capacity(groups.len());

    let mut tx = db_pool.begin().await.context("failed to open ledger transaction")?;

    for group in groups.iter().filter(|g| g.is_complete()) {
        let members = group.members();
        let username = |i: usize| members.get(i).map(|c: &Candidate| c.username.as_str());
        let user_id = |i: usize| members.get(i).map(|c: &Candidate| c.user_id);

        let (pair_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO pairs
                (room_id, user1_id, user2_id, user3_id, username1, username2, username3, date, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            RETURNING id
            "#,
        )
        .bind(group.room_id())
        .bind(user_id(0))
        .bind(user_id(1))
        .bind(user_id(2))
        .bind(username(0))
        .bind(username(1))
        .bind(username(2))
        .bind(&date_str)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert group {}", group.room_id()))?;

        for member in members {
            sqlx::query("INSERT INTO pair_participation (pair_id,user_id,date) VALUES (?,?,?)")
                .bind(pair_id)
                .bind(member.user_id)
                .bind(&date_str)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("user {} is already in a group for {date_str}", member.user_id))?;
        }

        let announcement = PairingAnnouncement::new(
            PairingKind::Daily,
            members.iter().cloned().map(Into::into).collect(),
            created_at,
        );
        outbox::enqueue(&mut tx, &announcement).await?;

        committed.push(CommittedGroup { pair_id, date, announcement });
    }

    tx.commit().await.context("failed to commit ledger batch")?;

    tracing::info!(groups = committed.len(), date = %date_str, "ledger batch committed");
    Ok(committed)
}

#[cfg(test)]
mod tests {
    use crate::pairs::matcher::partition;

    use super::*;

    fn pool(ids: &[i64]) -> Vec<Candidate> {
        ids.iter()
            .map(|&user_id| Candidate {
                user_id,
                username: format!("u{user_id}"),
                profile_url: String::new(),
            })
            .collect()
    }

    async fn count(db_pool: &SqlitePool, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let (n,): (i64,) = sqlx::query_as(&sql)
            .fetch_one(db_pool)
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn writes_groups_placeholders_and_outbox() {
        let db_pool = db::memory().await.unwrap();
        let groups = partition(pool(&[5, 1, 3, 2, 4]));

        let committed = write_cycle(&db_pool, &groups, db::today()).await.unwrap();

        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].announcement.room_id, "1_5");
        assert_eq!(committed[1].announcement.room_id, "2_3_4");
        assert_eq!(count(&db_pool, "pairs").await, 2);
        assert_eq!(count(&db_pool, "pair_participation").await, 5);
        assert_eq!(count(&db_pool, "fanout_outbox").await, 2);

        let (user3,): (Option<i64>,) = sqlx::query_as("SELECT user3_id FROM pairs WHERE room_id='1_5'")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(user3, None);
    }

    #[tokio::test]
    async fn batch_rolls_back_on_duplicate_membership() {
        let db_pool = db::memory().await.unwrap();
        let today = db::today();
        write_cycle(&db_pool, &partition(pool(&[1, 2])), today).await.unwrap();

        // user 2 already has a group today
        let err = write_cycle(&db_pool, &partition(pool(&[3, 4, 2, 5])), today).await;
        assert!(err.is_err());

        assert_eq!(count(&db_pool, "pairs").await, 1);
        assert_eq!(count(&db_pool, "pair_participation").await, 2);
        assert_eq!(count(&db_pool, "fanout_outbox").await, 1);
    }

    #[tokio::test]
    async fn singleton_is_not_persisted() {
        let db_pool = db::memory().await.unwrap();
        let committed = write_cycle(&db_pool, &partition(pool(&[9])), db::today()).await.unwrap();

        assert!(committed.is_empty());
        assert_eq!(count(&db_pool, "pairs").await, 0);
    }
}
