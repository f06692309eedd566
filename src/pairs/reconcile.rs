//! The generate-pair cycle: close the day's groups, then open the next ones.
//!
//! Collect → Apply → Purge → Advance. Apply marks the groups it settled as
//! completed in the same transaction as the counter updates, so re-running the
//! cycle after a crash never counts a group twice.

use std::{collections::HashMap, fmt};

use anyhow::Context;
use sqlx::SqlitePool;
use time::Date;

use crate::{
    db,
    fanout::{Publisher, RelayReport},
    users::store::{self as users, Counter},
    waitlist,
};

use super::{ledger, matcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberOutcome {
    pub pair_id: i64,
    pub user_id: i64,
    pub counter: Counter,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub closed_groups: usize,
    pub attended: usize,
    pub missed: usize,
    pub created_groups: usize,
    pub carried_over: Vec<i64>,
    pub relay: RelayReport,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "closed {} group(s): {} attended, {} missed; generated {} group(s); {}",
            self.closed_groups, self.attended, self.missed, self.created_groups, self.relay
        )?;
        for user_id in &self.carried_over {
            write!(f, "; user {user_id} carried over to the waitlist")?;
        }
        Ok(())
    }
}

/// Outcome for every member of every pending group. No record means a miss.
pub async fn collect(db_pool: &SqlitePool) -> anyhow::Result<Vec<MemberOutcome>> {
    let groups: Vec<(i64, i64, i64, Option<i64>)> =
        sqlx::query_as("SELECT id,user1_id,user2_id,user3_id FROM pairs WHERE status='pending' ORDER BY id")
            .fetch_all(db_pool)
            .await
            .context("failed to fetch pending groups")?;

    let flags: Vec<(i64, i64, Option<bool>)> = sqlx::query_as(
        r#"
        SELECT pp.pair_id, pp.user_id, pp.is_participating
        FROM pair_participation pp
        JOIN pairs p ON p.id = pp.pair_id
        WHERE p.status = 'pending'
        "#,
    )
    .fetch_all(db_pool)
    .await
    .context("failed to fetch participation")?;

    let flags: HashMap<(i64, i64), bool> = flags
        .into_iter()
        .map(|(pair_id, user_id, flag)| ((pair_id, user_id), flag.unwrap_or(false)))
        .collect();

    let outcomes = groups
        .into_iter()
        .flat_map(|(pair_id, user1, user2, user3)| {
            [Some(user1), Some(user2), user3]
                .into_iter()
                .flatten()
                .map(move |user_id| (pair_id, user_id))
        })
        .map(|(pair_id, user_id)| {
            let counter = match flags.get(&(pair_id, user_id)) {
                Some(true) => Counter::Attendance,
                _ => Counter::MissCount,
            };
            MemberOutcome { pair_id, user_id, counter }
        })
        .collect();

    Ok(outcomes)
}

/// Bumps counters, stamps the streak score for `score_date` and completes the groups.
pub async fn apply(db_pool: &SqlitePool, outcomes: &[MemberOutcome], score_date: Date) -> anyhow::Result<()> {
    let mut tx = db_pool.begin().await?;

    for outcome in outcomes {
        users::increment(&mut tx, outcome.user_id, outcome.counter).await?;
        users::stamp_consistency(&mut tx, outcome.user_id, score_date, outcome.counter.score()).await?;

        match outcome.counter {
            Counter::Attendance => tracing::info!(user_id = outcome.user_id, pair_id = outcome.pair_id, "attended"),
            Counter::MissCount => tracing::info!(user_id = outcome.user_id, pair_id = outcome.pair_id, "missed"),
        }
    }

    let mut pair_ids: Vec<i64> = outcomes.iter().map(|o| o.pair_id).collect();
    pair_ids.dedup();
    for pair_id in pair_ids {
        sqlx::query("UPDATE pairs SET status='completed' WHERE id=?")
            .bind(pair_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await.context("failed to commit reconciliation")?;
    Ok(())
}

/// Clears the closed cycle's transient tables.
pub async fn purge(db_pool: &SqlitePool) -> anyhow::Result<()> {
    let mut tx = db_pool.begin().await?;

    for table in ["pair_participation", "pairs", "waitlist", "notification_seen", "notifications", "fanout_outbox"] {
        let sql = format!("DELETE FROM {table}");
        sqlx::query(&sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to clear {table}"))?;
    }

    tx.commit().await?;
    tracing::info!("previous cycle purged");
    Ok(())
}

/// Collect, Apply and Purge. Safe to retry on its own: settled groups are
/// completed, so a second run collects nothing.
pub async fn close(db_pool: &SqlitePool, score_date: Date) -> anyhow::Result<Vec<MemberOutcome>> {
    let outcomes = collect(db_pool).await?;
    apply(db_pool, &outcomes, score_date).await?;
    purge(db_pool).await?;
    Ok(outcomes)
}

/// Matches the current pool, commits it and fans it out.
///
/// Does not fail once the ledger batch is committed: carry-over and relay
/// errors are logged and the rooms stay in the outbox.
pub async fn advance(db_pool: &SqlitePool, publisher: &Publisher, date: Date) -> anyhow::Result<CycleReport> {
    let candidates = users::candidates(db_pool).await?;
    if candidates.is_empty() {
        tracing::info!("no users to pair");
    }

    let (groups, singles): (Vec<_>, Vec<_>) = matcher::make_groups(candidates)
        .into_iter()
        .partition(|g| g.is_complete());

    let committed = ledger::write_cycle(db_pool, &groups, date).await?;

    let mut carried_over = Vec::new();
    for candidate in singles.into_iter().flat_map(|g| g.into_members()) {
        match waitlist::carry_over(db_pool, &candidate).await {
            Ok(()) => carried_over.push(candidate.user_id),
            Err(e) => tracing::warn!(user_id = candidate.user_id, error = %e, "carry-over failed"),
        }
    }

    let relay = match publisher.relay(db_pool).await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::warn!(error = %e, "relay after commit failed, rooms stay in the outbox");
            RelayReport::default()
        }
    };

    Ok(CycleReport {
        created_groups: committed.len(),
        carried_over,
        relay,
        ..CycleReport::default()
    })
}

/// Adds the closing half of the cycle to an advance report.
pub fn closed(mut report: CycleReport, outcomes: &[MemberOutcome]) -> CycleReport {
    let mut pair_ids: Vec<i64> = outcomes.iter().map(|o| o.pair_id).collect();
    pair_ids.dedup();
    report.closed_groups = pair_ids.len();
    report.attended = outcomes.iter().filter(|o| o.counter == Counter::Attendance).count();
    report.missed = outcomes.len() - report.attended;
    report
}

/// Score date for a cycle running on `today`.
pub fn score_date(today: Date) -> Date {
    today.previous_day().unwrap_or(today)
}

pub async fn run_cycle(db_pool: &SqlitePool, publisher: &Publisher) -> anyhow::Result<CycleReport> {
    let today = db::today();

    let outcomes = close(db_pool, score_date(today)).await?;
    let report = closed(advance(db_pool, publisher, today).await?, &outcomes);

    tracing::info!(%report, "cycle finished");
    Ok(report)
}

/// Credits attendance directly and completes the users' pending groups.
pub async fn fill_attendance(db_pool: &SqlitePool, user_ids: &[i64]) -> anyhow::Result<()> {
    let date = score_date(db::today());
    let mut tx = db_pool.begin().await?;

    for &user_id in user_ids {
        sqlx::query("UPDATE pairs SET status='completed' WHERE status='pending' AND (user1_id=? OR user2_id=? OR user3_id=?)")
            .bind(user_id)
            .bind(user_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        users::increment(&mut tx, user_id, Counter::Attendance).await?;
        users::stamp_consistency(&mut tx, user_id, date, Counter::Attendance.score()).await?;
    }

    tx.commit().await?;
    Ok(())
}
