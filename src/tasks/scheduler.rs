use std::time::Duration;

use anyhow::Context;
use sqlx::SqlitePool;
use time::{OffsetDateTime, Time};

use crate::{
    db,
    fanout::Publisher,
    pairs::reconcile::{self, CycleReport},
};

use super::supervisor::{with_retry, Backoff};

const CYCLE_ATTEMPTS: u32 = 5;

/// Time left until the next `hour`:00 UTC strictly after `now`.
pub fn until_next(hour: u8, now: OffsetDateTime) -> anyhow::Result<Duration> {
    let at = Time::from_hms(hour, 0, 0).context("invalid pairing hour")?;
    let mut next = now.replace_time(at);
    if next <= now {
        next += time::Duration::DAY;
    }
    Ok(Duration::try_from(next - now)?)
}

/// One cycle with the closing and the advancing half retried separately.
pub async fn scheduled_cycle(db_pool: &SqlitePool, publisher: &Publisher, backoff: &Backoff) -> anyhow::Result<CycleReport> {
    let today = db::today();
    let score_date = reconcile::score_date(today);

    let outcomes = with_retry(CYCLE_ATTEMPTS, backoff, || reconcile::close(db_pool, score_date)).await?;
    let report = with_retry(CYCLE_ATTEMPTS, backoff, || reconcile::advance(db_pool, publisher, today)).await?;
    Ok(reconcile::closed(report, &outcomes))
}

/// Runs the cycle every day at `hour` UTC.
pub async fn run_daily(db_pool: SqlitePool, publisher: Publisher, hour: u8) -> anyhow::Result<()> {
    let backoff = Backoff {
        initial: Duration::from_secs(5),
        max: Duration::from_secs(120),
        multiplier: 2,
    };

    loop {
        let wait = until_next(hour, OffsetDateTime::now_utc())?;
        tracing::info!(in_secs = wait.as_secs(), "next pairing cycle scheduled");
        tokio::time::sleep(wait).await;

        let report = scheduled_cycle(&db_pool, &publisher, &backoff).await?;
        tracing::info!(%report, "scheduled cycle done");
    }
}

/// Periodically drains the fan-out outbox.
pub async fn run_relay(db_pool: SqlitePool, publisher: Publisher, every: Duration) -> anyhow::Result<()> {
    anyhow::ensure!(!every.is_zero(), "relay interval must be non-zero");
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        publisher.relay(&db_pool).await?;
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[tokio::test]
    async fn zero_relay_interval_is_an_error() {
        let db_pool = db::memory().await.unwrap();
        let publisher = Publisher::new(std::sync::Arc::new(crate::fanout::MemoryStore::new()));

        let result = run_relay(db_pool, publisher, Duration::ZERO).await;
        assert!(result.is_err());
    }

    #[test]
    fn later_today() {
        let wait = until_next(6, datetime!(2026-10-19 04:30 UTC)).unwrap();
        assert_eq!(wait, Duration::from_secs(90 * 60));
    }

    #[test]
    fn tomorrow_when_passed() {
        let wait = until_next(6, datetime!(2026-10-19 06:00 UTC)).unwrap();
        assert_eq!(wait, Duration::from_secs(24 * 3600));

        let wait = until_next(6, datetime!(2026-10-19 23:00 UTC)).unwrap();
        assert_eq!(wait, Duration::from_secs(7 * 3600));
    }
}
