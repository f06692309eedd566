use std::{future::Future, time::Duration};

use tokio::{task::JoinHandle, time::Instant};

#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(300),
            multiplier: 2,
        }
    }
}

impl Backoff {
    pub fn next(&self, delay: Duration) -> Duration {
        (delay * self.multiplier).min(self.max)
    }
}

/// Runs `task` on its own tokio task and restarts it whenever it fails.
///
/// A run that lasted longer than `backoff.max` resets the delay. The
/// supervisor stops once the task returns `Ok`.
pub fn supervise<F, Fut>(name: &'static str, backoff: Backoff, mut task: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut delay = backoff.initial;
        loop {
            let started = Instant::now();
            match task().await {
                Ok(()) => {
                    tracing::info!(task = name, "task finished");
                    return;
                }
                Err(e) => {
                    if started.elapsed() > backoff.max {
                        delay = backoff.initial;
                    }
                    tracing::error!(task = name, error = %e, retry_in = ?delay, "task failed, restarting");
                    tokio::time::sleep(delay).await;
                    delay = backoff.next(delay);
                }
            }
        }
    })
}

/// Retries `f` up to `attempts` times with the given backoff.
pub async fn with_retry<F, Fut, T>(attempts: u32, backoff: &Backoff, mut f: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut delay = backoff.initial;
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(x) => return Ok(x),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, retry_in = ?delay, "attempt failed");
                tokio::time::sleep(delay).await;
                delay = backoff.next(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use anyhow::anyhow;

    use super::*;

    fn fast() -> Backoff {
        Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
            multiplier: 2,
        }
    }

    #[test]
    fn backoff_is_capped() {
        let backoff = fast();
        assert_eq!(backoff.next(Duration::from_millis(1)), Duration::from_millis(2));
        assert_eq!(backoff.next(Duration::from_millis(4)), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn supervise_restarts_until_ok() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();

        let handle = supervise("flaky", fast(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(anyhow!("not yet"))
                } else {
                    Ok(())
                }
            }
        });

        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn with_retry_gives_up() {
        let mut calls = 0;
        let result: anyhow::Result<()> = with_retry(3, &fast(), || {
            calls += 1;
            async { Err(anyhow!("down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn with_retry_returns_first_success() {
        let mut calls = 0;
        let value = with_retry(5, &fast(), || {
            calls += 1;
            let ok = calls == 2;
            async move { if ok { Ok(7) } else { Err(anyhow!("flaky")) } }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls, 2);
    }
}
