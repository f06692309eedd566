//! Long-lived background work, each piece under its own supervisor.

pub mod scheduler;
pub mod supervisor;
pub mod telegram;

use tokio::task::JoinHandle;

use crate::{config::Config, AppState};

use supervisor::{supervise, Backoff};

pub fn spawn_all(config: &Config, state: &AppState) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    let (db_pool, publisher, every) = (state.db_pool.clone(), state.publisher.clone(), config.relay_interval);
    handles.push(supervise("outbox-relay", Backoff::default(), move || {
        scheduler::run_relay(db_pool.clone(), publisher.clone(), every)
    }));

    if let Some(hour) = config.pairing_hour {
        let (db_pool, publisher) = (state.db_pool.clone(), state.publisher.clone());
        handles.push(supervise("pairing-cycle", Backoff::default(), move || {
            scheduler::run_daily(db_pool.clone(), publisher.clone(), hour)
        }));
    } else {
        tracing::info!("scheduled pairing cycle disabled");
    }

    match &config.bot_token {
        Some(token) => {
            let (db_pool, token) = (state.db_pool.clone(), token.clone());
            handles.push(supervise("telegram-listener", Backoff { initial: std::time::Duration::from_secs(10), ..Backoff::default() }, move || {
                telegram::listen(db_pool.clone(), token.clone())
            }));
        }
        None => tracing::warn!("BOT_TOKEN not set, telegram listener disabled"),
    }

    handles
}
