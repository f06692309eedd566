use std::sync::Arc;

use pairup::{
    config::Config,
    db,
    fanout::{FanoutStore, MemoryStore, Publisher, RealtimeDb},
    tasks, AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url).await?;
    tracing::info!("database ready");

    let store: Arc<dyn FanoutStore> = match &config.fanout_url {
        Some(url) => Arc::new(RealtimeDb::new(url.as_str(), config.fanout_auth.clone())),
        None => {
            tracing::warn!("FANOUT_DATABASE_URL not set, chat rooms are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let app_state = AppState::new(db_pool, Publisher::new(store));
    let _tasks = tasks::spawn_all(&config, &app_state);

    let app = pairup::app(app_state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
