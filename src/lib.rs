pub mod appresult;
pub mod config;
pub mod db;
pub mod fanout;
pub mod notifications;
pub mod pairs;
pub mod tasks;
pub mod users;
pub mod waitlist;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};

use fanout::Publisher;
use waitlist::Waitlist;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub publisher: Publisher,
    pub waitlist: Waitlist,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, publisher: Publisher) -> Self {
        AppState {
            db_pool,
            publisher,
            waitlist: Waitlist::new(),
        }
    }
}

pub fn app(app_state: AppState) -> Router {
    let api = Router::new()
        .merge(pairs::router())
        .merge(users::router())
        .merge(waitlist::router())
        .merge(notifications::router());

    Router::new()
        .nest("/api/v1", api)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
