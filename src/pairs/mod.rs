mod daily;
pub mod ledger;
pub mod matcher;
pub mod participation;
pub mod reconcile;

use axum::{routing::{get, put}, Router};

use crate::AppState;

pub use daily::{daily_pair, DailyPair};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pair/{user_id}", get(daily::get_pair))
        .route("/pair", put(daily::put_participation))
}
