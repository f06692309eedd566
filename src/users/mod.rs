pub mod store;

use axum::{debug_handler, extract::{rejection::{JsonRejection, PathRejection}, Path, State}, routing::{get, post}, Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{appresult::{json_body, path_param}, fanout::Publisher, pairs::reconcile, AppError, AppResult, AppState};

use store::Profile;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/{user_id}", get(profile))
        .route("/user/attendance", post(attendance))
        .route("/user/generate-pair", post(generate_pair))
}

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    State(db_pool): State<SqlitePool>,
    user_id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Profile>> {
    let user_id = path_param(user_id)?;
    store::get(&db_pool, user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttendanceRequest {
    user_ids: Vec<i64>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn attendance(
    State(db_pool): State<SqlitePool>,
    body: Result<Json<AttendanceRequest>, JsonRejection>,
) -> AppResult<Json<serde_json::Value>> {
    let AttendanceRequest { user_ids } = json_body(body)?;
    reconcile::fill_attendance(&db_pool, &user_ids).await?;
    Ok(Json(json!({ "message": "Attendance filled successfully" })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn generate_pair(
    State(db_pool): State<SqlitePool>,
    State(publisher): State<Publisher>,
) -> AppResult<Json<String>> {
    let report = reconcile::run_cycle(&db_pool, &publisher).await?;
    Ok(Json(report.to_string()))
}
