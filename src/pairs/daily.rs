use axum::{debug_handler, extract::{rejection::{JsonRejection, PathRejection}, Path, State}, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::Date;

use crate::{appresult::{json_body, path_param}, db, AppError, AppResult};

use super::participation::{set_participation, Participation};

/// Today's group as clients see it; unset flags read as `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyPair {
    pub id: i64,
    pub room_id: String,
    pub user1_id: i64,
    pub user2_id: i64,
    pub user3_id: Option<i64>,
    pub username1: String,
    pub username2: String,
    pub username3: Option<String>,
    pub user1_participating: bool,
    pub user2_participating: bool,
    pub user3_participating: bool,
    pub special_group: bool,
    pub status: String,
    pub date: String,
}

pub async fn daily_pair(db_pool: &SqlitePool, user_id: i64, date: Date) -> anyhow::Result<Option<DailyPair>> {
    let pair = sqlx::query_as::<_, DailyPair>(
        r#"
        SELECT
            p.id, p.room_id,
            p.user1_id, p.user2_id, p.user3_id,
            p.username1, p.username2, p.username3,
            COALESCE(pp1.is_participating, 0) AS user1_participating,
            COALESCE(pp2.is_participating, 0) AS user2_participating,
            COALESCE(pp3.is_participating, 0) AS user3_participating,
            (p.user3_id IS NOT NULL) AS special_group,
            p.status, p.date
        FROM pairs p
        LEFT JOIN pair_participation pp1 ON pp1.pair_id = p.id AND pp1.user_id = p.user1_id
        LEFT JOIN pair_participation pp2 ON pp2.pair_id = p.id AND pp2.user_id = p.user2_id
        LEFT JOIN pair_participation pp3 ON pp3.pair_id = p.id AND pp3.user_id = p.user3_id
        WHERE (p.user1_id = ? OR p.user2_id = ? OR p.user3_id = ?) AND p.date = ?
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .bind(date.to_string())
    .fetch_optional(db_pool)
    .await?;
    Ok(pair)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn get_pair(
    State(db_pool): State<SqlitePool>,
    user_id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<DailyPair>> {
    let user_id = path_param(user_id)?;
    let Some(pair) = daily_pair(&db_pool, user_id, db::today()).await? else {
        return Err(AppError::not_found(format!("no pair found today for user {user_id}")));
    };
    Ok(Json(pair))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ParticipationRequest {
    pair_id: i64,
    user_id: i64,
    participating: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn put_participation(
    State(db_pool): State<SqlitePool>,
    body: Result<Json<ParticipationRequest>, JsonRejection>,
) -> AppResult<Json<&'static str>> {
    let ParticipationRequest { pair_id, user_id, participating } = json_body(body)?;

    match set_participation(&db_pool, pair_id, user_id, participating, db::today()).await? {
        Participation::Recorded => Ok(Json("Updated Successfully!")),
        Participation::UnknownPair => Err(AppError::not_found(format!("pair {pair_id} does not exist today"))),
        Participation::NotAMember => Err(AppError::bad_request(format!("user {user_id} is not in pair {pair_id}"))),
    }
}
