use axum::{debug_handler, extract::{rejection::PathRejection, Path, State}, routing::{get, post}, Json, Router};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{appresult::path_param, fanout::docs::PairingAnnouncement, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/notifications/{user_id}", get(notifications))
        .route("/user/notifications/{user_id}/seen", post(seen))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user1_id: i64,
    pub user2_id: i64,
    pub message: String,
    pub seen: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub is_waiting: bool,
}

/// Records the pairing notice for both members; keyed by room id.
pub async fn insert(conn: &mut SqliteConnection, announcement: &PairingAnnouncement) -> anyhow::Result<()> {
    let [first, second, ..] = announcement.members.as_slice() else {
        anyhow::bail!("notification for room {} needs two members", announcement.room_id);
    };

    sqlx::query("INSERT INTO notifications (id,user1_id,user2_id,message,created_at) VALUES (?,?,?,?,?) ON CONFLICT (id) DO NOTHING")
        .bind(&announcement.room_id)
        .bind(first.user_id)
        .bind(second.user_id)
        .bind(announcement.message())
        .bind(announcement.created_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn feed(db_pool: &SqlitePool, user_id: i64) -> anyhow::Result<NotificationFeed> {
    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT n.id, n.user1_id, n.user2_id, n.message, n.created_at,
               (ns.user_id IS NOT NULL) AS seen
        FROM notifications n
        LEFT JOIN notification_seen ns ON ns.notification_id = n.id AND ns.user_id = ?
        WHERE n.user1_id = ? OR n.user2_id = ?
        ORDER BY n.created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    let (waiting,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM waitlist WHERE user_id=?")
        .bind(user_id)
        .fetch_one(db_pool)
        .await?;

    Ok(NotificationFeed { notifications, is_waiting: waiting > 0 })
}

/// Marks every notification of the user as seen; returns how many were new.
pub async fn mark_seen(db_pool: &SqlitePool, user_id: i64) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO notification_seen (notification_id, user_id)
        SELECT id, ? FROM notifications WHERE user1_id = ? OR user2_id = ?
        ON CONFLICT (notification_id, user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .execute(db_pool)
    .await?;
    Ok(result.rows_affected())
}

#[debug_handler(state = AppState)]
pub(crate) async fn notifications(
    State(db_pool): State<SqlitePool>,
    user_id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<NotificationFeed>> {
    let user_id = path_param(user_id)?;
    Ok(Json(feed(&db_pool, user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn seen(
    State(db_pool): State<SqlitePool>,
    user_id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = path_param(user_id)?;
    let marked = mark_seen(&db_pool, user_id).await?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}
