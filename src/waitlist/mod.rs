//! On-demand pairing against a FIFO waitlist of one.

use std::sync::Arc;

use axum::{debug_handler, extract::{rejection::JsonRejection, State}, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::{
    appresult::json_body,
    db,
    fanout::{
        docs::{PairingAnnouncement, PairingKind, Participant},
        outbox, Publisher,
    },
    notifications,
    pairs::matcher::Candidate,
    AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/pair", post(pair_user))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Waiting,
    Matched { room_id: String },
}

/// Serializes enqueues, from reading the head to delivering the match;
/// cloned handles share the one lock.
#[derive(Debug, Clone, Default)]
pub struct Waitlist {
    head: Arc<Mutex<()>>,
}

#[derive(Debug, sqlx::FromRow)]
struct WaitlistEntry {
    id: i64,
    user_id: i64,
    username: String,
    profile_url: String,
}

impl Waitlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, db_pool: &SqlitePool, publisher: &Publisher, requester: Participant) -> anyhow::Result<Enqueued> {
        let _head = self.head.lock().await;
        let announcement = {
            let mut tx = db_pool.begin().await?;

            let head: Option<WaitlistEntry> = sqlx::query_as(
                "SELECT id,user_id,username,profile_url FROM waitlist ORDER BY created_at, id LIMIT 1",
            )
            .fetch_optional(&mut *tx)
            .await?;

            let Some(head) = head else {
                sqlx::query(
                    "INSERT INTO waitlist (user_id,username,profile_url,created_at) VALUES (?,?,?,?) ON CONFLICT (user_id) DO NOTHING",
                )
                .bind(requester.user_id)
                .bind(&requester.username)
                .bind(&requester.profile_url)
                .bind(db::now_millis())
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                tracing::info!(user_id = requester.user_id, "user is waiting");
                return Ok(Enqueued::Waiting);
            };

            if head.user_id == requester.user_id {
                return Ok(Enqueued::Waiting);
            }

            sqlx::query("DELETE FROM waitlist WHERE id=?")
                .bind(head.id)
                .execute(&mut *tx)
                .await?;

            let partner = Participant {
                user_id: head.user_id,
                username: head.username,
                profile_url: head.profile_url,
            };
            let announcement = PairingAnnouncement::new(PairingKind::OnDemand, vec![requester, partner], db::now_millis());

            notifications::insert(&mut tx, &announcement).await?;
            outbox::enqueue(&mut tx, &announcement).await?;
            tx.commit().await?;

            announcement
        };

        tracing::info!(room_id = %announcement.room_id, "waitlist match");
        publisher.deliver(db_pool, &announcement).await?;

        Ok(Enqueued::Matched { room_id: announcement.room_id })
    }
}

/// Queues a user the cycle could not pair; right after Purge they are the only entry.
pub async fn carry_over(db_pool: &SqlitePool, candidate: &Candidate) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO waitlist (user_id,username,profile_url,created_at) VALUES (?,?,?,?) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(candidate.user_id)
    .bind(&candidate.username)
    .bind(&candidate.profile_url)
    .bind(db::now_millis())
    .execute(db_pool)
    .await?;

    tracing::info!(user_id = candidate.user_id, "unpaired user carried over to the waitlist");
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PairUserRequest {
    user_id: i64,
    username: String,
    #[serde(default)]
    profile_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PairUserResponse {
    wait: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn pair_user(
    State(db_pool): State<SqlitePool>,
    State(publisher): State<Publisher>,
    State(waitlist): State<Waitlist>,
    body: Result<Json<PairUserRequest>, JsonRejection>,
) -> AppResult<Json<PairUserResponse>> {
    let PairUserRequest { user_id, username, profile_url } = json_body(body)?;

    let requester = Participant { user_id, username, profile_url };
    let wait = match waitlist.enqueue(&db_pool, &publisher, requester).await? {
        Enqueued::Waiting => true,
        Enqueued::Matched { .. } => false,
    };

    Ok(Json(PairUserResponse { wait }))
}
