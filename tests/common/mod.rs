#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use pairup::{
    db,
    fanout::{MemoryStore, Publisher},
    users::store as users,
    AppState,
};
use sqlx::SqlitePool;

pub struct TestApp {
    pub state: AppState,
    pub store: MemoryStore,
    file: Option<PathBuf>,
}

impl TestApp {
    pub async fn new() -> TestApp {
        let db_pool = db::memory().await.expect("in-memory database");
        TestApp::with_pool(db_pool, None)
    }

    /// Temp-file database behind a pool of several connections.
    pub async fn on_disk() -> TestApp {
        let file = std::env::temp_dir().join(format!("pairup-{}.db", uuid::Uuid::now_v7().simple()));
        let db_pool = db::connect(&format!("sqlite://{}", file.display()))
            .await
            .expect("file database");
        TestApp::with_pool(db_pool, Some(file))
    }

    fn with_pool(db_pool: SqlitePool, file: Option<PathBuf>) -> TestApp {
        let store = MemoryStore::new();
        let state = AppState::new(db_pool, Publisher::new(Arc::new(store.clone())));
        TestApp { state, store, file }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.state.db_pool
    }

    pub async fn with_users(self, ids: &[i64]) -> TestApp {
        for &id in ids {
            users::upsert(self.db(), id, &format!("user{id}"), Some(format!("https://img/{id}").as_str()))
                .await
                .expect("seed user");
        }
        self
    }

    pub async fn count(&self, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let (n,): (i64,) = sqlx::query_as(&sql)
            .fetch_one(self.db())
            .await
            .expect("count");
        n
    }

    pub async fn counters(&self, id: i64) -> (i64, i64) {
        let profile = users::get(self.db(), id).await.expect("get").expect("user exists");
        (profile.attendance, profile.miss_count)
    }

    /// Pair id of the user's group today.
    pub async fn pair_of(&self, user_id: i64) -> i64 {
        pairup::pairs::daily_pair(self.db(), user_id, db::today())
            .await
            .expect("query")
            .expect("user has a pair today")
            .id
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            for suffix in ["", "-wal", "-shm", "-journal"] {
                let _ = std::fs::remove_file(format!("{}{suffix}", file.display()));
            }
        }
    }
}
