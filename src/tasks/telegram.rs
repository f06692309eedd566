//! Ingestion listener: `/start` messages to the bot register the sender.

use std::time::Duration;

use serde::Deserialize;
use sqlx::SqlitePool;

use crate::users::store as users;

const POLL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    text: Option<String>,
    from: Option<Sender>,
}

#[derive(Debug, Deserialize)]
struct Sender {
    id: i64,
    username: Option<String>,
    first_name: String,
}

/// `(external user id, username)` for a `/start` command, if this update is one.
fn registration(update: &Update) -> Option<(i64, String)> {
    let message = update.message.as_ref()?;
    let text = message.text.as_deref()?;
    let command = text.split_whitespace().next()?;
    if command != "/start" && !command.starts_with("/start@") {
        return None;
    }

    let from = message.from.as_ref()?;
    let username = from.username.clone().unwrap_or_else(|| from.first_name.clone());
    Some((from.id, username))
}

/// Long-polls `getUpdates` until an error, which the supervisor restarts.
pub async fn listen(db_pool: SqlitePool, token: String) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
        .build()?;
    let url = format!("https://api.telegram.org/bot{token}/getUpdates");
    let mut offset = 0;

    tracing::info!("telegram listener started");
    loop {
        let response: ApiResponse<Vec<Update>> = client
            .get(&url)
            .query(&[("timeout", POLL_TIMEOUT_SECS as i64), ("offset", offset)])
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            anyhow::bail!("getUpdates failed: {}", response.description.unwrap_or_default());
        }

        for update in response.result.unwrap_or_default() {
            offset = offset.max(update.update_id + 1);
            if let Some((user_id, username)) = registration(&update) {
                users::upsert(&db_pool, user_id, &username, None).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn start_command_registers_sender() {
        let u = update(r#"{"update_id":1,"message":{"text":"/start","from":{"id":42,"username":"ada","first_name":"Ada"}}}"#);
        assert_eq!(registration(&u), Some((42, "ada".to_owned())));

        let u = update(r#"{"update_id":2,"message":{"text":"/start@pair_bot x","from":{"id":7,"first_name":"Bo"}}}"#);
        assert_eq!(registration(&u), Some((7, "Bo".to_owned())));
    }

    #[test]
    fn other_updates_are_ignored() {
        assert_eq!(registration(&update(r#"{"update_id":3}"#)), None);
        assert_eq!(
            registration(&update(r#"{"update_id":4,"message":{"text":"hello","from":{"id":1,"first_name":"A"}}}"#)),
            None
        );
        assert_eq!(
            registration(&update(r#"{"update_id":5,"message":{"text":"/startle","from":{"id":1,"first_name":"A"}}}"#)),
            None
        );
    }
}
