use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{FanoutError, FanoutStore};

/// Realtime-Database style REST store: every path maps to `{root}/{path}.json`.
#[derive(Debug, Clone)]
pub struct RealtimeDb {
    client: reqwest::Client,
    root: String,
    auth: Option<String>,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

impl RealtimeDb {
    pub fn new(root: impl Into<String>, auth: Option<String>) -> Self {
        RealtimeDb {
            client: reqwest::Client::new(),
            root: root.into().trim_end_matches('/').to_owned(),
            auth,
        }
    }

    fn url(&self, path: &str) -> String {
        let url = format!("{}/{}.json", self.root, path.trim_matches('/'));
        match &self.auth {
            Some(auth) => format!("{url}?auth={auth}"),
            None => url,
        }
    }

    fn check(path: &str, response: &reqwest::Response) -> Result<(), FanoutError> {
        if !response.status().is_success() {
            return Err(FanoutError::Status {
                path: path.to_owned(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FanoutStore for RealtimeDb {
    async fn set(&self, path: &str, document: Value) -> Result<(), FanoutError> {
        let response = self.client.put(self.url(path))
            .json(&document)
            .send()
            .await?;
        Self::check(path, &response)
    }

    async fn push(&self, path: &str) -> Result<String, FanoutError> {
        let response = self.client.post(self.url(path))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check(path, &response)?;

        let PushResponse { name } = response.json().await?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls() {
        let db = RealtimeDb::new("https://example.firebaseio.com/", None);
        assert_eq!(db.url("/chats/1_2"), "https://example.firebaseio.com/chats/1_2.json");

        let db = RealtimeDb::new("https://example.firebaseio.com", Some("secret".to_owned()));
        assert_eq!(db.url("userChats/1/1_2"), "https://example.firebaseio.com/userChats/1/1_2.json?auth=secret");
    }
}
