use std::{fmt, sync::Arc};

use futures_util::future::try_join_all;
use serde_json::Value;
use sqlx::SqlitePool;

use super::{
    docs::{ChatMessage, ChatRoom, PairingAnnouncement, PAIRING_MESSAGE_KEY},
    outbox, FanoutError, FanoutStore,
};

const RELAY_BATCH: i64 = 100;

#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn FanoutStore>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
}

impl fmt::Display for RelayReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} room(s) published, {} failed", self.published, self.failed)
    }
}

impl Publisher {
    pub fn new(store: Arc<dyn FanoutStore>) -> Self {
        Publisher { store }
    }

    /// Writes the room, its announcement and the membership links.
    pub async fn publish(&self, announcement: &PairingAnnouncement) -> Result<(), FanoutError> {
        let room_id = &announcement.room_id;

        let room = ChatRoom::from_announcement(announcement);
        room.validate()?;
        let message = ChatMessage::pairing(announcement);
        message.validate()?;

        self.store.set(&format!("chats/{room_id}"), serde_json::to_value(&room)?).await?;
        self.store
            .set(&format!("messages/{room_id}/{PAIRING_MESSAGE_KEY}"), serde_json::to_value(&message)?)
            .await?;

        try_join_all(announcement.members.iter().map(|member| {
            let path = format!("userChats/{}/{room_id}", member.user_id);
            async move { self.store.set(&path, Value::Bool(true)).await }
        }))
        .await?;

        tracing::info!(room_id = %room_id, members = announcement.members.len(), "room published");
        Ok(())
    }

    /// Publishes and records the outcome in the outbox. Failure is logged only.
    pub async fn deliver(&self, db_pool: &SqlitePool, announcement: &PairingAnnouncement) -> anyhow::Result<bool> {
        match self.publish(announcement).await {
            Ok(()) => {
                outbox::mark_published(db_pool, &announcement.room_id).await?;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(room_id = %announcement.room_id, error = %e, "fan-out failed, left in outbox");
                outbox::mark_failed(db_pool, &announcement.room_id, &e.to_string()).await?;
                Ok(false)
            }
        }
    }

    /// Drains one batch of the outbox.
    pub async fn relay(&self, db_pool: &SqlitePool) -> anyhow::Result<RelayReport> {
        let mut report = RelayReport::default();

        for announcement in outbox::pending(db_pool, RELAY_BATCH).await? {
            if self.deliver(db_pool, &announcement).await? {
                report.published += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.published + report.failed > 0 {
            tracing::info!(published = report.published, failed = report.failed, "outbox relayed");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::fanout::{
        docs::{PairingKind, Participant},
        MemoryStore,
    };

    use super::*;

    fn announcement(ids: &[i64]) -> PairingAnnouncement {
        let members = ids
            .iter()
            .map(|&user_id| Participant {
                user_id,
                username: format!("user{user_id}"),
                profile_url: String::new(),
            })
            .collect();
        PairingAnnouncement::new(PairingKind::Daily, members, 1_700_000_000_000)
    }

    #[tokio::test]
    async fn publish_writes_room_message_and_links() {
        let store = MemoryStore::new();
        let publisher = Publisher::new(Arc::new(store.clone()));

        publisher.publish(&announcement(&[2, 1])).await.unwrap();

        let room: ChatRoom = serde_json::from_value(store.get("chats/1_2").unwrap()).unwrap();
        assert_eq!(room.participant_ids, vec![1, 2]);
        assert!(store.get("messages/1_2/pairing").is_some());
        assert_eq!(store.get("userChats/1/1_2"), Some(Value::Bool(true)));
        assert_eq!(store.get("userChats/2/1_2"), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn publish_twice_is_identical() {
        let store = MemoryStore::new();
        let publisher = Publisher::new(Arc::new(store.clone()));
        let a = announcement(&[4, 9, 6]);

        publisher.publish(&a).await.unwrap();
        let first = serde_json::to_vec(&store.snapshot()).unwrap();
        publisher.publish(&a).await.unwrap();
        let second = serde_json::to_vec(&store.snapshot()).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalid_room_is_not_written() {
        let store = MemoryStore::new();
        let publisher = Publisher::new(Arc::new(store.clone()));

        assert!(matches!(publisher.publish(&announcement(&[1])).await, Err(FanoutError::Invalid(_))));
        assert!(store.snapshot().is_empty());
    }
}
