use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::FanoutError;

pub const ROOM_NAME: &str = "Daily Match";
pub const SYSTEM_SENDER_NAME: &str = "admin";
pub const SYSTEM_SENDER_ID: i64 = 1;
/// Key of the pairing announcement under `messages/{room_id}`.
pub const PAIRING_MESSAGE_KEY: &str = "pairing";

pub const PAIRED_MESSAGE: &str = "You've been paired for today's conversation!";
pub const SPECIAL_GROUP_MESSAGE: &str = "You are in a special group for today's conversation!";
/// Room preview of a waitlist match.
pub const ON_DEMAND_PREVIEW: &str = "As per your request, you have been paired. Please check your messages.";

/// Canonical room id: ascending member ids joined by `_`.
pub fn room_id(member_ids: &[i64]) -> String {
    let mut ids = member_ids.to_vec();
    ids.sort_unstable();
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: i64,
    pub username: String,
    pub profile_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingKind {
    Daily,
    OnDemand,
}

/// What the ledger hands to fan-out; stored verbatim in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingAnnouncement {
    pub room_id: String,
    pub kind: PairingKind,
    /// Ascending by `user_id`.
    pub members: Vec<Participant>,
    pub created_at: i64,
}

impl PairingAnnouncement {
    pub fn new(kind: PairingKind, mut members: Vec<Participant>, created_at: i64) -> Self {
        members.sort_by_key(|m| m.user_id);
        let ids: Vec<i64> = members.iter().map(|m| m.user_id).collect();

        PairingAnnouncement {
            room_id: room_id(&ids),
            kind,
            members,
            created_at,
        }
    }

    pub fn message(&self) -> &'static str {
        if self.members.len() == 3 {
            SPECIAL_GROUP_MESSAGE
        } else {
            PAIRED_MESSAGE
        }
    }

    /// `lastMessage` of the room; waitlist matches get their own wording.
    pub fn preview(&self) -> &'static str {
        match self.kind {
            PairingKind::OnDemand => ON_DEMAND_PREVIEW,
            PairingKind::Daily => self.message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub chat_id: String,
    pub name: String,
    pub is_group: bool,
    pub participant_ids: Vec<i64>,
    pub participant_usernames: Vec<String>,
    pub participant_images: Vec<String>,
    pub last_message: String,
    pub last_message_time: i64,
    pub seen_by: BTreeMap<String, bool>,
    pub unread_counts: BTreeMap<String, u32>,
}

impl ChatRoom {
    pub fn from_announcement(announcement: &PairingAnnouncement) -> ChatRoom {
        let members = &announcement.members;
        let keys = members.iter().map(|m| m.user_id.to_string());

        ChatRoom {
            chat_id: announcement.room_id.clone(),
            name: ROOM_NAME.to_owned(),
            is_group: members.len() > 2,
            participant_ids: members.iter().map(|m| m.user_id).collect(),
            participant_usernames: members.iter().map(|m| m.username.clone()).collect(),
            participant_images: members.iter().map(|m| m.profile_url.clone()).collect(),
            last_message: announcement.preview().to_owned(),
            last_message_time: announcement.created_at,
            seen_by: keys.clone().map(|k| (k, false)).collect(),
            // the announcement itself is the one unread message
            unread_counts: keys.map(|k| (k, 1)).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), FanoutError> {
        let n = self.participant_ids.len();
        if !(2..=3).contains(&n) {
            return Err(FanoutError::Invalid(format!("room {} has {n} participants", self.chat_id)));
        }
        if !self.participant_ids.windows(2).all(|w| w[0] < w[1]) {
            return Err(FanoutError::Invalid(format!("room {} participants are not ascending", self.chat_id)));
        }
        if self.participant_usernames.len() != n || self.participant_images.len() != n {
            return Err(FanoutError::Invalid(format!("room {} participant lists differ in length", self.chat_id)));
        }
        if self.chat_id != room_id(&self.participant_ids) {
            return Err(FanoutError::Invalid(format!("room id {} does not match its participants", self.chat_id)));
        }
        let keyed = |keys: Vec<&String>| {
            keys.len() == n && self.participant_ids.iter().all(|id| keys.contains(&&id.to_string()))
        };
        if !keyed(self.seen_by.keys().collect()) || !keyed(self.unread_counts.keys().collect()) {
            return Err(FanoutError::Invalid(format!("room {} per-user maps do not match participants", self.chat_id)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub sender_name: String,
    pub sender_id: i64,
    pub created_at: i64,
    pub is_system_message: bool,
}

impl ChatMessage {
    pub fn pairing(announcement: &PairingAnnouncement) -> ChatMessage {
        ChatMessage {
            text: announcement.message().to_owned(),
            sender_name: SYSTEM_SENDER_NAME.to_owned(),
            sender_id: SYSTEM_SENDER_ID,
            created_at: announcement.created_at,
            is_system_message: true,
        }
    }

    pub fn validate(&self) -> Result<(), FanoutError> {
        if self.text.trim().is_empty() {
            return Err(FanoutError::Invalid("system message without text".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user_id: i64, username: &str) -> Participant {
        Participant { user_id, username: username.to_owned(), profile_url: format!("https://img/{user_id}") }
    }

    #[test]
    fn room_id_is_sorted() {
        assert_eq!(room_id(&[7, 5]), "5_7");
        assert_eq!(room_id(&[3, 1, 2]), "1_2_3");
        assert_eq!(room_id(&[10, 9]), "9_10");
    }

    #[test]
    fn announcement_orders_members() {
        let a = PairingAnnouncement::new(PairingKind::OnDemand, vec![member(7, "g"), member(5, "e")], 1000);
        assert_eq!(a.room_id, "5_7");
        assert_eq!(a.members[0].user_id, 5);
        assert_eq!(a.message(), PAIRED_MESSAGE);
    }

    #[test]
    fn on_demand_room_has_its_own_preview() {
        let a = PairingAnnouncement::new(PairingKind::OnDemand, vec![member(7, "g"), member(5, "e")], 1000);
        assert_eq!(ChatRoom::from_announcement(&a).last_message, ON_DEMAND_PREVIEW);
        assert_eq!(ChatMessage::pairing(&a).text, PAIRED_MESSAGE);

        let daily = PairingAnnouncement::new(PairingKind::Daily, vec![member(7, "g"), member(5, "e")], 1000);
        assert_eq!(ChatRoom::from_announcement(&daily).last_message, PAIRED_MESSAGE);
    }

    #[test]
    fn chat_room_from_trio() {
        let a = PairingAnnouncement::new(PairingKind::Daily, vec![member(3, "c"), member(1, "a"), member(2, "b")], 42);
        let room = ChatRoom::from_announcement(&a);

        assert_eq!(room.chat_id, "1_2_3");
        assert!(room.is_group);
        assert_eq!(room.participant_usernames, vec!["a", "b", "c"]);
        assert_eq!(room.last_message, SPECIAL_GROUP_MESSAGE);
        assert_eq!(room.last_message_time, 42);
        assert!(room.unread_counts.values().all(|&c| c == 1));
        assert!(room.seen_by.values().all(|&s| !s));
        room.validate().unwrap();
    }

    #[test]
    fn validate_rejects_mismatched_room_id() {
        let a = PairingAnnouncement::new(PairingKind::Daily, vec![member(1, "a"), member(2, "b")], 0);
        let mut room = ChatRoom::from_announcement(&a);
        room.chat_id = "2_1".to_owned();
        assert!(room.validate().is_err());
    }

    #[test]
    fn validate_rejects_singleton() {
        let a = PairingAnnouncement::new(PairingKind::Daily, vec![member(1, "a")], 0);
        assert!(ChatRoom::from_announcement(&a).validate().is_err());
    }

    #[test]
    fn camel_case_on_the_wire() {
        let a = PairingAnnouncement::new(PairingKind::Daily, vec![member(1, "a"), member(2, "b")], 0);
        let value = serde_json::to_value(ChatRoom::from_announcement(&a)).unwrap();
        assert_eq!(value["participantIds"], serde_json::json!([1, 2]));
        assert_eq!(value["unreadCounts"]["2"], 1);
        assert_eq!(value["isGroup"], false);
    }
}
