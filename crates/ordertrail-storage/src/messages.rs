use std::collections::HashMap;

use ordertrail_core::RawMessage;
use tracing::debug;

/// Outcome of handing a message to the store. An id seen before for the
/// same user yields the stored copy, which callers process instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    New(RawMessage),
    Existing(RawMessage),
}

impl Ingested {
    pub fn message(&self) -> &RawMessage {
        match self {
            Self::New(message) | Self::Existing(message) => message,
        }
    }

    pub fn into_message(self) -> RawMessage {
        match self {
            Self::New(message) | Self::Existing(message) => message,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}

#[derive(Debug, Default)]
pub struct MessageStore {
    messages: HashMap<(String, String), RawMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, user_id: &str, message: RawMessage) -> Ingested {
        let key = (user_id.to_string(), message.id.clone());
        if let Some(stored) = self.messages.get(&key) {
            debug!(message_id = %message.id, "message already ingested");
            return Ingested::Existing(stored.clone());
        }
        self.messages.insert(key, message.clone());
        Ingested::New(message)
    }

    pub fn get(&self, user_id: &str, message_id: &str) -> Option<&RawMessage> {
        self.messages.get(&(user_id.to_string(), message_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(id: &str, subject: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            sender: "orders@hm.com".to_string(),
            to_address: None,
            subject: subject.to_string(),
            received_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            html_body: String::new(),
            text_body: String::new(),
        }
    }

    #[test]
    fn repeated_ids_return_the_stored_copy() {
        let mut store = MessageStore::new();
        assert!(store.ingest("u1", message("m1", "first")).is_new());

        let again = store.ingest("u1", message("m1", "edited"));
        assert!(!again.is_new());
        assert_eq!(again.message().subject, "first");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn ids_are_scoped_per_user() {
        let mut store = MessageStore::new();
        assert!(store.ingest("u1", message("m1", "a")).is_new());
        assert!(store.ingest("u2", message("m1", "b")).is_new());
        assert_eq!(store.get("u2", "m1").map(|m| m.subject.as_str()), Some("b"));
    }
}
