//! ---
//! srr_section: "02-messaging-bus"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Message-bus envelope, transports, and request client."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata keys carried on every envelope.
pub mod meta {
    /// Action requested from the receiver (`save`, `restore`, `reset`, ...).
    pub const SUBJECT: &str = "subject";
    /// Agent name of the sender.
    pub const FROM: &str = "from";
    /// Agent name of the addressee.
    pub const TO: &str = "to";
    /// Fresh UUID binding a reply to its request.
    pub const CORRELATION_ID: &str = "correlation-id";
    /// Queue on which the sender awaits the reply.
    pub const REPLY_TO: &str = "reply-to";
    /// Reply status string on UI-facing responses.
    pub const STATUS: &str = "status";
}

/// Envelope moved across the bus: a flat metadata map plus a JSON body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Envelope metadata (subject, routing, correlation).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Payload, serialized JSON.
    #[serde(default)]
    pub body: String,
}

impl Message {
    /// Build a request envelope with a fresh correlation id.
    pub fn request(
        subject: &str,
        from: &str,
        to: &str,
        reply_to: &str,
        body: impl Into<String>,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(meta::SUBJECT.to_owned(), subject.to_owned());
        metadata.insert(meta::FROM.to_owned(), from.to_owned());
        metadata.insert(meta::TO.to_owned(), to.to_owned());
        metadata.insert(meta::REPLY_TO.to_owned(), reply_to.to_owned());
        metadata.insert(
            meta::CORRELATION_ID.to_owned(),
            Uuid::new_v4().to_string(),
        );
        Self {
            metadata,
            body: body.into(),
        }
    }

    /// Build the reply envelope for `request`: routing fields swapped, the
    /// correlation id preserved.
    pub fn reply(request: &Message, body: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        if let Some(subject) = request.meta(meta::SUBJECT) {
            metadata.insert(meta::SUBJECT.to_owned(), subject.to_owned());
        }
        if let Some(to) = request.meta(meta::TO) {
            metadata.insert(meta::FROM.to_owned(), to.to_owned());
        }
        if let Some(from) = request.meta(meta::FROM) {
            metadata.insert(meta::TO.to_owned(), from.to_owned());
        }
        if let Some(correlation) = request.meta(meta::CORRELATION_ID) {
            metadata.insert(meta::CORRELATION_ID.to_owned(), correlation.to_owned());
        }
        Self {
            metadata,
            body: body.into(),
        }
    }

    /// Read a metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Set a metadata value, replacing any previous one.
    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_owned(), value.into());
    }

    /// Action this envelope carries; empty when absent.
    pub fn subject(&self) -> &str {
        self.meta(meta::SUBJECT).unwrap_or_default()
    }

    /// Correlation id binding request and reply; empty when absent.
    pub fn correlation_id(&self) -> &str {
        self.meta(meta::CORRELATION_ID).unwrap_or_default()
    }

    /// Queue the sender expects the reply on.
    pub fn reply_to(&self) -> Option<&str> {
        self.meta(meta::REPLY_TO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_gets_fresh_correlation_ids() {
        let first = Message::request("save", "etn-srr", "etn-asset", "ETN.Q.SRR.REPLY", "{}");
        let second = Message::request("save", "etn-srr", "etn-asset", "ETN.Q.SRR.REPLY", "{}");
        assert!(!first.correlation_id().is_empty());
        assert_ne!(first.correlation_id(), second.correlation_id());
        assert_eq!(first.subject(), "save");
        assert_eq!(first.reply_to(), Some("ETN.Q.SRR.REPLY"));
    }

    #[test]
    fn reply_preserves_correlation_and_swaps_route() {
        let request = Message::request("restore", "etn-srr", "etn-asset", "ETN.Q.SRR.REPLY", "{}");
        let reply = Message::reply(&request, r#"{"status":"SUCCESS"}"#);
        assert_eq!(reply.correlation_id(), request.correlation_id());
        assert_eq!(reply.meta(meta::FROM), Some("etn-asset"));
        assert_eq!(reply.meta(meta::TO), Some("etn-srr"));
    }
}
