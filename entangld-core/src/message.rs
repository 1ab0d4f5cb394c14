//! The wire record exchanged between stores. `Store` never serializes a `Message` itself
//! (byte encoding is an external collaborator); it only builds, matches, and dispatches
//! these as plain values, handing them to the user-supplied send function.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorMessage;
use crate::value::Node;

/// Correlates a `get`/`value` pair or a whole subscription chain. Every link of one
/// logical subscription shares a single id; a fresh one is minted per `get` and per
/// top-level `subscribe`.
pub type CorrelationId = Uuid;

/// Optional side-channel parameter carried by `get`/`set`/`push`. Most calls pass none;
/// `push` reads a `limit` field out of a map here, callable `get`s pass whatever the
/// caller supplies, and a depth-limited `get` passes a bare number. One loosely-typed
/// slot rather than three, matching how callers actually use it.
pub type Params = Node;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Message {
    /// upstream -> downstream: fetch the value at `path`, with optional `params` to hand
    /// to a callable leaf or a depth limit. `id` is fresh per call and echoed back on
    /// `value`.
    Get {
        path: String,
        params: Option<Params>,
        id: CorrelationId,
    },

    /// downstream -> upstream: the reply to a `Get`, echoing its path and id. `value` is
    /// `None` when the path resolved to nothing.
    Value {
        path: String,
        value: Option<Node>,
        id: CorrelationId,
    },

    /// upstream -> downstream: apply a local write. Uncorrelated.
    Set {
        path: String,
        value: Option<Node>,
        params: Option<Params>,
    },

    /// upstream -> downstream: append to a sequence leaf. Uncorrelated.
    Push {
        path: String,
        value: Node,
        params: Option<Params>,
    },

    /// upstream -> downstream: install a subscription link. `id` is the chain identifier,
    /// shared by every hop of this logical subscription.
    Subscribe {
        path: String,
        id: CorrelationId,
        throttle: u32,
    },

    /// downstream -> upstream: a change notification for the subscription chain `id`.
    /// `path` is relative to the sender; the receiver prepends its own namespace for
    /// that remote before matching it against its links.
    Event {
        path: String,
        value: Node,
        id: CorrelationId,
    },

    /// either direction: remove every link sharing `id`. Also used as the orphan-cleanup
    /// reply when an `Event` arrives for a chain the receiver no longer tracks.
    Unsubscribe { id: CorrelationId },

    /// downstream -> upstream: a `Get` could not be satisfied. Sent instead of `Value`;
    /// still resolves the caller's outstanding request, just with an error.
    Error { id: CorrelationId, error: ErrorMessage },
}

impl Message {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Get { .. } => "get",
            Message::Value { .. } => "value",
            Message::Set { .. } => "set",
            Message::Push { .. } => "push",
            Message::Subscribe { .. } => "subscribe",
            Message::Event { .. } => "event",
            Message::Unsubscribe { .. } => "unsubscribe",
            Message::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let id = Uuid::new_v4();
        let msg = Message::Get { path: "a.b".into(), params: Some(Node::from(2.0)), id };
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        match decoded {
            Message::Get { path, params, id: decoded_id } => {
                assert_eq!(path, "a.b");
                assert_eq!(params, Some(Node::from(2.0)));
                assert_eq!(decoded_id, id);
            }
            other => panic!("expected Get, got {}", other.kind_name()),
        }
    }

    #[test]
    fn kind_name_covers_every_variant() {
        let id = Uuid::new_v4();
        assert_eq!(Message::Get { path: "a".into(), params: None, id }.kind_name(), "get");
        assert_eq!(Message::Value { path: "a".into(), value: None, id }.kind_name(), "value");
        assert_eq!(Message::Unsubscribe { id }.kind_name(), "unsubscribe");
    }
}
