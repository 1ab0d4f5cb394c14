//! The local tree's leaf type. A node is a tagged sum: primitive data, an ordered
//! sequence, a nested mapping, or a callable. See `Store::get` for how callables are
//! dereferenced with partial-path continuation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde_json::Value as Json;

use crate::error::{EntangldError, Result};
use crate::path;

/// A callable leaf: invoked on `get`, given an optional parameter node, returning a
/// future of either a value or an error. May be invoked repeatedly and from any clone.
pub type Callable = Arc<dyn Fn(Option<Node>) -> BoxFuture<'static, Result<Node>> + Send + Sync>;

/// One leaf (or subtree) of the local store tree.
#[derive(Clone)]
pub enum Node {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Seq(Vec<Node>),
    Map(HashMap<String, Node>),
    Callable(Callable),
}

impl Node {
    pub fn map() -> Self {
        Node::Map(HashMap::new())
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Node::Map(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Node::Callable(_))
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut HashMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_seq_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(Option<Node>) -> BoxFuture<'static, Result<Node>> + Send + Sync + 'static,
    {
        Node::Callable(Arc::new(f))
    }

    /// Lossy conversion to `serde_json::Value`, used by the demo wire transport and by
    /// `deref_mode`. A callable that survives to this point (dereference did not run, or
    /// a nested result still embeds one) is dropped to `null`; this is an accepted
    /// limitation, not a bug.
    pub fn into_json(self) -> Json {
        match self {
            Node::Null => Json::Null,
            Node::Bool(b) => Json::Bool(b),
            Node::Number(n) => serde_json::Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null),
            Node::String(s) => Json::String(s),
            Node::Seq(items) => Json::Array(items.into_iter().map(Node::into_json).collect()),
            Node::Map(map) => Json::Object(map.into_iter().map(|(k, v)| (k, v.into_json())).collect()),
            Node::Callable(_) => Json::Null,
        }
    }
}

impl From<Json> for Node {
    fn from(value: Json) -> Self {
        match value {
            Json::Null => Node::Null,
            Json::Bool(b) => Node::Bool(b),
            Json::Number(n) => Node::Number(n.as_f64().unwrap_or(0.0)),
            Json::String(s) => Node::String(s),
            Json::Array(items) => Node::Seq(items.into_iter().map(Node::from).collect()),
            Json::Object(map) => Node::Map(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect()),
        }
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Number(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Number(value as f64)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::String(value)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => write!(f, "Null"),
            Node::Bool(b) => write!(f, "Bool({b})"),
            Node::Number(n) => write!(f, "Number({n})"),
            Node::String(s) => write!(f, "String({s:?})"),
            Node::Seq(items) => f.debug_list().entries(items).finish(),
            Node::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Node::Callable(_) => write!(f, "Callable(..)"),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Number(a), Node::Number(b)) => a == b,
            (Node::String(a), Node::String(b)) => a == b,
            (Node::Seq(a), Node::Seq(b)) => a == b,
            (Node::Map(a), Node::Map(b)) => a == b,
            (Node::Callable(a), Node::Callable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Callables serialize as `null`; see `into_json`. This makes `Message` serializable
/// end to end even though the local tree may embed callables.
impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Node::Null | Node::Callable(_) => serializer.serialize_none(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(n) => serializer.serialize_f64(*n),
            Node::String(s) => serializer.serialize_str(s),
            Node::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Map(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = Json::deserialize(deserializer).map_err(de::Error::custom)?;
        Ok(Node::from(json))
    }
}

/// Outcome of resolving a path against a tree. `Callable` carries whatever suffix of the
/// path was not consumed before the callable was reached, so the caller can continue
/// resolution into the callable's result.
pub enum Resolution {
    Found(Node),
    Callable(Callable, String),
    Absent,
}

/// Walks `segments` through `root`, stopping early at the first callable encountered.
pub fn resolve(root: &Node, path: &str) -> Resolution {
    let segments = path::split(path);
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        match current {
            Node::Callable(callable) => {
                return Resolution::Callable(callable.clone(), path::join(&segments[i..]));
            }
            Node::Map(map) => match map.get(*segment) {
                Some(next) => current = next,
                None => return Resolution::Absent,
            },
            _ => return Resolution::Absent,
        }
    }
    if let Node::Callable(callable) = current {
        return Resolution::Callable(callable.clone(), String::new());
    }
    Resolution::Found(current.clone())
}

/// Writes `value` at `path` within `root`, auto-creating intermediate mappings.
/// `value = None` removes the leaf. Root-level sets (`path == ""`) replace the whole
/// tree and require a mapping.
pub fn set(root: &mut Node, path: &str, value: Option<Node>) -> Result<()> {
    let segments = path::split(path);

    if segments.is_empty() {
        return match value {
            Some(Node::Map(_)) => {
                *root = value.unwrap();
                Ok(())
            }
            Some(_) => Err(EntangldError::type_error("root set requires a mapping value")),
            None => {
                *root = Node::map();
                Ok(())
            }
        };
    }

    let (last, ancestors) = segments.split_last().expect("non-empty segments");

    let mut current = root;
    for segment in ancestors {
        let map = match current {
            Node::Map(m) => m,
            _ => return Err(EntangldError::type_error(format!("{segment} is not a mapping"))),
        };
        current = map.entry((*segment).to_string()).or_insert_with(Node::map);
    }

    let map = match current {
        Node::Map(m) => m,
        _ => return Err(EntangldError::type_error(format!("{last} is not a mapping"))),
    };

    match value {
        Some(v) => {
            map.insert((*last).to_string(), v);
        }
        None => {
            map.remove(*last);
        }
    }

    Ok(())
}

/// Appends `value` to the sequence at `path`, then trims from the head down to `limit`
/// if given. Fails if the leaf is not a sequence.
pub fn push(root: &mut Node, path: &str, value: Node, limit: Option<usize>) -> Result<()> {
    let segments = path::split(path);
    let (last, ancestors) = segments
        .split_last()
        .ok_or_else(|| EntangldError::type_error("push requires a non-root path"))?;

    let mut current = root;
    for segment in ancestors {
        let map = match current {
            Node::Map(m) => m,
            _ => return Err(EntangldError::type_error(format!("{segment} is not a mapping"))),
        };
        current = map.entry((*segment).to_string()).or_insert_with(Node::map);
    }

    let map = match current {
        Node::Map(m) => m,
        _ => return Err(EntangldError::type_error(format!("{last} is not a mapping"))),
    };

    let seq = match map.entry((*last).to_string()).or_insert_with(|| Node::Seq(Vec::new())) {
        Node::Seq(s) => s,
        _ => return Err(EntangldError::type_error(format!("{last} is not a sequence"))),
    };

    seq.push(value);

    if let Some(limit) = limit {
        while seq.len() > limit {
            seq.remove(0);
        }
    }

    Ok(())
}

/// Returns a copy of `node` truncated at `depth`: primitives pass through untouched,
/// nested containers at `depth == 0` become empty (preserving their kind), otherwise
/// recurse with `depth - 1`.
pub fn project(node: &Node, depth: u32) -> Node {
    match node {
        Node::Map(map) => {
            if depth == 0 {
                Node::map()
            } else {
                Node::Map(map.iter().map(|(k, v)| (k.clone(), project(v, depth - 1))).collect())
            }
        }
        Node::Seq(items) => {
            if depth == 0 {
                Node::Seq(Vec::new())
            } else {
                Node::Seq(items.iter().map(|v| project(v, depth - 1)).collect())
            }
        }
        other => other.clone(),
    }
}

/// Walks `node`, replacing every callable it finds with the value that callable
/// produces (awaiting its future), recursively dereferencing the result as well.
pub fn deref(node: Node) -> BoxFuture<'static, Node> {
    Box::pin(async move {
        match node {
            Node::Callable(callable) => match callable(None).await {
                Ok(produced) => deref(produced).await,
                Err(_) => Node::Null,
            },
            Node::Map(map) => {
                let mut out = HashMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, deref(v).await);
                }
                Node::Map(out)
            }
            Node::Seq(items) => {
                let mut out = Vec::with_capacity(items.len());
                for v in items {
                    out.push(deref(v).await);
                }
                Node::Seq(out)
            }
            other => other,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Node)]) -> Node {
        Node::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn set_and_resolve_primitive() {
        let mut tree = Node::map();
        set(&mut tree, "number.six", Some(Node::from(6.0))).unwrap();
        match resolve(&tree, "number.six") {
            Resolution::Found(Node::Number(n)) => assert_eq!(n, 6.0),
            _ => panic!("expected number"),
        }
    }

    #[test]
    fn set_auto_creates_intermediate_maps() {
        let mut tree = Node::map();
        set(&mut tree, "a.b.c", Some(Node::from("leaf"))).unwrap();
        assert!(matches!(resolve(&tree, "a"), Resolution::Found(Node::Map(_))));
        assert!(matches!(resolve(&tree, "a.b"), Resolution::Found(Node::Map(_))));
    }

    #[test]
    fn set_none_removes_leaf() {
        let mut tree = map(&[("a", Node::from(1.0))]);
        set(&mut tree, "a", None).unwrap();
        assert!(matches!(resolve(&tree, "a"), Resolution::Absent));
    }

    #[test]
    fn root_set_requires_mapping() {
        let mut tree = Node::map();
        assert!(set(&mut tree, "", Some(Node::from(1.0))).is_err());
        assert!(set(&mut tree, "", Some(Node::map())).is_ok());
    }

    #[test]
    fn resolve_missing_segment_is_absent() {
        let tree = Node::map();
        assert!(matches!(resolve(&tree, "a.b"), Resolution::Absent));
    }

    #[test]
    fn resolve_stops_at_callable_with_remaining_suffix() {
        let tree = map(&[("double", Node::callable(|_| Box::pin(async { Ok(Node::from(4.0)) })))]);
        match resolve(&tree, "double.me") {
            Resolution::Callable(_, remaining) => assert_eq!(remaining, "me"),
            _ => panic!("expected callable"),
        }
    }

    #[test]
    fn push_appends_and_trims_to_limit() {
        let mut tree = Node::map();
        for _ in 0..4 {
            push(&mut tree, "rapid.data", Node::from(1.0), Some(2)).unwrap();
        }
        match resolve(&tree, "rapid.data") {
            Resolution::Found(Node::Seq(items)) => assert_eq!(items.len(), 2),
            _ => panic!("expected sequence"),
        }
    }

    #[test]
    fn push_against_non_sequence_fails() {
        let mut tree = map(&[("a", Node::from(1.0))]);
        assert!(push(&mut tree, "a", Node::from(2.0), None).is_err());
    }

    #[test]
    fn project_depth_limits_nested_containers() {
        let tree = map(&[("a", map(&[("b", Node::from(1.0))]))]);
        let projected = project(&tree, 0);
        assert_eq!(projected, Node::map());

        let projected = project(&tree, 1);
        match projected {
            Node::Map(m) => assert_eq!(m.get("a"), Some(&Node::map())),
            _ => panic!("expected map"),
        }
    }

    #[tokio::test]
    async fn deref_replaces_callables_with_their_value() {
        let tree = map(&[("x", Node::callable(|_| Box::pin(async { Ok(Node::from(4.0)) })))]);
        let out = deref(tree).await;
        match out {
            Node::Map(m) => assert_eq!(m.get("x"), Some(&Node::from(4.0))),
            _ => panic!("expected map"),
        }
    }
}
