//! The store: a local tree, a mount table into other stores, an outstanding-request
//! table for one-shot `get`s, and a subscription list. Every operation here runs under
//! one lock; see [`Inner`]. The lock never spans an `await` — the user-supplied `send`
//! function is synchronous, and the only genuinely async waits (a remote's `value` reply,
//! a callable leaf's future) happen after the guard has been dropped.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{EntangldError, ErrorMessage, Result};
use crate::message::{CorrelationId, Message};
use crate::mount::MountTable;
use crate::path;
use crate::subscription::{Callback, Subscription};
use crate::value::{self, Node, Resolution};

/// Delivers one message to one remote. Fire-and-forget by contract — the store never
/// waits on it, and whatever happens to the message after this call (queued, written to
/// a socket, dropped) is the transport's business, not the store's.
pub type SendFn<R> = Box<dyn Fn(Message, R) + Send + Sync>;

/// Notifications a host process can observe without installing a callback: a local
/// subscription link came up or went away. Mirrors the outbox/inbox pattern used
/// elsewhere in this codebase for fan-out without a direct caller/callee coupling.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Subscription { path: String, id: CorrelationId },
    Unsubscription { path: String, id: CorrelationId },
}

struct Inner<R> {
    tree: Node,
    mounts: MountTable<R>,
    outstanding: HashMap<CorrelationId, oneshot::Sender<Option<Node>>>,
    subscriptions: Vec<Subscription<R>>,
    send: Option<SendFn<R>>,
    config: StoreConfig,
    events: broadcast::Sender<StoreEvent>,
}

/// A federated hierarchical key-value store. `R` is an opaque handle identifying a
/// remote peer — a channel, an actor address, a connection id — whatever the embedding
/// transport uses to tell peers apart. The store never interprets `R` beyond equality
/// and hashing.
pub struct Store<R> {
    inner: Mutex<Inner<R>>,
}

impl<R> Store<R>
where
    R: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner {
                tree: Node::map(),
                mounts: MountTable::default(),
                outstanding: HashMap::new(),
                subscriptions: Vec::new(),
                send: None,
                config,
                events,
            }),
        }
    }

    /// Registers the function used to deliver every outgoing message, in either logical
    /// direction. A store with no `send` configured can still hold data and serve local
    /// callers; anything that would cross a mount boundary fails with `ProtocolError`.
    pub fn transmit(&self, send: SendFn<R>) {
        self.inner.lock().unwrap().send = Some(send);
    }

    pub fn config(&self) -> StoreConfig {
        self.inner.lock().unwrap().config.clone()
    }

    pub fn set_config(&self, config: StoreConfig) {
        self.inner.lock().unwrap().config = config;
    }

    /// A fresh receiver for this store's subscription-lifecycle events. Lagging
    /// receivers silently miss old events rather than blocking delivery to others.
    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.lock().unwrap().events.subscribe()
    }

    /// A full copy of the local tree, mount placeholders included. Callables are not
    /// invoked; they come back as whatever `Node`'s `Debug`/`Serialize` impls do with
    /// them. Mainly useful for tests and diagnostics.
    pub fn snapshot(&self) -> Node {
        self.inner.lock().unwrap().tree.clone()
    }

    /// Mounts `remote` at `namespace`, installing an empty mapping placeholder in the
    /// local tree. Any subscription already rooted at or beneath `namespace` is torn
    /// down and re-installed through the new mount, keeping its id, callback, and
    /// upstream so the chain it belongs to stays intact.
    pub fn attach(&self, namespace: &str, remote: R) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mounts.attach(namespace, remote)?;
        value::set(&mut inner.tree, namespace, Some(Node::map()))?;
        debug!(namespace, "attached remote store");

        let mut rehomed = Vec::new();
        let mut kept = Vec::new();
        for sub in inner.subscriptions.drain(..) {
            if path::is_beneath(&sub.path, namespace) {
                rehomed.push(sub);
            } else {
                kept.push(sub);
            }
        }
        inner.subscriptions = kept;
        for sub in rehomed {
            trace!(path = %sub.path, "rehoming subscription onto newly attached remote");
            install_link(&mut inner, sub.path, sub.id, sub.upstream, sub.callback, sub.throttle);
        }
        Ok(())
    }

    /// Unmounts a remote, given either its namespace or the handle itself. Subscription
    /// links that forwarded through this remote are left in the list; see the crate's
    /// design notes on why cleanup there is deliberately out of scope.
    pub fn detach(&self, namespace: Option<&str>, remote: Option<&R>) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let namespace = inner.mounts.detach(namespace, remote)?;
        value::set(&mut inner.tree, &namespace, None)?;
        debug!(namespace = %namespace, "detached remote store");
        Ok(namespace)
    }

    pub fn set(&self, path: &str, value: Option<Node>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        do_set(&mut inner, path, value)
    }

    pub fn push(&self, path: &str, value: Node, limit: Option<usize>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        do_push(&mut inner, path, value, limit)
    }

    /// Resolves `path`, forwarding to a mount if one covers it. `params` is handed to a
    /// callable leaf verbatim; against ordinary data, a bare non-negative number instead
    /// requests a depth-limited projection. Returns `Ok(None)` when the path is absent
    /// rather than treating that as an error.
    pub fn get<'a>(&'a self, path: &'a str, params: Option<Node>) -> BoxFuture<'a, Result<Option<Node>>> {
        Box::pin(async move {
            enum Step<R> {
                Remote(R, String),
                Found(Node),
                Callable(crate::value::Callable, String),
                Absent,
            }

            let step = {
                let inner = self.inner.lock().unwrap();
                match inner.mounts.resolve(path) {
                    Some((remote, _, residual)) => Step::Remote(remote.clone(), residual.to_string()),
                    None => match value::resolve(&inner.tree, path) {
                        Resolution::Found(node) => Step::Found(node),
                        Resolution::Callable(callable, residual) => Step::Callable(callable, residual),
                        Resolution::Absent => Step::Absent,
                    },
                }
            };

            match step {
                Step::Remote(remote, residual) => self.get_remote(remote, residual, params).await,
                Step::Absent => Ok(None),
                Step::Found(node) => Ok(Some(self.finish_local(node, params).await)),
                Step::Callable(callable, residual) => self.resolve_callable_chain(callable, residual, params).await,
            }
        })
    }

    async fn get_remote(&self, remote: R, path: String, params: Option<Node>) -> Result<Option<Node>> {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.outstanding.insert(id, tx);
            if let Err(err) = send(&inner, Message::Get { path, params, id }, remote) {
                inner.outstanding.remove(&id);
                return Err(err);
            }
        }
        rx.await.map_err(|_| EntangldError::not_found("remote store did not reply before being dropped"))
    }

    async fn resolve_callable_chain(&self, mut callable: crate::value::Callable, mut residual: String, params: Option<Node>) -> Result<Option<Node>> {
        loop {
            let produced = callable(params.clone()).await?;
            if residual.is_empty() {
                return Ok(Some(self.finish_local(produced, None).await));
            }
            match value::resolve(&produced, &residual) {
                Resolution::Found(node) => return Ok(Some(self.finish_local(node, None).await)),
                Resolution::Callable(next, rest) => {
                    callable = next;
                    residual = rest;
                }
                Resolution::Absent => return Ok(None),
            }
        }
    }

    /// Applies depth projection (when `params` is a bare number) and, if `deref_mode` is
    /// on, walks the result replacing any surviving callables with their own value.
    async fn finish_local(&self, node: Node, params: Option<Node>) -> Node {
        let projected = match params {
            Some(Node::Number(depth)) if depth >= 0.0 => value::project(&node, depth as u32),
            _ => node,
        };
        let deref_mode = self.inner.lock().unwrap().config.deref_mode;
        if deref_mode {
            value::deref(projected).await
        } else {
            projected
        }
    }

    /// Installs a fresh subscription rooted at `path` and returns its id. The id is also
    /// the handle `unsubscribe` takes later.
    pub fn subscribe(&self, path: &str, throttle: u32, callback: Callback) -> CorrelationId {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().unwrap();
        install_link(&mut inner, path.to_string(), id, None, Some(callback), throttle.max(1));
        id
    }

    /// Removes the local head link with this id. Fails `NotFound` if no such head link
    /// exists — this call is for the party that created the subscription, not for
    /// tearing down a pass-through hop installed on behalf of someone else.
    pub fn unsubscribe(&self, id: CorrelationId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let pos = inner.subscriptions.iter().position(|s| s.id == id && s.is_head());
        let Some(idx) = pos else {
            return Err(EntangldError::not_found(format!("no local subscription with id {id}")));
        };
        let sub = inner.subscriptions.remove(idx);
        finish_removal(&mut inner, sub);
        Ok(())
    }

    /// Removes every local link rooted at or beneath `path`, regardless of role.
    /// Succeeds only partially if any removed link was a pass-through hop — its true
    /// owner, somewhere further upstream, still believes the chain is live.
    pub fn unsubscribe_tree(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let matching: Vec<usize> = inner
            .subscriptions
            .iter()
            .enumerate()
            .filter(|(_, s)| path::is_beneath(&s.path, path))
            .map(|(i, _)| i)
            .collect();

        if matching.is_empty() {
            return Err(EntangldError::not_found(format!("no subscriptions beneath {path}")));
        }

        let mut partial = false;
        for idx in matching.into_iter().rev() {
            let sub = inner.subscriptions.remove(idx);
            partial |= sub.is_pass_through();
            finish_removal(&mut inner, sub);
        }

        if partial {
            return Err(EntangldError::partial_failure(format!(
                "removed local links beneath {path}, but some were pass-through hops whose upstream owner must also unsubscribe"
            )));
        }
        Ok(())
    }

    /// Handles one incoming message from `sender`. `Get`/`Set`/`Push`/`Subscribe` route
    /// through the same mount resolution and local application used by the direct API;
    /// `Value`/`Error` resolve an outstanding `get`; `Event`/`Unsubscribe` drive the
    /// subscription chain this store participates in.
    pub async fn receive(&self, message: Message, sender: R) -> Result<()> {
        match message {
            Message::Get { path, params, id } => {
                let result = self.get(&path, params).await;
                let mut inner = self.inner.lock().unwrap();
                match result {
                    Ok(value) => {
                        let _ = send(&inner, Message::Value { path, value, id }, sender);
                    }
                    Err(err) => {
                        warn!(%id, %err, "get failed while serving a remote; replying with error");
                        let _ = send(&inner, Message::Error { id, error: ErrorMessage::from(err) }, sender);
                    }
                }
                Ok(())
            }
            Message::Value { path: _, value, id } => {
                let mut inner = self.inner.lock().unwrap();
                if let Some(tx) = inner.outstanding.remove(&id) {
                    let _ = tx.send(value);
                }
                Ok(())
            }
            Message::Error { id, error } => {
                warn!(%id, msg = %error.msg, "remote reported an error for one of our gets");
                let mut inner = self.inner.lock().unwrap();
                inner.outstanding.remove(&id);
                Ok(())
            }
            Message::Set { path, value, params: _ } => {
                let mut inner = self.inner.lock().unwrap();
                do_set(&mut inner, &path, value)
            }
            Message::Push { path, value, params } => {
                let mut inner = self.inner.lock().unwrap();
                let limit = extract_limit(&params);
                do_push(&mut inner, &path, value, limit)
            }
            Message::Subscribe { path, id, throttle } => {
                let mut inner = self.inner.lock().unwrap();
                install_link(&mut inner, path, id, Some(sender), None, throttle.max(1));
                Ok(())
            }
            Message::Event { path, value, id } => {
                let mut inner = self.inner.lock().unwrap();
                deliver_wire_event(&mut inner, &sender, &path, value, id)
            }
            Message::Unsubscribe { id } => {
                let mut inner = self.inner.lock().unwrap();
                let matching: Vec<usize> = inner.subscriptions.iter().enumerate().filter(|(_, s)| s.id == id).map(|(i, _)| i).collect();
                for idx in matching.into_iter().rev() {
                    let sub = inner.subscriptions.remove(idx);
                    finish_removal(&mut inner, sub);
                }
                Ok(())
            }
        }
    }
}

fn send<R>(inner: &Inner<R>, message: Message, remote: R) -> Result<()> {
    match &inner.send {
        Some(f) => {
            f(message, remote);
            Ok(())
        }
        None => {
            warn!(kind = message.kind_name(), "dropping outgoing message; transmit() was never configured");
            Err(EntangldError::protocol_error("transmit() has not been configured on this store"))
        }
    }
}

fn do_set<R: Clone + Eq + Hash>(inner: &mut Inner<R>, path: &str, value: Option<Node>) -> Result<()> {
    let resolved = inner.mounts.resolve(path).map(|(remote, _, residual)| (remote.clone(), residual.to_string()));
    match resolved {
        Some((remote, residual)) => send(inner, Message::Set { path: residual, value, params: None }, remote),
        None => {
            let shadowed = inner.mounts.namespaces().find(|ns| path::is_strictly_beneath(ns, path)).map(str::to_string);
            if let Some(ns) = shadowed {
                return Err(EntangldError::conflicting_mount(ns));
            }
            value::set(&mut inner.tree, path, value.clone())?;
            notify_change(inner, path, &value.unwrap_or(Node::Null));
            Ok(())
        }
    }
}

fn do_push<R: Clone + Eq + Hash>(inner: &mut Inner<R>, path: &str, value: Node, limit: Option<usize>) -> Result<()> {
    let resolved = inner.mounts.resolve(path).map(|(remote, _, residual)| (remote.clone(), residual.to_string()));
    match resolved {
        Some((remote, residual)) => {
            let params = limit.map(|n| Node::Map(HashMap::from([("limit".to_string(), Node::from(n as i64))])));
            send(inner, Message::Push { path: residual, value, params }, remote)
        }
        None => {
            let shadowed = inner.mounts.namespaces().find(|ns| path::is_strictly_beneath(ns, path)).map(str::to_string);
            if let Some(ns) = shadowed {
                return Err(EntangldError::conflicting_mount(ns));
            }
            value::push(&mut inner.tree, path, value.clone(), limit)?;
            notify_change(inner, path, &value);
            Ok(())
        }
    }
}

fn extract_limit(params: &Option<Node>) -> Option<usize> {
    match params {
        Some(Node::Map(map)) => match map.get("limit") {
            Some(Node::Number(n)) if *n >= 0.0 => Some(*n as usize),
            _ => None,
        },
        Some(Node::Number(n)) if *n >= 0.0 => Some(*n as usize),
        _ => None,
    }
}

/// Resolves `path` against the mount table and either records a pass-through link and
/// forwards a wire `Subscribe`, or records a terminal link and announces it on the
/// event outbox for local observers. Drops any pre-existing link sharing `(id, path)`
/// first — defensive cleanup for the case where an attach re-home runs twice over the
/// same link before the old one is pruned.
fn install_link<R: Clone + Eq + Hash>(inner: &mut Inner<R>, path: String, id: CorrelationId, upstream: Option<R>, callback: Option<Callback>, throttle: u32) {
    inner.subscriptions.retain(|s| !(s.id == id && s.path == path));

    let resolved = inner.mounts.resolve(&path).map(|(remote, _, residual)| (remote.clone(), residual.to_string()));
    match resolved {
        Some((remote, residual)) => {
            inner.subscriptions.push(Subscription::new(path, id, Some(remote.clone()), upstream, callback, throttle));
            let _ = send(inner, Message::Subscribe { path: residual, id, throttle }, remote);
        }
        None => {
            inner.subscriptions.push(Subscription::new(path.clone(), id, None, upstream, callback, throttle));
            let _ = inner.events.send(StoreEvent::Subscription { path, id });
        }
    }
}

/// Shared tail of every removal path: forward `unsubscribe` downstream if there was one,
/// otherwise this was a terminal link and its removal is locally observable.
fn finish_removal<R: Clone + Eq + Hash>(inner: &mut Inner<R>, sub: Subscription<R>) {
    match sub.downstream.clone() {
        Some(remote) => {
            let _ = send(inner, Message::Unsubscribe { id: sub.id }, remote);
        }
        None => {
            let _ = inner.events.send(StoreEvent::Unsubscription { path: sub.path.clone(), id: sub.id });
        }
    }
}

/// Fans a change at `path` out to every terminal link whose root is at or above it: head
/// links fire their callback (throttled), pass-through-but-terminal links (this store
/// holds the data for a remote that mounted it) forward an unthrottled `Event` upstream.
fn notify_change<R: Clone + Eq + Hash>(inner: &mut Inner<R>, path: &str, value: &Node) {
    let matching: Vec<usize> = inner
        .subscriptions
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_terminal() && path::is_beneath(path, &s.path))
        .map(|(i, _)| i)
        .collect();

    for idx in matching {
        let id = inner.subscriptions[idx].id;
        if inner.subscriptions[idx].is_head() {
            if inner.subscriptions[idx].tick() {
                if let Some(cb) = &inner.subscriptions[idx].callback {
                    cb(path, value);
                }
            }
        } else if let Some(upstream) = inner.subscriptions[idx].upstream.clone() {
            let _ = send(inner, Message::Event { path: path.to_string(), value: value.clone(), id }, upstream);
        }
    }
}

/// Handles a wire `Event`: finds the link this came in on (matched by id *and* sender,
/// since two distinct chains can share an overlapping path), re-roots the event's path
/// onto this store's own namespace for that remote, and either fires the local callback
/// or forwards further upstream. An id this store no longer tracks gets an `Unsubscribe`
/// echoed back so the sender stops retransmitting it.
fn deliver_wire_event<R: Clone + Eq + Hash>(inner: &mut Inner<R>, sender: &R, path: &str, value: Node, id: CorrelationId) -> Result<()> {
    let pos = inner.subscriptions.iter().position(|s| s.id == id && s.downstream.as_ref() == Some(sender));
    let Some(idx) = pos else {
        warn!(%id, "event for an untracked subscription chain; echoing unsubscribe");
        return send(inner, Message::Unsubscribe { id }, sender.clone());
    };

    let Some(namespace) = inner.mounts.namespace_of(sender).map(str::to_string) else {
        return Err(EntangldError::missing_context(format!("event for chain {id} from a remote with no attached namespace")));
    };
    let absolute = path::concat(&namespace, path);

    if inner.subscriptions[idx].is_head() {
        if inner.subscriptions[idx].tick() {
            if let Some(cb) = &inner.subscriptions[idx].callback {
                cb(&absolute, &value);
            }
        }
        Ok(())
    } else if let Some(upstream) = inner.subscriptions[idx].upstream.clone() {
        send(inner, Message::Event { path: absolute, value, id }, upstream)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn set_then_get_local_round_trips() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        store.set("a.b", Some(Node::from(6.0))).unwrap();
        let got = futures::executor::block_on(store.get("a.b", None)).unwrap();
        assert_eq!(got, Some(Node::from(6.0)));
    }

    #[test]
    fn get_missing_path_is_ok_none() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        let got = futures::executor::block_on(store.get("nowhere", None)).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn set_beneath_an_unattached_path_just_writes_locally() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        store.set("x.y.z", Some(Node::from(1.0))).unwrap();
        let got = futures::executor::block_on(store.get("x.y.z", None)).unwrap();
        assert_eq!(got, Some(Node::from(1.0)));
    }

    #[test]
    fn set_above_an_attached_namespace_is_rejected() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        store.attach("child", "remote-a").unwrap();
        let err = store.set("", Some(Node::map())).unwrap_err();
        assert!(matches!(err.kind, crate::error::EntangldErrorType::ConflictingMount(_)));
    }

    #[test]
    fn local_subscription_fires_on_matching_set() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        store.subscribe("a", 1, Box::new(move |_path, _value| { seen2.fetch_add(1, Ordering::SeqCst); }));
        store.set("a.b", Some(Node::from(1.0))).unwrap();
        store.set("a.b", Some(Node::from(2.0))).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn throttled_subscription_skips_intermediate_fires() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        store.subscribe("a", 2, Box::new(move |_path, _value| { seen2.fetch_add(1, Ordering::SeqCst); }));
        for n in 0..4 {
            store.set("a.b", Some(Node::from(n as f64))).unwrap();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_removes_the_head_link() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        let id = store.subscribe("a", 1, Box::new(|_, _| {}));
        store.unsubscribe(id).unwrap();
        assert!(store.unsubscribe(id).is_err());
    }

    #[test]
    fn unsubscribe_tree_reports_partial_failure_for_pass_through_links() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        store.attach("child", "remote-a").unwrap();
        store.transmit(Box::new(|_msg, _remote| {}));
        {
            let mut inner = store.inner.lock().unwrap();
            install_link(&mut inner, "child.a".to_string(), Uuid::new_v4(), Some("upstream-remote"), None, 1);
        }
        let err = store.unsubscribe_tree("child").unwrap_err();
        assert!(matches!(err.kind, crate::error::EntangldErrorType::PartialFailure(_)));
    }

    #[tokio::test]
    async fn callable_leaf_is_invoked_and_continued_into() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        store
            .set(
                "api",
                Some(Node::callable(|_| Box::pin(async { Ok(Node::Map(HashMap::from([("ok".to_string(), Node::from(true))]))) }))),
            )
            .unwrap();
        let got = store.get("api.ok", None).await.unwrap();
        assert_eq!(got, Some(Node::from(true)));
    }

    #[tokio::test]
    async fn get_beneath_a_mount_fails_without_transmit_configured() {
        let store: Store<&str> = Store::new(StoreConfig::default());
        store.attach("child", "remote-a").unwrap();
        let err = store.get("child.anything", None).await.unwrap_err();
        assert!(matches!(err.kind, crate::error::EntangldErrorType::ProtocolError(_)));
    }
}
