//! Cross-store scenarios that need two or three wired-together stores, which doesn't
//! fit a single module's `#[cfg(test)]` block. The tiny transport below is the minimum
//! needed to deliver a `Message` from one store's `transmit` to another's `receive`; it
//! isn't meant to be a reusable piece of the crate, just test plumbing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use entangld_core::prelude::*;

type PeerId = String;

#[derive(Default)]
struct Network {
    stores: HashMap<PeerId, Arc<Store<PeerId>>>,
}

impl Network {
    fn register(&mut self, id: &str) -> Arc<Store<PeerId>> {
        let store = Arc::new(Store::new(StoreConfig::default()));
        self.stores.insert(id.to_string(), store.clone());
        store
    }

    fn wire(&self) {
        let stores = Arc::new(self.stores.clone());
        for (from_id, store) in &self.stores {
            let from_id = from_id.clone();
            let stores = stores.clone();
            store.transmit(Box::new(move |message, to_id| {
                let from_id = from_id.clone();
                let stores = stores.clone();
                tokio::spawn(async move {
                    if let Some(peer) = stores.get(&to_id) {
                        let _ = peer.receive(message, from_id).await;
                    }
                });
            }));
        }
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn mounted_remote_get_crosses_the_wire() {
    let mut net = Network::default();
    let parent = net.register("parent");
    let child = net.register("child");
    net.wire();

    parent.attach("child", "child".to_string()).unwrap();
    child.set("system.voltage", Some(Node::from(33.0))).unwrap();

    let got = parent.get("child.system.voltage", None).await.unwrap();
    assert_eq!(got, Some(Node::from(33.0)));
}

#[tokio::test]
async fn get_at_an_attached_namespace_returns_the_remote_root() {
    let mut net = Network::default();
    let parent = net.register("parent");
    let child = net.register("child");
    net.wire();

    parent.attach("child", "child".to_string()).unwrap();
    child.set("a", Some(Node::from(1.0))).unwrap();
    child.set("b", Some(Node::from(2.0))).unwrap();

    let got = parent.get("child", None).await.unwrap().unwrap();
    let map = got.as_map().unwrap();
    assert_eq!(map.get("a"), Some(&Node::from(1.0)));
    assert_eq!(map.get("b"), Some(&Node::from(2.0)));
}

#[tokio::test]
async fn remote_subscription_fires_on_a_mounted_write() {
    let mut net = Network::default();
    let parent = net.register("parent");
    let child = net.register("child");
    net.wire();

    parent.attach("child", "child".to_string()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    parent.subscribe(
        "child.system.voltage",
        1,
        Box::new(move |path, value| seen_cb.lock().unwrap().push((path.to_string(), value.clone()))),
    );
    settle().await;

    child.set("system.voltage", Some(Node::from(21.0))).unwrap();
    settle().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], ("child.system.voltage".to_string(), Node::from(21.0)));
}

#[tokio::test]
async fn throttled_remote_subscription_fires_on_first_and_every_nth() {
    let mut net = Network::default();
    let parent = net.register("parent");
    let child = net.register("child");
    net.wire();

    parent.attach("child", "child".to_string()).unwrap();

    let fires = Arc::new(AtomicUsize::new(0));
    let fires_cb = fires.clone();
    parent.subscribe("child.rapid.data", 2, Box::new(move |_, _| { fires_cb.fetch_add(1, Ordering::SeqCst); }));
    settle().await;

    for _ in 0..4 {
        child.set("rapid.data", Some(Node::from(1.0))).unwrap();
        settle().await;
    }

    assert_eq!(fires.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cyclic_mount_ring_delivers_exactly_once() {
    let mut net = Network::default();
    let s = net.register("S");
    let a = net.register("A");
    let b = net.register("B");
    net.wire();

    s.attach("pA", "A".to_string()).unwrap();
    s.attach("pB", "B".to_string()).unwrap();
    a.attach("qB", "B".to_string()).unwrap();
    b.attach("rA", "A".to_string()).unwrap();

    let fires = Arc::new(Mutex::new(Vec::new()));
    let fires_cb = fires.clone();
    s.subscribe(
        "pA.qB.rA.data",
        1,
        Box::new(move |path, value| fires_cb.lock().unwrap().push((path.to_string(), value.clone()))),
    );
    settle().await;

    a.set("data", Some(Node::from(1.0))).unwrap();
    settle().await;

    let fires = fires.lock().unwrap();
    assert_eq!(*fires, vec![("pA.qB.rA.data".to_string(), Node::from(1.0))]);
}

#[tokio::test]
async fn unsubscribe_tears_down_the_remote_hop_too() {
    let mut net = Network::default();
    let parent = net.register("parent");
    let child = net.register("child");
    net.wire();

    parent.attach("child", "child".to_string()).unwrap();

    let fires = Arc::new(AtomicUsize::new(0));
    let fires_cb = fires.clone();
    let id = parent.subscribe("child.a", 1, Box::new(move |_, _| { fires_cb.fetch_add(1, Ordering::SeqCst); }));
    settle().await;

    parent.unsubscribe(id).unwrap();
    settle().await;

    child.set("a", Some(Node::from(1.0))).unwrap();
    settle().await;

    assert_eq!(fires.load(Ordering::SeqCst), 0);
}
