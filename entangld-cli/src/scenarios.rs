//! One async function per literal federation scenario, narrated to stdout. These mirror
//! the property-based unit tests in `entangld-core` but run against a real (if
//! in-process) transport, so the cross-store cases — mounts, remote subscriptions,
//! throttling, and the cyclic chain — actually exercise message delivery instead of
//! calling store internals directly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use entangld_core::prelude::*;

use crate::network::Network;

/// Gives spawned delivery tasks a chance to run before the next step depends on them
/// having landed. The demo network has no acknowledgement protocol of its own; a real
/// transport would offer one, or the caller would await a `get` instead.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub async fn basic_set_get() -> anyhow::Result<()> {
    let store: Store<String> = Store::new(StoreConfig::default());
    store.set("number.six", Some(Node::from(6.0)))?;
    let got = store.get("number.six", None).await?;
    println!("number.six = {got:?}");
    Ok(())
}

pub async fn rpc_leaf() -> anyhow::Result<()> {
    let store: Store<String> = Store::new(StoreConfig::default());
    store.set(
        "double.me",
        Some(Node::callable(|arg| {
            Box::pin(async move {
                let n = match arg {
                    Some(Node::Number(n)) => n,
                    _ => 0.0,
                };
                Ok(Node::from(n * 2.0))
            })
        })),
    )?;
    let got = store.get("double.me", Some(Node::from(2.0))).await?;
    println!("double.me(2) = {got:?}");
    Ok(())
}

pub async fn mounted_remote() -> anyhow::Result<()> {
    let mut net = Network::new();
    let parent = net.register("parent");
    let child = net.register("child");
    net.wire();

    parent.attach("child", "child".to_string())?;
    child.set("system.voltage", Some(Node::from(33.0)))?;

    let got = parent.get("child.system.voltage", None).await?;
    println!("parent sees child.system.voltage = {got:?}");
    Ok(())
}

pub async fn remote_subscription() -> anyhow::Result<()> {
    let mut net = Network::new();
    let parent = net.register("parent");
    let child = net.register("child");
    net.wire();

    parent.attach("child", "child".to_string())?;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    parent.subscribe(
        "child.system.voltage",
        1,
        Box::new(move |path, value| {
            seen_cb.lock().unwrap().push((path.to_string(), value.clone()));
        }),
    );
    settle().await;

    child.set("system.voltage", Some(Node::from(21.0)))?;
    settle().await;

    println!("parent observed: {:?}", seen.lock().unwrap());
    Ok(())
}

pub async fn throttled_subscription() -> anyhow::Result<()> {
    let mut net = Network::new();
    let parent = net.register("parent");
    let child = net.register("child");
    net.wire();

    parent.attach("child", "child".to_string())?;

    let fires = Arc::new(AtomicUsize::new(0));
    let fires_cb = fires.clone();
    parent.subscribe(
        "child.rapid.data",
        2,
        Box::new(move |_path, _value| {
            fires_cb.fetch_add(1, Ordering::SeqCst);
        }),
    );
    settle().await;

    for _ in 0..4 {
        child.set("rapid.data", Some(Node::from(1.0)))?;
        settle().await;
    }

    println!("callback fired {} times across 4 sets with throttle 2 (expect 2)", fires.load(Ordering::SeqCst));
    Ok(())
}

pub async fn cyclic_chain() -> anyhow::Result<()> {
    let mut net = Network::new();
    let s = net.register("S");
    let a = net.register("A");
    let b = net.register("B");
    net.wire();

    s.attach("pA", "A".to_string())?;
    s.attach("pB", "B".to_string())?;
    a.attach("qB", "B".to_string())?;
    b.attach("rA", "A".to_string())?;

    let fires = Arc::new(AtomicUsize::new(0));
    let fires_cb = fires.clone();
    s.subscribe(
        "pA.qB.rA.data",
        1,
        Box::new(move |path, value| {
            fires_cb.fetch_add(1, Ordering::SeqCst);
            println!("cyclic chain delivered {path} = {value:?}");
        }),
    );
    settle().await;

    a.set("data", Some(Node::from(1.0)))?;
    settle().await;

    println!("head callback fired {} times (expect 1)", fires.load(Ordering::SeqCst));
    Ok(())
}

pub async fn unsubscribe_by_id() -> anyhow::Result<()> {
    let store: Store<String> = Store::new(StoreConfig::default());

    let first_fires = Arc::new(AtomicUsize::new(0));
    let first_cb = first_fires.clone();
    let first_id = store.subscribe("a.b", 1, Box::new(move |_, _| { first_cb.fetch_add(1, Ordering::SeqCst); }));

    let second_fires = Arc::new(AtomicUsize::new(0));
    let second_cb = second_fires.clone();
    store.subscribe("a.b", 1, Box::new(move |_, _| { second_cb.fetch_add(1, Ordering::SeqCst); }));

    store.unsubscribe(first_id)?;
    store.set("a.b", Some(Node::from(1.0)))?;

    println!("unsubscribed callback fired {} times (expect 0)", first_fires.load(Ordering::SeqCst));
    println!("remaining callback fired {} times (expect 1)", second_fires.load(Ordering::SeqCst));
    Ok(())
}
