//! An in-process "network" of stores linked by channels and JSON encoding — a stand-in
//! for the socket transport a real deployment would plug into `Store::transmit`. Every
//! hop still round-trips through `serde_json`, the same way a real wire transport would,
//! so a bug in `Message`'s (de)serialization shows up here rather than only at runtime
//! against a real socket.

use std::collections::HashMap;
use std::sync::Arc;

use entangld_core::prelude::*;
use tracing::warn;

/// Opaque remote handle for the demo transport: just the peer's registered name.
pub type PeerId = String;

#[derive(Default)]
pub struct Network {
    stores: HashMap<PeerId, Arc<Store<PeerId>>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh, unwired store under `id` and returns a handle to it. Call
    /// `wire()` once every peer for a scenario has been registered.
    pub fn register(&mut self, id: impl Into<PeerId>) -> Arc<Store<PeerId>> {
        let id = id.into();
        let store = Arc::new(Store::new(StoreConfig::default()));
        self.stores.insert(id, store.clone());
        store
    }

    pub fn store(&self, id: &str) -> Arc<Store<PeerId>> {
        self.stores.get(id).cloned().expect("peer was registered before use")
    }

    /// Points every registered store's `transmit` at this network: encode the outgoing
    /// message to JSON, hand it to the addressed peer's `receive` on a spawned task so
    /// the sender never blocks on delivery, and decode on the other side.
    pub fn wire(&self) {
        let stores = Arc::new(self.stores.clone());
        for (from_id, store) in &self.stores {
            let from_id = from_id.clone();
            let stores = stores.clone();
            store.transmit(Box::new(move |message, to_id| {
                let from_id = from_id.clone();
                let stores = stores.clone();
                tokio::spawn(async move {
                    let Some(peer) = stores.get(&to_id) else {
                        warn!(%to_id, "send addressed to an unregistered peer");
                        return;
                    };
                    let encoded = serde_json::to_vec(&message).expect("message encodes to json");
                    let decoded: Message = serde_json::from_slice(&encoded).expect("message round-trips through json");
                    if let Err(err) = peer.receive(decoded, from_id.clone()).await {
                        warn!(%from_id, %to_id, %err, "peer rejected a delivered message");
                    }
                });
            }));
        }
    }
}
