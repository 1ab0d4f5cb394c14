//! Entangld federates hierarchical key-value stores across process and machine
//! boundaries. Each [`store::Store`] owns a local tree of dotted paths; other stores can
//! be mounted into it at a namespace, making reads, writes, and subscriptions rooted
//! there transparently cross to wherever that namespace is actually hosted.
//!
//! This crate is the engine only: the tree, the mount table, the wire message shapes,
//! and the subscription graph. It deliberately knows nothing about sockets, byte
//! encoding, or how a host process discovers its peers — see [`store::Store::transmit`]
//! and [`store::Store::receive`] for where that glue plugs in.

pub mod config;
pub mod error;
pub mod message;
pub mod mount;
pub mod path;
pub mod store;
pub mod subscription;
pub mod value;

pub mod prelude;
