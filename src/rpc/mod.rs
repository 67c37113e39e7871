//! The RPC node: dispatch, forwarding, and the advertisement protocol
//!
//! One [`Router`] instance embodies one logical endpoint. It owns the set of
//! active [`Connection`](connection::Connection)s, a
//! [`RouteSet`](crate::routing::RouteSet), the pending-outgoing-request
//! table, and the named handler registries, and it implements the forwarding
//! and route-advertisement protocol that keeps every node's table consistent
//! with actual reachability.

mod connection;
mod handlers;
mod pending;
mod router;

pub use router::{RequestOptions, Router};
