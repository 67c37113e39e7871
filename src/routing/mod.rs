//! Routing subsystem for portmesh
//!
//! This module provides the per-node routing table and the pieces the
//! router's advertisement protocol is built from:
//!
//! - **RouteSet**: authoritative view of "how do I reach address X, and how
//!   well", tracking every via per destination plus a min/second-min RTT
//!   cache recomputed synchronously on every mutation.
//! - **InverseRouteSet**: the mirror image (via → destinations), answering
//!   "what do I stop being able to reach if this via disappears" in O(1).
//! - **RouteChange**: typed change events returned by every mutation; the
//!   router fans them out to neighbors as route advertisements and to local
//!   waiters.
//!
//! The scheme is a minimal distance-vector variant scoped to star-like or
//! short-chain topologies: only the best and second-best RTT per destination
//! are cached, because that is exactly what a node needs to decide what to
//! re-advertise to each neighbor (a neighbor must never be told its own best
//! path back to itself, only the best alternative).

mod inverse;
mod route_set;

pub use inverse::InverseRouteSet;
pub use route_set::{MinRtt, RouteChange, RouteSet, Rtt, Via};
