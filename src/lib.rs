//! portmesh - addressed message routing with RPC semantics
//!
//! Five fixed logical endpoints ([`Address`]) exchange request/response and
//! fire-and-forget messages over chains of point-to-point duplex channels.
//! Each endpoint runs a [`Router`] that learns multi-hop paths from its
//! neighbors' route advertisements, forwards packets along the
//! cheapest-known path, and correlates responses back to their originating
//! requests.
//!
//! # Features
//!
//! - **Addressed delivery**: packets carry sender and receiver; any node in
//!   between forwards them without inspecting the payload
//! - **Path discovery**: direct connections are advertised transitively, so
//!   endpoints that share no channel still reach each other
//! - **RTT-scoped selection**: each destination keeps its best and
//!   second-best round-trip cost; a direct channel always wins over a
//!   forwarded path
//! - **RPC correlation**: requests carry a random 128-bit id; responses
//!   resolve the matching pending future, racing the deadline and an
//!   optional cancellation token
//! - **Typed handlers**: request and notification handlers take and return
//!   `serde` types; the wire stays self-describing JSON
//!
//! # Quick start
//!
//! ```no_run
//! use portmesh::{Address, Router, Rtt};
//! use portmesh::transport::memory;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> portmesh::Result<()> {
//!     let background = Router::new(Address::Background);
//!     let popup = Router::new(Address::Popup);
//!
//!     popup.add_request_handler("Echo", |_from, data: Value| async move { Ok(data) });
//!
//!     // Wire the two routers together with an in-memory duplex channel.
//!     let (a, b) = memory::pair();
//!     background.add_direct(Address::Popup, a.0, a.1, Rtt(1));
//!     popup.add_direct(Address::Background, b.0, b.1, Rtt(1));
//!
//!     background.wait_for_connection_to(Address::Popup).await?;
//!     let echoed: Value = background
//!         .request(Address::Popup, "Echo", &json!({ "value": 42 }))
//!         .await?;
//!     assert_eq!(echoed["value"], json!(42));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod routing;
mod rpc;
pub mod transport;

pub use config::RouterConfig;
pub use error::{Error, Result};
pub use protocol::{Address, Packet, RequestId, RequestPacket, ResponsePacket, ResponseTo};
pub use routing::{MinRtt, RouteChange, RouteSet, Rtt, Via};
pub use rpc::{RequestOptions, Router};
