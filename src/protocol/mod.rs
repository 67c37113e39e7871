//! Wire protocol for the portmesh network
//!
//! This module defines the closed address space and the two packet forms
//! that cross channels:
//!
//! - **Request packets** carry `sender`, `receiver`, a request name, and an
//!   optional response-correlation block; the payload is merged into the
//!   same top-level object.
//! - **Response packets** carry the correlation id, the originating sender,
//!   and an optional error string.
//!
//! The field names and nesting are a wire contract: a packet is a request
//! if and only if it carries no top-level `rid` field.

mod address;
mod packet;

pub use address::Address;
pub use packet::{Packet, RequestId, RequestPacket, ResponsePacket, ResponseTo};

pub(crate) use packet::object_payload;
