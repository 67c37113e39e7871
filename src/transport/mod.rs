//! Channel boundary between the router and its transports
//!
//! The router never talks to a concrete transport directly; it only requires
//! a duplex channel that delivers whole [`Packet`](crate::protocol::Packet)
//! values atomically and in order, reports disconnection at most once
//! (optionally with an error description), and supports a one-shot explicit
//! close. Host-specific transports (extension ports, postMessage shims,
//! native-messaging pipes) implement the two halves below; the [`memory`]
//! module provides the in-process implementation used for same-process links
//! and in tests.

pub mod memory;

use crate::error::Result;
use crate::protocol::Packet;
use async_trait::async_trait;

/// Event emitted by the receive half of a channel
#[derive(Debug)]
pub enum ChannelEvent {
    /// A packet arrived from the remote end
    Message(Packet),
    /// The remote end went away; terminal, reported at most once
    Disconnected {
        /// Failure description, if the disconnect was not a clean close
        error: Option<String>,
    },
}

/// Send half of a duplex packet channel
pub trait ChannelSender: Send + Sync + 'static {
    /// Queue a packet for delivery to the remote end
    ///
    /// Must not block; ordering between consecutive sends is preserved.
    fn send(&self, packet: Packet) -> Result<()>;

    /// Close the channel; the remote end observes a clean disconnect
    ///
    /// Idempotent. Sending after close returns
    /// [`Error::ChannelClosed`](crate::Error::ChannelClosed).
    fn close(&self);
}

/// Receive half of a duplex packet channel
#[async_trait]
pub trait ChannelReceiver: Send + 'static {
    /// Wait for the next event
    ///
    /// After [`ChannelEvent::Disconnected`] has been returned no further
    /// messages follow.
    async fn recv(&mut self) -> ChannelEvent;
}
