//! In-process duplex channel over tokio mpsc queues
//!
//! The canonical transport for two routers living in the same process, and
//! the transport every integration test links nodes with.

use crate::error::{Error, Result};
use crate::protocol::Packet;
use crate::transport::{ChannelEvent, ChannelReceiver, ChannelSender};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Create a connected pair of duplex channel ends
///
/// Each end is the (sender, receiver) half-pair one router passes to
/// [`Router::add_direct`](crate::Router::add_direct). Packets sent on one
/// end arrive on the other in order; closing either end delivers a clean
/// [`ChannelEvent::Disconnected`] to its peer.
pub fn pair() -> ((MemorySender, MemoryReceiver), (MemorySender, MemoryReceiver)) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        (
            MemorySender {
                tx: a_tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            MemoryReceiver {
                rx: a_rx,
                finished: false,
            },
        ),
        (
            MemorySender {
                tx: b_tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            MemoryReceiver {
                rx: b_rx,
                finished: false,
            },
        ),
    )
}

/// Send half of an in-process channel
pub struct MemorySender {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    closed: Arc<AtomicBool>,
}

impl ChannelSender for MemorySender {
    fn send(&self, packet: Packet) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ChannelClosed);
        }
        self.tx
            .send(ChannelEvent::Message(packet))
            .map_err(|_| Error::ChannelClosed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(ChannelEvent::Disconnected { error: None });
        }
    }
}

/// Receive half of an in-process channel
pub struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    finished: bool,
}

#[async_trait]
impl ChannelReceiver for MemoryReceiver {
    async fn recv(&mut self) -> ChannelEvent {
        if self.finished {
            return ChannelEvent::Disconnected { error: None };
        }
        // A dropped peer counts as a clean disconnect.
        let event = match self.rx.recv().await {
            Some(event) => event,
            None => ChannelEvent::Disconnected { error: None },
        };
        if matches!(event, ChannelEvent::Disconnected { .. }) {
            self.finished = true;
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Address, RequestPacket};
    use serde_json::json;

    fn ping(n: u64) -> Packet {
        Packet::Request(RequestPacket::notification(
            Address::Content,
            Address::Background,
            "Ping",
            json!({ "n": n }),
        ))
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let ((a_tx, _a_rx), (_b_tx, mut b_rx)) = pair();
        a_tx.send(ping(1)).unwrap();
        a_tx.send(ping(2)).unwrap();

        for expected in [1, 2] {
            match b_rx.recv().await {
                ChannelEvent::Message(Packet::Request(p)) => {
                    assert_eq!(p.payload["n"], json!(expected));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_close_delivers_clean_disconnect_to_peer() {
        let ((a_tx, _a_rx), (_b_tx, mut b_rx)) = pair();
        a_tx.send(ping(1)).unwrap();
        a_tx.close();

        assert!(matches!(b_rx.recv().await, ChannelEvent::Message(_)));
        assert!(matches!(
            b_rx.recv().await,
            ChannelEvent::Disconnected { error: None }
        ));
        // Terminal: stays disconnected.
        assert!(matches!(
            b_rx.recv().await,
            ChannelEvent::Disconnected { error: None }
        ));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let ((a_tx, _a_rx), _b) = pair();
        a_tx.close();
        a_tx.close(); // idempotent
        assert!(matches!(a_tx.send(ping(1)), Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_dropped_peer_reads_as_disconnect() {
        let ((a_tx, a_rx), (_b_tx, mut b_rx)) = pair();
        drop(a_tx);
        drop(a_rx);
        assert!(matches!(
            b_rx.recv().await,
            ChannelEvent::Disconnected { error: None }
        ));
    }
}
