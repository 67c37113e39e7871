//! A bound channel to one directly reachable neighbor

use crate::error::Result;
use crate::protocol::{Address, Packet};
use crate::routing::Rtt;
use crate::transport::ChannelSender;
use std::fmt;
use tokio::task::JoinHandle;

/// One direct link: (address, channel, fixed RTT)
///
/// Owned exclusively by the router. Created by `add_direct`, destroyed on
/// disconnect (local or remote-initiated) or explicit `remove_direct`; the
/// paired reader task relays inbound packets into the router and triggers
/// removal when the channel reports disconnection.
pub(crate) struct Connection {
    address: Address,
    rtt: Rtt,
    sender: Box<dyn ChannelSender>,
    reader: JoinHandle<()>,
}

impl Connection {
    pub(crate) fn new(
        address: Address,
        rtt: Rtt,
        sender: Box<dyn ChannelSender>,
        reader: JoinHandle<()>,
    ) -> Self {
        Self {
            address,
            rtt,
            sender,
            reader,
        }
    }

    pub(crate) fn address(&self) -> Address {
        self.address
    }

    pub(crate) fn send(&self, packet: Packet) -> Result<()> {
        self.sender.send(packet)
    }

    /// Close the channel and stop the reader task
    ///
    /// Safe to call from the reader task itself: aborting the current task
    /// only takes effect at its next yield point, and removal happens right
    /// before it returns.
    pub(crate) fn close(&self) {
        self.sender.close();
        self.reader.abort();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("rtt", &self.rtt)
            .finish_non_exhaustive()
    }
}
