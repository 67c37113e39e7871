//! The per-node routing table and its change events

use crate::protocol::Address;
use crate::routing::InverseRouteSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::error;

/// Round-trip-time cost estimate in milliseconds
///
/// Used purely as a path-preference metric; nothing re-measures it after a
/// connection is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rtt(pub u32);

impl fmt::Display for Rtt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The neighbor through which a destination is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Via {
    /// The destination is a directly connected neighbor
    Direct,
    /// Packets are forwarded through this neighbor
    Peer(Address),
}

/// Cached best and second-best cost for a destination
///
/// `second_best` is what gets re-advertised to the primary via itself: the
/// cost it would see if its own path to the destination failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinRtt {
    /// The cheapest via
    pub via: Via,
    /// Its cost
    pub rtt: Rtt,
    /// Minimum cost over the remaining vias, if a second one exists
    pub second_best: Option<Rtt>,
}

/// Change event produced by a RouteSet mutation
///
/// Every mutation returns the events it caused; the router fans them out to
/// directly connected neighbors as route advertisements and to local
/// connection waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteChange {
    /// The destination became reachable (its first via appeared)
    Added {
        /// Newly reachable destination
        address: Address,
        /// Its sole via
        via: Via,
        /// Cost through that via
        rtt: Rtt,
    },
    /// The destination became unreachable (its last via disappeared)
    Removed {
        /// No-longer-reachable destination
        address: Address,
        /// The via that was removed last
        via: Via,
    },
    /// The destination gained its second via (the path now has a backup)
    Seconded {
        /// Destination that gained the backup
        address: Address,
        /// The via that used to be the only one
        initial_via: Via,
        /// Minimum of the two costs
        rtt: Rtt,
    },
    /// The destination is back to exactly one via (the backup is gone)
    Unseconded {
        /// Destination that lost the backup
        address: Address,
        /// The via that remains
        only_via: Via,
    },
    /// Primary or secondary cost for the destination changed
    MinRttChanged {
        /// Affected destination
        address: Address,
        /// The new cache entry
        min: MinRtt,
        /// Whether the primary cost (or the chosen via) changed
        first_changed: bool,
        /// Whether the secondary cost (or the chosen via) changed
        second_changed: bool,
    },
}

/// Authoritative per-node view of reachability
///
/// Invariants: a destination present in the table always has at least one
/// via; the min/second-min cache is consistent with the table after every
/// mutation; the inverse table mirrors the forward table exactly.
#[derive(Debug, Default)]
pub struct RouteSet {
    routes: HashMap<Address, HashMap<Via, Rtt>>,
    min_rtt: HashMap<Address, MinRtt>,
    inverse: InverseRouteSet,
}

impl RouteSet {
    /// Create an empty routing table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that `via` can reach `address` at cost `rtt`
    ///
    /// A duplicate (address, via) pair is logged and ignored.
    pub fn inc(&mut self, address: Address, via: Via, rtt: Rtt) -> Vec<RouteChange> {
        let mut changes = Vec::new();
        if let Some(vias) = self.routes.get_mut(&address) {
            if vias.contains_key(&via) {
                error!(%address, ?via, "added duplicate route");
                return changes;
            }
            if vias.len() == 1 {
                let (&initial_via, _) = vias.iter().next().expect("route entry with no vias");
                // The new via is the initial via's only alternative path, so
                // its cost is what the initial via gets offered.
                changes.push(RouteChange::Seconded {
                    address,
                    initial_via,
                    rtt,
                });
            }
            vias.insert(via, rtt);
            self.refresh_min_rtt(address, &mut changes);
        } else {
            self.routes.insert(address, HashMap::from([(via, rtt)]));
            self.min_rtt.insert(
                address,
                MinRtt {
                    via,
                    rtt,
                    second_best: None,
                },
            );
            changes.push(RouteChange::Added { address, via, rtt });
        }
        self.inverse.inc(via, address);
        changes
    }

    /// Remove one via for `address`
    ///
    /// Removing the last via drops the whole entry. An unknown pair is
    /// logged and ignored.
    pub fn dec(&mut self, address: Address, via: Via) -> Vec<RouteChange> {
        let mut changes = Vec::new();
        let Some(vias) = self.routes.get_mut(&address) else {
            error!(%address, ?via, "removed route for unknown address");
            return changes;
        };
        if !vias.contains_key(&via) {
            error!(%address, ?via, "removed unknown via");
            return changes;
        }
        if vias.len() == 1 {
            self.routes.remove(&address);
            self.min_rtt.remove(&address);
            changes.push(RouteChange::Removed { address, via });
        } else {
            vias.remove(&via);
            if vias.len() == 1 {
                let (&only_via, _) = vias.iter().next().expect("route entry with no vias");
                changes.push(RouteChange::Unseconded { address, only_via });
            }
            self.refresh_min_rtt(address, &mut changes);
        }
        self.inverse.dec(via, address);
        changes
    }

    /// Adjust the cost of a previously registered via
    pub fn update(&mut self, address: Address, via: Via, rtt: Rtt) -> Vec<RouteChange> {
        let mut changes = Vec::new();
        let Some(vias) = self.routes.get_mut(&address) else {
            error!(%address, ?via, "updated rtt for unknown address");
            return changes;
        };
        if !vias.contains_key(&via) {
            error!(%address, ?via, "updated rtt for unknown via");
            return changes;
        }
        vias.insert(via, rtt);
        self.refresh_min_rtt(address, &mut changes);
        changes
    }

    /// True when at least one via reaches `address`
    pub fn has(&self, address: Address) -> bool {
        self.routes.contains_key(&address)
    }

    /// Snapshot of every known destination with its cached best costs
    pub fn list(&self) -> Vec<(Address, MinRtt)> {
        self.min_rtt
            .iter()
            .map(|(address, min)| (*address, min.clone()))
            .collect()
    }

    /// Pick the via to forward a packet to `address` through
    ///
    /// A direct connection always wins regardless of RTT; otherwise the
    /// cheapest via outside `blacklist`. Returns `None` when the destination
    /// is unknown or every via is blacklisted.
    pub fn forwarder_for(&self, address: Address, blacklist: &[Address]) -> Option<Via> {
        let vias = self.routes.get(&address)?;
        if vias.contains_key(&Via::Direct) {
            return Some(Via::Direct);
        }
        vias.iter()
            .filter_map(|(via, rtt)| match via {
                Via::Peer(peer) if !blacklist.contains(peer) => Some((*peer, *rtt)),
                _ => None,
            })
            .min_by_key(|&(_, rtt)| rtt)
            .map(|(peer, _)| Via::Peer(peer))
    }

    /// Can `forwarder` legitimately deliver packets on behalf of `sender`?
    ///
    /// True for self-originated packets and for forwarders that are a
    /// registered via toward the sender; the loop/spoof guard for dispatch.
    pub fn may_be_forwarder_for(&self, forwarder: Via, sender: Address) -> bool {
        if forwarder == Via::Peer(sender) {
            return true;
        }
        self.routes
            .get(&sender)
            .is_some_and(|vias| vias.contains_key(&forwarder))
    }

    /// Register a new directly connected neighbor
    pub fn on_add_direct(&mut self, address: Address, rtt: Rtt) -> Vec<RouteChange> {
        self.inc(address, Via::Direct, rtt)
    }

    /// Retract everything a lost direct neighbor provided
    ///
    /// Drops the direct route, every remaining route *to* the neighbor, and
    /// every forwarded route *through* it, so no reference to the neighbor
    /// survives anywhere in the table or the inverse set.
    pub fn on_remove_direct(&mut self, address: Address) -> Vec<RouteChange> {
        let mut changes = self.dec(address, Via::Direct);

        let leftover: Vec<Via> = self
            .routes
            .get(&address)
            .map(|vias| vias.keys().copied().collect())
            .unwrap_or_default();
        for via in leftover {
            changes.extend(self.dec(address, via));
        }

        let through: Vec<Address> = self
            .inverse
            .forwarded(Via::Peer(address))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for destination in through {
            changes.extend(self.dec(destination, Via::Peer(address)));
        }
        changes
    }

    /// Recompute the min/second-min cache after a mutation
    ///
    /// Emits `MinRttChanged` only if the primary, secondary, or chosen via
    /// actually changed.
    fn refresh_min_rtt(&mut self, address: Address, changes: &mut Vec<RouteChange>) {
        let vias = self
            .routes
            .get(&address)
            .expect("min-rtt refresh for unknown address");
        let (&best_via, &best_rtt) = vias
            .iter()
            .min_by_key(|&(_, rtt)| rtt)
            .expect("route entry with no vias");
        let second_best = vias
            .iter()
            .filter(|&(via, _)| *via != best_via)
            .map(|(_, &rtt)| rtt)
            .min();

        let new = MinRtt {
            via: best_via,
            rtt: best_rtt,
            second_best,
        };
        let old = self
            .min_rtt
            .get(&address)
            .expect("min-rtt cache missing for known address");
        if *old == new {
            return;
        }

        let via_changed = old.via != new.via;
        let first_changed = old.rtt != new.rtt || via_changed;
        let second_changed = old.second_best != new.second_best || via_changed;
        self.min_rtt.insert(address, new.clone());
        changes.push(RouteChange::MinRttChanged {
            address,
            min: new,
            first_changed,
            second_changed,
        });
    }
}
