//! Inverse routing table (via → reachable destinations)

use crate::protocol::Address;
use crate::routing::Via;
use std::collections::{HashMap, HashSet};

/// For each via, the set of destinations currently reachable through it
///
/// Kept strictly in lockstep with the forward table: `inverse[via]` contains
/// destination `d` if and only if the forward entry for `d` lists `via`.
/// Increment and decrement must therefore be paired exactly; an unpaired
/// call is a programming error in the caller and panics rather than
/// silently corrupting the table.
#[derive(Debug, Default)]
pub struct InverseRouteSet {
    vias: HashMap<Via, HashSet<Address>>,
}

impl InverseRouteSet {
    /// Create an empty inverse table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `to` became reachable through `via`
    ///
    /// # Panics
    ///
    /// Panics if the pair is already present (double increment).
    pub fn inc(&mut self, via: Via, to: Address) {
        let destinations = self.vias.entry(via).or_default();
        if !destinations.insert(to) {
            panic!("inverse route imbalance: double inc of {to} via {via:?}");
        }
    }

    /// Record that `to` is no longer reachable through `via`
    ///
    /// # Panics
    ///
    /// Panics if the pair is not present (unpaired decrement).
    pub fn dec(&mut self, via: Via, to: Address) {
        let Some(destinations) = self.vias.get_mut(&via) else {
            panic!("inverse route imbalance: dec of {to} via unknown {via:?}");
        };
        if !destinations.remove(&to) {
            panic!("inverse route imbalance: double dec of {to} via {via:?}");
        }
        if destinations.is_empty() {
            self.vias.remove(&via);
        }
    }

    /// Destinations currently reachable through `via`, if any
    pub fn forwarded(&self, via: Via) -> Option<&HashSet<Address>> {
        self.vias.get(&via)
    }

    /// True when no via forwards to anything
    pub fn is_empty(&self) -> bool {
        self.vias.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paired_inc_dec_balances() {
        let mut inverse = InverseRouteSet::new();
        inverse.inc(Via::Peer(Address::Background), Address::Native);
        inverse.inc(Via::Peer(Address::Background), Address::Popup);
        inverse.inc(Via::Direct, Address::Background);

        let forwarded = inverse.forwarded(Via::Peer(Address::Background)).unwrap();
        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.contains(&Address::Native));

        inverse.dec(Via::Peer(Address::Background), Address::Native);
        inverse.dec(Via::Peer(Address::Background), Address::Popup);
        inverse.dec(Via::Direct, Address::Background);
        assert!(inverse.is_empty());
    }

    #[test]
    fn test_last_dec_drops_the_via() {
        let mut inverse = InverseRouteSet::new();
        inverse.inc(Via::Direct, Address::Native);
        inverse.dec(Via::Direct, Address::Native);
        assert!(inverse.forwarded(Via::Direct).is_none());
    }

    #[test]
    #[should_panic(expected = "double inc")]
    fn test_double_inc_panics() {
        let mut inverse = InverseRouteSet::new();
        inverse.inc(Via::Direct, Address::Native);
        inverse.inc(Via::Direct, Address::Native);
    }

    #[test]
    #[should_panic(expected = "unknown")]
    fn test_dec_of_unknown_via_panics() {
        let mut inverse = InverseRouteSet::new();
        inverse.dec(Via::Direct, Address::Native);
    }

    #[test]
    #[should_panic(expected = "double dec")]
    fn test_double_dec_panics() {
        let mut inverse = InverseRouteSet::new();
        inverse.inc(Via::Direct, Address::Native);
        inverse.inc(Via::Direct, Address::Popup);
        inverse.dec(Via::Direct, Address::Native);
        inverse.dec(Via::Direct, Address::Native);
    }
}
