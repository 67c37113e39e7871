//! The closed set of logical endpoint addresses

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical endpoint identifier
///
/// The address space is fixed and known to every node at compile time. An
/// address names both the originator of a packet and its intended receiver;
/// it carries no location information — reachability is resolved per node by
/// its [`RouteSet`](crate::routing::RouteSet).
///
/// The five roles mirror the slots of an embedder that bridges a native
/// helper process to an injected page API through a background hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// The native helper process
    Native,
    /// The long-lived background hub
    Background,
    /// The transient approval/management surface
    Popup,
    /// The per-page content bridge
    Content,
    /// The script injected into the page itself
    Injected,
}

impl Address {
    /// All addresses in the space, in a fixed order
    pub const ALL: [Address; 5] = [
        Address::Native,
        Address::Background,
        Address::Popup,
        Address::Content,
        Address::Injected,
    ];
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Address::Native => "Native",
            Address::Background => "Background",
            Address::Popup => "Popup",
            Address::Content => "Content",
            Address::Injected => "Injected",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_serializes_as_name() {
        let json = serde_json::to_string(&Address::Background).unwrap();
        assert_eq!(json, "\"Background\"");

        let back: Address = serde_json::from_str("\"Injected\"").unwrap();
        assert_eq!(back, Address::Injected);
    }

    #[test]
    fn test_address_display_matches_wire_name() {
        for addr in Address::ALL {
            let wire = serde_json::to_value(addr).unwrap();
            assert_eq!(wire, serde_json::Value::String(addr.to_string()));
        }
    }
}
