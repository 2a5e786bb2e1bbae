//! Transport Abstraction
//!
//! The router core never touches sockets directly. It talks to a [`Transport`]
//! implementation through fire-and-forget sends and reacts to liveness events
//! fed into it by the event loop. The concrete UDP implementation lives in
//! [`udp`]; tests substitute a recording transport.

pub mod udp;

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::router::protocol::Packet;

pub use udp::UdpTransport;

/// Delivery class for an outbound packet.
///
/// The UDP transport treats both the same way; the distinction is carried so
/// a reliability layer can honor it without touching the router core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// Must-arrive control traffic (membership updates, join replies).
    Reliable,
    /// Best-effort relay traffic (routed gameplay data).
    Unreliable,
}

/// Opaque transport identity of a peer.
///
/// Wraps the peer's observed network address. Two `PeerId`s compare equal only
/// if their addresses are identical; [`PeerId::compare_and_update`] is the
/// migration-aware comparison the router uses when resolving packet sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerId(SocketAddr);

impl PeerId {
    /// Well-known non-routable placeholder substituted wherever a real
    /// address must be withheld. 240.0.0.1 sits in the reserved class E
    /// block and is never assigned to a real peer.
    pub const BLACKHOLE: PeerId = PeerId(SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::new(240, 0, 0, 1),
        0,
    )));

    /// Wrap an observed socket address.
    pub fn new(addr: SocketAddr) -> Self {
        PeerId(addr)
    }

    /// The current network address of this peer.
    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    /// Whether this is the withheld-address placeholder.
    pub fn is_blackhole(&self) -> bool {
        *self == Self::BLACKHOLE
    }

    /// Migration-aware comparison.
    ///
    /// Returns whether `observed` refers to the same logical peer. A NAT
    /// rebind shows up as the same IP on a new port; in that case the stored
    /// address is updated in place so later sends reach the new path. A
    /// different IP is a different peer.
    pub fn compare_and_update(&mut self, observed: SocketAddr) -> bool {
        if self.0 == observed {
            return true;
        }
        if self.0.ip() == observed.ip() {
            tracing::debug!(old = %self.0, new = %observed, "peer address migrated");
            self.0 = observed;
            return true;
        }
        false
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound interface the router core drives.
///
/// Every method is a non-blocking enqueue; failures are the transport's
/// problem (logged, absorbed). The router never waits on network I/O.
pub trait Transport {
    /// Encode and send a packet to a peer. `start_conversation` marks the
    /// first server-initiated packet of a session so the transport can set
    /// up per-peer state before any reply arrives.
    fn send(&mut self, packet: &Packet, dest: &PeerId, delivery: Delivery, start_conversation: bool);

    /// Begin liveness tracking for a peer.
    fn ensure_tracked(&mut self, peer: &PeerId);

    /// Drop all per-peer state. Idempotent.
    fn forget(&mut self, peer: &PeerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_blackhole_is_distinguishable() {
        let real = PeerId::new(addr("10.0.0.1:4000"));
        assert!(PeerId::BLACKHOLE.is_blackhole());
        assert!(!real.is_blackhole());
        assert_ne!(real, PeerId::BLACKHOLE);
    }

    #[test]
    fn test_compare_same_address() {
        let mut peer = PeerId::new(addr("10.0.0.1:4000"));
        assert!(peer.compare_and_update(addr("10.0.0.1:4000")));
        assert_eq!(peer.addr(), addr("10.0.0.1:4000"));
    }

    #[test]
    fn test_compare_updates_on_port_migration() {
        let mut peer = PeerId::new(addr("10.0.0.1:4000"));
        assert!(peer.compare_and_update(addr("10.0.0.1:5111")));
        assert_eq!(peer.addr(), addr("10.0.0.1:5111"));
    }

    #[test]
    fn test_compare_rejects_different_ip() {
        let mut peer = PeerId::new(addr("10.0.0.1:4000"));
        assert!(!peer.compare_and_update(addr("10.0.0.2:4000")));
        assert_eq!(peer.addr(), addr("10.0.0.1:4000"));
    }
}
