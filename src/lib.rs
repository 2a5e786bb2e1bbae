//! # Lobby Router
//!
//! Relay/router server letting a small group of NAT-bound peers form one
//! logical lobby without direct connectivity. One peer is elected host; all
//! others exchange session and gameplay traffic through the router, which
//! mediates membership and lobby metadata.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       LOBBY ROUTER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  router/          - Session core (single-threaded dispatch)  │
//! │  ├── protocol.rs  - Wire message model + codec               │
//! │  ├── registry.rs  - Client records, router-ID allocation     │
//! │  ├── lobby.rs     - Lobby metadata record                    │
//! │  └── session.rs   - Membership/routing state machine         │
//! │                                                              │
//! │  transport/       - Datagram plumbing                        │
//! │  ├── mod.rs       - Transport trait, PeerId, blackhole       │
//! │  └── udp.rs       - UDP socket, liveness sweep, keepalives   │
//! │                                                              │
//! │  config.rs        - key=value command line                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trust Model
//!
//! Identity is transport-address-derived: every packet carrying a
//! self-declared sender ID is checked against the client that owns the
//! datagram's source address, and dropped on mismatch. Real addresses are
//! disclosed between two peers only when **both** opted in; everyone else
//! sees the blackhole placeholder.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod router;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use router::{Client, ClientRegistry, LobbyInfo, Packet, Router, RouterId, HOST_ID, NULL_ID};
pub use transport::{Delivery, PeerId, Transport, UdpTransport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
