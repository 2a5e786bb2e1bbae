//! Lobby Router Core
//!
//! Session/membership state machine and packet routing. Submodules:
//!
//! - [`protocol`] - wire message model and codec helpers
//! - [`registry`] - per-session client records and router-ID allocation
//! - [`lobby`] - the single mutable lobby metadata record
//! - [`session`] - the state machine dispatching decoded packets

pub mod lobby;
pub mod protocol;
pub mod registry;
pub mod session;

pub use lobby::LobbyInfo;
pub use protocol::{Decision, MemberOp, Packet};
pub use registry::{Client, ClientRegistry, RouterId, HOST_ID, NULL_ID};
pub use session::Router;
