//! Protocol Messages
//!
//! Wire model for client-router communication over UDP datagrams.
//! Packets are encoded with bincode on the wire, with JSON helpers
//! kept around for debugging and tests.

use serde::{Deserialize, Serialize};

use crate::router::lobby::LobbyInfo;
use crate::router::registry::RouterId;
use crate::transport::PeerId;

/// Largest datagram the router will encode or accept.
pub const MAX_DATAGRAM: usize = 1400;

/// Host's verdict on a prospective member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Admit the prospective member to the lobby.
    Accept,
    /// Turn the prospective member away.
    Reject,
}

/// Operation carried by a [`Packet::MemberList`] update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberOp {
    /// Members appeared; `ids`, `addrs` and `names` run in parallel.
    Add,
    /// Members departed; only `ids` is populated.
    Remove,
    /// Member details changed.
    Update,
}

/// Every message exchanged with the router.
///
/// Client-to-router kinds, router-to-client notifications and relayed
/// kinds share one enum: routed packets are forwarded as-is after the
/// sender field is rewritten, so splitting the namespace would only
/// force a copy at the relay boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// A peer asks to join the lobby (or to host it, if empty).
    JoinRequest {
        /// Display name, immutable for the session.
        name: String,
        /// Consent to disclose the real address to other consenting peers.
        expose_ip: bool,
    },

    /// The host admits or turns away a prospective member.
    HostDecision {
        /// Router ID of the prospective member.
        target: RouterId,
        /// Verdict.
        decision: Decision,
    },

    /// An accepted member announces it is leaving.
    LeaveNotice,

    /// Session data relayed between two members.
    RouteData {
        /// Claimed sender; rewritten to the verified ID before forwarding.
        from: RouterId,
        /// Destination member.
        to: RouterId,
        /// Opaque session payload.
        payload: Vec<u8>,
    },

    /// Mod-defined data relayed between two members.
    CustomRoute {
        /// Claimed sender; rewritten to the verified ID before forwarding.
        from: RouterId,
        /// Destination member.
        to: RouterId,
        /// Opaque payload.
        payload: Vec<u8>,
    },

    /// Chat line relayed to proxied members.
    ChatMessage {
        /// Claimed sender; verified before relay.
        from: RouterId,
        /// Message text.
        text: String,
    },

    /// The sole-member host publishes the lobby metadata.
    PublishLobbyInfo(LobbyInfo),

    /// Membership update pushed to clients.
    MemberList {
        /// What happened to the listed members.
        op: MemberOp,
        /// Router IDs, in roster order.
        ids: Vec<RouterId>,
        /// Disclosure-gated addresses, parallel to `ids` (Add/Update only).
        addrs: Vec<PeerId>,
        /// Display names, parallel to `ids` (Add/Update only).
        names: Vec<String>,
    },

    /// Reply to the first joiner: the lobby was empty, they are now host.
    LobbyEmpty,

    /// Join confirmation carrying the assigned ID and current metadata.
    LobbyJoined {
        /// Router ID assigned to the recipient.
        router_id: RouterId,
        /// Lobby metadata as of the join.
        lobby: LobbyInfo,
    },
}

impl Packet {
    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode from the wire.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    /// Serialize to JSON (debugging/tests).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON (debugging/tests).
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::JoinRequest { .. } => "JoinRequest",
            Packet::HostDecision { .. } => "HostDecision",
            Packet::LeaveNotice => "LeaveNotice",
            Packet::RouteData { .. } => "RouteData",
            Packet::CustomRoute { .. } => "CustomRoute",
            Packet::ChatMessage { .. } => "ChatMessage",
            Packet::PublishLobbyInfo(_) => "PublishLobbyInfo",
            Packet::MemberList { .. } => "MemberList",
            Packet::LobbyEmpty => "LobbyEmpty",
            Packet::LobbyJoined { .. } => "LobbyJoined",
        }
    }
}
