//! Client Registry
//!
//! Per-session client records and router-ID allocation. A client lives in
//! exactly one of two sets: `prospective` (asked to join, awaiting the host's
//! verdict) or `accepted` (a lobby member). Removal is deletion; there is no
//! stored terminal state.
//!
//! IDs count up from a high-water mark and are never reissued, so a
//! rejoining peer can never be confused with a departed one.

use std::net::SocketAddr;

use crate::transport::PeerId;

/// Small positive integer identifying a client within one lobby session.
pub type RouterId = u16;

/// Reserved "no ID" sentinel; never assigned.
pub const NULL_ID: RouterId = 0;

/// The host always holds this ID.
pub const HOST_ID: RouterId = 1;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The peer already has a client record.
    #[error("peer already registered")]
    AlreadyPresent,

    /// The 16-bit ID space is used up; the join must be refused.
    #[error("no available router IDs")]
    IdSpaceExhausted,

    /// No client with that ID in the expected set.
    #[error("router ID {0} not found")]
    NotFound(RouterId),

    /// Host creation requires an empty lobby.
    #[error("lobby is not empty")]
    LobbyNotEmpty,
}

/// One peer participating in or applying to the lobby.
#[derive(Debug, Clone)]
pub struct Client {
    router_id: RouterId,
    peer: PeerId,
    name: String,
    expose_ip: bool,
}

impl Client {
    fn new(router_id: RouterId, peer: PeerId, name: String, expose_ip: bool) -> Self {
        tracing::debug!(router_id, name = %name, "new client");
        Client {
            router_id,
            peer,
            name,
            expose_ip,
        }
    }

    /// Router-assigned identity.
    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    /// Current transport identity.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Display name supplied at session start.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the peer consented to address disclosure.
    pub fn expose_ip(&self) -> bool {
        self.expose_ip
    }

    /// The address other peers are allowed to see unconditionally:
    /// the real one if the peer exposes, else the blackhole placeholder.
    pub fn public_addr(&self) -> PeerId {
        if self.expose_ip {
            self.peer
        } else {
            PeerId::BLACKHOLE
        }
    }

    /// Whether this client holds the host ID.
    pub fn is_host(&self) -> bool {
        self.router_id == HOST_ID
    }

    /// Migration-aware source match; updates the stored address in place
    /// when the peer's network path changed.
    pub fn owns_addr(&mut self, observed: SocketAddr) -> bool {
        self.peer.compare_and_update(observed)
    }
}

/// Owns every client record for the lobby's lifetime.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    prospective: Vec<Client>,
    accepted: Vec<Client>,
    /// Highest ID ever issued; departed IDs are never reissued.
    highest_issued: RouterId,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next router ID: one past the highest ever issued.
    fn allocate_id(&mut self) -> Result<RouterId, RegistryError> {
        // Wrapping back to 0 means the 16-bit space is spent.
        let id = self
            .highest_issued
            .checked_add(1)
            .ok_or(RegistryError::IdSpaceExhausted)?;
        self.highest_issued = id;
        Ok(id)
    }

    /// Register the very first member of an empty lobby directly as host.
    pub fn create_host(
        &mut self,
        peer: PeerId,
        name: String,
        expose_ip: bool,
    ) -> Result<RouterId, RegistryError> {
        if !self.accepted.is_empty() || !self.prospective.is_empty() {
            return Err(RegistryError::LobbyNotEmpty);
        }
        self.highest_issued = self.highest_issued.max(HOST_ID);
        self.accepted
            .push(Client::new(HOST_ID, peer, name, expose_ip));
        Ok(HOST_ID)
    }

    /// Register a peer as a prospective member awaiting the host's verdict.
    pub fn create_prospective(
        &mut self,
        peer: PeerId,
        name: String,
        expose_ip: bool,
    ) -> Result<RouterId, RegistryError> {
        if self.find_by_addr(peer.addr(), true).is_some() {
            return Err(RegistryError::AlreadyPresent);
        }
        let id = self.allocate_id()?;
        self.prospective.push(Client::new(id, peer, name, expose_ip));
        Ok(id)
    }

    /// Move a prospective client into the accepted set, appended to roster
    /// order.
    pub fn promote(&mut self, id: RouterId) -> Result<&Client, RegistryError> {
        let idx = self
            .prospective
            .iter()
            .position(|c| c.router_id == id)
            .ok_or(RegistryError::NotFound(id))?;
        let client = self.prospective.remove(idx);
        self.accepted.push(client);
        Ok(&self.accepted[self.accepted.len() - 1])
    }

    /// Remove a client from whichever set holds it. Idempotent: returns
    /// `None` when the ID is unknown.
    pub fn remove(&mut self, id: RouterId) -> Option<Client> {
        if let Some(idx) = self.accepted.iter().position(|c| c.router_id == id) {
            let client = self.accepted.remove(idx);
            tracing::debug!(router_id = id, "removing accepted client");
            return Some(client);
        }
        if let Some(idx) = self.prospective.iter().position(|c| c.router_id == id) {
            let client = self.prospective.remove(idx);
            tracing::debug!(router_id = id, "removing prospective client");
            return Some(client);
        }
        None
    }

    /// Resolve the client owning a source address, updating its stored
    /// address on migration. Accepted members are searched first; the
    /// prospective set only when the caller permits it.
    pub fn find_by_addr_mut(
        &mut self,
        observed: SocketAddr,
        include_prospective: bool,
    ) -> Option<&mut Client> {
        if let Some(idx) = self.accepted.iter_mut().position(|c| c.owns_addr(observed)) {
            return Some(&mut self.accepted[idx]);
        }
        if include_prospective {
            if let Some(idx) = self
                .prospective
                .iter_mut()
                .position(|c| c.owns_addr(observed))
            {
                return Some(&mut self.prospective[idx]);
            }
        }
        None
    }

    /// Address lookup without migration updates (exact match only).
    pub fn find_by_addr(&self, observed: SocketAddr, include_prospective: bool) -> Option<&Client> {
        self.accepted
            .iter()
            .find(|c| c.peer.addr() == observed)
            .or_else(|| {
                if include_prospective {
                    self.prospective.iter().find(|c| c.peer.addr() == observed)
                } else {
                    None
                }
            })
    }

    /// Accepted member by ID.
    pub fn accepted_by_id(&self, id: RouterId) -> Option<&Client> {
        self.accepted.iter().find(|c| c.router_id == id)
    }

    /// Prospective client by ID.
    pub fn prospective_by_id(&self, id: RouterId) -> Option<&Client> {
        self.prospective.iter().find(|c| c.router_id == id)
    }

    /// Client by ID across both sets.
    pub fn by_id(&self, id: RouterId) -> Option<&Client> {
        self.accepted_by_id(id).or_else(|| self.prospective_by_id(id))
    }

    /// Accepted members in roster (insertion) order.
    pub fn accepted(&self) -> &[Client] {
        &self.accepted
    }

    /// Prospective clients awaiting a verdict.
    pub fn prospective(&self) -> &[Client] {
        &self.prospective
    }

    /// Whether any member has been accepted.
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.prospective.is_empty()
    }

    /// The host, while present.
    pub fn host(&self) -> Option<&Client> {
        self.accepted_by_id(HOST_ID)
    }

    /// Seed an accepted client with a chosen ID, bypassing allocation.
    #[cfg(test)]
    fn seed_accepted(&mut self, id: RouterId, peer: PeerId) {
        self.highest_issued = self.highest_issued.max(id);
        self.accepted
            .push(Client::new(id, peer, format!("client{id}"), false));
    }
}
