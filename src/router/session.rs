//! Router Session State Machine
//!
//! Processes one decoded packet (or liveness event) at a time to completion.
//! Handlers read and mutate the client registry and lobby metadata and emit
//! outbound packets through the transport; nothing here blocks.
//!
//! Trust model: identity is transport-address-derived. Every handler that
//! consumes a self-declared sender ID verifies it against the client owning
//! the datagram's source address and fails closed on mismatch.

use std::net::SocketAddr;

use tracing::{debug, error, info, warn};

use crate::router::lobby::LobbyInfo;
use crate::router::protocol::{Decision, MemberOp, Packet};
use crate::router::registry::{Client, ClientRegistry, RouterId, HOST_ID};
use crate::transport::{Delivery, PeerId, Transport};

/// The relay's session/membership state machine.
pub struct Router<T: Transport> {
    transport: T,
    registry: ClientRegistry,
    lobby: LobbyInfo,
    lobby_closed: bool,
}

impl<T: Transport> Router<T> {
    /// Create a router seeded with the startup lobby metadata.
    pub fn new(transport: T, lobby: LobbyInfo) -> Self {
        Router {
            transport,
            registry: ClientRegistry::new(),
            lobby,
            lobby_closed: false,
        }
    }

    /// Whether the host has departed and the process should wind down.
    pub fn lobby_closed(&self) -> bool {
        self.lobby_closed
    }

    /// Current lobby metadata.
    pub fn lobby(&self) -> &LobbyInfo {
        &self.lobby
    }

    /// Registered clients.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// The transport, for the event loop's liveness plumbing.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Dispatch one decoded packet annotated with its source address.
    pub fn handle_packet(&mut self, packet: Packet, source: SocketAddr) {
        match packet {
            Packet::JoinRequest { name, expose_ip } => self.on_join_request(source, name, expose_ip),
            Packet::HostDecision { target, decision } => {
                self.on_host_decision(source, target, decision)
            }
            Packet::LeaveNotice => self.on_leave_notice(source),
            Packet::RouteData { from, to, payload } => {
                self.on_route(source, from, to, payload, false)
            }
            Packet::CustomRoute { from, to, payload } => {
                self.on_route(source, from, to, payload, true)
            }
            Packet::ChatMessage { from, text } => self.on_chat_message(source, from, text),
            Packet::PublishLobbyInfo(update) => self.on_publish_lobby_info(source, update),
            other => {
                debug!(kind = other.kind(), %source, "ignoring server-to-client packet kind from peer");
            }
        }
    }

    /// React to the transport declaring a peer dead. Torn down exactly like
    /// a leave notice, searching both sets.
    ///
    /// The lookup is migration-aware: the transport follows a NAT rebind on
    /// any inbound datagram (keepalives included), so the address it reports
    /// may be newer than the one the registry last stored.
    pub fn handle_peer_forgotten(&mut self, peer: PeerId) {
        let id = match self.registry.find_by_addr_mut(peer.addr(), true) {
            Some(client) => client.router_id(),
            None => return,
        };
        info!(router_id = id, %peer, "peer timed out");
        self.remove_and_broadcast(id);
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    fn on_join_request(&mut self, source: SocketAddr, name: String, expose_ip: bool) {
        // Retries from a registered address are silently absorbed. The
        // lookup is same-IP migration-aware, so a second player behind the
        // same NAT is treated as a retry of the first (and moves the stored
        // port); one client per IP is the operating assumption.
        if self.registry.find_by_addr_mut(source, true).is_some() {
            debug!(%source, "duplicate join request");
            return;
        }

        let peer = PeerId::new(source);

        if self.registry.accepted().is_empty() {
            match self.registry.create_host(peer, name, expose_ip) {
                Ok(_) => {}
                Err(e) => {
                    error!(%source, %e, "refusing join as host");
                    return;
                }
            }
            info!("first player! let them be host");
            self.transport.ensure_tracked(&peer);
            self.transport
                .send(&Packet::LobbyEmpty, &peer, Delivery::Reliable, true);
            if let Some(host) = self.registry.host().cloned() {
                let roster = vec![host.clone()];
                self.send_member_add(&host, &roster);
            }
            self.log_roster();
            return;
        }

        let id = match self.registry.create_prospective(peer, name.clone(), expose_ip) {
            Ok(id) => id,
            Err(e) => {
                error!(%source, %e, "refusing join");
                return;
            }
        };
        self.transport.ensure_tracked(&peer);

        // The host decides on the applicant knowing only its name; a
        // prospective member's real address is never disclosed.
        if let Some(host_peer) = self.registry.host().map(|h| h.peer()) {
            let pending = Packet::MemberList {
                op: MemberOp::Add,
                ids: vec![id],
                addrs: vec![PeerId::BLACKHOLE],
                names: vec![name],
            };
            self.transport
                .send(&pending, &host_peer, Delivery::Reliable, false);
        }

        // Provisional roster so the applicant can render a join screen.
        // Addresses stay withheld until the host accepts.
        let provisional = Packet::MemberList {
            op: MemberOp::Add,
            ids: self.registry.accepted().iter().map(|c| c.router_id()).collect(),
            addrs: vec![PeerId::BLACKHOLE; self.registry.accepted().len()],
            names: self
                .registry
                .accepted()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };
        self.transport
            .send(&provisional, &peer, Delivery::Reliable, true);
        self.transport.send(
            &Packet::LobbyJoined {
                router_id: id,
                lobby: self.lobby.clone(),
            },
            &peer,
            Delivery::Reliable,
            false,
        );
        self.log_roster();
    }

    fn on_host_decision(&mut self, source: SocketAddr, target: RouterId, decision: Decision) {
        let sender_is_host = matches!(
            self.registry.find_by_addr_mut(source, false),
            Some(client) if client.is_host()
        );
        if !sender_is_host {
            error!(%source, target, "host decision from a non-host address");
            return;
        }

        match decision {
            Decision::Reject => {
                if self.registry.prospective_by_id(target).is_none() {
                    debug!(target, "decision for unknown prospective (no-op)");
                    return;
                }
                if let Some(rejected) = self.drop_client(target) {
                    info!(target, "host rejected prospective member");
                    let notice = Packet::MemberList {
                        op: MemberOp::Remove,
                        ids: vec![HOST_ID, target],
                        addrs: Vec::new(),
                        names: Vec::new(),
                    };
                    self.transport
                        .send(&notice, &rejected.peer(), Delivery::Reliable, false);
                    self.log_roster();
                }
            }
            Decision::Accept => {
                let new_member = match self.registry.promote(target) {
                    Ok(client) => client.clone(),
                    Err(e) => {
                        debug!(target, %e, "decision for unknown prospective (no-op)");
                        return;
                    }
                };
                info!(target, name = new_member.name(), "host accepted member");

                let host = match self.registry.host().cloned() {
                    Some(h) => h,
                    None => return,
                };

                // Mutual introduction, each side gated by the disclosure rule.
                self.send_member_add(&new_member, std::slice::from_ref(&host));
                self.send_member_add(&host, std::slice::from_ref(&new_member));

                // Everyone else learns about the new member...
                let others: Vec<Client> = self
                    .registry
                    .accepted()
                    .iter()
                    .filter(|c| c.router_id() != target && !c.is_host())
                    .cloned()
                    .collect();
                for other in &others {
                    self.send_member_add(other, std::slice::from_ref(&new_member));
                }

                // ...and the new member gets the full roster as it now stands.
                let roster: Vec<Client> = self.registry.accepted().to_vec();
                self.send_member_add(&new_member, &roster);
                self.log_roster();
            }
        }
    }

    fn on_leave_notice(&mut self, source: SocketAddr) {
        let id = match self.registry.find_by_addr_mut(source, false) {
            Some(client) => client.router_id(),
            None => {
                error!(%source, "client that's not there wishes to leave");
                return;
            }
        };
        debug!(router_id = id, "client leaving");
        self.remove_and_broadcast(id);
    }

    fn on_route(
        &mut self,
        source: SocketAddr,
        from: RouterId,
        to: RouterId,
        payload: Vec<u8>,
        custom: bool,
    ) {
        // Prospective members are allowed here: they route to the host
        // while their join is pending.
        let verified = match self.check_sender(source, from, true) {
            Some(id) => id,
            None => return,
        };
        if verified == to {
            warn!(router_id = verified, "self-addressed route");
        }

        let sender_accepted = self.registry.accepted_by_id(verified).is_some();
        if !sender_accepted && to != HOST_ID {
            error!(
                router_id = verified,
                to, "prospective client may only route to the host"
            );
            return;
        }

        // Prospective destinations are reachable only by the host.
        let dest = self
            .registry
            .accepted_by_id(to)
            .map(|c| c.peer())
            .or_else(|| {
                if verified == HOST_ID {
                    self.registry.prospective_by_id(to).map(|c| c.peer())
                } else {
                    None
                }
            });
        let dest_peer = match dest {
            Some(peer) => peer,
            None => {
                error!(to, "received packet for departed client");
                return;
            }
        };

        debug!(
            from = verified,
            to,
            len = payload.len(),
            head = %hex::encode(&payload[..payload.len().min(8)]),
            "routing"
        );

        // Identity fields carry the verified sender, never the claim.
        let forwarded = if custom {
            Packet::CustomRoute {
                from: verified,
                to,
                payload,
            }
        } else {
            Packet::RouteData {
                from: verified,
                to,
                payload,
            }
        };
        self.transport
            .send(&forwarded, &dest_peer, Delivery::Unreliable, false);
    }

    fn on_chat_message(&mut self, source: SocketAddr, from: RouterId, text: String) {
        let verified = match self.check_sender(source, from, false) {
            Some(id) => id,
            None => return,
        };
        let sender_exposes = self
            .registry
            .accepted_by_id(verified)
            .map(|c| c.expose_ip())
            .unwrap_or(false);

        // Two exposing peers are presumed to have a direct channel; the
        // server only relays chat when at least one side is proxied.
        let recipients: Vec<PeerId> = self
            .registry
            .accepted()
            .iter()
            .filter(|c| c.router_id() != verified && !(sender_exposes && c.expose_ip()))
            .map(|c| c.peer())
            .collect();

        let relay = Packet::ChatMessage {
            from: verified,
            text,
        };
        for peer in recipients {
            self.transport.send(&relay, &peer, Delivery::Reliable, false);
        }
    }

    fn on_publish_lobby_info(&mut self, source: SocketAddr, update: LobbyInfo) {
        let sender_id = match self.registry.find_by_addr_mut(source, false) {
            Some(client) => client.router_id(),
            None => {
                debug!(%source, "PublishLobbyInfo from an unauthorized party");
                return;
            }
        };
        if self.registry.accepted().len() != 1 || sender_id != HOST_ID {
            debug!(sender_id, "PublishLobbyInfo ignored: lobby already has members");
            return;
        }
        debug!("received new lobby");
        self.lobby.apply(&update);
    }

    // ------------------------------------------------------------------
    // Shared pieces
    // ------------------------------------------------------------------

    /// Resolve the client owning the source address and match it against the
    /// claimed sender ID. Fails closed; both IDs are logged on a mismatch.
    fn check_sender(
        &mut self,
        source: SocketAddr,
        claimed: RouterId,
        include_prospective: bool,
    ) -> Option<RouterId> {
        let actual = match self.registry.find_by_addr_mut(source, include_prospective) {
            Some(client) => client.router_id(),
            None => {
                error!(claimed, %source, "impersonation attempt! unknown sender in disguise");
                return None;
            }
        };
        if actual != claimed {
            error!(claimed, actual, "impersonation attempt!");
            return None;
        }
        Some(actual)
    }

    /// Address `viewer` is shown for `subject`: real iff both consented.
    fn disclosed_addr(viewer: &Client, subject: &Client) -> PeerId {
        if viewer.expose_ip() && subject.expose_ip() {
            subject.peer()
        } else {
            PeerId::BLACKHOLE
        }
    }

    /// Send `viewer` an Add update for `subjects`, every address gated
    /// individually by the disclosure rule.
    fn send_member_add(&mut self, viewer: &Client, subjects: &[Client]) {
        let packet = Packet::MemberList {
            op: MemberOp::Add,
            ids: subjects.iter().map(|s| s.router_id()).collect(),
            addrs: subjects
                .iter()
                .map(|s| Self::disclosed_addr(viewer, s))
                .collect(),
            names: subjects.iter().map(|s| s.name().to_string()).collect(),
        };
        self.transport
            .send(&packet, &viewer.peer(), Delivery::Reliable, false);
    }

    /// The single teardown path. Every removal funnels through here so the
    /// transport's tracking is released exactly once per client, on every
    /// exit path.
    fn drop_client(&mut self, id: RouterId) -> Option<Client> {
        let client = self.registry.remove(id)?;
        self.transport.forget(&client.peer());
        if client.is_host() {
            info!("host departed; lobby closing");
            self.lobby_closed = true;
        }
        Some(client)
    }

    /// Remove a client and broadcast the removal to the departing peer and
    /// every remaining accepted member.
    fn remove_and_broadcast(&mut self, id: RouterId) {
        let client = match self.drop_client(id) {
            Some(c) => c,
            None => return,
        };
        let removal = Packet::MemberList {
            op: MemberOp::Remove,
            ids: vec![id],
            addrs: Vec::new(),
            names: Vec::new(),
        };
        self.transport
            .send(&removal, &client.peer(), Delivery::Reliable, false);
        let peers: Vec<PeerId> = self.registry.accepted().iter().map(|c| c.peer()).collect();
        for peer in peers {
            self.transport.send(&removal, &peer, Delivery::Reliable, false);
        }
        self.log_roster();
    }

    fn log_roster(&self) {
        debug!("client list:");
        for client in self.registry.accepted() {
            debug!(
                "  ID: {}, peer: {}, name: {}",
                client.router_id(),
                client.peer(),
                client.name()
            );
        }
        for client in self.registry.prospective() {
            debug!(
                "  (pending) ID: {}, name: {}",
                client.router_id(),
                client.name()
            );
        }
    }
}
