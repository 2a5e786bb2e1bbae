//! UDP Transport
//!
//! Thin datagram transport behind the [`Transport`] trait: non-blocking
//! sends, per-peer last-heard tracking with a timeout sweep, and periodic
//! empty-datagram keepalives so NAT mappings stay open. Reliability,
//! retransmission and encryption are deliberately absent; the `Reliable`
//! delivery class is carried for a future reliability layer but maps to a
//! plain datagram here.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tracing::{debug, error, warn};

use crate::router::protocol::{Packet, MAX_DATAGRAM};
use crate::transport::{Delivery, PeerId, Transport};

/// Datagram transport over one bound UDP socket.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    /// Last-heard instant per tracked peer address.
    peers: HashMap<SocketAddr, Instant>,
    timeout: Duration,
}

impl UdpTransport {
    /// Wrap a bound socket. `timeout` is how long a tracked peer may stay
    /// silent before the sweep declares it forgotten.
    pub fn new(socket: Arc<UdpSocket>, timeout: Duration) -> Self {
        UdpTransport {
            socket,
            peers: HashMap::new(),
            timeout,
        }
    }

    /// Refresh a peer's liveness on any inbound datagram. A datagram from a
    /// tracked peer's IP on a new port follows the peer to the new address
    /// (NAT rebind), mirroring [`PeerId::compare_and_update`].
    pub fn note_heard(&mut self, addr: SocketAddr) {
        let now = Instant::now();
        if let Some(last) = self.peers.get_mut(&addr) {
            *last = now;
            return;
        }
        let migrated = self
            .peers
            .keys()
            .find(|known| known.ip() == addr.ip())
            .copied();
        if let Some(old) = migrated {
            debug!(%old, new = %addr, "tracked peer rebound");
            self.peers.remove(&old);
            self.peers.insert(addr, now);
        }
    }

    /// Collect and drop every peer that has been silent past the timeout.
    pub fn sweep(&mut self) -> Vec<PeerId> {
        let now = Instant::now();
        let expired: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > self.timeout)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &expired {
            self.peers.remove(addr);
        }
        expired.into_iter().map(PeerId::new).collect()
    }

    /// Send an empty datagram to every tracked peer to keep NAT mappings
    /// alive. Receivers treat zero-length datagrams as liveness only.
    pub fn send_keepalives(&mut self) {
        for addr in self.peers.keys() {
            if let Err(e) = self.socket.try_send_to(&[], *addr) {
                debug!(%addr, %e, "keepalive send failed");
            }
        }
    }

    /// Number of tracked peers.
    pub fn tracked_peers(&self) -> usize {
        self.peers.len()
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, packet: &Packet, dest: &PeerId, _delivery: Delivery, start_conversation: bool) {
        if dest.is_blackhole() {
            warn!(kind = packet.kind(), "refusing to send to the blackhole placeholder");
            return;
        }
        if start_conversation {
            self.ensure_tracked(dest);
        }
        let bytes = match packet.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                error!(kind = packet.kind(), %e, "failed to encode packet");
                return;
            }
        };
        if bytes.len() > MAX_DATAGRAM {
            error!(
                kind = packet.kind(),
                len = bytes.len(),
                "packet exceeds datagram budget, dropped"
            );
            return;
        }
        if let Err(e) = self.socket.try_send_to(&bytes, dest.addr()) {
            warn!(dest = %dest, %e, "send failed");
        }
    }

    fn ensure_tracked(&mut self, peer: &PeerId) {
        self.peers.entry(peer.addr()).or_insert_with(Instant::now);
    }

    fn forget(&mut self, peer: &PeerId) {
        self.peers.remove(&peer.addr());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn transport(timeout: Duration) -> UdpTransport {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        UdpTransport::new(Arc::new(socket), timeout)
    }

    fn peer(s: &str) -> PeerId {
        PeerId::new(s.parse().unwrap())
    }

    #[tokio::test]
    async fn test_track_and_forget() {
        let mut t = transport(Duration::from_millis(50)).await;
        let p = peer("127.0.0.1:9001");

        t.ensure_tracked(&p);
        t.ensure_tracked(&p);
        assert_eq!(t.tracked_peers(), 1);

        t.forget(&p);
        t.forget(&p);
        assert_eq!(t.tracked_peers(), 0);
    }

    #[tokio::test]
    async fn test_sweep_expires_silent_peers() {
        let mut t = transport(Duration::from_millis(0)).await;
        let p = peer("127.0.0.1:9002");
        t.ensure_tracked(&p);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let forgotten = t.sweep();
        assert_eq!(forgotten, vec![p]);
        assert_eq!(t.tracked_peers(), 0);
        // Second sweep finds nothing.
        assert!(t.sweep().is_empty());
    }

    #[tokio::test]
    async fn test_note_heard_keeps_peer_alive() {
        let mut t = transport(Duration::from_millis(40)).await;
        let p = peer("127.0.0.1:9003");
        t.ensure_tracked(&p);

        tokio::time::sleep(Duration::from_millis(30)).await;
        t.note_heard(p.addr());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(t.sweep().is_empty(), "refreshed peer must not expire");
    }

    #[tokio::test]
    async fn test_note_heard_follows_rebind() {
        let mut t = transport(Duration::from_secs(5)).await;
        t.ensure_tracked(&peer("127.0.0.1:9004"));

        t.note_heard("127.0.0.1:9005".parse().unwrap());
        assert_eq!(t.tracked_peers(), 1);
        assert!(t.peers.contains_key(&"127.0.0.1:9005".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_note_heard_ignores_strangers() {
        let mut t = transport(Duration::from_secs(5)).await;
        t.note_heard("127.0.0.2:9006".parse().unwrap());
        assert_eq!(t.tracked_peers(), 0);
    }

    #[tokio::test]
    async fn test_blackhole_send_is_dropped() {
        let mut t = transport(Duration::from_secs(5)).await;
        t.send(&Packet::LobbyEmpty, &PeerId::BLACKHOLE, Delivery::Reliable, false);
        assert_eq!(t.tracked_peers(), 0);
    }

    #[tokio::test]
    async fn test_start_conversation_tracks_peer() {
        let mut t = transport(Duration::from_secs(5)).await;
        let p = peer("127.0.0.1:9007");
        t.send(&Packet::LobbyEmpty, &p, Delivery::Reliable, true);
        assert_eq!(t.tracked_peers(), 1);
    }
}
