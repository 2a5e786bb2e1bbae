//! Lobby Router Server
//!
//! Relay process for one lobby. Binds a UDP port, decodes datagrams, and
//! feeds packets and liveness events one at a time into the router core.
//! Exits when the host departs and the lobby closes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use lobby_router::router::protocol::MAX_DATAGRAM;
use lobby_router::{Config, Packet, Router, UdpTransport, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_args(&args).context("bad command line")?;

    info!("Lobby Router v{}", VERSION);
    info!("Lobby: '{}' mode={} maxplayers={}", config.lobby.name, config.lobby.mode, config.lobby.max_players);

    let socket = UdpSocket::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind UDP port {}", config.port))?;
    info!("Hosting on port {}", config.port);

    let socket = Arc::new(socket);
    let transport = UdpTransport::new(socket.clone(), Duration::from_millis(config.timeout_ms));
    let mut router = Router::new(transport, config.lobby.clone());

    // One sweep per timeout quarter keeps detection latency bounded without
    // busy-scanning tiny lobbies.
    let sweep_every = Duration::from_millis((config.timeout_ms / 4).max(100));
    let mut sweep = interval(sweep_every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heartbeat = interval(Duration::from_millis(config.heartbeat_ms.max(1)));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut buf = vec![0u8; MAX_DATAGRAM];

    // Single consumer: packets and liveness events are serialized here, so
    // the core never sees concurrent mutations.
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((0, src)) => {
                        // Zero-length datagrams are keepalives.
                        router.transport_mut().note_heard(src);
                    }
                    Ok((len, src)) => {
                        router.transport_mut().note_heard(src);
                        match Packet::from_bytes(&buf[..len]) {
                            Ok(packet) => {
                                debug!(kind = packet.kind(), %src, "received");
                                router.handle_packet(packet, src);
                            }
                            Err(e) => warn!(%src, %e, "undecodable datagram dropped"),
                        }
                    }
                    Err(e) => error!(%e, "recv error"),
                }
            }
            _ = sweep.tick() => {
                for peer in router.transport_mut().sweep() {
                    router.handle_peer_forgotten(peer);
                }
            }
            _ = heartbeat.tick() => {
                router.transport_mut().send_keepalives();
            }
        }

        if router.lobby_closed() {
            info!("lobby closed; shutting down");
            break;
        }
    }

    Ok(())
}
