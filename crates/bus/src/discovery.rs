// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback multicast peer discovery.
//!
//! Every bus announces itself once a second on the discovery group: service
//! name, loopback host, unicast receive port, and the current subscription
//! set. A single always-on listener ingests peer announcements; a sweeper
//! evicts peers that have gone quiet. TTL 0 on the sending socket keeps the
//! group traffic on this host.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::Arc;

use parking_lot::Mutex;
use prost::Message;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusConfig, BusState, Peer, MAX_DATAGRAM};
use crate::periodic::Periodic;
use crate::schema::Announce;
use crate::stamp;

/// The only host a peer may announce; the bus is process-local by design.
pub const LOCAL_HOST: &str = "127.0.0.1";

/// Bind the shared multicast listen socket. `SO_REUSEADDR`/`SO_REUSEPORT`
/// let every bus on the host bind the same group port.
pub(crate) fn multicast_listener(config: &BusConfig) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, config.multicast_port).into();
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&config.multicast_group, &Ipv4Addr::UNSPECIFIED)?;
    let socket: StdUdpSocket = socket.into();
    Ok(UdpSocket::from_std(socket)?)
}

/// Start the announce, listen, and sweep tasks for a bus.
pub(crate) fn spawn(
    config: BusConfig,
    port: u16,
    unicast: Arc<UdpSocket>,
    listener: UdpSocket,
    state: Arc<Mutex<BusState>>,
    shutdown: CancellationToken,
) {
    spawn_announcer(config.clone(), port, unicast, Arc::clone(&state), shutdown.clone());
    spawn_listener(listener, port, Arc::clone(&state), shutdown.clone());
    spawn_sweeper(config, state, shutdown);
}

fn spawn_announcer(
    config: BusConfig,
    port: u16,
    unicast: Arc<UdpSocket>,
    state: Arc<Mutex<BusState>>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let group = SocketAddr::V4(config.group());
        let mut periodic = Periodic::new(config.announce_period, "announce");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = periodic.tick() => {}
            }
            let announce = Announce {
                stamp: Some(stamp::now()),
                recv_stamp: None,
                service: config.service.clone(),
                host: LOCAL_HOST.to_owned(),
                port: u32::from(port),
                subscriptions: state.lock().subscriptions.clone(),
            };
            if let Err(e) = unicast.try_send_to(&announce.encode_to_vec(), group) {
                warn!("announce send failed: {e}");
            }
        }
    });
}

fn spawn_listener(
    listener: UdpSocket,
    our_port: u16,
    state: Arc<Mutex<BusState>>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM + 1];
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = listener.recv_from(&mut buf) => r,
            };
            let (len, from) = match received {
                Ok(x) => x,
                Err(e) => {
                    warn!("announce receive failed: {e}");
                    continue;
                }
            };
            let Some(announce) = accept_announce(&buf[..len], from, our_port) else {
                continue;
            };

            let mut state = state.lock();
            let key = format!("{}:{}", announce.host, announce.port);
            debug!(service = %announce.service, %key, "peer announce");
            for (_, queue) in &state.announce_queues {
                if queue.try_send(announce.clone()).is_err() {
                    warn!(service = %announce.service, "announce queue full, dropping");
                }
            }
            state.peers.insert(key, Peer { announce, refreshed: Instant::now() });
        }
    });
}

/// Validate a raw announcement datagram.
///
/// Self-announcements are skipped quietly. Announcements whose declared
/// address disagrees with the datagram origin, or whose declared host is not
/// local, are rejected with a warning.
pub(crate) fn accept_announce(buf: &[u8], from: SocketAddr, our_port: u16) -> Option<Announce> {
    if from.port() == our_port {
        return None;
    }
    let mut announce = match Announce::decode(buf) {
        Ok(announce) => announce,
        Err(e) => {
            warn!(%from, "undecodable announcement: {e}");
            return None;
        }
    };
    if announce.host != LOCAL_HOST {
        warn!(%from, host = %announce.host, "ignoring non-local announcement");
        return None;
    }
    if announce.port != u32::from(from.port()) {
        warn!(%from, declared = announce.port, "announcement does not match sender, rejecting");
        return None;
    }
    announce.recv_stamp = Some(stamp::now());
    Some(announce)
}

fn spawn_sweeper(config: BusConfig, state: Arc<Mutex<BusState>>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut periodic = Periodic::new(config.sweep_period, "peer-sweep");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = periodic.tick() => {}
            }
            state.lock().peers.retain(|key, peer| {
                let live = peer.refreshed.elapsed() <= config.peer_ttl;
                if !live {
                    info!(service = %peer.announce.service, %key, "dropping stale peer");
                }
                live
            });
        }
    });
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
