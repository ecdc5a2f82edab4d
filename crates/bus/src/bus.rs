// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process event bus.
//!
//! One bus per process, threaded through construction as an explicit handle.
//! The bus owns its sockets, the peer table, the last-value state cache, and
//! the subscriber set; everything is torn down when the last handle drops.
//! Delivery is datagram-best-effort: no retransmission, no cross-name
//! ordering, and nothing larger than a single UDP datagram.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use prost::Message;
use prost_types::{Any, Timestamp};
use regex::Regex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery;
use crate::schema::{Announce, Event, Subscription};
use crate::stamp;

/// Largest event datagram the bus will put on the wire.
pub const MAX_DATAGRAM: usize = 65_507;

/// Bus tuning knobs.
///
/// Defaults are the production constants; tests shrink the cadences and pick
/// a private multicast port so parallel test binaries stay isolated.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Service name carried in announcements.
    pub service: String,
    /// Administratively-scoped discovery group, confined to this host.
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    /// How often this bus announces itself.
    pub announce_period: Duration,
    /// How often stale peers are swept.
    pub sweep_period: Duration,
    /// A peer that has not announced within this window is evicted.
    pub peer_ttl: Duration,
    pub event_queue_depth: usize,
    pub announce_queue_depth: usize,
}

impl BusConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            multicast_group: Ipv4Addr::new(239, 20, 20, 21),
            multicast_port: 10_000,
            announce_period: Duration::from_secs(1),
            sweep_period: Duration::from_secs(2),
            peer_ttl: Duration::from_secs(10),
            event_queue_depth: 256,
            announce_queue_depth: 64,
        }
    }

    pub fn group(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.multicast_group, self.multicast_port)
    }
}

// -- Interior state ------------------------------------------------------------

/// Compiled subscription patterns, keyed by source string. A pattern that
/// fails to compile matches nothing and warns once.
#[derive(Default)]
pub(crate) struct PatternCache {
    compiled: HashMap<String, Option<Regex>>,
}

impl PatternCache {
    pub(crate) fn get(&mut self, source: &str) -> Option<&Regex> {
        self.compiled
            .entry(source.to_owned())
            .or_insert_with(|| match Regex::new(source) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = source, "bad subscription pattern: {e}");
                    None
                }
            })
            .as_ref()
    }

    /// Unanchored search semantics: `pose` matches `pose/tractor/base`.
    pub(crate) fn any_match(&mut self, subscriptions: &[Subscription], name: &str) -> bool {
        subscriptions.iter().any(|sub| self.get(&sub.name).is_some_and(|re| re.is_match(name)))
    }
}

pub(crate) struct Peer {
    pub(crate) announce: Announce,
    pub(crate) refreshed: Instant,
}

#[derive(Default)]
pub(crate) struct BusState {
    pub(crate) subscriptions: Vec<Subscription>,
    pub(crate) cache: PatternCache,
    /// Active peers, keyed by `host:port`.
    pub(crate) peers: HashMap<String, Peer>,
    /// Latest event per name, updated on every send and receive.
    pub(crate) latest: HashMap<String, Event>,
    pub(crate) event_queues: Vec<(u64, mpsc::Sender<Event>)>,
    pub(crate) announce_queues: Vec<(u64, mpsc::Sender<Announce>)>,
}

#[derive(Default)]
struct BusStats {
    datagrams_sent: AtomicU64,
    events_received: AtomicU64,
    events_dropped: AtomicU64,
}

/// Point-in-time counters, mostly for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStatsSnapshot {
    pub datagrams_sent: u64,
    pub events_received: u64,
    pub events_dropped: u64,
}

struct BusInner {
    config: BusConfig,
    port: u16,
    unicast: Arc<UdpSocket>,
    state: Arc<Mutex<BusState>>,
    stats: Arc<BusStats>,
    shutdown: CancellationToken,
    queue_seq: AtomicU64,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Handle --------------------------------------------------------------------

/// Cloneable handle to the process event bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Bind the unicast event socket and the discovery group, then start the
    /// announce/listen/sweep/ingress tasks.
    pub async fn bind(config: BusConfig) -> anyhow::Result<Self> {
        let unicast = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        // TTL 0 keeps announcements from leaving this host.
        unicast.set_multicast_ttl_v4(0)?;
        let port = unicast.local_addr()?.port();
        let unicast = Arc::new(unicast);

        let listener = discovery::multicast_listener(&config)?;
        let state = Arc::new(Mutex::new(BusState::default()));
        let stats = Arc::new(BusStats::default());
        let shutdown = CancellationToken::new();

        discovery::spawn(
            config.clone(),
            port,
            Arc::clone(&unicast),
            listener,
            Arc::clone(&state),
            shutdown.clone(),
        );
        spawn_ingress(
            Arc::clone(&unicast),
            Arc::clone(&state),
            Arc::clone(&stats),
            shutdown.clone(),
        );

        info!(service = %config.service, port, "event bus bound");
        Ok(Self {
            inner: Arc::new(BusInner {
                config,
                port,
                unicast,
                state,
                stats,
                shutdown,
                queue_seq: AtomicU64::new(0),
            }),
        })
    }

    pub fn service(&self) -> &str {
        &self.inner.config.service
    }

    /// The unicast port peers deliver events to.
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn stats(&self) -> BusStatsSnapshot {
        BusStatsSnapshot {
            datagrams_sent: self.inner.stats.datagrams_sent.load(Ordering::Relaxed),
            events_received: self.inner.stats.events_received.load(Ordering::Relaxed),
            events_dropped: self.inner.stats.events_dropped.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of the currently known peers.
    pub fn active_peers(&self) -> Vec<Announce> {
        self.inner.state.lock().peers.values().map(|p| p.announce.clone()).collect()
    }

    /// Stop all bus tasks. Dropping the last handle does the same.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Append name patterns to this bus's subscription set. The patterns ride
    /// out with the next announcement.
    pub fn add_subscriptions<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.inner.state.lock();
        for name in names {
            let name = name.into();
            // Compile now so a bad pattern warns at declaration, not at match.
            state.cache.get(&name);
            state.subscriptions.push(Subscription { name });
        }
    }

    /// Publish an event: the local state cache is updated unconditionally,
    /// then one unicast datagram goes to every peer whose subscription set
    /// matches the event name. No matching peer, no wire traffic.
    pub fn send(&self, event: Event) {
        if event.name.is_empty() {
            warn!("refusing to send event with empty name");
            return;
        }
        let name = event.name.clone();
        let buf = event.encode_to_vec();

        let recipients: Vec<SocketAddr> = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.latest.insert(name.clone(), event);
            let cache = &mut state.cache;
            state
                .peers
                .values()
                .filter(|peer| cache.any_match(&peer.announce.subscriptions, &name))
                .filter_map(|peer| {
                    let host: Ipv4Addr = peer.announce.host.parse().ok()?;
                    Some(SocketAddr::from((host, peer.announce.port as u16)))
                })
                .collect()
        };

        if recipients.is_empty() {
            return;
        }
        if buf.len() > MAX_DATAGRAM {
            warn!(%name, len = buf.len(), "event exceeds max datagram size, not sent");
            return;
        }
        for addr in recipients {
            match self.inner.unicast.try_send_to(&buf, addr) {
                Ok(_) => {
                    self.inner.stats.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!(%name, %addr, "event send failed: {e}"),
            }
        }
    }

    /// Latest cached event under `name`, from either a local send or an
    /// ingress. Warns when this bus never declared a matching subscription,
    /// since nothing from the network can have landed in the cache.
    pub fn get_last_event(&self, name: &str) -> Option<Event> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if !state.cache.any_match(&state.subscriptions, name) {
            warn!(
                service = %self.inner.config.service,
                name,
                "no subscription declared for event name"
            );
        }
        state.latest.get(name).cloned()
    }

    /// Attach a bounded queue that receives every ingress event until the
    /// guard drops.
    pub fn event_queue(&self) -> EventQueue {
        let (tx, rx) = mpsc::channel(self.inner.config.event_queue_depth);
        let id = self.inner.queue_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.state.lock().event_queues.push((id, tx));
        debug!(id, "event queue attached");
        EventQueue { id, rx, state: Arc::downgrade(&self.inner.state) }
    }

    /// Attach a bounded queue of accepted peer announcements.
    pub fn announce_queue(&self) -> AnnounceQueue {
        let (tx, rx) = mpsc::channel(self.inner.config.announce_queue_depth);
        let id = self.inner.queue_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.state.lock().announce_queues.push((id, tx));
        debug!(id, "announce queue attached");
        AnnounceQueue { id, rx, state: Arc::downgrade(&self.inner.state) }
    }

    /// Consume an event queue on a task, forwarding each event to `callback`.
    /// The task ends when the bus is torn down.
    pub fn add_event_callback(
        &self,
        mut callback: impl FnMut(Event) + Send + 'static,
    ) -> JoinHandle<()> {
        let mut queue = self.event_queue();
        tokio::spawn(async move {
            while let Some(event) = queue.recv().await {
                callback(event);
            }
        })
    }
}

// -- Scoped queues -------------------------------------------------------------

/// Scoped event subscription; detaches from the bus on drop.
pub struct EventQueue {
    id: u64,
    rx: mpsc::Receiver<Event>,
    state: Weak<Mutex<BusState>>,
}

impl EventQueue {
    /// Next ingress event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().event_queues.retain(|(id, _)| *id != self.id);
            debug!(id = self.id, "event queue detached");
        }
    }
}

/// Scoped announcement subscription; detaches from the bus on drop.
pub struct AnnounceQueue {
    id: u64,
    rx: mpsc::Receiver<Announce>,
    state: Weak<Mutex<BusState>>,
}

impl AnnounceQueue {
    pub async fn recv(&mut self) -> Option<Announce> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Announce> {
        self.rx.try_recv().ok()
    }
}

impl Drop for AnnounceQueue {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().announce_queues.retain(|(id, _)| *id != self.id);
            debug!(id = self.id, "announce queue detached");
        }
    }
}

// -- Ingress -------------------------------------------------------------------

fn spawn_ingress(
    unicast: Arc<UdpSocket>,
    state: Arc<Mutex<BusState>>,
    stats: Arc<BusStats>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM + 1];
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = unicast.recv_from(&mut buf) => r,
            };
            let (len, _from) = match received {
                Ok(x) => x,
                Err(e) => {
                    warn!("event receive failed: {e}");
                    continue;
                }
            };
            let mut event = match Event::decode(&buf[..len]) {
                Ok(event) => event,
                Err(e) => {
                    warn!(len, "undecodable event datagram: {e}");
                    continue;
                }
            };
            event.recv_stamp = Some(stamp::now());
            stats.events_received.fetch_add(1, Ordering::Relaxed);

            let mut state = state.lock();
            state.latest.insert(event.name.clone(), event.clone());
            for (_, queue) in &state.event_queues {
                if let Err(mpsc::error::TrySendError::Full(_)) = queue.try_send(event.clone()) {
                    stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(name = %event.name, "event queue full, dropping event");
                }
            }
        }
    });
}

// -- Event construction --------------------------------------------------------

/// Pack `message` as a type-tagged event payload, stamped now.
pub fn make_event<M: prost::Name>(name: &str, message: &M) -> Event {
    make_event_at(name, message, stamp::now())
}

/// Pack `message` as a type-tagged event payload with an explicit stamp.
pub fn make_event_at<M: prost::Name>(name: &str, message: &M, stamp: Timestamp) -> Event {
    Event {
        name: name.to_owned(),
        stamp: Some(stamp),
        recv_stamp: None,
        data: Any::from_msg(message).ok(),
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
