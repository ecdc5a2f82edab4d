// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end bus scenarios.
//!
//! Each test gets its own multicast port so parallel test binaries never
//! cross-talk; the group address stays the production one. Timings here are
//! generous because discovery announces on a one-second cadence.

use std::time::Duration;

use harrow_bus::{BusConfig, EventBus};

/// Reserve a UDP port unlikely to collide with parallel tests.
pub fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .and_then(|s| s.local_addr())
        .map(|a| a.port())
        .unwrap_or(14_999)
}

/// Production config on a private multicast port.
pub fn test_config(service: &str, multicast_port: u16) -> BusConfig {
    let mut config = BusConfig::new(service);
    config.multicast_port = multicast_port;
    config
}

/// Poll `predicate` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Wait until `observer` has `service` in its peer table.
pub async fn wait_for_peer(observer: &EventBus, service: &str, timeout: Duration) -> bool {
    wait_until(timeout, || observer.active_peers().iter().any(|p| p.service == service)).await
}

/// Discovery takes an announce cycle in each direction.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
/// One scheduler hop plus loopback delivery.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
