// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end bus scenarios over real loopback sockets: discovery, addressed
//! delivery, subscription gating, and peer eviction.

use std::time::Duration;

use harrow_bus::schema::SteeringCommand;
use harrow_bus::{make_event, EventBus};

use harrow_specs::{
    free_udp_port, test_config, wait_for_peer, wait_until, DELIVERY_TIMEOUT, DISCOVERY_TIMEOUT,
};

fn probe(velocity: f64) -> SteeringCommand {
    SteeringCommand { velocity, ..SteeringCommand::hard_stop() }
}

fn cached_velocity(bus: &EventBus, name: &str) -> Option<f64> {
    bus.get_last_event(name)
        .and_then(|e| e.data)
        .and_then(|any| any.to_msg::<SteeringCommand>().ok())
        .map(|c| c.velocity)
}

#[tokio::test]
async fn round_trip_between_two_buses() -> anyhow::Result<()> {
    let port = free_udp_port();
    let a = EventBus::bind(test_config("a", port)).await?;
    a.add_subscriptions(["hello"]);
    let b = EventBus::bind(test_config("b", port)).await?;

    // B must learn A's address and subscription set before sending.
    assert!(
        wait_until(DISCOVERY_TIMEOUT, || {
            b.active_peers().iter().any(|p| p.service == "a" && !p.subscriptions.is_empty())
        })
        .await,
        "b never discovered a"
    );

    b.send(make_event("hello", &probe(0.25)));
    assert!(
        wait_until(DELIVERY_TIMEOUT, || a.get_last_event("hello").is_some()).await,
        "a never observed the event"
    );

    let event = a.get_last_event("hello");
    assert!(event.as_ref().is_some_and(|e| e.recv_stamp.is_some()), "ingress must stamp");
    assert_eq!(cached_velocity(&a, "hello"), Some(0.25));
    assert!(b.stats().datagrams_sent >= 1);
    Ok(())
}

#[tokio::test]
async fn subscription_gate_produces_zero_datagrams() -> anyhow::Result<()> {
    let port = free_udp_port();
    let a = EventBus::bind(test_config("a", port)).await?;
    a.add_subscriptions(["state/.*"]);
    let b = EventBus::bind(test_config("b", port)).await?;
    assert!(wait_for_peer(&b, "a", DISCOVERY_TIMEOUT).await);

    // Nobody subscribes to `steering`: cache updates, nothing on the wire.
    b.send(make_event("steering", &probe(0.5)));
    assert_eq!(b.stats().datagrams_sent, 0);
    assert!(b.get_last_event("steering").is_some());

    // A matching name does go out.
    b.send(make_event("state/engine", &probe(0.5)));
    assert_eq!(b.stats().datagrams_sent, 1);
    Ok(())
}

#[tokio::test]
async fn last_event_wins_per_name() -> anyhow::Result<()> {
    let port = free_udp_port();
    let a = EventBus::bind(test_config("a", port)).await?;
    a.add_subscriptions(["counter"]);
    let b = EventBus::bind(test_config("b", port)).await?;
    assert!(
        wait_until(DISCOVERY_TIMEOUT, || {
            b.active_peers().iter().any(|p| p.service == "a" && !p.subscriptions.is_empty())
        })
        .await
    );

    for i in 0..20 {
        b.send(make_event("counter", &probe(f64::from(i))));
    }
    assert!(
        wait_until(DELIVERY_TIMEOUT, || cached_velocity(&a, "counter") == Some(19.0)).await,
        "a settled on {:?} instead of the last event",
        cached_velocity(&a, "counter")
    );
    Ok(())
}

#[tokio::test]
async fn event_queue_streams_ingress() -> anyhow::Result<()> {
    let port = free_udp_port();
    let a = EventBus::bind(test_config("a", port)).await?;
    a.add_subscriptions(["stream/.*"]);
    let mut queue = a.event_queue();
    let b = EventBus::bind(test_config("b", port)).await?;
    assert!(
        wait_until(DISCOVERY_TIMEOUT, || {
            b.active_peers().iter().any(|p| p.service == "a" && !p.subscriptions.is_empty())
        })
        .await
    );

    b.send(make_event("stream/x", &probe(1.0)));
    let received = tokio::time::timeout(DELIVERY_TIMEOUT, queue.recv()).await?;
    assert!(received.is_some_and(|e| e.name == "stream/x"));
    Ok(())
}

#[tokio::test]
async fn event_callback_fans_out_ingress() -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let port = free_udp_port();
    let a = EventBus::bind(test_config("a", port)).await?;
    a.add_subscriptions(["tick"]);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    a.add_event_callback(move |event| {
        if event.name == "tick" {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let b = EventBus::bind(test_config("b", port)).await?;
    assert!(
        wait_until(DISCOVERY_TIMEOUT, || {
            b.active_peers().iter().any(|p| p.service == "a" && !p.subscriptions.is_empty())
        })
        .await
    );

    for _ in 0..5 {
        b.send(make_event("tick", &probe(0.0)));
    }
    assert!(
        wait_until(DELIVERY_TIMEOUT, || seen.load(Ordering::SeqCst) == 5).await,
        "callback saw {} of 5 events",
        seen.load(Ordering::SeqCst)
    );
    Ok(())
}

#[tokio::test]
async fn announce_queue_sees_peers() -> anyhow::Result<()> {
    let port = free_udp_port();
    let a = EventBus::bind(test_config("a", port)).await?;
    let mut announces = a.announce_queue();
    let _b = EventBus::bind(test_config("b", port)).await?;

    let announce = tokio::time::timeout(DISCOVERY_TIMEOUT, announces.recv()).await?;
    assert!(announce.is_some_and(|ann| ann.service == "b" && ann.host == "127.0.0.1"));
    Ok(())
}

#[tokio::test]
async fn evicted_peer_draws_zero_datagrams() -> anyhow::Result<()> {
    let port = free_udp_port();

    let mut subscriber_config = test_config("ephemeral", port);
    subscriber_config.announce_period = Duration::from_millis(200);
    let a = EventBus::bind(subscriber_config).await?;
    a.add_subscriptions(["exclusive/.*"]);

    let mut sender_config = test_config("sender", port);
    sender_config.peer_ttl = Duration::from_millis(1_500);
    sender_config.sweep_period = Duration::from_millis(500);
    let b = EventBus::bind(sender_config).await?;

    assert!(
        wait_until(DISCOVERY_TIMEOUT, || {
            b.active_peers().iter().any(|p| p.service == "ephemeral" && !p.subscriptions.is_empty())
        })
        .await
    );

    // Kill the subscriber; after the TTL plus a sweep it must be gone.
    drop(a);
    assert!(
        wait_until(Duration::from_secs(10), || b.active_peers().is_empty()).await,
        "stale peer was never evicted: {:?}",
        b.active_peers()
    );

    b.send(make_event("exclusive/topic", &probe(1.0)));
    assert_eq!(b.stats().datagrams_sent, 0, "send to an evicted peer hit the wire");
    Ok(())
}
