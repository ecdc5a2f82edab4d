// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Steering lockout recovery through two live buses: commands stream in,
//! drop out, and resume; the gate must refuse motion until a near-zero
//! command arrives.

use std::time::Duration;

use harrow::steering::{SteeringClient, STEERING_EVENT};
use harrow_bus::schema::{SteeringCommand, SteeringMode};
use harrow_bus::{make_event, EventBus};

use harrow_specs::{free_udp_port, test_config, wait_until, DELIVERY_TIMEOUT, DISCOVERY_TIMEOUT};

fn command(velocity: f64) -> SteeringCommand {
    SteeringCommand {
        mode: SteeringMode::JoystickManual as i32,
        deadman: 1.0,
        brake: 0.0,
        velocity,
        angular_velocity: 0.0,
    }
}

fn cached_velocity(bus: &EventBus) -> Option<f64> {
    bus.get_last_event(STEERING_EVENT)
        .and_then(|e| e.data)
        .and_then(|any| any.to_msg::<SteeringCommand>().ok())
        .map(|c| c.velocity)
}

#[tokio::test]
async fn lockout_recovery_across_a_command_dropout() -> anyhow::Result<()> {
    let port = free_udp_port();
    let tractor_bus = EventBus::bind(test_config("tractor", port)).await?;
    let mut client = SteeringClient::new(&tractor_bus);
    let operator = EventBus::bind(test_config("operator", port)).await?;

    assert!(
        wait_until(DISCOVERY_TIMEOUT, || {
            operator.active_peers().iter().any(|p| p.service == "tractor")
        })
        .await,
        "operator never discovered the tractor"
    );

    // Before any command arrives: hard stop, locked out.
    assert_eq!(client.get_steering_command(), SteeringCommand::hard_stop());
    assert!(client.locked_out());

    // A zero command releases the lockout.
    operator.send(make_event(STEERING_EVENT, &command(0.0)));
    assert!(wait_until(DELIVERY_TIMEOUT, || cached_velocity(&tractor_bus) == Some(0.0)).await);
    assert_eq!(client.get_steering_command().velocity, 0.0);
    assert!(!client.locked_out());

    // Streaming moving commands pass through.
    operator.send(make_event(STEERING_EVENT, &command(0.5)));
    assert!(wait_until(DELIVERY_TIMEOUT, || cached_velocity(&tractor_bus) == Some(0.5)).await);
    for _ in 0..10 {
        operator.send(make_event(STEERING_EVENT, &command(0.5)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.get_steering_command().velocity, 0.5);
    }

    // Dropout: no commands for 1.2 s. The gate locks and hard-stops.
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(client.get_steering_command(), SteeringCommand::hard_stop());
    assert!(client.locked_out());

    // Resumption with a moving command is still refused.
    operator.send(make_event(STEERING_EVENT, &command(0.5)));
    assert!(wait_until(DELIVERY_TIMEOUT, || cached_velocity(&tractor_bus) == Some(0.5)).await);
    assert_eq!(client.get_steering_command(), SteeringCommand::hard_stop());
    assert!(client.locked_out());

    // A near-zero command releases; traffic flows again.
    operator.send(make_event(STEERING_EVENT, &command(0.0)));
    assert!(wait_until(DELIVERY_TIMEOUT, || cached_velocity(&tractor_bus) == Some(0.0)).await);
    assert_eq!(client.get_steering_command().velocity, 0.0);
    assert!(!client.locked_out());

    operator.send(make_event(STEERING_EVENT, &command(0.5)));
    assert!(wait_until(DELIVERY_TIMEOUT, || cached_velocity(&tractor_bus) == Some(0.5)).await);
    assert_eq!(client.get_steering_command().velocity, 0.5);
    Ok(())
}
