// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use harrow_bus::make_event_at;
use harrow_bus::schema::SteeringMode;
use harrow_bus::stamp::from_micros;
use proptest::prelude::*;

use super::*;

const SEC: i64 = 1_000_000;

fn command(velocity: f64, angular_velocity: f64) -> SteeringCommand {
    SteeringCommand {
        mode: SteeringMode::JoystickManual as i32,
        deadman: 1.0,
        brake: 0.0,
        velocity,
        angular_velocity,
    }
}

/// An event as the bus cache would hold it after ingress at `recv_micros`.
fn received_at(command: &SteeringCommand, recv_micros: i64) -> Event {
    let mut event = make_event_at(STEERING_EVENT, command, from_micros(recv_micros));
    event.recv_stamp = Some(from_micros(recv_micros));
    event
}

#[test]
fn missing_event_means_lockout_and_hard_stop() {
    let mut gate = SteeringGate::new();
    let out = gate.evaluate(None, &from_micros(10 * SEC));
    assert_eq!(out, SteeringCommand::hard_stop());
    assert!(gate.locked_out());
}

#[test]
fn stale_event_means_lockout_and_hard_stop() {
    let mut gate = SteeringGate::new();
    // Fresh zero command releases the lockout first.
    let zero = received_at(&command(0.0, 0.0), 10 * SEC);
    gate.evaluate(Some(&zero), &from_micros(10 * SEC));
    assert!(!gate.locked_out());

    // 1.1 s gap: the same cached event is now stale.
    let out = gate.evaluate(Some(&zero), &from_micros(10 * SEC + 1_100_000));
    assert_eq!(out, SteeringCommand::hard_stop());
    assert!(gate.locked_out());
}

#[test]
fn event_without_recv_stamp_cannot_release() {
    let mut gate = SteeringGate::new();
    let local_only = make_event_at(STEERING_EVENT, &command(0.0, 0.0), from_micros(10 * SEC));
    let out = gate.evaluate(Some(&local_only), &from_micros(10 * SEC));
    assert_eq!(out, SteeringCommand::hard_stop());
    assert!(gate.locked_out());
}

#[test]
fn undecodable_payload_locks_out() {
    let mut gate = SteeringGate::new();
    let pose = harrow_bus::schema::NamedSe3Pose::default();
    let mut event = make_event_at(STEERING_EVENT, &pose, from_micros(10 * SEC));
    event.recv_stamp = Some(from_micros(10 * SEC));
    let out = gate.evaluate(Some(&event), &from_micros(10 * SEC));
    assert_eq!(out, SteeringCommand::hard_stop());
    assert!(gate.locked_out());
}

#[test]
fn lockout_holds_until_near_zero_command() {
    let mut gate = SteeringGate::new();

    // Moving command while locked out: still a hard stop.
    let moving = received_at(&command(0.5, 0.0), 10 * SEC);
    let out = gate.evaluate(Some(&moving), &from_micros(10 * SEC));
    assert_eq!(out, SteeringCommand::hard_stop());
    assert!(gate.locked_out());

    // Near-zero command releases.
    let zero = received_at(&command(0.005, -0.005), 11 * SEC);
    let out = gate.evaluate(Some(&zero), &from_micros(11 * SEC));
    assert_eq!(out, command(0.005, -0.005));
    assert!(!gate.locked_out());

    // Subsequent moving commands pass through.
    let moving = received_at(&command(0.5, 0.1), 12 * SEC);
    let out = gate.evaluate(Some(&moving), &from_micros(12 * SEC));
    assert_eq!(out, command(0.5, 0.1));
}

/// Lockout-recovery trace: 20 Hz commands, a 2 s dropout, then resumption.
#[test]
fn dropout_trace_recovers_only_after_zero_command() {
    let mut gate = SteeringGate::new();
    let mut t = 10 * SEC;

    // Prime with a zero command, then stream moving commands for 2 s.
    let zero = received_at(&command(0.0, 0.0), t);
    gate.evaluate(Some(&zero), &from_micros(t));
    let mut last = zero;
    for _ in 0..40 {
        t += 50_000;
        last = received_at(&command(0.5, 0.0), t);
        let out = gate.evaluate(Some(&last), &from_micros(t));
        assert_eq!(out.velocity, 0.5);
    }

    // 2 s pause: the cached event goes stale.
    t += 2 * SEC;
    let out = gate.evaluate(Some(&last), &from_micros(t));
    assert_eq!(out, SteeringCommand::hard_stop());

    // First post-pause moving sample is still refused.
    let resumed = received_at(&command(0.5, 0.0), t);
    let out = gate.evaluate(Some(&resumed), &from_micros(t));
    assert_eq!(out, SteeringCommand::hard_stop());

    // A zero sample releases; traffic flows again.
    t += 50_000;
    let zero = received_at(&command(0.0, 0.0), t);
    gate.evaluate(Some(&zero), &from_micros(t));
    t += 50_000;
    let moving = received_at(&command(0.5, 0.0), t);
    let out = gate.evaluate(Some(&moving), &from_micros(t));
    assert_eq!(out.velocity, 0.5);
}

proptest! {
    // Any gap over a second in receive stamps forces a hard stop and lockout.
    #[test]
    fn prop_gap_over_one_second_locks_out(gap_ms in 1_001i64..60_000) {
        let mut gate = SteeringGate::new();
        let t0 = 100 * SEC;
        let zero = received_at(&command(0.0, 0.0), t0);
        gate.evaluate(Some(&zero), &from_micros(t0));
        prop_assert!(!gate.locked_out());

        let out = gate.evaluate(Some(&zero), &from_micros(t0 + gap_ms * 1_000));
        prop_assert_eq!(out, SteeringCommand::hard_stop());
        prop_assert!(gate.locked_out());
    }

    // After lockout, commands above the release threshold never pass.
    #[test]
    fn prop_lockout_blocks_moving_commands(v in 0.011f64..2.0, w in -0.5f64..0.5) {
        let mut gate = SteeringGate::new();
        let moving = received_at(&command(v, w), 100 * SEC);
        let out = gate.evaluate(Some(&moving), &from_micros(100 * SEC));
        prop_assert_eq!(out, SteeringCommand::hard_stop());
        prop_assert!(gate.locked_out());
    }
}
