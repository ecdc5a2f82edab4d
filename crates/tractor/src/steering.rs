// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Steering client: the safety gate between operator intent and actuation.
//!
//! Consumes the latest cached `steering` event. A missing or stale command
//! locks the gate and commands a hard stop; the lockout holds until the
//! operator presents a near-zero command, so a tractor never lurches when
//! input returns after a gap.

use harrow_bus::schema::{Event, SteeringCommand};
use harrow_bus::{stamp, EventBus};
use prost_types::Timestamp;
use tracing::warn;

/// Event name carrying operator steering commands.
pub const STEERING_EVENT: &str = "steering";

/// Commands older than this are treated as operator loss.
const STALE_MS: i64 = 1_000;
/// A command with |velocity| and |angular velocity| under this releases the
/// lockout.
const RELEASE_THRESHOLD: f64 = 0.01;

/// The lockout state machine, separated from the bus lookup so command
/// traces can be driven directly in tests.
#[derive(Debug, Default)]
pub struct SteeringGate {
    released: bool,
    warned_bad_payload: bool,
}

impl SteeringGate {
    /// A fresh gate starts locked out.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locked_out(&self) -> bool {
        !self.released
    }

    /// The command the control loop may act on this tick: either the latest
    /// operator command or a hard stop.
    pub fn evaluate(&mut self, event: Option<&Event>, now: &Timestamp) -> SteeringCommand {
        let Some(event) = event else {
            self.released = false;
            return SteeringCommand::hard_stop();
        };

        // Only events that crossed the wire carry a receive stamp; anything
        // else cannot prove operator liveness.
        let Some(recv_stamp) = &event.recv_stamp else {
            self.released = false;
            return SteeringCommand::hard_stop();
        };
        let age_ms = stamp::to_millis(now) - stamp::to_millis(recv_stamp);
        if age_ms > STALE_MS {
            warn!(age_ms, "steering locked out, time since last command too long");
            self.released = false;
            return SteeringCommand::hard_stop();
        }

        let command = match event.data.as_ref().map(|any| any.to_msg::<SteeringCommand>()) {
            Some(Ok(command)) => command,
            _ => {
                if !self.warned_bad_payload {
                    self.warned_bad_payload = true;
                    warn!("steering event payload is not a SteeringCommand, locking out");
                }
                self.released = false;
                return SteeringCommand::hard_stop();
            }
        };

        if !self.released {
            if command.velocity.abs() > RELEASE_THRESHOLD
                || command.angular_velocity.abs() > RELEASE_THRESHOLD
            {
                // Operator must present a near-zero command first.
                return SteeringCommand::hard_stop();
            }
            self.released = true;
        }
        command
    }
}

/// Bus-backed steering consumer used by the control loop.
pub struct SteeringClient {
    bus: EventBus,
    gate: SteeringGate,
}

impl SteeringClient {
    pub fn new(bus: &EventBus) -> Self {
        bus.add_subscriptions([STEERING_EVENT]);
        Self { bus: bus.clone(), gate: SteeringGate::new() }
    }

    pub fn locked_out(&self) -> bool {
        self.gate.locked_out()
    }

    pub fn get_steering_command(&mut self) -> SteeringCommand {
        let event = self.bus.get_last_event(STEERING_EVENT);
        self.gate.evaluate(event.as_ref(), &stamp::now())
    }
}

#[cfg(test)]
#[path = "steering_tests.rs"]
mod tests;
