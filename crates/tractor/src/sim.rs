// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulated motor bank.
//!
//! Sits on the far side of a virtual CAN pair and plays the role of the
//! motor controllers: velocity commands in, telemetry status frames out.
//! Commanded speeds are reflected back verbatim, which is exactly what the
//! odometry and goal-servo paths need to run without hardware.

use std::time::Duration;

use bytes::Buf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use harrow_bus::Periodic;

use crate::canbus::{CanTransport, CAN_EFF_FLAG, CAN_EFF_MASK};
use crate::motor::{
    encode_status_1, encode_status_5, VESC_SET_CURRENT_BRAKE, VESC_SET_RPM, VESC_STATUS_MSG_1,
    VESC_STATUS_MSG_5,
};

/// Telemetry rounds between full-state frames.
const FULL_STATE_EVERY: u64 = 10;
const SIM_INPUT_VOLTAGE: f64 = 48.0;

#[derive(Debug, Clone, Copy)]
pub struct SimMotorParams {
    pub node_id: u8,
}

struct SimMotor {
    node_id: u8,
    erpm: f64,
    cycle: u64,
}

pub struct SimMotorBank {
    transport: CanTransport,
    motors: Vec<SimMotor>,
}

impl SimMotorBank {
    /// `transport` is the simulator's end of a virtual CAN pair.
    pub fn new(transport: CanTransport, motors: impl IntoIterator<Item = SimMotorParams>) -> Self {
        Self {
            transport,
            motors: motors
                .into_iter()
                .map(|p| SimMotor { node_id: p.node_id, erpm: 0.0, cycle: 0 })
                .collect(),
        }
    }

    /// Drain pending command frames, updating per-motor targets.
    pub fn poll_commands(&mut self) -> anyhow::Result<()> {
        while let Some((cob_id, data, _stamp)) = self.transport.try_recv()? {
            let masked = cob_id & CAN_EFF_MASK;
            let node_id = (masked & 0xff) as u8;
            let command = ((masked >> 8) & 0xff) as u8;
            let Some(motor) = self.motors.iter_mut().find(|m| m.node_id == node_id) else {
                continue;
            };
            match command {
                VESC_SET_RPM => {
                    let mut data = &data[..];
                    if data.len() >= 4 {
                        motor.erpm = f64::from(data.get_i32());
                    }
                }
                VESC_SET_CURRENT_BRAKE => motor.erpm = 0.0,
                _ => warn!(node_id, command, "simulated motor ignoring command"),
            }
        }
        Ok(())
    }

    /// Emit one telemetry round: a velocity frame per motor, plus the
    /// full-state frame every few rounds.
    pub fn emit_telemetry(&mut self) -> anyhow::Result<()> {
        for motor in &mut self.motors {
            let status_1 = u32::from(motor.node_id) | (u32::from(VESC_STATUS_MSG_1) << 8);
            self.transport.send(status_1, &encode_status_1(motor.erpm, 0.0, 0.0), CAN_EFF_FLAG)?;
            motor.cycle += 1;
            if motor.cycle % FULL_STATE_EVERY == 0 {
                let status_5 = u32::from(motor.node_id) | (u32::from(VESC_STATUS_MSG_5) << 8);
                self.transport.send(
                    status_5,
                    &encode_status_5(motor.cycle as f64, SIM_INPUT_VOLTAGE),
                    CAN_EFF_FLAG,
                )?;
            }
        }
        Ok(())
    }

    /// Run the bank at `rate_hz` until shutdown.
    pub fn spawn(mut self, rate_hz: f64, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(motors = self.motors.len(), rate_hz, "simulated motor bank running");
            let mut periodic = Periodic::new(Duration::from_secs_f64(1.0 / rate_hz), "sim-motors");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = periodic.tick() => {}
                }
                if let Err(e) = self.poll_commands().and_then(|_| self.emit_telemetry()) {
                    warn!("simulated motor bank stopping: {e}");
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "sim_tests.rs"]
mod tests;
