// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VESC-style hub motor over the CAN endpoint.
//!
//! The controller streams five periodic status frames; the motor merges them
//! into one telemetry state and publishes `<name>/state` on the bus when the
//! final frame of a cycle lands. Command frames (velocity, brake current) go
//! out with the node id in the low byte and the command id in the next byte,
//! extended-frame addressing.

use std::f64::consts::PI;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use parking_lot::Mutex;
use prost_types::Timestamp;
use tokio::time::Instant;
use tracing::warn;

use harrow_bus::schema::MotorControllerState;
use harrow_bus::{make_event_at, EventBus};

use crate::canbus::{CanBus, CAN_EFF_FLAG};

pub(crate) const VESC_SET_CURRENT_BRAKE: u8 = 2;
pub(crate) const VESC_SET_RPM: u8 = 3;
pub(crate) const VESC_STATUS_MSG_1: u8 = 9;
pub(crate) const VESC_STATUS_MSG_2: u8 = 14;
pub(crate) const VESC_STATUS_MSG_3: u8 = 15;
pub(crate) const VESC_STATUS_MSG_4: u8 = 16;
pub(crate) const VESC_STATUS_MSG_5: u8 = 27;

/// Smoothing factor for the telemetry-rate estimate.
const RATE_ALPHA: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct MotorConfig {
    pub name: String,
    pub node_id: u8,
    pub gear_ratio: f64,
    pub pole_pairs: f64,
    /// Torque-capable controllers accept brake-current commands; the rest
    /// get zero-velocity on brake.
    pub torque_capable: bool,
}

#[derive(Default)]
struct Telemetry {
    state: MotorControllerState,
    /// Smoothed seconds between velocity status frames.
    update_interval: Option<f64>,
    last_arrival: Option<Instant>,
}

struct MotorInner {
    config: MotorConfig,
    bus: EventBus,
    telemetry: Mutex<Telemetry>,
}

/// Handle to one hub motor. Telemetry state is owned here and read-only for
/// everyone else.
///
/// The CAN handle lives outside the shared inner so the endpoint's reader
/// list never points back at itself.
#[derive(Clone)]
pub struct HubMotor {
    inner: Arc<MotorInner>,
    can: CanBus,
}

impl HubMotor {
    /// Build the motor and register its frame handler on the CAN endpoint.
    pub fn new(config: MotorConfig, can: &CanBus, bus: &EventBus) -> Self {
        let inner = Arc::new(MotorInner {
            config,
            bus: bus.clone(),
            telemetry: Mutex::new(Telemetry::default()),
        });
        let handler = Arc::clone(&inner);
        can.add_reader(move |cob_id, data, recv_stamp| {
            handler.handle_frame(cob_id, data, recv_stamp);
        });
        Self { inner, can: can.clone() }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn torque_capable(&self) -> bool {
        self.inner.config.torque_capable
    }

    /// Latest merged telemetry.
    pub fn state(&self) -> MotorControllerState {
        self.inner.telemetry.lock().state.clone()
    }

    /// Measured wheel angular velocity, rad/s, derived from the reported
    /// electrical rpm.
    pub fn velocity_rads(&self) -> f64 {
        let erpm = self.inner.telemetry.lock().state.rpm.unwrap_or(0.0);
        let config = &self.inner.config;
        erpm / (config.pole_pairs * config.gear_ratio) * (2.0 * PI / 60.0)
    }

    /// Smoothed telemetry rate in Hz; zero until two frames have arrived.
    pub fn average_update_rate(&self) -> f64 {
        match self.inner.telemetry.lock().update_interval {
            Some(interval) if interval > 0.0 => 1.0 / interval,
            _ => 0.0,
        }
    }

    /// Command a wheel angular velocity, rad/s.
    pub fn send_velocity_rads(&self, velocity_rads: f64) -> anyhow::Result<()> {
        let rpm = velocity_rads * 60.0 / (2.0 * PI);
        let config = &self.inner.config;
        let erpm = rpm * config.pole_pairs * config.gear_ratio;
        self.send_command(VESC_SET_RPM, &(erpm as i32).to_be_bytes())
    }

    /// Command a brake current, clamped to `[0, 20]` A.
    pub fn send_brake_current(&self, current_amps: f64) -> anyhow::Result<()> {
        let max_current = 20.0;
        let milliamps = (1_000.0 * current_amps.clamp(0.0, max_current)) as i32;
        self.send_command(VESC_SET_CURRENT_BRAKE, &milliamps.to_be_bytes())
    }

    fn send_command(&self, command: u8, data: &[u8]) -> anyhow::Result<()> {
        let cob_id = u32::from(self.inner.config.node_id) | (u32::from(command) << 8);
        self.can.send(cob_id, data, CAN_EFF_FLAG)
    }
}

impl MotorInner {
    fn handle_frame(&self, cob_id: u32, data: &[u8], recv_stamp: &Timestamp) {
        if (cob_id & 0xff) as u8 != self.config.node_id {
            return;
        }
        let command = ((cob_id >> 8) & 0xff) as u8;
        let Some(update) = parse_status(command, data) else {
            warn!(
                motor = %self.config.name,
                command,
                "no parser for motor status frame"
            );
            return;
        };

        let snapshot = {
            let mut telemetry = self.telemetry.lock();
            telemetry.state.merge_from(&update);
            telemetry.state.stamp = Some(recv_stamp.clone());

            if command == VESC_STATUS_MSG_1 {
                let now = Instant::now();
                if let Some(prev) = telemetry.last_arrival {
                    let interval = (now - prev).as_secs_f64();
                    telemetry.update_interval = Some(match telemetry.update_interval {
                        Some(avg) => avg + RATE_ALPHA * (interval - avg),
                        None => interval,
                    });
                }
                telemetry.last_arrival = Some(now);
            }

            // Complete state once the final status frame of a cycle lands.
            (command == VESC_STATUS_MSG_5).then(|| telemetry.state.clone())
        };
        if let Some(state) = snapshot {
            let name = format!("{}/state", self.config.name);
            self.bus.send(make_event_at(&name, &state, recv_stamp.clone()));
        }
    }
}

// -- Status frame codecs -------------------------------------------------------

fn parse_status(command: u8, data: &[u8]) -> Option<MotorControllerState> {
    match command {
        VESC_STATUS_MSG_1 => parse_status_1(data),
        VESC_STATUS_MSG_2 => parse_status_2(data),
        VESC_STATUS_MSG_3 => parse_status_3(data),
        VESC_STATUS_MSG_4 => parse_status_4(data),
        VESC_STATUS_MSG_5 => parse_status_5(data),
        _ => None,
    }
}

fn parse_status_1(mut data: &[u8]) -> Option<MotorControllerState> {
    if data.len() < 8 {
        return None;
    }
    Some(MotorControllerState {
        rpm: Some(f64::from(data.get_i32())),
        current: Some(f64::from(data.get_i16()) / 1e1),
        duty_cycle: Some(f64::from(data.get_i16()) / 1e3),
        ..Default::default()
    })
}

fn parse_status_2(mut data: &[u8]) -> Option<MotorControllerState> {
    if data.len() < 8 {
        return None;
    }
    Some(MotorControllerState {
        amp_hours: Some(f64::from(data.get_i32()) / 1e4),
        amp_hours_charged: Some(f64::from(data.get_i32()) / 1e4),
        ..Default::default()
    })
}

fn parse_status_3(mut data: &[u8]) -> Option<MotorControllerState> {
    if data.len() < 8 {
        return None;
    }
    Some(MotorControllerState {
        watt_hours: Some(f64::from(data.get_i32()) / 1e4),
        watt_hours_charged: Some(f64::from(data.get_i32()) / 1e4),
        ..Default::default()
    })
}

fn parse_status_4(mut data: &[u8]) -> Option<MotorControllerState> {
    if data.len() < 8 {
        return None;
    }
    Some(MotorControllerState {
        temp_fet: Some(f64::from(data.get_i16()) / 1e1),
        temp_motor: Some(f64::from(data.get_i16()) / 1e1),
        current_in: Some(f64::from(data.get_i16()) / 1e1),
        pid_pos: Some(f64::from(data.get_i16()) / 50.0),
        ..Default::default()
    })
}

fn parse_status_5(mut data: &[u8]) -> Option<MotorControllerState> {
    if data.len() < 8 {
        return None;
    }
    Some(MotorControllerState {
        tachometer: Some(f64::from(data.get_i32())),
        input_voltage: Some(f64::from(data.get_i16()) / 1e1),
        ..Default::default()
    })
}

/// Encode a velocity status frame: erpm, current, duty cycle.
pub(crate) fn encode_status_1(erpm: f64, current: f64, duty_cycle: f64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    {
        let mut cursor = &mut buf[..];
        cursor.put_i32(erpm as i32);
        cursor.put_i16((current * 1e1) as i16);
        cursor.put_i16((duty_cycle * 1e3) as i16);
    }
    buf
}

/// Encode the end-of-cycle status frame: tachometer, input voltage.
pub(crate) fn encode_status_5(tachometer: f64, input_voltage: f64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    {
        let mut cursor = &mut buf[..];
        cursor.put_i32(tachometer as i32);
        cursor.put_i16((input_voltage * 1e1) as i16);
        cursor.put_i16(0);
    }
    buf
}

#[cfg(test)]
#[path = "motor_tests.rs"]
mod tests;
