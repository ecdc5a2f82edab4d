// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Operator steering intent, published at the steering sender's rate under
/// the `steering` event name.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SteeringCommand {
    #[prost(enumeration = "SteeringMode", tag = "1")]
    pub mode: i32,
    /// 1.0 while the operator holds the deadman control, else 0.0.
    #[prost(double, tag = "2")]
    pub deadman: f64,
    /// Brake request in `[0, 1]`; any positive value commands a stop.
    #[prost(double, tag = "3")]
    pub brake: f64,
    /// Forward velocity in m/s.
    #[prost(double, tag = "4")]
    pub velocity: f64,
    /// Angular velocity in rad/s.
    #[prost(double, tag = "5")]
    pub angular_velocity: f64,
}

impl prost::Name for SteeringCommand {
    const NAME: &'static str = "SteeringCommand";
    const PACKAGE: &'static str = "harrow.v1";
}

impl SteeringCommand {
    /// The full-brake, zero-velocity command issued whenever the steering
    /// client refuses to pass operator intent through.
    pub fn hard_stop() -> Self {
        Self {
            mode: SteeringMode::Unspecified as i32,
            deadman: 0.0,
            brake: 1.0,
            velocity: 0.0,
            angular_velocity: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SteeringMode {
    Unspecified = 0,
    JoystickManual = 1,
    JoystickCruiseControl = 2,
    Servo = 3,
}
