// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use prost_types::Timestamp;

/// Telemetry aggregated from a motor controller's periodic status frames.
///
/// Fields are optional because each status frame carries only a slice of the
/// full state; the motor merges frames as they arrive. `rpm` is the electrical
/// rpm as reported by the controller.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MotorControllerState {
    #[prost(message, optional, tag = "1")]
    pub stamp: Option<Timestamp>,
    #[prost(double, optional, tag = "2")]
    pub rpm: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub current: Option<f64>,
    #[prost(double, optional, tag = "4")]
    pub duty_cycle: Option<f64>,
    #[prost(double, optional, tag = "5")]
    pub amp_hours: Option<f64>,
    #[prost(double, optional, tag = "6")]
    pub amp_hours_charged: Option<f64>,
    #[prost(double, optional, tag = "7")]
    pub watt_hours: Option<f64>,
    #[prost(double, optional, tag = "8")]
    pub watt_hours_charged: Option<f64>,
    #[prost(double, optional, tag = "9")]
    pub temp_fet: Option<f64>,
    #[prost(double, optional, tag = "10")]
    pub temp_motor: Option<f64>,
    #[prost(double, optional, tag = "11")]
    pub current_in: Option<f64>,
    #[prost(double, optional, tag = "12")]
    pub pid_pos: Option<f64>,
    #[prost(double, optional, tag = "13")]
    pub tachometer: Option<f64>,
    #[prost(double, optional, tag = "14")]
    pub input_voltage: Option<f64>,
}

impl prost::Name for MotorControllerState {
    const NAME: &'static str = "MotorControllerState";
    const PACKAGE: &'static str = "harrow.v1";
}

impl MotorControllerState {
    /// Overlay every populated field of `other` onto this state.
    pub fn merge_from(&mut self, other: &Self) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field.clone();
                }
            };
        }
        take!(stamp);
        take!(rpm);
        take!(current);
        take!(duty_cycle);
        take!(amp_hours);
        take!(amp_hours_charged);
        take!(watt_hours);
        take!(watt_hours_charged);
        take!(temp_fet);
        take!(temp_motor);
        take!(current_in);
        take!(pid_pos);
        take!(tachometer);
        take!(input_voltage);
    }
}
