// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use prost_types::Timestamp;

use super::NamedSe3Pose;

/// Aggregated control-loop state, published every tick as `tractor_state`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TractorState {
    #[prost(message, optional, tag = "1")]
    pub stamp: Option<Timestamp>,
    /// Measured wheel angular velocities, rad/s.
    #[prost(double, tag = "2")]
    pub wheel_velocity_rads_left: f64,
    #[prost(double, tag = "3")]
    pub wheel_velocity_rads_right: f64,
    /// Commanded wheel angular velocities, rad/s.
    #[prost(double, tag = "4")]
    pub commanded_wheel_velocity_rads_left: f64,
    #[prost(double, tag = "5")]
    pub commanded_wheel_velocity_rads_right: f64,
    /// Commanded brake current, A. Zero unless braking.
    #[prost(double, tag = "6")]
    pub commanded_brake_current: f64,
    /// Target unicycle command.
    #[prost(double, tag = "7")]
    pub target_unicycle_velocity: f64,
    #[prost(double, tag = "8")]
    pub target_unicycle_angular_velocity: f64,
    /// Odometry integration step, clamped to `[0, 1]` s.
    #[prost(double, tag = "9")]
    pub dt: f64,
    /// Cumulative translation distance, m.
    #[prost(double, tag = "10")]
    pub abs_distance_traveled: f64,
    /// `odometry/wheel` to `tractor/base` transform.
    #[prost(message, optional, tag = "11")]
    pub odometry_pose_base: Option<NamedSe3Pose>,
    /// Measured telemetry rates per motor, Hz.
    #[prost(double, tag = "12")]
    pub average_update_rate_left_motor: f64,
    #[prost(double, tag = "13")]
    pub average_update_rate_right_motor: f64,
}

impl prost::Name for TractorState {
    const NAME: &'static str = "TractorState";
    const PACKAGE: &'static str = "harrow.v1";
}
