// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Vec3 {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

impl prost::Name for Vec3 {
    const NAME: &'static str = "Vec3";
    const PACKAGE: &'static str = "harrow.v1";
}

/// Unit quaternion in xyzw ordering.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Quaternion {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
    #[prost(double, tag = "4")]
    pub w: f64,
}

impl prost::Name for Quaternion {
    const NAME: &'static str = "Quaternion";
    const PACKAGE: &'static str = "harrow.v1";
}

/// Rigid transform on SE(3).
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Se3Pose {
    #[prost(message, optional, tag = "1")]
    pub position: Option<Vec3>,
    #[prost(message, optional, tag = "2")]
    pub rotation: Option<Quaternion>,
}

impl prost::Name for Se3Pose {
    const NAME: &'static str = "SE3Pose";
    const PACKAGE: &'static str = "harrow.v1";
}

/// A transform between two named frames: `a_pose_b` maps frame `b`
/// coordinates into frame `a`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct NamedSe3Pose {
    #[prost(string, tag = "1")]
    pub frame_a: String,
    #[prost(string, tag = "2")]
    pub frame_b: String,
    #[prost(message, optional, tag = "3")]
    pub a_pose_b: Option<Se3Pose>,
}

impl prost::Name for NamedSe3Pose {
    const NAME: &'static str = "NamedSE3Pose";
    const PACKAGE: &'static str = "harrow.v1";
}
