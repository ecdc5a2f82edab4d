// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rigid transforms on SE(3).
//!
//! Just enough Lie-group machinery for wheel odometry: composition, inverse,
//! the exponential map, and conversions to the wire representation. Rotations
//! are unit quaternions in xyzw ordering to match the proto schema.

use harrow_bus::schema::{Quaternion, Se3Pose, Vec3};

/// Unit quaternion, xyzw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Quaternion for a rotation vector (axis scaled by angle).
    pub fn from_rotation_vector(phi: [f64; 3]) -> Self {
        let theta = norm(phi);
        if theta < 1e-12 {
            // First-order: q ~ [phi/2, 1].
            let q = Self { x: phi[0] * 0.5, y: phi[1] * 0.5, z: phi[2] * 0.5, w: 1.0 };
            return q.normalized();
        }
        let half = theta * 0.5;
        let k = half.sin() / theta;
        Self { x: phi[0] * k, y: phi[1] * k, z: phi[2] * k, w: half.cos() }
    }

    pub fn conjugate(self) -> Self {
        Self { x: -self.x, y: -self.y, z: -self.z, w: self.w }
    }

    pub fn normalized(self) -> Self {
        let n = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if n < 1e-12 {
            return Self::IDENTITY;
        }
        Self { x: self.x / n, y: self.y / n, z: self.z / n, w: self.w / n }
    }

    /// Hamilton product.
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }

    /// Rotate a vector.
    pub fn rotate(self, v: [f64; 3]) -> [f64; 3] {
        let q = [self.x, self.y, self.z];
        let t = scale(cross(q, v), 2.0);
        add(add(v, scale(t, self.w)), cross(q, t))
    }
}

/// Rigid transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rot: Quat,
    pub trans: [f64; 3],
}

impl Pose {
    pub const IDENTITY: Self = Self { rot: Quat::IDENTITY, trans: [0.0; 3] };

    /// `self` then `rhs`: the transform mapping `rhs`-frame coordinates
    /// through `self`.
    pub fn compose(&self, rhs: &Pose) -> Pose {
        Pose {
            rot: self.rot.mul(rhs.rot).normalized(),
            trans: add(self.trans, self.rot.rotate(rhs.trans)),
        }
    }

    pub fn inverse(&self) -> Pose {
        let rot = self.rot.conjugate();
        Pose { rot, trans: scale(rot.rotate(self.trans), -1.0) }
    }

    /// Exponential map of a twist `[rho, phi]` (translation, rotation).
    pub fn exp(xi: [f64; 6]) -> Pose {
        let rho = [xi[0], xi[1], xi[2]];
        let phi = [xi[3], xi[4], xi[5]];
        let theta = norm(phi);
        let rot = Quat::from_rotation_vector(phi);

        // trans = V * rho with V the left Jacobian of SO(3).
        let (a, b) = if theta < 1e-9 {
            (0.5, 1.0 / 6.0)
        } else {
            ((1.0 - theta.cos()) / (theta * theta), (theta - theta.sin()) / (theta * theta * theta))
        };
        let phi_rho = cross(phi, rho);
        let trans = add(rho, add(scale(phi_rho, a), scale(cross(phi, phi_rho), b)));
        Pose { rot, trans }
    }

    /// 2-norm of the translation component.
    pub fn translation_norm(&self) -> f64 {
        norm(self.trans)
    }

    pub fn to_proto(&self) -> Se3Pose {
        Se3Pose {
            position: Some(Vec3 { x: self.trans[0], y: self.trans[1], z: self.trans[2] }),
            rotation: Some(Quaternion {
                x: self.rot.x,
                y: self.rot.y,
                z: self.rot.z,
                w: self.rot.w,
            }),
        }
    }

    /// Decode a wire pose; missing halves default to identity parts.
    pub fn from_proto(proto: &Se3Pose) -> Pose {
        let position = proto.position.unwrap_or(Vec3 { x: 0.0, y: 0.0, z: 0.0 });
        let rotation =
            proto.rotation.unwrap_or(Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 });
        Pose {
            rot: Quat { x: rotation.x, y: rotation.y, z: rotation.z, w: rotation.w }.normalized(),
            trans: [position.x, position.y, position.z],
        }
    }
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn scale(v: [f64; 3], k: f64) -> [f64; 3] {
    [v[0] * k, v[1] * k, v[2] * k]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
#[path = "pose_tests.rs"]
mod tests;
