// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format messages for the harrow bus and the tractor control core.
//!
//! These are hand-derived `prost` messages rather than protoc output; the
//! field tags are the wire contract. Every message carries a `prost::Name`
//! impl so it can ride inside an event payload as a type-tagged `Any`.

mod geometry;
mod io;
mod motor;
mod steering;
mod tractor;

pub use geometry::{NamedSe3Pose, Quaternion, Se3Pose, Vec3};
pub use io::{Announce, Event, Subscription};
pub use motor::MotorControllerState;
pub use steering::{SteeringCommand, SteeringMode};
pub use tractor::TractorState;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
