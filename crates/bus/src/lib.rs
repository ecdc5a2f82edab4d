// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harrow event bus: process-local peer discovery over loopback multicast,
//! addressed unicast event delivery, and the monotonic periodic timer that
//! drives the real-time control loops built on top of it.

pub mod bus;
pub mod discovery;
pub mod periodic;
pub mod schema;
pub mod stamp;

pub use bus::{make_event, make_event_at, BusConfig, EventBus};
pub use periodic::Periodic;
