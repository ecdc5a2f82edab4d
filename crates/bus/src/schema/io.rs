// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use prost_types::{Any, Timestamp};

/// A name-addressed message on the bus.
///
/// `recv_stamp` is set on ingress and only on ingress: a cached event with no
/// receive stamp was published by this process and never crossed the wire.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    /// Hierarchical event name, e.g. `pose/tractor/base`.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Sender wall stamp, set when the event is made.
    #[prost(message, optional, tag = "2")]
    pub stamp: Option<Timestamp>,
    /// Receiver wall stamp, filled in when the event arrives off the wire.
    #[prost(message, optional, tag = "3")]
    pub recv_stamp: Option<Timestamp>,
    /// Type-tagged opaque payload.
    #[prost(message, optional, tag = "4")]
    pub data: Option<Any>,
}

impl prost::Name for Event {
    const NAME: &'static str = "Event";
    const PACKAGE: &'static str = "harrow.v1";
}

/// A single name-pattern a peer wishes to receive.
///
/// The pattern is an unanchored regular expression; `pose` matches every
/// event name containing `pose`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Subscription {
    #[prost(string, tag = "1")]
    pub name: String,
}

impl prost::Name for Subscription {
    const NAME: &'static str = "Subscription";
    const PACKAGE: &'static str = "harrow.v1";
}

/// A peer's periodic self-description on the discovery multicast group.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Announce {
    #[prost(message, optional, tag = "1")]
    pub stamp: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub recv_stamp: Option<Timestamp>,
    /// Service name, for humans and logs.
    #[prost(string, tag = "3")]
    pub service: String,
    /// Loopback address the peer receives unicast events on.
    #[prost(string, tag = "4")]
    pub host: String,
    /// Unicast receive port.
    #[prost(uint32, tag = "5")]
    pub port: u32,
    /// The peer's current subscription set.
    #[prost(message, repeated, tag = "6")]
    pub subscriptions: Vec<Subscription>,
}

impl prost::Name for Announce {
    const NAME: &'static str = "Announce";
    const PACKAGE: &'static str = "harrow.v1";
}
