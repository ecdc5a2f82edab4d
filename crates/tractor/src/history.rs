// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time-ordered ring of odometry poses.
//!
//! Holds the recent pose trajectory so a goal stamped in the past can be
//! composed against the pose the tractor actually had at that time. Lookups
//! return the entry with the largest stamp not exceeding the target.

use std::collections::VecDeque;
use std::time::Duration;

use harrow_bus::stamp;
use prost_types::Timestamp;

use crate::pose::Pose;

pub struct PoseHistory {
    items: VecDeque<(i64, Pose)>,
    window_micros: i64,
}

impl PoseHistory {
    pub fn new(window: Duration) -> Self {
        Self { items: VecDeque::new(), window_micros: window.as_micros() as i64 }
    }

    /// Insert a pose, keeping stamps sorted and trimming entries older than
    /// the window behind the newest stamp.
    pub fn push(&mut self, stamp: &Timestamp, pose: Pose) {
        let t = stamp::to_micros(stamp);
        let idx = self.items.partition_point(|(s, _)| *s <= t);
        self.items.insert(idx, (t, pose));

        if let Some((newest, _)) = self.items.back().copied() {
            while let Some((oldest, _)) = self.items.front() {
                if newest - oldest > self.window_micros {
                    self.items.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Nearest-past lookup: the pose whose stamp is the largest not exceeding
    /// `target`. `None` when the history is empty or every entry is newer.
    pub fn nearest_past(&self, target: &Timestamp) -> Option<(Pose, Timestamp)> {
        let t = stamp::to_micros(target);
        let idx = self.items.partition_point(|(s, _)| *s <= t);
        let (s, pose) = self.items.get(idx.checked_sub(1)?)?;
        Some((*pose, stamp::from_micros(*s)))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
