// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Runtime configuration for the tractor binary.
#[derive(Debug, Parser)]
pub struct Config {
    /// Service name announced on the event bus.
    #[arg(long, env = "HARROW_SERVICE", default_value = "tractor")]
    pub service: String,

    /// CAN interface name, or "sim" for the built-in motor simulator.
    #[arg(long, env = "HARROW_CAN", default_value = "can0")]
    pub can_interface: String,

    /// Path to a tractor geometry JSON file (see `gen-config`).
    #[arg(long, env = "HARROW_TRACTOR_CONFIG")]
    pub tractor_config: Option<PathBuf>,

    /// Control loop rate in Hz.
    #[arg(long, env = "HARROW_RATE", default_value = "50")]
    pub rate_hz: f64,

    /// Log format (json or text).
    #[arg(long, env = "HARROW_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HARROW_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.rate_hz > 0.0 && self.rate_hz <= 1_000.0,
            "control rate must be in (0, 1000] Hz, got {}",
            self.rate_hz
        );
        anyhow::ensure!(!self.service.is_empty(), "service name must not be empty");
        Ok(())
    }
}

/// Drive topology: which motors exist and receive commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    TwoMotorDiffDrive,
    FourMotorSkidSteer,
}

/// Tractor geometry and motor wiring, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TractorParams {
    /// Wheel radius, m.
    pub wheel_radius: f64,
    /// Wheel baseline, m.
    pub wheel_baseline: f64,
    pub hub_motor_gear_ratio: f64,
    pub hub_motor_pole_pairs: f64,
    pub topology: Topology,
    pub right_motor_node: u8,
    pub left_motor_node: u8,
    pub right_aft_motor_node: u8,
    pub left_aft_motor_node: u8,
}

impl Default for TractorParams {
    fn default() -> Self {
        Self {
            wheel_radius: 0.275_74 / 2.0,
            wheel_baseline: 48.0 * 0.025_4,
            hub_motor_gear_ratio: 29.909_722_222,
            hub_motor_pole_pairs: 8.0,
            topology: Topology::TwoMotorDiffDrive,
            right_motor_node: 7,
            left_motor_node: 9,
            right_aft_motor_node: 8,
            left_aft_motor_node: 10,
        }
    }
}

impl TractorParams {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&contents)?;
        anyhow::ensure!(params.wheel_radius > 0.0, "wheel radius must be positive");
        anyhow::ensure!(params.wheel_baseline > 0.0, "wheel baseline must be positive");
        Ok(params)
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
