// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The 50 Hz control loop.
//!
//! Each tick fuses the latest steering intent, the goal servo, and wheel
//! telemetry into motor commands, advances wheel odometry, and publishes the
//! pose and aggregate state back onto the bus. Braking and every failure
//! path collapse to the same hard-stop commands.

use std::time::Duration;

use prost_types::Timestamp;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use harrow_bus::schema::{Event, NamedSe3Pose, SteeringCommand, SteeringMode, TractorState};
use harrow_bus::{make_event_at, stamp, EventBus, Periodic};

use crate::canbus::CanBus;
use crate::config::{Topology, TractorParams};
use crate::goal::GoalController;
use crate::history::PoseHistory;
use crate::kinematics::TractorKinematics;
use crate::motor::{HubMotor, MotorConfig};
use crate::pose::Pose;
use crate::steering::SteeringClient;

/// Goal poses arrive under this name, expressed in the tractor base frame.
pub const GOAL_EVENT: &str = "pose/tractor/base/goal";
/// Odometry output event.
pub const POSE_EVENT: &str = "pose/tractor/base";
/// Aggregate state event.
pub const STATE_EVENT: &str = "tractor_state";

const ODOMETRY_FRAME: &str = "odometry/wheel";
const BASE_FRAME: &str = "tractor/base";

const BRAKE_CURRENT_AMPS: f64 = 10.0;
const MIN_DT: f64 = 0.0;
const MAX_DT: f64 = 1.0;
const HISTORY_WINDOW: Duration = Duration::from_secs(10);

pub struct TractorController {
    bus: EventBus,
    rate_hz: f64,
    kinematics: TractorKinematics,
    steering: SteeringClient,
    servo: GoalController,
    left: HubMotor,
    right: HubMotor,
    left_aft: Option<HubMotor>,
    right_aft: Option<HubMotor>,
    state: TractorState,
    odom_pose: Pose,
    history: PoseHistory,
    last_stamp: Option<Timestamp>,
    n_cycle: u64,
    warned_goal_payload: bool,
}

impl TractorController {
    pub fn new(bus: &EventBus, can: &CanBus, params: &TractorParams, rate_hz: f64) -> Self {
        bus.add_subscriptions([GOAL_EVENT]);
        let steering = SteeringClient::new(bus);

        let motor = |name: &str, node_id: u8| {
            HubMotor::new(
                MotorConfig {
                    name: name.to_owned(),
                    node_id,
                    gear_ratio: params.hub_motor_gear_ratio,
                    pole_pairs: params.hub_motor_pole_pairs,
                    torque_capable: true,
                },
                can,
                bus,
            )
        };
        let left = motor("left_motor", params.left_motor_node);
        let right = motor("right_motor", params.right_motor_node);
        let (left_aft, right_aft) = match params.topology {
            Topology::TwoMotorDiffDrive => (None, None),
            Topology::FourMotorSkidSteer => {
                info!("four motor skid steer topology");
                (
                    Some(motor("left_motor_aft", params.left_aft_motor_node)),
                    Some(motor("right_motor_aft", params.right_aft_motor_node)),
                )
            }
        };

        Self {
            bus: bus.clone(),
            rate_hz,
            kinematics: TractorKinematics::new(params.wheel_radius, params.wheel_baseline),
            steering,
            servo: GoalController::new(rate_hz),
            left,
            right,
            left_aft,
            right_aft,
            state: TractorState::default(),
            odom_pose: Pose::IDENTITY,
            history: PoseHistory::new(HISTORY_WINDOW),
            last_stamp: None,
            n_cycle: 0,
            warned_goal_payload: false,
        }
    }

    /// Drive the loop until shutdown: periodic ticks plus goal ingestion.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut timer = Periodic::new(Duration::from_secs_f64(1.0 / self.rate_hz), "control-loop");
        let mut events = self.bus.event_queue();
        info!(rate_hz = self.rate_hz, "control loop running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                n_periods = timer.tick() => self.step(&stamp::now(), n_periods),
                event = events.recv() => match event {
                    Some(event) => self.on_event(&event),
                    None => break,
                },
            }
        }
    }

    /// One control tick at wall time `now`.
    pub fn step(&mut self, now: &Timestamp, n_periods: u64) {
        let command = self.steering.get_steering_command();
        self.step_with_command(now, n_periods, command);
    }

    fn step_with_command(&mut self, now: &Timestamp, n_periods: u64, command: SteeringCommand) {
        let log_every = ((5.0 * self.rate_hz) as u64).max(1);
        if self.n_cycle % log_every == 0 {
            debug!(
                left = ?self.left.state(),
                right = ?self.right.state(),
                state = ?self.state,
                "control loop state"
            );
        }
        self.n_cycle += 1;

        self.state.stamp = Some(now.clone());
        self.state.wheel_velocity_rads_left = self.left.velocity_rads();
        self.state.wheel_velocity_rads_right = self.right.velocity_rads();
        self.state.average_update_rate_left_motor = self.left.average_update_rate();
        self.state.average_update_rate_right_motor = self.right.average_update_rate();

        if let Some(prev) = self.last_stamp.take() {
            let dt = stamp::seconds_between(&prev, now);
            if !(MIN_DT..=MAX_DT).contains(&dt) {
                warn!(n_periods, dt, "odometry time delta out of bounds, clamping");
            }
            self.state.dt = dt.clamp(MIN_DT, MAX_DT);

            let delta = self.kinematics.pose_delta(
                self.state.wheel_velocity_rads_left,
                self.state.wheel_velocity_rads_right,
                self.state.dt,
            );
            self.odom_pose = self.odom_pose.compose(&delta);
            self.history.push(now, self.odom_pose);
            self.state.abs_distance_traveled += delta.translation_norm();

            let named = NamedSe3Pose {
                frame_a: ODOMETRY_FRAME.to_owned(),
                frame_b: BASE_FRAME.to_owned(),
                a_pose_b: Some(self.odom_pose.to_proto()),
            };
            self.state.odometry_pose_base = Some(named.clone());
            self.bus.send(make_event_at(POSE_EVENT, &named, now.clone()));
        }
        self.last_stamp = Some(now.clone());

        if command.brake > 0.0 {
            self.command_brake();
        } else {
            match command.mode() {
                SteeringMode::Servo => {
                    let bound = command.velocity.max(0.0);
                    let (v, w) = self.servo.update(&self.odom_pose, bound);
                    self.command_velocity(v, w);
                }
                SteeringMode::JoystickManual | SteeringMode::JoystickCruiseControl => {
                    self.command_velocity(command.velocity, command.angular_velocity);
                }
                // Anything unrecognized degrades to a hard stop.
                SteeringMode::Unspecified => self.command_brake(),
            }
        }

        self.bus.send(make_event_at(STATE_EVENT, &self.state, now.clone()));
    }

    /// Ingest bus events; only goal poses are interesting here.
    pub fn on_event(&mut self, event: &Event) {
        if event.name != GOAL_EVENT {
            return;
        }
        let Some(send_stamp) = &event.stamp else {
            warn!("goal event carries no stamp, dropping");
            return;
        };
        let goal = match event.data.as_ref().map(|any| any.to_msg::<NamedSe3Pose>()) {
            Some(Ok(goal)) => goal,
            _ => {
                if !self.warned_goal_payload {
                    self.warned_goal_payload = true;
                    warn!("goal event payload is not a NamedSE3Pose, dropping");
                }
                return;
            }
        };
        if goal.frame_a != BASE_FRAME {
            warn!(frame_a = %goal.frame_a, "goal not in the tractor base frame, dropping");
            return;
        }
        let Some((odom_pose_at, _)) = self.history.nearest_past(send_stamp) else {
            warn!("no odometry history covering the goal stamp, dropping goal");
            return;
        };
        let base_pose_goal = Pose::from_proto(&goal.a_pose_b.unwrap_or_default());
        self.servo.set_goal(odom_pose_at.compose(&base_pose_goal));
    }

    /// Current integrated odometry pose.
    pub fn odometry_pose(&self) -> &Pose {
        &self.odom_pose
    }

    pub fn tractor_state(&self) -> &TractorState {
        &self.state
    }

    fn motors(&self) -> impl Iterator<Item = &HubMotor> {
        [Some(&self.left), Some(&self.right), self.left_aft.as_ref(), self.right_aft.as_ref()]
            .into_iter()
            .flatten()
    }

    fn command_velocity(&mut self, v: f64, w: f64) {
        self.state.target_unicycle_velocity = v;
        self.state.target_unicycle_angular_velocity = w;
        let (left, right) = self.kinematics.unicycle_to_wheel(v, w);
        self.state.commanded_brake_current = 0.0;
        self.state.commanded_wheel_velocity_rads_left = left;
        self.state.commanded_wheel_velocity_rads_right = right;

        let lefts = [Some(&self.left), self.left_aft.as_ref()];
        let rights = [Some(&self.right), self.right_aft.as_ref()];
        for (motor, target) in lefts
            .into_iter()
            .flatten()
            .map(|m| (m, left))
            .chain(rights.into_iter().flatten().map(|m| (m, right)))
        {
            if let Err(e) = motor.send_velocity_rads(target) {
                warn!(motor = motor.name(), "velocity command failed: {e}");
            }
        }
    }

    fn command_brake(&mut self) {
        self.state.commanded_brake_current = BRAKE_CURRENT_AMPS;
        self.state.commanded_wheel_velocity_rads_left = 0.0;
        self.state.commanded_wheel_velocity_rads_right = 0.0;
        self.state.target_unicycle_velocity = 0.0;
        self.state.target_unicycle_angular_velocity = 0.0;

        for motor in self.motors() {
            let result = if motor.torque_capable() {
                motor.send_brake_current(BRAKE_CURRENT_AMPS)
            } else {
                motor.send_velocity_rads(0.0)
            };
            if let Err(e) = result {
                warn!(motor = motor.name(), "brake command failed: {e}");
            }
        }
        self.servo.reset();
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
