//! Timed maneuvers
//!
//! Scripts built from primitive commands with the delays kept on the caller's
//! side. The dispatcher never sleeps, so anything enqueued by another producer
//! (a stop, say) still goes out between steps.

use crate::domain::command::{Command, MOTOR_NEUTRAL, SERVO_CENTER};
use crate::infrastructure::dispatcher::{DispatchError, DispatcherHandle};
use clap::ValueEnum;
use std::time::Duration;
use tracing::info;

/// Motor offset from neutral for driving
pub const DRIVE_SPEED: u8 = 59;
/// Servo offset from center for a full turn
pub const STEER_ANGLE: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Maneuver {
    Forward,
    Backward,
    Left,
    Right,
}

/// A command and how long to let it run before the next one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub command: Command,
    pub hold: Duration,
}

impl Step {
    fn new(command: Command, hold_ms: u64) -> Self {
        Self {
            command,
            hold: Duration::from_millis(hold_ms),
        }
    }
}

impl Maneuver {
    /// Steps before the closing reset
    pub fn steps(self) -> Vec<Step> {
        let forward = Command::motor2(MOTOR_NEUTRAL + DRIVE_SPEED);
        match self {
            Self::Forward => vec![Step::new(forward, 2000)],
            Self::Backward => vec![Step::new(
                Command::motor2(MOTOR_NEUTRAL - DRIVE_SPEED),
                2000,
            )],
            Self::Left => vec![
                Step::new(Command::servo(SERVO_CENTER + STEER_ANGLE), 1000),
                Step::new(forward, 1000),
            ],
            Self::Right => vec![
                Step::new(Command::servo(SERVO_CENTER - STEER_ANGLE), 1000),
                Step::new(forward, 1000),
            ],
        }
    }

    /// Enqueue each step, wait out its hold, then reset the robot.
    pub async fn perform(self, handle: &DispatcherHandle) -> Result<(), DispatchError> {
        info!("Performing {:?}", self);
        for step in self.steps() {
            handle.enqueue(step.command).await?;
            tokio::time::sleep(step.hold).await;
        }
        handle.enqueue(Command::reset()).await
    }
}
