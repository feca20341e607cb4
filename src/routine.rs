// Scripted drive routines
//
// A routine is a list of commands, each held for a fixed time. The runner
// always finishes with `stop()`, so the motors end de-energized.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DEFAULT_MAX_SPEED;
use crate::messages::DriveCommand;
use crate::motor::{Drive, Gpio, MotorError};

/// Names accepted by [`Routine::builtin`]
pub const BUILTIN_ROUTINES: [&str; 3] = ["forward", "box", "battery-drain"];

const CRUISE_SPEED: i32 = 240;
const FULL_SPEED: i32 = DEFAULT_MAX_SPEED as i32;

#[derive(Debug, thiserror::Error)]
pub enum RoutineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid routine file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown routine '{0}'")]
    Unknown(String),

    #[error("Motor error: {0}")]
    Motor(#[from] MotorError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub command: DriveCommand,
    pub hold_ms: u64,
}

impl Step {
    pub fn new(command: DriveCommand, hold_ms: u64) -> Self {
        Self { command, hold_ms }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Routine {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RoutineError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn builtin(name: &str) -> Result<Self, RoutineError> {
        match name {
            "forward" => Ok(Self::forward_run()),
            "box" => Ok(Self::box_pattern()),
            "battery-drain" => Ok(Self::battery_drain()),
            other => Err(RoutineError::Unknown(other.to_string())),
        }
    }

    /// Straight run at cruise speed for 15 s
    pub fn forward_run() -> Self {
        Self {
            name: "forward".to_string(),
            steps: vec![Step::new(DriveCommand::Forward { speed: CRUISE_SPEED }, 15_000)],
        }
    }

    /// Forward, then two turn-and-advance legs
    pub fn box_pattern() -> Self {
        let advance = Step::new(DriveCommand::Forward { speed: CRUISE_SPEED }, 5_000);
        let turn = Step::new(
            DriveCommand::Right {
                left: CRUISE_SPEED,
                right: CRUISE_SPEED,
            },
            2_000,
        );

        let mut steps = vec![advance.clone()];
        for _ in 0..2 {
            steps.push(turn.clone());
            steps.push(advance.clone());
        }
        Self {
            name: "box".to_string(),
            steps,
        }
    }

    /// Full speed forward and back, 30 s each, with a pause in between
    pub fn battery_drain() -> Self {
        Self {
            name: "battery-drain".to_string(),
            steps: vec![
                Step::new(DriveCommand::Forward { speed: FULL_SPEED }, 30_000),
                Step::new(DriveCommand::Stop, 1_000),
                Step::new(DriveCommand::Backward { speed: FULL_SPEED }, 30_000),
                Step::new(DriveCommand::Stop, 1_000),
            ],
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.steps.iter().map(|s| s.hold_ms).sum())
    }
}

/// Run `routine` `repeat` times, then stop
///
/// `pause` is called after each command with its hold time; pass
/// `std::thread::sleep` to run in real time. If a command fails the runner
/// still tries to stop the motors before returning the error.
pub fn run<G, F>(drive: &mut Drive<G>, routine: &Routine, repeat: u32, mut pause: F) -> Result<(), RoutineError>
where
    G: Gpio,
    F: FnMut(Duration),
{
    info!(
        "Running routine '{}': {} steps x{} ({:?} per pass)",
        routine.name,
        routine.steps.len(),
        repeat,
        routine.duration()
    );

    let result = run_passes(drive, routine, repeat, &mut pause);

    match result {
        Ok(()) => {
            drive.stop()?;
            info!("Routine '{}' finished", routine.name);
            Ok(())
        }
        Err(e) => {
            if let Err(stop_err) = drive.stop() {
                warn!("Failed to stop motors after routine error: {}", stop_err);
            }
            Err(e.into())
        }
    }
}

fn run_passes<G, F>(drive: &mut Drive<G>, routine: &Routine, repeat: u32, pause: &mut F) -> Result<(), MotorError>
where
    G: Gpio,
    F: FnMut(Duration),
{
    for pass in 1..=repeat {
        info!("Routine '{}' pass {}/{}", routine.name, pass, repeat);
        for step in &routine.steps {
            drive.execute(step.command)?;
            pause(Duration::from_millis(step.hold_ms));
        }
    }
    Ok(())
}
