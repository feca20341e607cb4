// Differential-drive controller for a two-motor rover on a Raspberry Pi
//
// Modules:
// - motor: GPIO abstraction, motor channels and the differential drive
// - messages: drive commands and state snapshots
// - routine: scripted, timed drive sequences
// - runtime: keyboard teleop loop with watchdog
// - config: pin mapping, PWM timing and runtime settings

pub mod config;
pub mod messages;
pub mod motor;
pub mod routine;
pub mod runtime;
