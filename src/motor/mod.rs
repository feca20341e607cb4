// Motor control module for the rover's dual MC33926 driver
//
// Provides:
// - GPIO/PWM abstraction with a Raspberry Pi and a simulated backend
// - Single motor channel with speed clamping
// - Differential drive over a left and right channel

mod channel;
mod drive;
pub mod gpio;
#[cfg(feature = "rpi")]
pub mod rpi;

pub use channel::{clamp_speed, Channel, ChannelPins, Direction, PwmSettings};
pub use drive::{Drive, DrivePins};
pub use gpio::{Gpio, GpioError, SimGpio};
#[cfg(feature = "rpi")]
pub use rpi::RppalGpio;

/// Error types for channel and drive operations
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Hardware write failed: {0}")]
    Gpio(#[from] GpioError),

    #[error("Channel on PWM pin {pwm_pin} used before open")]
    NotOpen { pwm_pin: u8 },

    #[error("Pin {pin} assigned more than once")]
    PinConflict { pin: u8 },

    #[error("Invalid PWM settings: {reason}")]
    InvalidSettings { reason: &'static str },
}

pub type Result<T> = std::result::Result<T, MotorError>;
