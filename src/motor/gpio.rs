// GPIO/PWM hardware abstraction
//
// The motor code only talks to the pins through the `Gpio` trait. Pins are
// identified by their BCM number, the same numbering the rover wiring uses.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

/// Pin configuration modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Output,
    PwmOutput,
}

/// Logic level of a digital output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

/// PWM generator modes (BCM2835 naming)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PwmMode {
    /// Fixed-frequency square wave, duty = value / range
    #[default]
    MarkSpace,
    Balanced,
}

/// Error types for GPIO/PWM access
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[cfg(feature = "rpi")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[cfg(feature = "rpi")]
    #[error("PWM error: {0}")]
    Pwm(#[from] rppal::pwm::Error),

    #[error("Pin {pin} has no hardware PWM channel")]
    UnsupportedPwmPin { pin: u8 },

    #[error("Pin {pin} is not configured as {expected:?}")]
    PinNotConfigured { pin: u8, expected: PinMode },

    #[error("Duty value {value} on pin {pin} exceeds PWM range {range}")]
    DutyOutOfRange { pin: u8, value: u32, range: u32 },

    #[error("Unsupported PWM mode {0:?}")]
    UnsupportedPwmMode(PwmMode),

    #[error("Write to pin {pin} failed")]
    WriteFailed { pin: u8 },
}

pub type Result<T> = std::result::Result<T, GpioError>;

/// Primitives the motor channels need from the GPIO library
pub trait Gpio {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;

    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()>;

    /// PWM mode, range and clock are shared by all PWM outputs
    fn set_pwm_mode(&mut self, mode: PwmMode) -> Result<()>;

    fn set_pwm_range(&mut self, range: u32) -> Result<()>;

    fn set_pwm_clock(&mut self, divider: u32) -> Result<()>;

    fn pwm_write(&mut self, pin: u8, value: u32) -> Result<()>;
}

/// A single call made against a `SimGpio`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioOp {
    PinMode { pin: u8, mode: PinMode },
    DigitalWrite { pin: u8, level: Level },
    PwmMode(PwmMode),
    PwmRange(u32),
    PwmClock(u32),
    PwmWrite { pin: u8, value: u32 },
}

/// In-memory GPIO backend
///
/// Keeps the pin table and an ordered log of every successful call, so the
/// drive can run without hardware (`--simulate`) and tests can check the exact
/// write sequence.
#[derive(Debug, Default)]
pub struct SimGpio {
    modes: BTreeMap<u8, PinMode>,
    levels: BTreeMap<u8, Level>,
    duties: BTreeMap<u8, u32>,
    pwm_mode: Option<PwmMode>,
    pwm_range: Option<u32>,
    pwm_clock: Option<u32>,
    faulty: BTreeSet<u8>,
    ops: Vec<GpioOp>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write to `pin` fail
    pub fn inject_fault(&mut self, pin: u8) {
        self.faulty.insert(pin);
    }

    pub fn clear_faults(&mut self) {
        self.faulty.clear();
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        self.modes.get(&pin).copied()
    }

    pub fn level(&self, pin: u8) -> Option<Level> {
        self.levels.get(&pin).copied()
    }

    pub fn duty(&self, pin: u8) -> Option<u32> {
        self.duties.get(&pin).copied()
    }

    pub fn pwm_mode(&self) -> Option<PwmMode> {
        self.pwm_mode
    }

    pub fn pwm_range(&self) -> Option<u32> {
        self.pwm_range
    }

    pub fn pwm_clock(&self) -> Option<u32> {
        self.pwm_clock
    }

    pub fn ops(&self) -> &[GpioOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    fn check(&self, pin: u8, expected: PinMode) -> Result<()> {
        if self.faulty.contains(&pin) {
            return Err(GpioError::WriteFailed { pin });
        }
        match self.modes.get(&pin) {
            Some(&mode) if mode == expected => Ok(()),
            _ => Err(GpioError::PinNotConfigured { pin, expected }),
        }
    }

    fn record(&mut self, op: GpioOp) {
        debug!("sim gpio: {:?}", op);
        self.ops.push(op);
    }
}

impl Gpio for SimGpio {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        if self.faulty.contains(&pin) {
            return Err(GpioError::WriteFailed { pin });
        }
        self.modes.insert(pin, mode);
        self.record(GpioOp::PinMode { pin, mode });
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()> {
        self.check(pin, PinMode::Output)?;
        self.levels.insert(pin, level);
        self.record(GpioOp::DigitalWrite { pin, level });
        Ok(())
    }

    fn set_pwm_mode(&mut self, mode: PwmMode) -> Result<()> {
        self.pwm_mode = Some(mode);
        self.record(GpioOp::PwmMode(mode));
        Ok(())
    }

    fn set_pwm_range(&mut self, range: u32) -> Result<()> {
        self.pwm_range = Some(range);
        self.record(GpioOp::PwmRange(range));
        Ok(())
    }

    fn set_pwm_clock(&mut self, divider: u32) -> Result<()> {
        self.pwm_clock = Some(divider);
        self.record(GpioOp::PwmClock(divider));
        Ok(())
    }

    fn pwm_write(&mut self, pin: u8, value: u32) -> Result<()> {
        self.check(pin, PinMode::PwmOutput)?;
        if let Some(range) = self.pwm_range {
            if value > range {
                return Err(GpioError::DutyOutOfRange { pin, value, range });
            }
        }
        self.duties.insert(pin, value);
        self.record(GpioOp::PwmWrite { pin, value });
        Ok(())
    }
}
