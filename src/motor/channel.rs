// One H-bridge channel: PWM speed output, direction line, enable line

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::gpio::{Gpio, Level, PinMode, PwmMode};
use super::{MotorError, Result};
use crate::config::{DEFAULT_MAX_SPEED, DEFAULT_PWM_CLOCK_DIVIDER, PWM_BASE_CLOCK_HZ};

// BCM2835 PWM clock divider is 12 bits wide
const MAX_CLOCK_DIVIDER: u32 = 4095;

/// Rotation direction as seen by the motor driver's DIR input
///
/// Forward drives the direction line low, Backward drives it high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn level(self) -> Level {
        match self {
            Direction::Forward => Level::Low,
            Direction::Backward => Level::High,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Accepts `forward`/`f`/`0` and `backward`/`b`/`1`
impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" | "f" | "0" => Ok(Direction::Forward),
            "backward" | "b" | "1" => Ok(Direction::Backward),
            other => Err(format!("invalid direction '{}'", other)),
        }
    }
}

/// The three pins wired to one motor driver channel (BCM numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPins {
    pub pwm_pin: u8,
    pub direction_pin: u8,
    pub enable_pin: u8,
}

impl ChannelPins {
    pub fn as_array(&self) -> [u8; 3] {
        [self.pwm_pin, self.direction_pin, self.enable_pin]
    }
}

/// PWM timing shared by both channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmSettings {
    /// Largest duty value, also used as the PWM range
    pub max_speed: u16,
    pub clock_divider: u32,
}

impl Default for PwmSettings {
    fn default() -> Self {
        Self {
            max_speed: DEFAULT_MAX_SPEED,
            clock_divider: DEFAULT_PWM_CLOCK_DIVIDER,
        }
    }
}

impl PwmSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_speed == 0 {
            return Err(MotorError::InvalidSettings {
                reason: "max_speed must be positive",
            });
        }
        if !(1..=MAX_CLOCK_DIVIDER).contains(&self.clock_divider) {
            return Err(MotorError::InvalidSettings {
                reason: "clock_divider must be within 1..=4095",
            });
        }
        Ok(())
    }

    pub fn frequency_hz(&self) -> f64 {
        f64::from(PWM_BASE_CLOCK_HZ) / f64::from(self.clock_divider) / f64::from(self.max_speed)
    }
}

/// Clamp a signed speed request to a duty magnitude in `[0, max_speed]`
///
/// The sign is dropped; anything beyond `max_speed` in either direction
/// saturates.
pub fn clamp_speed(requested: i32, max_speed: u16) -> u16 {
    let magnitude = i64::from(requested).abs();
    magnitude.min(i64::from(max_speed)) as u16
}

/// A single PWM-driven motor channel
///
/// `new` only records the pins; `open` configures the hardware. Speed,
/// direction and enabled state are the last values commanded through this
/// channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pins: ChannelPins,
    settings: PwmSettings,
    speed: u16,
    direction: Direction,
    enabled: bool,
    open: bool,
}

impl Channel {
    pub fn new(pins: ChannelPins, settings: PwmSettings) -> Self {
        Self {
            pins,
            settings,
            speed: 0,
            direction: Direction::Forward,
            enabled: false,
            open: false,
        }
    }

    /// Configure the PWM output (mode, range, clock) and both digital outputs
    pub fn open<G: Gpio>(&mut self, gpio: &mut G) -> Result<()> {
        debug!(
            "Opening channel pwm={} dir={} en={} ({:.0} Hz)",
            self.pins.pwm_pin,
            self.pins.direction_pin,
            self.pins.enable_pin,
            self.settings.frequency_hz()
        );
        gpio.set_pin_mode(self.pins.pwm_pin, PinMode::PwmOutput)?;
        gpio.set_pwm_mode(PwmMode::MarkSpace)?;
        gpio.set_pwm_range(u32::from(self.settings.max_speed))?;
        gpio.set_pwm_clock(self.settings.clock_divider)?;

        gpio.set_pin_mode(self.pins.direction_pin, PinMode::Output)?;
        gpio.set_pin_mode(self.pins.enable_pin, PinMode::Output)?;

        self.open = true;
        Ok(())
    }

    /// Energize the driver output stage, returns the new enabled flag
    pub fn enable<G: Gpio>(&mut self, gpio: &mut G) -> Result<bool> {
        self.ensure_open()?;
        gpio.digital_write(self.pins.enable_pin, Level::High)?;
        self.enabled = true;
        Ok(self.enabled)
    }

    /// De-energize the driver output stage, returns the new enabled flag
    pub fn disable<G: Gpio>(&mut self, gpio: &mut G) -> Result<bool> {
        self.ensure_open()?;
        gpio.digital_write(self.pins.enable_pin, Level::Low)?;
        self.enabled = false;
        Ok(self.enabled)
    }

    /// Write direction and duty, returns the applied magnitude
    ///
    /// The sign of `requested` only affects the magnitude: the direction line
    /// always follows `direction`, so `(-100, Forward)` runs forward at 100.
    pub fn set_speed<G: Gpio>(&mut self, gpio: &mut G, requested: i32, direction: Direction) -> Result<u16> {
        self.ensure_open()?;
        self.direction = direction;
        self.speed = clamp_speed(requested, self.settings.max_speed);

        debug!(
            "Channel {}: requested {} -> {} {}",
            self.pins.pwm_pin, requested, self.speed, self.direction
        );
        gpio.digital_write(self.pins.direction_pin, self.direction.level())?;
        gpio.pwm_write(self.pins.pwm_pin, u32::from(self.speed))?;

        Ok(self.speed)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn speed(&self) -> u16 {
        self.speed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn pins(&self) -> ChannelPins {
        self.pins
    }

    pub fn max_speed(&self) -> u16 {
        self.settings.max_speed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(MotorError::NotOpen {
                pwm_pin: self.pins.pwm_pin,
            })
        }
    }
}
