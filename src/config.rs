// Pin mapping, PWM timing and runtime settings
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::{ChannelPins, DrivePins, MotorError, PwmSettings};

// PWM peripheral base clock on the Raspberry Pi
pub const PWM_BASE_CLOCK_HZ: u32 = 19_200_000;

// Top duty value / PWM range: 19.2 MHz / 2 / 480 = 20 kHz
pub const DEFAULT_MAX_SPEED: u16 = 480;
pub const DEFAULT_PWM_CLOCK_DIVIDER: u32 = 2;

// Pololu dual MC33926 wiring (BCM numbering)
pub const DEFAULT_LEFT_PINS: ChannelPins = ChannelPins {
    pwm_pin: 12,
    direction_pin: 24,
    enable_pin: 22,
};
pub const DEFAULT_RIGHT_PINS: ChannelPins = ChannelPins {
    pwm_pin: 13,
    direction_pin: 25,
    enable_pin: 23,
};

// Teleop loop frequency
pub const LOOP_HZ: u64 = 50;

// Key input timeout for the teleop watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Teleop speed steps (low, medium, high)
pub const TELEOP_SPEEDS: [i32; 3] = [120, 240, 480];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] MotorError),
}

/// Drive configuration, optionally loaded from a JSON file
///
/// Every field is optional in the file; missing ones use the defaults above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub pins: DrivePins,
    pub pwm: PwmSettings,
}

impl DriveConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MotorError> {
        self.pins.validate()?;
        self.pwm.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriveConfig::default();
        assert_eq!(config.pins.left, DEFAULT_LEFT_PINS);
        assert_eq!(config.pins.right, DEFAULT_RIGHT_PINS);
        assert_eq!(config.pwm.max_speed, 480);
        assert_eq!(config.pwm.clock_divider, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = DriveConfig::from_json(
            r#"{ "pins": { "right": { "pwm_pin": 19, "direction_pin": 5, "enable_pin": 6 } } }"#,
        )
        .unwrap();
        assert_eq!(config.pins.left, DEFAULT_LEFT_PINS);
        assert_eq!(config.pins.right.pwm_pin, 19);
        assert_eq!(config.pwm, PwmSettings::default());
    }

    #[test]
    fn test_overlapping_pins_rejected() {
        let result = DriveConfig::from_json(
            r#"{ "pins": { "right": { "pwm_pin": 13, "direction_pin": 24, "enable_pin": 23 } } }"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::Invalid(MotorError::PinConflict { pin: 24 }))
        ));
    }

    #[test]
    fn test_invalid_pwm_settings_rejected() {
        let result = DriveConfig::from_json(r#"{ "pwm": { "max_speed": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = DriveConfig::from_json(r#"{ "pwm": { "clock_divider": 5000 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            DriveConfig::from_json("{ pins: "),
            Err(ConfigError::Json(_))
        ));
    }
}
