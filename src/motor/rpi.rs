// Raspberry Pi GPIO backend (rppal)
//
// Digital outputs go through /dev/gpiomem, PWM through the kernel's hardware
// PWM channels (requires the pwm-2chan overlay for BCM 12/13).

use std::collections::HashMap;

use rppal::gpio::{self, OutputPin};
use rppal::pwm::{Channel, Polarity, Pwm};
use tracing::{debug, info};

use super::gpio::{Gpio, GpioError, Level, PinMode, PwmMode, Result};
use crate::config::{DEFAULT_MAX_SPEED, DEFAULT_PWM_CLOCK_DIVIDER, PWM_BASE_CLOCK_HZ};

/// Hardware PWM channel wired to a BCM pin
fn pwm_channel(pin: u8) -> Result<Channel> {
    match pin {
        12 | 18 => Ok(Channel::Pwm0),
        13 | 19 => Ok(Channel::Pwm1),
        _ => Err(GpioError::UnsupportedPwmPin { pin }),
    }
}

impl From<Level> for gpio::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => gpio::Level::Low,
            Level::High => gpio::Level::High,
        }
    }
}

pub struct RppalGpio {
    gpio: gpio::Gpio,
    outputs: HashMap<u8, OutputPin>,
    pwm: HashMap<u8, (Pwm, u32)>, // pin -> (channel, last duty value)
    range: u32,
    divider: u32,
}

impl RppalGpio {
    /// One-time GPIO subsystem initialization
    pub fn new() -> Result<Self> {
        let gpio = gpio::Gpio::new()?;
        info!("GPIO initialized");
        Ok(Self {
            gpio,
            outputs: HashMap::new(),
            pwm: HashMap::new(),
            range: u32::from(DEFAULT_MAX_SPEED),
            divider: DEFAULT_PWM_CLOCK_DIVIDER,
        })
    }

    /// PWM frequency in Hz: base clock / divider / range
    pub fn frequency_hz(&self) -> f64 {
        f64::from(PWM_BASE_CLOCK_HZ) / f64::from(self.divider.max(1)) / f64::from(self.range.max(1))
    }

    fn duty_cycle(&self, value: u32) -> f64 {
        (f64::from(value) / f64::from(self.range.max(1))).min(1.0)
    }

    // Range or clock changed: re-apply the frequency keeping each duty value
    fn reapply(&self) -> Result<()> {
        let frequency = self.frequency_hz();
        for (&pin, (pwm, value)) in &self.pwm {
            debug!("PWM pin {}: {:.1} Hz", pin, frequency);
            pwm.set_frequency(frequency, self.duty_cycle(*value))?;
        }
        Ok(())
    }
}

impl Gpio for RppalGpio {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        match mode {
            PinMode::Output => {
                let mut output = self.gpio.get(pin)?.into_output_low();
                // Outputs keep their last level when the process exits
                output.set_reset_on_drop(false);
                self.outputs.insert(pin, output);
            }
            PinMode::PwmOutput => {
                let channel = pwm_channel(pin)?;
                let pwm = Pwm::with_frequency(channel, self.frequency_hz(), 0.0, Polarity::Normal, true)?;
                self.pwm.insert(pin, (pwm, 0));
            }
        }
        debug!("Pin {} configured as {:?}", pin, mode);
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()> {
        let output = self.outputs.get_mut(&pin).ok_or(GpioError::PinNotConfigured {
            pin,
            expected: PinMode::Output,
        })?;
        output.write(level.into());
        Ok(())
    }

    fn set_pwm_mode(&mut self, mode: PwmMode) -> Result<()> {
        // The kernel PWM driver only generates mark-space output
        match mode {
            PwmMode::MarkSpace => Ok(()),
            PwmMode::Balanced => Err(GpioError::UnsupportedPwmMode(mode)),
        }
    }

    fn set_pwm_range(&mut self, range: u32) -> Result<()> {
        self.range = range;
        self.reapply()
    }

    fn set_pwm_clock(&mut self, divider: u32) -> Result<()> {
        self.divider = divider;
        self.reapply()
    }

    fn pwm_write(&mut self, pin: u8, value: u32) -> Result<()> {
        let duty = self.duty_cycle(value);
        let frequency = self.frequency_hz();
        let (pwm, last) = self.pwm.get_mut(&pin).ok_or(GpioError::PinNotConfigured {
            pin,
            expected: PinMode::PwmOutput,
        })?;
        pwm.set_frequency(frequency, duty)?;
        *last = value;
        Ok(())
    }
}
