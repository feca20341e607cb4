// Differential drive over a left and right channel
//
// Every movement runs the same bracket: disable both channels, write the new
// speed/direction to both, enable both. `stop` leaves them disabled.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::channel::{Channel, ChannelPins, Direction, PwmSettings};
use super::gpio::Gpio;
use super::{MotorError, Result};
use crate::config::{DEFAULT_LEFT_PINS, DEFAULT_RIGHT_PINS};
use crate::messages::{ChannelState, DriveCommand, DriveState};

/// Pin triples for both sides of the rover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivePins {
    pub left: ChannelPins,
    pub right: ChannelPins,
}

impl Default for DrivePins {
    fn default() -> Self {
        Self {
            left: DEFAULT_LEFT_PINS,
            right: DEFAULT_RIGHT_PINS,
        }
    }
}

impl DrivePins {
    /// All six pins must be distinct
    pub fn validate(&self) -> Result<()> {
        let pins: Vec<u8> = self
            .left
            .as_array()
            .into_iter()
            .chain(self.right.as_array())
            .collect();
        for (i, pin) in pins.iter().enumerate() {
            if pins[..i].contains(pin) {
                return Err(MotorError::PinConflict { pin: *pin });
            }
        }
        Ok(())
    }
}

/// Two-motor differential drive
///
/// Owns the GPIO backend and both channels. Call [`Drive::initialize`] (or
/// construct through [`Drive::open`]) before issuing movement commands.
pub struct Drive<G: Gpio> {
    gpio: G,
    left: Channel,
    right: Channel,
}

impl<G: Gpio> Drive<G> {
    /// Create a drive without touching the hardware
    pub fn new(gpio: G, pins: DrivePins, settings: PwmSettings) -> Result<Self> {
        pins.validate()?;
        settings.validate()?;
        Ok(Self {
            gpio,
            left: Channel::new(pins.left, settings),
            right: Channel::new(pins.right, settings),
        })
    }

    /// Create and initialize in one step
    pub fn open(gpio: G, pins: DrivePins, settings: PwmSettings) -> Result<Self> {
        let mut drive = Self::new(gpio, pins, settings)?;
        drive.initialize()?;
        Ok(drive)
    }

    /// Configure the pins of both channels
    pub fn initialize(&mut self) -> Result<()> {
        info!(
            "Initializing drive: left {:?}, right {:?}",
            self.left.pins(),
            self.right.pins()
        );
        self.left.open(&mut self.gpio)?;
        self.right.open(&mut self.gpio)?;
        info!("Drive initialized (max speed {})", self.left.max_speed());
        Ok(())
    }

    pub fn forward(&mut self, speed: i32) -> Result<()> {
        debug!("forward({})", speed);
        self.command((speed, Direction::Forward), (speed, Direction::Forward))
    }

    pub fn backward(&mut self, speed: i32) -> Result<()> {
        debug!("backward({})", speed);
        self.command((speed, Direction::Backward), (speed, Direction::Backward))
    }

    /// Turn left: left wheel reverses, right wheel advances
    pub fn left(&mut self, speed_left: i32, speed_right: i32) -> Result<()> {
        debug!("left({}, {})", speed_left, speed_right);
        self.command((speed_left, Direction::Backward), (speed_right, Direction::Forward))
    }

    /// Turn right: left wheel advances, right wheel reverses
    pub fn right(&mut self, speed_left: i32, speed_right: i32) -> Result<()> {
        debug!("right({}, {})", speed_left, speed_right);
        self.command((speed_left, Direction::Forward), (speed_right, Direction::Backward))
    }

    /// Independent speed and direction per side
    pub fn set_speeds(
        &mut self,
        speed_left: i32,
        direction_left: Direction,
        speed_right: i32,
        direction_right: Direction,
    ) -> Result<()> {
        debug!(
            "set_speeds({} {}, {} {})",
            speed_left, direction_left, speed_right, direction_right
        );
        self.command((speed_left, direction_left), (speed_right, direction_right))
    }

    /// Disable both channels and zero their speed
    ///
    /// Unlike the movement commands this does not re-enable the channels.
    pub fn stop(&mut self) -> Result<()> {
        debug!("stop()");
        self.disable()?;
        self.left.set_speed(&mut self.gpio, 0, Direction::Forward)?;
        self.right.set_speed(&mut self.gpio, 0, Direction::Forward)?;
        Ok(())
    }

    pub fn enable(&mut self) -> Result<()> {
        self.left.enable(&mut self.gpio)?;
        self.right.enable(&mut self.gpio)?;
        Ok(())
    }

    pub fn disable(&mut self) -> Result<()> {
        self.left.disable(&mut self.gpio)?;
        self.right.disable(&mut self.gpio)?;
        Ok(())
    }

    pub fn execute(&mut self, command: DriveCommand) -> Result<()> {
        match command {
            DriveCommand::Forward { speed } => self.forward(speed),
            DriveCommand::Backward { speed } => self.backward(speed),
            DriveCommand::Left { left, right } => self.left(left, right),
            DriveCommand::Right { left, right } => self.right(left, right),
            DriveCommand::Speeds {
                left,
                left_direction,
                right,
                right_direction,
            } => self.set_speeds(left, left_direction, right, right_direction),
            DriveCommand::Enable => self.enable(),
            DriveCommand::Disable => self.disable(),
            DriveCommand::Stop => self.stop(),
        }
    }

    pub fn left_channel(&self) -> &Channel {
        &self.left
    }

    pub fn right_channel(&self) -> &Channel {
        &self.right
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }

    pub fn state(&self) -> DriveState {
        DriveState {
            left: ChannelState::from(&self.left),
            right: ChannelState::from(&self.right),
        }
    }

    fn command(&mut self, left: (i32, Direction), right: (i32, Direction)) -> Result<()> {
        self.disable()?;
        self.left.set_speed(&mut self.gpio, left.0, left.1)?;
        self.right.set_speed(&mut self.gpio, right.0, right.1)?;
        self.enable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::gpio::{GpioError, GpioOp, Level, SimGpio};

    fn sim_drive() -> Drive<SimGpio> {
        Drive::open(SimGpio::new(), DrivePins::default(), PwmSettings::default()).unwrap()
    }

    fn assert_channel(channel: &Channel, speed: u16, direction: Direction, enabled: bool) {
        assert_eq!(channel.speed(), speed, "speed of {:?}", channel.pins());
        assert_eq!(channel.direction(), direction, "direction of {:?}", channel.pins());
        assert_eq!(channel.is_enabled(), enabled, "enabled of {:?}", channel.pins());
    }

    #[test]
    fn test_forward() {
        let mut drive = sim_drive();
        drive.forward(200).unwrap();
        assert_channel(drive.left_channel(), 200, Direction::Forward, true);
        assert_channel(drive.right_channel(), 200, Direction::Forward, true);

        let gpio = drive.gpio();
        assert_eq!(gpio.duty(12), Some(200));
        assert_eq!(gpio.duty(13), Some(200));
        assert_eq!(gpio.level(24), Some(Level::Low));
        assert_eq!(gpio.level(25), Some(Level::Low));
        assert_eq!(gpio.level(22), Some(Level::High));
        assert_eq!(gpio.level(23), Some(Level::High));
    }

    #[test]
    fn test_backward() {
        let mut drive = sim_drive();
        drive.backward(-50).unwrap();
        assert_channel(drive.left_channel(), 50, Direction::Backward, true);
        assert_channel(drive.right_channel(), 50, Direction::Backward, true);
        assert_eq!(drive.gpio().level(24), Some(Level::High));
        assert_eq!(drive.gpio().level(25), Some(Level::High));
    }

    #[test]
    fn test_left_turn() {
        let mut drive = sim_drive();
        drive.left(150, 900).unwrap();
        assert_channel(drive.left_channel(), 150, Direction::Backward, true);
        assert_channel(drive.right_channel(), 480, Direction::Forward, true);
    }

    #[test]
    fn test_right_turn_strips_sign() {
        let mut drive = sim_drive();
        drive.right(-100, 300).unwrap();
        assert_channel(drive.left_channel(), 100, Direction::Forward, true);
        assert_channel(drive.right_channel(), 300, Direction::Backward, true);
    }

    #[test]
    fn test_forward_then_stop() {
        let mut drive = sim_drive();
        drive.forward(600).unwrap();
        assert_channel(drive.left_channel(), 480, Direction::Forward, true);
        assert_channel(drive.right_channel(), 480, Direction::Forward, true);

        drive.stop().unwrap();
        assert_channel(drive.left_channel(), 0, Direction::Forward, false);
        assert_channel(drive.right_channel(), 0, Direction::Forward, false);
        assert_eq!(drive.gpio().duty(12), Some(0));
        assert_eq!(drive.gpio().level(22), Some(Level::Low));
        assert_eq!(drive.gpio().level(23), Some(Level::Low));
    }

    #[test]
    fn test_stop_does_not_reenable() {
        let mut drive = sim_drive();
        drive.backward(300).unwrap();
        drive.gpio_mut().clear_ops();

        drive.stop().unwrap();
        let enables: Vec<_> = drive
            .gpio()
            .ops()
            .iter()
            .filter(|op| matches!(op, GpioOp::DigitalWrite { pin: 22 | 23, .. }))
            .copied()
            .collect();
        assert_eq!(
            enables,
            vec![
                GpioOp::DigitalWrite { pin: 22, level: Level::Low },
                GpioOp::DigitalWrite { pin: 23, level: Level::Low },
            ]
        );
        assert!(!drive.left_channel().is_enabled());
        assert!(!drive.right_channel().is_enabled());
    }

    #[test]
    fn test_movement_is_bracketed_by_disable_enable() {
        let mut drive = sim_drive();
        drive.gpio_mut().clear_ops();
        drive.left(100, 200).unwrap();

        assert_eq!(
            drive.gpio().ops(),
            &[
                GpioOp::DigitalWrite { pin: 22, level: Level::Low },
                GpioOp::DigitalWrite { pin: 23, level: Level::Low },
                GpioOp::DigitalWrite { pin: 24, level: Level::High },
                GpioOp::PwmWrite { pin: 12, value: 100 },
                GpioOp::DigitalWrite { pin: 25, level: Level::Low },
                GpioOp::PwmWrite { pin: 13, value: 200 },
                GpioOp::DigitalWrite { pin: 22, level: Level::High },
                GpioOp::DigitalWrite { pin: 23, level: Level::High },
            ]
        );
    }

    #[test]
    fn test_set_speeds_independent_sides() {
        let mut drive = sim_drive();
        drive
            .set_speeds(480, Direction::Backward, 384, Direction::Backward)
            .unwrap();
        assert_channel(drive.left_channel(), 480, Direction::Backward, true);
        assert_channel(drive.right_channel(), 384, Direction::Backward, true);
    }

    #[test]
    fn test_enable_disable_both() {
        let mut drive = sim_drive();
        drive.enable().unwrap();
        assert!(drive.left_channel().is_enabled() && drive.right_channel().is_enabled());
        drive.disable().unwrap();
        assert!(!drive.left_channel().is_enabled() && !drive.right_channel().is_enabled());
    }

    #[test]
    fn test_execute_command() {
        let mut drive = sim_drive();
        drive.execute(DriveCommand::Left { left: 80, right: 90 }).unwrap();
        assert_channel(drive.left_channel(), 80, Direction::Backward, true);
        assert_channel(drive.right_channel(), 90, Direction::Forward, true);

        drive.execute(DriveCommand::Stop).unwrap();
        assert_channel(drive.left_channel(), 0, Direction::Forward, false);
    }

    #[test]
    fn test_state_snapshot() {
        let mut drive = sim_drive();
        drive.right(10, 20).unwrap();
        let state = drive.state();
        assert_eq!(
            state.left,
            ChannelState {
                speed: 10,
                direction: Direction::Forward,
                enabled: true
            }
        );
        assert_eq!(state.right.direction, Direction::Backward);
    }

    #[test]
    fn test_new_does_not_touch_hardware() {
        let mut drive = Drive::new(SimGpio::new(), DrivePins::default(), PwmSettings::default()).unwrap();
        assert!(drive.gpio().ops().is_empty());
        assert!(matches!(drive.forward(100), Err(MotorError::NotOpen { .. })));

        drive.initialize().unwrap();
        drive.forward(100).unwrap();
        assert_eq!(drive.left_channel().speed(), 100);
    }

    #[test]
    fn test_pin_conflict_rejected() {
        let pins = DrivePins {
            left: DEFAULT_LEFT_PINS,
            right: ChannelPins {
                pwm_pin: 13,
                direction_pin: 25,
                enable_pin: 22,
            },
        };
        assert!(matches!(
            Drive::new(SimGpio::new(), pins, PwmSettings::default()),
            Err(MotorError::PinConflict { pin: 22 })
        ));

        let pins = DrivePins {
            left: ChannelPins {
                pwm_pin: 12,
                direction_pin: 12,
                enable_pin: 22,
            },
            right: DEFAULT_RIGHT_PINS,
        };
        assert!(pins.validate().is_err());
    }

    #[test]
    fn test_hardware_failure_propagates() {
        let mut drive = sim_drive();
        drive.gpio_mut().inject_fault(13);

        let err = drive.forward(100).unwrap_err();
        assert!(matches!(err, MotorError::Gpio(GpioError::WriteFailed { pin: 13 })));
        // Left side got its command, both stay disabled
        assert_eq!(drive.left_channel().speed(), 100);
        assert!(!drive.left_channel().is_enabled());
        assert!(!drive.right_channel().is_enabled());
    }
}
