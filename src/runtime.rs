// Keyboard teleop: 50 Hz loop with watchdog
// WASD move, space stop, R/F speed, Q quit.
// If no movement key arrives within CMD_TIMEOUT the rover is stopped, so a
// released key (or a hung terminal) never leaves the motors running.

use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{CMD_TIMEOUT, LOOP_HZ, TELEOP_SPEEDS};
use crate::messages::DriveCommand;
use crate::motor::{Drive, Gpio};

/// Watchdog status of the teleop loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Quit,
}

pub struct Teleop {
    speed_idx: usize,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    applied: Option<DriveCommand>,
    health: RuntimeHealth,
}

impl Default for Teleop {
    fn default() -> Self {
        Self::new()
    }
}

impl Teleop {
    pub fn new() -> Self {
        Self {
            speed_idx: 0,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            applied: None,
            health: RuntimeHealth::CmdStale, // Start stale until first key
        }
    }

    pub fn speed(&self) -> i32 {
        TELEOP_SPEEDS[self.speed_idx]
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Map a key press to a command, received at `now`
    pub fn on_key(&mut self, code: KeyCode, now: Instant) -> KeyAction {
        let speed = self.speed();
        let cmd = match code {
            KeyCode::Char('w') => DriveCommand::Forward { speed },
            KeyCode::Char('s') => DriveCommand::Backward { speed },
            KeyCode::Char('a') => DriveCommand::Left { left: speed, right: speed },
            KeyCode::Char('d') => DriveCommand::Right { left: speed, right: speed },
            KeyCode::Char(' ') => DriveCommand::Stop,
            KeyCode::Char('r') => {
                self.speed_idx = (self.speed_idx + 1).min(TELEOP_SPEEDS.len() - 1);
                info!("Speed: {}", self.speed());
                return KeyAction::Continue;
            }
            KeyCode::Char('f') => {
                self.speed_idx = self.speed_idx.saturating_sub(1);
                info!("Speed: {}", self.speed());
                return KeyAction::Continue;
            }
            KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
            _ => return KeyAction::Continue,
        };
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
        KeyAction::Continue
    }

    /// Command to apply this tick (includes watchdog logic)
    pub fn compute_command(&mut self, now: Instant) -> DriveCommand {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        match self.latest_cmd {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                cmd
            }
            Some(_) => {
                // Watchdog triggered - stop the rover
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping rover", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                DriveCommand::Stop
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                DriveCommand::Stop
            }
        }
    }

    /// Apply `cmd` unless it is already in effect
    ///
    /// Repeating a movement would cycle the enable lines every tick.
    pub fn apply<G: Gpio>(&mut self, drive: &mut Drive<G>, cmd: DriveCommand) -> crate::motor::Result<()> {
        if self.applied == Some(cmd) {
            return Ok(());
        }
        debug!("Applying {:?}", cmd);
        drive.execute(cmd)?;
        self.applied = Some(cmd);
        Ok(())
    }
}

pub async fn run<G: Gpio>(drive: &mut Drive<G>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Controls: WASD=move, space=stop, R/F=speed, Q=quit");
    info!(
        "Teleop started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );

    enable_raw_mode()?;
    let result = run_loop(drive).await;
    disable_raw_mode()?;

    // Leave the rover de-energized whatever happened
    drive.stop()?;
    result
}

async fn run_loop<G: Gpio>(drive: &mut Drive<G>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut teleop = Teleop::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    loop {
        tick.tick().await;

        // 1. Drain all pending key events (non-blocking), keep latest
        while event::poll(Duration::ZERO)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind == KeyEventKind::Release {
                    continue;
                }
                if teleop.on_key(code, Instant::now()) == KeyAction::Quit {
                    info!("Teleop stopped");
                    return Ok(());
                }
            }
        }

        // 2. Compute command (includes watchdog logic)
        let cmd = teleop.compute_command(Instant::now());

        // 3. Drive
        teleop.apply(drive, cmd)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{Direction, DrivePins, PwmSettings, SimGpio};

    #[test]
    fn test_starts_stale() {
        let mut teleop = Teleop::new();
        assert_eq!(teleop.compute_command(Instant::now()), DriveCommand::Stop);
        assert_eq!(teleop.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_key_mapping() {
        let mut teleop = Teleop::new();
        let now = Instant::now();

        teleop.on_key(KeyCode::Char('w'), now);
        assert_eq!(teleop.compute_command(now), DriveCommand::Forward { speed: 120 });
        assert_eq!(teleop.health(), RuntimeHealth::Ok);

        teleop.on_key(KeyCode::Char('a'), now);
        assert_eq!(
            teleop.compute_command(now),
            DriveCommand::Left { left: 120, right: 120 }
        );

        teleop.on_key(KeyCode::Char(' '), now);
        assert_eq!(teleop.compute_command(now), DriveCommand::Stop);

        assert_eq!(teleop.on_key(KeyCode::Char('x'), now), KeyAction::Continue);
        assert_eq!(teleop.on_key(KeyCode::Char('q'), now), KeyAction::Quit);
        assert_eq!(teleop.on_key(KeyCode::Esc, now), KeyAction::Quit);
    }

    #[test]
    fn test_speed_steps_saturate() {
        let mut teleop = Teleop::new();
        let now = Instant::now();
        for _ in 0..5 {
            teleop.on_key(KeyCode::Char('r'), now);
        }
        assert_eq!(teleop.speed(), 480);

        teleop.on_key(KeyCode::Char('s'), now);
        assert_eq!(teleop.compute_command(now), DriveCommand::Backward { speed: 480 });

        for _ in 0..5 {
            teleop.on_key(KeyCode::Char('f'), now);
        }
        assert_eq!(teleop.speed(), 120);
    }

    #[test]
    fn test_watchdog_stops_stale_command() {
        let mut teleop = Teleop::new();
        let now = Instant::now();
        teleop.on_key(KeyCode::Char('d'), now);

        assert_eq!(
            teleop.compute_command(now + CMD_TIMEOUT),
            DriveCommand::Right { left: 120, right: 120 }
        );
        assert_eq!(
            teleop.compute_command(now + CMD_TIMEOUT + Duration::from_millis(1)),
            DriveCommand::Stop
        );
        assert_eq!(teleop.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_apply_skips_repeated_command() {
        let mut drive = Drive::open(SimGpio::new(), DrivePins::default(), PwmSettings::default()).unwrap();
        let mut teleop = Teleop::new();
        let cmd = DriveCommand::Forward { speed: 240 };

        teleop.apply(&mut drive, cmd).unwrap();
        let writes = drive.gpio().ops().len();
        teleop.apply(&mut drive, cmd).unwrap();
        assert_eq!(drive.gpio().ops().len(), writes);

        teleop.apply(&mut drive, DriveCommand::Stop).unwrap();
        assert!(drive.gpio().ops().len() > writes);
        assert_eq!(drive.left_channel().direction(), Direction::Forward);
        assert!(!drive.left_channel().is_enabled());
    }
}
