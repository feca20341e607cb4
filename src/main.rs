use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rover_motor_drive::config::DriveConfig;
use rover_motor_drive::messages::DriveCommand;
#[cfg(feature = "rpi")]
use rover_motor_drive::motor::RppalGpio;
use rover_motor_drive::motor::{Direction, Drive, Gpio, SimGpio};
use rover_motor_drive::routine::{self, Routine, Step, BUILTIN_ROUTINES};
use rover_motor_drive::runtime;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Drive the rover's two motors through the dual MC33926 driver
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON file with pin mapping and PWM settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-memory GPIO backend instead of the Raspberry Pi pins
    #[arg(long)]
    simulate: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Disable both motors and zero their speed (default)
    Stop,
    /// Enable both motor driver outputs
    Enable,
    /// Disable both motor driver outputs
    Disable,
    /// Run each motor with its own speed and direction (0/forward, 1/backward)
    SetSpeeds {
        #[arg(allow_negative_numbers = true)]
        left: i32,
        left_direction: Direction,
        #[arg(allow_negative_numbers = true)]
        right: i32,
        right_direction: Direction,
        /// How long to run before stopping
        #[arg(long, default_value_t = 1000)]
        hold_ms: u64,
    },
    Forward {
        #[arg(allow_negative_numbers = true)]
        speed: i32,
        #[arg(long, default_value_t = 1000)]
        hold_ms: u64,
    },
    Backward {
        #[arg(allow_negative_numbers = true)]
        speed: i32,
        #[arg(long, default_value_t = 1000)]
        hold_ms: u64,
    },
    /// Turn left: left wheel reverses, right wheel advances
    Left {
        #[arg(allow_negative_numbers = true)]
        left: i32,
        #[arg(allow_negative_numbers = true)]
        right: i32,
        #[arg(long, default_value_t = 1000)]
        hold_ms: u64,
    },
    /// Turn right: left wheel advances, right wheel reverses
    Right {
        #[arg(allow_negative_numbers = true)]
        left: i32,
        #[arg(allow_negative_numbers = true)]
        right: i32,
        #[arg(long, default_value_t = 1000)]
        hold_ms: u64,
    },
    /// Run a built-in routine (forward, box, battery-drain) or one from a JSON file
    Routine {
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Drive with the keyboard
    Teleop,
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = dispatch(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn dispatch(args: Args) -> Result<(), BoxError> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            DriveConfig::load(path)?
        }
        None => DriveConfig::default(),
    };
    let command = args.command.unwrap_or(Command::Stop);

    if args.simulate {
        info!("Using simulated GPIO");
        execute(SimGpio::new(), &config, command)
    } else {
        execute_hardware(&config, command)
    }
}

#[cfg(feature = "rpi")]
fn execute_hardware(config: &DriveConfig, command: Command) -> Result<(), BoxError> {
    let gpio = RppalGpio::new().map_err(|e| format!("GPIO initialization failed: {}", e))?;
    execute(gpio, config, command)
}

#[cfg(not(feature = "rpi"))]
fn execute_hardware(_config: &DriveConfig, _command: Command) -> Result<(), BoxError> {
    Err("built without Raspberry Pi support (feature `rpi`), use --simulate".into())
}

fn execute<G: Gpio>(gpio: G, config: &DriveConfig, command: Command) -> Result<(), BoxError> {
    let mut drive = Drive::open(gpio, config.pins, config.pwm)?;

    match command {
        Command::Stop => drive.stop()?,
        Command::Enable => drive.enable()?,
        Command::Disable => drive.disable()?,
        Command::SetSpeeds {
            left,
            left_direction,
            right,
            right_direction,
            hold_ms,
        } => {
            let cmd = DriveCommand::Speeds {
                left,
                left_direction,
                right,
                right_direction,
            };
            hold(&mut drive, "set-speeds", cmd, hold_ms)?
        }
        Command::Forward { speed, hold_ms } => {
            hold(&mut drive, "forward", DriveCommand::Forward { speed }, hold_ms)?
        }
        Command::Backward { speed, hold_ms } => {
            hold(&mut drive, "backward", DriveCommand::Backward { speed }, hold_ms)?
        }
        Command::Left { left, right, hold_ms } => {
            hold(&mut drive, "left", DriveCommand::Left { left, right }, hold_ms)?
        }
        Command::Right { left, right, hold_ms } => {
            hold(&mut drive, "right", DriveCommand::Right { left, right }, hold_ms)?
        }
        Command::Routine { name, file, repeat } => {
            let routine = match (file, name) {
                (Some(path), _) => Routine::load(path)?,
                (None, Some(name)) => Routine::builtin(&name)?,
                (None, None) => {
                    return Err(format!(
                        "give a routine name ({}) or --file",
                        BUILTIN_ROUTINES.join(", ")
                    )
                    .into());
                }
            };
            routine::run(&mut drive, &routine, repeat, std::thread::sleep)?
        }
        Command::Teleop => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            rt.block_on(runtime::run(&mut drive))?
        }
    }

    info!("Drive state: {}", serde_json::to_string(&drive.state())?);
    Ok(())
}

/// Run a single command for `hold_ms`, then stop
fn hold<G: Gpio>(drive: &mut Drive<G>, name: &str, command: DriveCommand, hold_ms: u64) -> Result<(), BoxError> {
    let routine = Routine {
        name: name.to_string(),
        steps: vec![Step::new(command, hold_ms)],
    };
    routine::run(drive, &routine, 1, std::thread::sleep)?;
    Ok(())
}
