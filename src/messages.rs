// Drive commands and state snapshots

use serde::{Deserialize, Serialize};

use crate::motor::{Channel, Direction};

// A single movement intent, as used by routines, the CLI and teleop.
// JSON form: {"cmd": "forward", "speed": 240}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DriveCommand {
    Forward {
        speed: i32,
    },
    Backward {
        speed: i32,
    },
    Left {
        left: i32,
        right: i32,
    },
    Right {
        left: i32,
        right: i32,
    },
    Speeds {
        left: i32,
        left_direction: Direction,
        right: i32,
        right_direction: Direction,
    },
    Enable,
    Disable,
    Stop,
}

/// Last commanded state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub speed: u16,
    pub direction: Direction,
    pub enabled: bool,
}

impl From<&Channel> for ChannelState {
    fn from(channel: &Channel) -> Self {
        Self {
            speed: channel.speed(),
            direction: channel.direction(),
            enabled: channel.is_enabled(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveState {
    pub left: ChannelState,
    pub right: ChannelState,
}
