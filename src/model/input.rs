use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Frame timing handed to every execution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TimeInfo {
    /// Seconds since the simulation started.
    pub time: f64,
    pub delta_time: f64,
    pub frame_count: u64,
}

impl TimeInfo {
    /// Timing after `frame` fixed steps of `dt` seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn at_frame(frame: u64, dt: f64) -> Self {
        Self {
            time: frame as f64 * dt,
            delta_time: dt,
            frame_count: frame,
        }
    }
}

/// Read-only view of the host's input devices.
pub trait InputState {
    fn is_key_down(&self, key: &str) -> bool;
    fn is_mouse_button_down(&self, button: u8) -> bool;
}

/// Input state captured for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub keys: HashSet<String>,
    pub mouse_buttons: HashSet<u8>,
}

impl InputSnapshot {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    pub fn with_mouse_button(mut self, button: u8) -> Self {
        self.mouse_buttons.insert(button);
        self
    }
}

impl InputState for InputSnapshot {
    fn is_key_down(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn is_mouse_button_down(&self, button: u8) -> bool {
        self.mouse_buttons.contains(&button)
    }
}

/// Input for headless runs: nothing is ever pressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputState for NoInput {
    fn is_key_down(&self, _key: &str) -> bool {
        false
    }

    fn is_mouse_button_down(&self, _button: u8) -> bool {
        false
    }
}
