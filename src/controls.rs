//! Per-task UI control state
//!
//! Each task starts with both controls disabled and requests two one-shot
//! timers: one enabling "Finished!" and one enabling "Give Up". Timer requests
//! carry the generation of the task that issued them, and a timer that fires
//! after the task changed is ignored.

use crate::rounds::{FINISH_ENABLE_DELAY_MS, GIVE_UP_ENABLE_DELAY_MS};
use serde::Serialize;
use std::time::Duration;

/// Alpha used to render a disabled control
pub const DISABLED_ALPHA: f32 = 0.4;

/// Alpha used to render an enabled control
pub const ENABLED_ALPHA: f32 = 1.0;

/// The two participant-facing controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Finish,
    GiveUp,
}

impl Control {
    pub fn label(&self) -> &'static str {
        match self {
            Control::Finish => "Finished",
            Control::GiveUp => "Give Up",
        }
    }

    /// Delay after task start before this control becomes available
    pub fn enable_delay(&self) -> Duration {
        match self {
            Control::Finish => Duration::from_millis(FINISH_ENABLE_DELAY_MS),
            Control::GiveUp => Duration::from_millis(GIVE_UP_ENABLE_DELAY_MS),
        }
    }
}

/// Enablement of a single control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub enabled: bool,
}

impl ControlState {
    pub fn alpha(&self) -> f32 {
        if self.enabled {
            ENABLED_ALPHA
        } else {
            DISABLED_ALPHA
        }
    }
}

/// A one-shot timer the host must schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub control: Control,
    pub delay: Duration,
    pub generation: u64,
}

impl TimerRequest {
    /// The event to deliver back once `delay` has elapsed
    pub fn fired(&self) -> TimerFired {
        TimerFired {
            control: self.control,
            generation: self.generation,
        }
    }
}

/// Delivered by the host when a [`TimerRequest`] elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub control: Control,
    pub generation: u64,
}

/// Control state for the task currently on screen
#[derive(Debug, Clone, Default)]
pub struct TaskControls {
    finish: ControlState,
    give_up: ControlState,
    generation: u64,
}

impl TaskControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable both controls for a new task and return the timers to schedule.
    ///
    /// Any timer requested for an earlier task becomes stale.
    pub fn reset_for_new_task(&mut self) -> [TimerRequest; 2] {
        self.generation += 1;
        self.finish = ControlState::default();
        self.give_up = ControlState::default();
        [Control::Finish, Control::GiveUp].map(|control| TimerRequest {
            control,
            delay: control.enable_delay(),
            generation: self.generation,
        })
    }

    /// Disable both controls and invalidate outstanding timers without
    /// requesting new ones
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.finish = ControlState::default();
        self.give_up = ControlState::default();
    }

    /// Apply a fired timer. Returns `false` when the timer belonged to an
    /// earlier task and was ignored.
    pub fn apply(&mut self, fired: TimerFired) -> bool {
        if fired.generation != self.generation {
            return false;
        }
        self.state_mut(fired.control).enabled = true;
        true
    }

    pub fn state(&self, control: Control) -> ControlState {
        match control {
            Control::Finish => self.finish,
            Control::GiveUp => self.give_up,
        }
    }

    pub fn is_enabled(&self, control: Control) -> bool {
        self.state(control).enabled
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn state_mut(&mut self, control: Control) -> &mut ControlState {
        match control {
            Control::Finish => &mut self.finish,
            Control::GiveUp => &mut self.give_up,
        }
    }
}
