//! Movement-class priority settings and the starvation ramp.

/// Resend cadence and priority per movement class of a physics body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrioritySettings {
    /// Frames between updates while accelerating.
    pub accelerating_update_count: u32,
    /// Frames between updates while coasting.
    pub linear_moving_update_count: u32,
    /// Frames between updates once stopped.
    pub stopped_update_count: u32,
    pub accelerating_priority: f32,
    pub linear_moving_priority: f32,
    pub stopped_priority: f32,
    /// Idle frames before a body counts as stopped.
    pub stop_after_update_count: u32,
    /// Scale the cadence by the simulation ratio, so a slowed simulation
    /// still sends often enough for smooth client movement.
    pub compensate_slow_simulation: bool,
    /// Extra priority per overdue cadence period.
    pub ramp_amount: f32,
}

impl Default for PrioritySettings {
    fn default() -> Self {
        Self {
            accelerating_update_count: 4,
            linear_moving_update_count: 20,
            stopped_update_count: 60,
            accelerating_priority: 1.0,
            linear_moving_priority: 0.33,
            stopped_priority: 0.13,
            stop_after_update_count: 60,
            compensate_slow_simulation: true,
            ramp_amount: 0.5,
        }
    }
}

impl PrioritySettings {
    /// Short cadences so tests reach every movement class quickly.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            accelerating_update_count: 1,
            linear_moving_update_count: 2,
            stopped_update_count: 4,
            stop_after_update_count: 3,
            compensate_slow_simulation: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_stop_after(mut self, frames: u32) -> Self {
        self.stop_after_update_count = frames;
        self
    }

    #[must_use]
    pub const fn with_ramp_amount(mut self, ramp: f32) -> Self {
        self.ramp_amount = ramp;
        self
    }
}

/// Holds `priority` at zero until `update_once_per` frames have passed, then
/// grows it by `ramp_amount` for every further period without a sync.
#[must_use]
pub fn ramp_priority(priority: f32, frames_since_sync: u32, update_once_per: f32, ramp_amount: f32) -> f32 {
    if priority <= 0.0 {
        return 0.0;
    }
    let frames = frames_since_sync as f32;
    if update_once_per <= 0.0 {
        return priority;
    }
    if frames < update_once_per {
        return 0.0;
    }
    priority * (1.0 + ramp_amount * (frames - update_once_per) / update_once_per)
}
