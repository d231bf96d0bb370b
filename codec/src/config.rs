//! Tunable constants for pose/velocity quantization.

/// Codec configuration.
///
/// The defaults match a 60 Hz simulation. They are tuning values, not wire
/// contracts: both peers only need to agree on the decimal precision.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodecConfig {
    /// Decimal digits kept when rounding velocities before quantization.
    pub num_decimal_precision: u8,
    /// Squared length above which an acceleration counts as "accelerating".
    pub acceleration_epsilon_sq: f32,
    /// Squared distance above which a received position counts as moved.
    pub position_epsilon_sq: f64,
    /// Lower clamp for the simulation-rate ratio.
    pub min_simulation_ratio: f32,
    /// Upper clamp for the simulation-rate ratio.
    pub max_simulation_ratio: f32,
    /// Scale velocities by the simulation ratio. When off the ratio is always 1.
    pub velocity_compensation: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            num_decimal_precision: 1,
            acceleration_epsilon_sq: 0.05 * 0.05,
            position_epsilon_sq: 0.05 * 0.05,
            min_simulation_ratio: 0.1,
            max_simulation_ratio: 2.0,
            velocity_compensation: true,
        }
    }
}

impl CodecConfig {
    /// Config with velocity compensation off, so tests see unscaled values.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            velocity_compensation: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_decimal_precision(mut self, digits: u8) -> Self {
        self.num_decimal_precision = digits;
        self
    }

    #[must_use]
    pub const fn with_velocity_compensation(mut self, enabled: bool) -> Self {
        self.velocity_compensation = enabled;
        self
    }

    /// Smallest velocity component that is not rounded to zero.
    #[must_use]
    pub fn precision(&self) -> f32 {
        1.0 / 10f32.powi(i32::from(self.num_decimal_precision))
    }

    /// Clamps a raw simulation ratio into the configured range.
    ///
    /// Non-finite or non-positive ratios fall back to 1.
    #[must_use]
    pub fn effective_simulation_ratio(&self, raw: f32) -> f32 {
        if !self.velocity_compensation || !raw.is_finite() || raw <= 0.0 {
            return 1.0;
        }
        raw.clamp(self.min_simulation_ratio, self.max_simulation_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_precision_is_one_decimal() {
        let config = CodecConfig::default();
        assert!((config.precision() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn simulation_ratio_is_clamped() {
        let config = CodecConfig::default();
        assert!((config.effective_simulation_ratio(0.01) - 0.1).abs() < 1e-6);
        assert!((config.effective_simulation_ratio(5.0) - 2.0).abs() < 1e-6);
        assert!((config.effective_simulation_ratio(0.5) - 0.5).abs() < 1e-6);
        assert!((config.effective_simulation_ratio(f32::NAN) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn compensation_off_pins_ratio() {
        let config = CodecConfig::default().with_velocity_compensation(false);
        assert!((config.effective_simulation_ratio(0.5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn testing_config_disables_compensation() {
        let config = CodecConfig::for_testing();
        assert!(!config.velocity_compensation);
        assert_eq!(config.with_decimal_precision(2).num_decimal_precision, 2);
    }
}
