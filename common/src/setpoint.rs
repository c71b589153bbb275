use std::sync::Arc;

use tracing::warn;

use crate::{
    config::SetpointLimits,
    sources::{NumericSetpointSource, SharedSetpoint},
    types::{OperatingMode, SetpointBand},
};

#[derive(Debug, Clone)]
pub struct SetpointPair {
    mode: OperatingMode,
    min: Arc<SharedSetpoint>,
    max: Arc<SharedSetpoint>,
    limits: SetpointLimits,
}

impl SetpointPair {
    pub fn new(mode: OperatingMode, band: SetpointBand, limits: SetpointLimits) -> Self {
        let pair = Self {
            mode,
            min: Arc::new(SharedSetpoint::new(band.min_temperature)),
            max: Arc::new(SharedSetpoint::new(band.max_temperature)),
            limits,
        };
        pair.set_max(band.max_temperature);
        pair.set_min(band.min_temperature);
        pair
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn min_source(&self) -> Arc<SharedSetpoint> {
        self.min.clone()
    }

    pub fn max_source(&self) -> Arc<SharedSetpoint> {
        self.max.clone()
    }

    pub fn band(&self) -> SetpointBand {
        SetpointBand {
            min_temperature: self.min.read(),
            max_temperature: self.max.read(),
        }
    }

    pub fn set_min(&self, value: f32) -> SetpointBand {
        let width = self.limits.min_band_width;
        let value = value.clamp(self.limits.lower, self.limits.upper);
        let current_max = self.max.read();

        if value < current_max {
            self.min.set(value);
            return self.band();
        }

        let pushed_max = value + width;
        if pushed_max <= self.limits.upper {
            self.min.set(value);
            self.max.set(pushed_max);
        } else {
            let safe_min = (current_max - width).max(self.limits.lower);
            warn!(
                "cannot raise {} max to {pushed_max:.1} (limit {:.1}), holding min at {safe_min:.1}",
                self.mode.as_str(),
                self.limits.upper
            );
            self.min.set(safe_min);
        }
        self.band()
    }

    pub fn set_max(&self, value: f32) -> SetpointBand {
        let width = self.limits.min_band_width;
        let value = value.clamp(self.limits.lower, self.limits.upper);
        let current_min = self.min.read();

        if value > current_min {
            self.max.set(value);
            return self.band();
        }

        let pushed_min = value - width;
        if pushed_min >= self.limits.lower {
            self.max.set(value);
            self.min.set(pushed_min);
        } else {
            let safe_max = (current_min + width).min(self.limits.upper);
            warn!(
                "cannot lower {} min to {pushed_min:.1} (limit {:.1}), holding max at {safe_max:.1}",
                self.mode.as_str(),
                self.limits.lower
            );
            self.max.set(safe_max);
        }
        self.band()
    }
}
