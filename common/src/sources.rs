use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use crate::types::{ActuatorCommand, FanMode, OperatingMode};

pub trait TemperatureSource: Send + Sync {
    /// Last known room temperature, or `None` while unavailable.
    fn read(&self) -> Option<f32>;
}

pub trait NumericSetpointSource: Send + Sync {
    fn read(&self) -> f32;
}

pub trait ModeSelector: Send + Sync {
    fn read(&self) -> OperatingMode;
}

/// Fire-and-forget command channel to the real AC unit. Target and fan
/// updates are optional for units that take only a mode.
pub trait AcActuator: Send + Sync {
    fn command(&self, command: ActuatorCommand);

    fn set_target(&self, _temperature: f32) {}

    fn set_fan_mode(&self, _fan_mode: FanMode) {}
}

impl<T: TemperatureSource + ?Sized> TemperatureSource for Arc<T> {
    fn read(&self) -> Option<f32> {
        (**self).read()
    }
}

impl<T: NumericSetpointSource + ?Sized> NumericSetpointSource for Arc<T> {
    fn read(&self) -> f32 {
        (**self).read()
    }
}

impl<T: ModeSelector + ?Sized> ModeSelector for Arc<T> {
    fn read(&self) -> OperatingMode {
        (**self).read()
    }
}

impl<T: AcActuator + ?Sized> AcActuator for Arc<T> {
    fn command(&self, command: ActuatorCommand) {
        (**self).command(command)
    }

    fn set_target(&self, temperature: f32) {
        (**self).set_target(temperature)
    }

    fn set_fan_mode(&self, fan_mode: FanMode) {
        (**self).set_fan_mode(fan_mode)
    }
}

#[derive(Debug)]
pub struct LatestReading {
    latest: RwLock<Option<(f32, Instant)>>,
    stale_after: Option<Duration>,
}

impl LatestReading {
    pub fn new(stale_after: Option<Duration>) -> Self {
        Self {
            latest: RwLock::new(None),
            stale_after,
        }
    }

    pub fn update(&self, value: f32) {
        let mut latest = self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *latest = Some((value, Instant::now()));
    }

    pub fn clear(&self) {
        let mut latest = self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *latest = None;
    }
}

impl TemperatureSource for LatestReading {
    fn read(&self) -> Option<f32> {
        let latest = self
            .latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (value, at) = (*latest)?;

        if !value.is_finite() {
            return None;
        }
        if let Some(stale_after) = self.stale_after {
            if at.elapsed() >= stale_after {
                return None;
            }
        }
        Some(value)
    }
}

#[derive(Debug)]
pub struct SharedSetpoint {
    value: RwLock<f32>,
}

impl SharedSetpoint {
    pub fn new(value: f32) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    pub fn set(&self, value: f32) {
        *self
            .value
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
    }
}

impl NumericSetpointSource for SharedSetpoint {
    fn read(&self) -> f32 {
        *self
            .value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
pub struct SelectedMode {
    mode: RwLock<OperatingMode>,
}

impl SelectedMode {
    pub fn new(mode: OperatingMode) -> Self {
        Self {
            mode: RwLock::new(mode),
        }
    }

    pub fn select(&self, mode: OperatingMode) -> bool {
        let mut current = self
            .mode
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current == mode {
            return false;
        }
        *current = mode;
        true
    }
}

impl ModeSelector for SelectedMode {
    fn read(&self) -> OperatingMode {
        *self
            .mode
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
