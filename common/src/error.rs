use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{OperatingMode, SetpointBand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Min,
    Max,
}

impl Bound {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// Wiring problems found while initializing a controller. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("room temperature sensor is not wired")]
    MissingRoomSensor,
    #[error("AC actuator is not wired")]
    MissingActuator,
    #[error("{} setpoint for {} mode is not wired", .bound.as_str(), .mode.as_str())]
    MissingSetpoint { mode: OperatingMode, bound: Bound },
}

/// Non-fatal conditions observed during a tick. They are logged and
/// reported back to the caller, never raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anomaly {
    SensorUnavailable,
    InvertedBand {
        mode: OperatingMode,
        corrected: SetpointBand,
    },
    SetpointUnavailable {
        mode: OperatingMode,
    },
}
