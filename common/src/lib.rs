pub mod config;
pub mod error;
pub mod schedule;
pub mod setpoint;
pub mod sources;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use config::{BandDefaults, NetworkConfig, RuntimeConfig, SetpointLimits, ThermostatConfig};
pub use error::{Anomaly, Bound, ConfigError};
pub use schedule::{DayOfWeek, Schedule, ScheduleEntry};
pub use setpoint::SetpointPair;
pub use sources::{
    AcActuator, LatestReading, ModeSelector, NumericSetpointSource, SelectedMode, SharedSetpoint,
    TemperatureSource,
};
pub use thermostat::{next_command, ControllerWiring, ThermostatController, TickReport};
pub use topics::*;
pub use types::{
    ActuatorCommand, ControllerState, ControllerStatePayload, FanMode, OperatingMode,
    SetpointBand,
};
