use serde::{Deserialize, Serialize};

use crate::{
    schedule::Schedule,
    types::{OperatingMode, SetpointBand},
};

pub const MIN_BAND_WIDTH: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointLimits {
    pub lower: f32,
    pub upper: f32,
    pub min_band_width: f32,
}

impl Default for SetpointLimits {
    fn default() -> Self {
        Self {
            lower: 10.0,
            upper: 32.0,
            min_band_width: MIN_BAND_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermostatConfig {
    pub tick_interval_ms: u64,
    pub sensor_stale_timeout_ms: u64,
    pub state_publish_interval_ms: u64,
    pub min_valid_temp_c: f32,
    pub max_valid_temp_c: f32,
    pub setpoint_limits: SetpointLimits,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            sensor_stale_timeout_ms: 300_000,
            state_publish_interval_ms: 10_000,
            min_valid_temp_c: -40.0,
            max_valid_temp_c: 65.0,
            setpoint_limits: SetpointLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandDefaults {
    pub home: SetpointBand,
    pub sleep: SetpointBand,
    pub away: SetpointBand,
}

impl BandDefaults {
    pub fn for_mode(&self, mode: OperatingMode) -> SetpointBand {
        match mode {
            OperatingMode::Home => self.home,
            OperatingMode::Sleep => self.sleep,
            OperatingMode::Away => self.away,
        }
    }
}

impl Default for BandDefaults {
    fn default() -> Self {
        Self {
            home: SetpointBand {
                min_temperature: 20.0,
                max_temperature: 24.0,
            },
            sleep: SetpointBand {
                min_temperature: 18.0,
                max_temperature: 22.0,
            },
            away: SetpointBand {
                min_temperature: 15.0,
                max_temperature: 28.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub thermostat: ThermostatConfig,
    pub bands: BandDefaults,
    pub initial_mode: OperatingMode,
    pub timezone: String,
    pub network: NetworkConfig,
    #[serde(default)]
    pub schedule: Schedule,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thermostat: ThermostatConfig::default(),
            bands: BandDefaults::default(),
            initial_mode: OperatingMode::Home,
            timezone: "UTC".to_string(),
            network: NetworkConfig::default(),
            schedule: Schedule::default(),
        }
    }
}

impl ThermostatConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(100, 60_000);
        self.state_publish_interval_ms = self.state_publish_interval_ms.clamp(1_000, 300_000);
        self.sensor_stale_timeout_ms = self.sensor_stale_timeout_ms.max(self.tick_interval_ms);

        if self.min_valid_temp_c > self.max_valid_temp_c {
            std::mem::swap(&mut self.min_valid_temp_c, &mut self.max_valid_temp_c);
        }

        let limits = &mut self.setpoint_limits;
        limits.min_band_width = limits.min_band_width.clamp(0.1, 5.0);
        if limits.lower > limits.upper {
            std::mem::swap(&mut limits.lower, &mut limits.upper);
        }
        if limits.upper - limits.lower < limits.min_band_width {
            limits.upper = limits.lower + limits.min_band_width;
        }
    }

    pub fn is_valid_room_temp(&self, temp_c: f32) -> bool {
        temp_c.is_finite() && (self.min_valid_temp_c..=self.max_valid_temp_c).contains(&temp_c)
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.thermostat.sanitize();
        self.schedule.normalize();
    }
}
