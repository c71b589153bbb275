use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Home,
    Sleep,
    Away,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 3] = [Self::Home, Self::Sleep, Self::Away];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Sleep => "sleep",
            Self::Away => "away",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "home" => Some(Self::Home),
            "sleep" => Some(Self::Sleep),
            "away" => Some(Self::Away),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Home => 0,
            Self::Sleep => 1,
            Self::Away => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActuatorCommand {
    Off,
    Heat,
    Cool,
}

impl ActuatorCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Auto,
    Low,
    Medium,
    High,
}

impl FanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointBand {
    #[serde(rename = "minTemperature")]
    pub min_temperature: f32,
    #[serde(rename = "maxTemperature")]
    pub max_temperature: f32,
}

impl SetpointBand {
    // The flag reports whether min and max had to be swapped.
    pub fn normalized(min: f32, max: f32) -> (Self, bool) {
        if min > max {
            (
                Self {
                    min_temperature: max,
                    max_temperature: min,
                },
                true,
            )
        } else {
            (
                Self {
                    min_temperature: min,
                    max_temperature: max,
                },
                false,
            )
        }
    }

    pub fn midpoint(&self) -> f32 {
        (self.min_temperature + self.max_temperature) / 2.0
    }

    pub fn contains(&self, temp: f32) -> bool {
        (self.min_temperature..=self.max_temperature).contains(&temp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub current_mode: OperatingMode,
    pub last_room_temperature: Option<f32>,
    pub actuator_command: ActuatorCommand,
    pub active_band: Option<SetpointBand>,
    pub fan_mode: FanMode,
}

impl ControllerState {
    pub fn initial(mode: OperatingMode) -> Self {
        Self {
            current_mode: mode,
            last_room_temperature: None,
            actuator_command: ActuatorCommand::Off,
            active_band: None,
            fan_mode: FanMode::Auto,
        }
    }

    pub fn target_temperature(&self) -> Option<f32> {
        self.active_band.map(|band| band.midpoint())
    }

    pub fn payload(&self) -> ControllerStatePayload {
        ControllerStatePayload {
            mode: self.current_mode.as_str(),
            command: self.actuator_command.as_str(),
            fan_mode: self.fan_mode.as_str(),
            room_temp: self.last_room_temperature,
            sensor_valid: self.last_room_temperature.is_some(),
            band_min: self.active_band.map(|band| band.min_temperature),
            band_max: self.active_band.map(|band| band.max_temperature),
            target_temp: self.target_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatePayload {
    pub mode: &'static str,
    pub command: &'static str,
    #[serde(rename = "fanMode")]
    pub fan_mode: &'static str,
    #[serde(rename = "roomTemp")]
    pub room_temp: Option<f32>,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    #[serde(rename = "bandMin")]
    pub band_min: Option<f32>,
    #[serde(rename = "bandMax")]
    pub band_max: Option<f32>,
    #[serde(rename = "targetTemp")]
    pub target_temp: Option<f32>,
}
