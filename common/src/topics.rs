use crate::{error::Bound, types::OperatingMode};

pub const TOPIC_SENSOR_ROOM_TEMP: &str = "vthermostat/sensor/room/temperature";
pub const TOPIC_SENSOR_STATUS: &str = "vthermostat/sensor/status";

pub const TOPIC_CONTROLLER_STATE: &str = "vthermostat/controller/state";
pub const TOPIC_AC_COMMAND: &str = "vthermostat/ac/command";
pub const TOPIC_AC_TARGET: &str = "vthermostat/ac/target";
pub const TOPIC_AC_FAN_MODE: &str = "vthermostat/ac/fan_mode";

pub const TOPIC_CMD_MODE: &str = "vthermostat/cmnd/mode";
pub const TOPIC_CMD_FAN_MODE: &str = "vthermostat/cmnd/fan_mode";
pub const TOPIC_CMD_SETPOINT_FILTER: &str = "vthermostat/cmnd/setpoint/+/+";

const SETPOINT_PREFIX: &str = "vthermostat/cmnd/setpoint/";

pub fn setpoint_topic(mode: OperatingMode, bound: Bound) -> String {
    format!("{SETPOINT_PREFIX}{}/{}", mode.as_str(), bound.as_str())
}

pub fn parse_setpoint_topic(topic: &str) -> Option<(OperatingMode, Bound)> {
    let rest = topic.strip_prefix(SETPOINT_PREFIX)?;
    let (mode, bound) = rest.split_once('/')?;
    let bound = match bound {
        "min" => Bound::Min,
        "max" => Bound::Max,
        _ => return None,
    };
    Some((OperatingMode::parse(mode)?, bound))
}
