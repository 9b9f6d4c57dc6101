pub const TOPIC_CO2_CONCENTRATION: &str = "co2-meter/-/concentration";
pub const TOPIC_CALIBRATION: &str = "co2-meter/-/calibration";
pub const TOPIC_CO2_ERROR: &str = "co2-meter/-/error";

pub const TOPIC_BATTERY_VOLTAGE: &str = "battery/-/voltage";
pub const TOPIC_PUSH_BUTTON_COUNT: &str = "push-button/-/event-count";

pub const TOPIC_NODE_STATUS: &str = "co2-monitor/-/status";
