use std::fmt;

use serde::{Deserialize, Serialize};

use crate::topics::{
    TOPIC_BATTERY_VOLTAGE, TOPIC_CALIBRATION, TOPIC_CO2_CONCENTRATION, TOPIC_CO2_ERROR,
    TOPIC_PUSH_BUTTON_COUNT,
};

pub type Tick = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensor {
    Temperature,
    Humidity,
    Barometer,
    Co2,
    Battery,
}

impl Sensor {
    pub const ALL: [Sensor; 5] = [
        Self::Temperature,
        Self::Humidity,
        Self::Barometer,
        Self::Co2,
        Self::Battery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Barometer => "barometer",
            Self::Co2 => "co2",
            Self::Battery => "battery",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SamplingPhase {
    Service,
    Normal,
}

impl SamplingPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "SERVICE",
            Self::Normal => "NORMAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Off,
    Pulse(u64),
    BlinkSlow,
    BlinkFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Press,
    Click,
    Hold,
}

/// A successful read from one of the sensor drivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Temperature(f32),
    Humidity(f32),
    /// Altitude is derived from the same conversion and may fail on its own.
    Barometer {
        pascal: f32,
        altitude_m: Option<f32>,
    },
    Co2(f32),
    Battery(f32),
}

impl Measurement {
    pub fn sensor(&self) -> Sensor {
        match self {
            Self::Temperature(_) => Sensor::Temperature,
            Self::Humidity(_) => Sensor::Humidity,
            Self::Barometer { .. } => Sensor::Barometer,
            Self::Co2(_) => Sensor::Co2,
            Self::Battery(_) => Sensor::Battery,
        }
    }
}

/// Radio pub channel of a tag, addressed by I2C bus and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioChannel {
    pub bus: u8,
    pub slot: u8,
}

impl RadioChannel {
    pub const I2C0_DEFAULT: Self = Self { bus: 0, slot: 0 };
    pub const HUMIDITY_R3_I2C0_DEFAULT: Self = Self { bus: 0, slot: 4 };
}

impl fmt::Display for RadioChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bus, self.slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    Start,
    Countdown(u32),
    End,
}

impl CalibrationStatus {
    pub fn payload(self) -> String {
        match self {
            Self::Start => "start".to_string(),
            Self::Countdown(remaining) => remaining.to_string(),
            Self::End => "end".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RadioMessage {
    Temperature {
        channel: RadioChannel,
        celsius: f32,
    },
    Humidity {
        channel: RadioChannel,
        percent: f32,
    },
    Barometer {
        channel: RadioChannel,
        pascal: f32,
        altitude_m: f32,
    },
    Co2 {
        ppm: f32,
    },
    Battery {
        voltage: f32,
    },
    PushButton {
        count: u16,
    },
    Calibration(CalibrationStatus),
    Co2Error {
        code: i32,
    },
}

impl RadioMessage {
    /// Topic/payload pairs as they appear on the gateway side. The barometer
    /// reading fans out into pressure and altitude.
    pub fn topics(&self) -> Vec<(String, String)> {
        match self {
            Self::Temperature { channel, celsius } => vec![(
                format!("thermometer/{channel}/temperature"),
                format!("{celsius:.2}"),
            )],
            Self::Humidity { channel, percent } => vec![(
                format!("hygrometer/{channel}/relative-humidity"),
                format!("{percent:.1}"),
            )],
            Self::Barometer {
                channel,
                pascal,
                altitude_m,
            } => vec![
                (
                    format!("barometer/{channel}/pressure"),
                    format!("{:.2}", pascal / 1000.0),
                ),
                (
                    format!("barometer/{channel}/altitude"),
                    format!("{altitude_m:.1}"),
                ),
            ],
            Self::Co2 { ppm } => vec![(TOPIC_CO2_CONCENTRATION.to_string(), format!("{ppm:.0}"))],
            Self::Battery { voltage } => {
                vec![(TOPIC_BATTERY_VOLTAGE.to_string(), format!("{voltage:.2}"))]
            }
            Self::PushButton { count } => {
                vec![(TOPIC_PUSH_BUTTON_COUNT.to_string(), count.to_string())]
            }
            Self::Calibration(status) => vec![(TOPIC_CALIBRATION.to_string(), status.payload())],
            Self::Co2Error { code } => vec![(TOPIC_CO2_ERROR.to_string(), code.to_string())],
        }
    }
}
