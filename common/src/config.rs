use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SamplingPhase;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid node config json")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelConfig {
    pub threshold: f32,
    pub service_heartbeat_ms: u64,
    pub normal_heartbeat_ms: u64,
    pub service_interval_ms: u64,
    pub normal_interval_ms: u64,
}

impl ChannelConfig {
    fn new(threshold: f32, heartbeat_ms: u64, service_interval_ms: u64, normal_interval_ms: u64) -> Self {
        Self {
            threshold,
            service_heartbeat_ms: heartbeat_ms,
            normal_heartbeat_ms: heartbeat_ms,
            service_interval_ms,
            normal_interval_ms,
        }
    }

    pub fn heartbeat_ms(&self, phase: SamplingPhase) -> u64 {
        match phase {
            SamplingPhase::Service => self.service_heartbeat_ms,
            SamplingPhase::Normal => self.normal_heartbeat_ms,
        }
    }

    pub fn interval_ms(&self, phase: SamplingPhase) -> u64 {
        match phase {
            SamplingPhase::Service => self.service_interval_ms,
            SamplingPhase::Normal => self.normal_interval_ms,
        }
    }

    pub fn sanitize(&mut self) {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            self.threshold = 0.0;
        }
        self.service_heartbeat_ms = self.service_heartbeat_ms.max(1);
        self.normal_heartbeat_ms = self.normal_heartbeat_ms.max(1);
        self.service_interval_ms = self.service_interval_ms.max(1);
        self.normal_interval_ms = self.normal_interval_ms.max(1);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub steps: u32,
    pub start_delay_ms: u64,
    pub step_interval_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            steps: 32,
            start_delay_ms: 240_000,
            step_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NodeConfigFile")]
pub struct NodeConfig {
    pub device_name: String,
    pub temperature: ChannelConfig,
    pub humidity: ChannelConfig,
    pub barometer: ChannelConfig,
    pub co2: ChannelConfig,
    pub calibration: CalibrationConfig,
    pub service_phase_ms: u64,
    pub battery_interval_ms: u64,
    pub button_hold_ms: u64,
    pub click_pulse_ms: u64,
    pub boot_pulse_ms: u64,
}

// On-disk shape: every key optional, channels merged field by field over
// their own defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChannelOverrides {
    threshold: Option<f32>,
    service_heartbeat_ms: Option<u64>,
    normal_heartbeat_ms: Option<u64>,
    service_interval_ms: Option<u64>,
    normal_interval_ms: Option<u64>,
}

impl ChannelOverrides {
    fn apply(self, base: ChannelConfig) -> ChannelConfig {
        ChannelConfig {
            threshold: self.threshold.unwrap_or(base.threshold),
            service_heartbeat_ms: self.service_heartbeat_ms.unwrap_or(base.service_heartbeat_ms),
            normal_heartbeat_ms: self.normal_heartbeat_ms.unwrap_or(base.normal_heartbeat_ms),
            service_interval_ms: self.service_interval_ms.unwrap_or(base.service_interval_ms),
            normal_interval_ms: self.normal_interval_ms.unwrap_or(base.normal_interval_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeConfigFile {
    device_name: Option<String>,
    temperature: ChannelOverrides,
    humidity: ChannelOverrides,
    barometer: ChannelOverrides,
    co2: ChannelOverrides,
    calibration: CalibrationConfig,
    service_phase_ms: Option<u64>,
    battery_interval_ms: Option<u64>,
    button_hold_ms: Option<u64>,
    click_pulse_ms: Option<u64>,
    boot_pulse_ms: Option<u64>,
}

impl From<NodeConfigFile> for NodeConfig {
    fn from(file: NodeConfigFile) -> Self {
        let defaults = NodeConfig::default();
        Self {
            device_name: file.device_name.unwrap_or(defaults.device_name),
            temperature: file.temperature.apply(defaults.temperature),
            humidity: file.humidity.apply(defaults.humidity),
            barometer: file.barometer.apply(defaults.barometer),
            co2: file.co2.apply(defaults.co2),
            calibration: file.calibration,
            service_phase_ms: file.service_phase_ms.unwrap_or(defaults.service_phase_ms),
            battery_interval_ms: file.battery_interval_ms.unwrap_or(defaults.battery_interval_ms),
            button_hold_ms: file.button_hold_ms.unwrap_or(defaults.button_hold_ms),
            click_pulse_ms: file.click_pulse_ms.unwrap_or(defaults.click_pulse_ms),
            boot_pulse_ms: file.boot_pulse_ms.unwrap_or(defaults.boot_pulse_ms),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_name: "co2-monitor".to_string(),
            temperature: ChannelConfig::new(0.2, 900_000, 5_000, 10_000),
            humidity: ChannelConfig::new(5.0, 900_000, 5_000, 10_000),
            barometer: ChannelConfig::new(20.0, 900_000, 60_000, 300_000),
            co2: ChannelConfig {
                threshold: 50.0,
                service_heartbeat_ms: 300_000,
                normal_heartbeat_ms: 900_000,
                service_interval_ms: 60_000,
                normal_interval_ms: 300_000,
            },
            calibration: CalibrationConfig::default(),
            service_phase_ms: 3_600_000,
            battery_interval_ms: 3_600_000,
            button_hold_ms: 10_000,
            click_pulse_ms: 100,
            boot_pulse_ms: 2_000,
        }
    }
}

impl NodeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut config = serde_json::from_slice::<NodeConfig>(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.temperature.sanitize();
        self.humidity.sanitize();
        self.barometer.sanitize();
        self.co2.sanitize();

        if self.calibration.steps == 0 {
            self.calibration.steps = 1;
        }
        self.calibration.step_interval_ms = self.calibration.step_interval_ms.max(1);
        self.battery_interval_ms = self.battery_interval_ms.max(1);

        if self.device_name.trim().is_empty() {
            self.device_name = "co2-monitor".to_string();
        }
    }
}
