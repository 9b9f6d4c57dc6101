pub mod calibration;
pub mod config;
pub mod node;
pub mod phase;
pub mod publish;
pub mod runtime;
pub mod scheduler;
pub mod topics;
pub mod types;

pub use calibration::{CalibrationAction, CalibrationController, CalibrationState};
pub use config::{CalibrationConfig, ChannelConfig, ConfigError, NodeConfig};
pub use node::{MonitorNode, NodeAction, NodeEvent, NodeTask};
pub use phase::PhaseController;
pub use publish::{ChannelPublishState, PublishPolicy};
pub use runtime::{Led, Radio, Runtime, SensorError, Sensors};
pub use scheduler::{Scheduler, TaskHandle};
pub use topics::*;
pub use types::{
    ButtonEvent, CalibrationStatus, LedMode, Measurement, RadioChannel, RadioMessage,
    SamplingPhase, Sensor, Tick,
};
