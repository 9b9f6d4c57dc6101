use thiserror::Error;
use tracing::debug;

use crate::{
    node::{MonitorNode, NodeAction, NodeEvent},
    types::{ButtonEvent, LedMode, Measurement, RadioMessage, Sensor, Tick},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("{0} reading unavailable")]
    Unavailable(Sensor),
    #[error("co2 sensor fault (code {0})")]
    Co2Fault(i32),
}

pub trait Sensors {
    fn read(&mut self, sensor: Sensor) -> Result<Measurement, SensorError>;
    fn set_sampling_interval(&mut self, sensor: Sensor, interval_ms: u64);
    /// Background-filtered calibration of the CO2 sensor.
    fn calibrate_co2(&mut self);
}

pub trait Radio {
    fn publish(&mut self, message: &RadioMessage);
    fn pairing_request(&mut self, device_name: &str, version: &str);
}

pub trait Led {
    fn set_mode(&mut self, mode: LedMode);
}

/// Drives a `MonitorNode` against concrete collaborators.
pub struct Runtime<S, R, L> {
    node: MonitorNode,
    sensors: S,
    radio: R,
    led: L,
}

impl<S: Sensors, R: Radio, L: Led> Runtime<S, R, L> {
    pub fn new(node: MonitorNode, sensors: S, radio: R, led: L) -> Self {
        Self {
            node,
            sensors,
            radio,
            led,
        }
    }

    pub fn node(&self) -> &MonitorNode {
        &self.node
    }

    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    pub fn next_due(&mut self) -> Option<Tick> {
        self.node.next_due()
    }

    pub fn boot(&mut self, now: Tick) {
        let actions = self.node.boot(now);
        self.execute(actions, now);
    }

    /// Runs every task due at `now`, including measurements they trigger.
    pub fn run_due(&mut self, now: Tick) {
        let actions = self.node.poll(now);
        self.execute(actions, now);
    }

    pub fn abort_calibration(&mut self, now: Tick) {
        let actions = self.node.abort_calibration(now);
        self.execute(actions, now);
    }

    pub fn button(&mut self, event: ButtonEvent, now: Tick) {
        let actions = self.node.handle_event(NodeEvent::Button(event), now);
        self.execute(actions, now);
    }

    fn execute(&mut self, actions: Vec<NodeAction>, now: Tick) {
        for action in actions {
            match action {
                NodeAction::Publish(message) => self.radio.publish(&message),
                NodeAction::SetLed(mode) => self.led.set_mode(mode),
                NodeAction::SetSamplingInterval {
                    sensor,
                    interval_ms,
                } => {
                    debug!("{sensor} sampling interval {interval_ms}ms");
                    self.sensors.set_sampling_interval(sensor, interval_ms);
                }
                NodeAction::Measure(sensor) => {
                    let event = match self.sensors.read(sensor) {
                        Ok(measurement) => NodeEvent::Measurement(measurement),
                        Err(SensorError::Co2Fault(code)) => NodeEvent::Co2Fault(code),
                        Err(err @ SensorError::Unavailable(_)) => {
                            debug!("{err}");
                            NodeEvent::ReadFailed(sensor)
                        }
                    };
                    let follow_up = self.node.handle_event(event, now);
                    self.execute(follow_up, now);
                }
                NodeAction::CalibrateCo2 => self.sensors.calibrate_co2(),
                NodeAction::PairingRequest {
                    device_name,
                    version,
                } => self.radio.pairing_request(&device_name, &version),
            }
        }
    }
}
