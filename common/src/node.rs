use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    calibration::{CalibrationAction, CalibrationController, CalibrationState},
    config::{ChannelConfig, NodeConfig},
    phase::PhaseController,
    publish::{ChannelPublishState, PublishPolicy},
    scheduler::{Scheduler, TaskHandle},
    types::{ButtonEvent, LedMode, Measurement, RadioChannel, RadioMessage, SamplingPhase, Sensor, Tick},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTask {
    Sample(Sensor),
    SwitchToNormal,
    CalibrationStep,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeEvent {
    Button(ButtonEvent),
    Measurement(Measurement),
    ReadFailed(Sensor),
    Co2Fault(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeAction {
    Publish(RadioMessage),
    SetLed(LedMode),
    SetSamplingInterval { sensor: Sensor, interval_ms: u64 },
    /// Read the sensor now and feed the result back as a `NodeEvent`.
    Measure(Sensor),
    CalibrateCo2,
    PairingRequest { device_name: String, version: String },
}

#[derive(Debug, Clone)]
struct Channels {
    temperature: ChannelPublishState,
    humidity: ChannelPublishState,
    barometer: ChannelPublishState,
    co2: ChannelPublishState,
}

/// Owns every piece of mutable node state. Handlers run to completion, one
/// at a time, so nothing here needs locking.
#[derive(Debug)]
pub struct MonitorNode {
    config: NodeConfig,
    channels: Channels,
    calibration: CalibrationController,
    phase: PhaseController,
    scheduler: Scheduler<NodeTask>,
    sample_tasks: HashMap<Sensor, TaskHandle>,
    intervals: HashMap<Sensor, u64>,
    calibration_task: Option<TaskHandle>,
    phase_task: Option<TaskHandle>,
    button_count: u16,
    booted: bool,
}

impl MonitorNode {
    pub fn new(mut config: NodeConfig) -> Self {
        config.sanitize();
        Self {
            calibration: CalibrationController::new(config.calibration.clone()),
            config,
            channels: Channels {
                temperature: ChannelPublishState::new(RadioChannel::I2C0_DEFAULT),
                humidity: ChannelPublishState::new(RadioChannel::HUMIDITY_R3_I2C0_DEFAULT),
                barometer: ChannelPublishState::new(RadioChannel::I2C0_DEFAULT),
                co2: ChannelPublishState::new(RadioChannel::I2C0_DEFAULT),
            },
            phase: PhaseController::default(),
            scheduler: Scheduler::new(),
            sample_tasks: HashMap::new(),
            intervals: HashMap::new(),
            calibration_task: None,
            phase_task: None,
            button_count: 0,
            booted: false,
        }
    }

    pub fn phase(&self) -> SamplingPhase {
        self.phase.phase()
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    pub fn sampling_interval(&self, sensor: Sensor) -> Option<u64> {
        self.intervals.get(&sensor).copied()
    }

    pub fn channel(&self, sensor: Sensor) -> Option<&ChannelPublishState> {
        match sensor {
            Sensor::Temperature => Some(&self.channels.temperature),
            Sensor::Humidity => Some(&self.channels.humidity),
            Sensor::Barometer => Some(&self.channels.barometer),
            Sensor::Co2 => Some(&self.channels.co2),
            Sensor::Battery => None,
        }
    }

    pub fn is_phase_switch_pending(&self) -> bool {
        self.phase_task.is_some()
    }

    pub fn next_due(&mut self) -> Option<Tick> {
        self.scheduler.next_due()
    }

    pub fn boot(&mut self, now: Tick) -> Vec<NodeAction> {
        if self.booted {
            return Vec::new();
        }
        self.booted = true;

        let mut actions = vec![
            NodeAction::SetLed(LedMode::Off),
            NodeAction::PairingRequest {
                device_name: self.config.device_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        ];

        for sensor in Sensor::ALL {
            let interval_ms = self.phase_interval_ms(sensor);
            self.intervals.insert(sensor, interval_ms);
            actions.push(NodeAction::SetSamplingInterval {
                sensor,
                interval_ms,
            });

            let handle = self.scheduler.register(NodeTask::Sample(sensor), 0, now);
            self.sample_tasks.insert(sensor, handle);
        }

        self.phase_task = Some(self.scheduler.register(
            NodeTask::SwitchToNormal,
            self.config.service_phase_ms,
            now,
        ));

        actions.push(NodeAction::SetLed(LedMode::Pulse(self.config.boot_pulse_ms)));
        info!(
            "node booted in {} phase, normal phase in {}s",
            self.phase().as_str(),
            self.config.service_phase_ms / 1000
        );
        actions
    }

    /// Dispatches every task due at or before `now`.
    pub fn poll(&mut self, now: Tick) -> Vec<NodeAction> {
        let mut actions = Vec::new();

        while let Some((handle, task)) = self.scheduler.pop_due(now) {
            match task {
                NodeTask::Sample(sensor) => {
                    actions.push(NodeAction::Measure(sensor));
                    let interval_ms = self.sampling_interval(sensor).unwrap_or(1);
                    self.scheduler.reschedule(handle, interval_ms, now);
                }
                NodeTask::SwitchToNormal => self.switch_to_normal(handle, now, &mut actions),
                NodeTask::CalibrationStep => {
                    let steps = self.calibration.step();
                    self.apply_calibration(steps, now, &mut actions);
                    if self.calibration.is_running() {
                        debug!(
                            "calibration step done, {} left",
                            self.calibration.remaining_steps()
                        );
                    }
                }
            }
        }

        actions
    }

    pub fn handle_event(&mut self, event: NodeEvent, now: Tick) -> Vec<NodeAction> {
        let mut actions = Vec::new();

        match event {
            NodeEvent::Button(button) => self.handle_button(button, now, &mut actions),
            NodeEvent::Measurement(measurement) => {
                self.handle_measurement(measurement, now, &mut actions)
            }
            NodeEvent::ReadFailed(sensor) => {
                debug!("{sensor} read failed, skipping this cycle");
            }
            NodeEvent::Co2Fault(code) => {
                info!("co2 sensor fault, code {code}");
                actions.push(NodeAction::Publish(RadioMessage::Co2Error { code }));
            }
        }

        actions
    }

    /// Ends the calibration session if one exists.
    pub fn abort_calibration(&mut self, now: Tick) -> Vec<NodeAction> {
        let mut actions = Vec::new();
        let steps = self.calibration.abort();
        self.apply_calibration(steps, now, &mut actions);
        actions
    }

    fn handle_button(&mut self, button: ButtonEvent, now: Tick, actions: &mut Vec<NodeAction>) {
        match button {
            ButtonEvent::Press => {}
            ButtonEvent::Click => {
                actions.push(NodeAction::SetLed(LedMode::Pulse(self.config.click_pulse_ms)));
                actions.push(NodeAction::Publish(RadioMessage::PushButton {
                    count: self.button_count,
                }));
                self.button_count = self.button_count.wrapping_add(1);
            }
            ButtonEvent::Hold => {
                let steps = self.calibration.toggle();
                info!("calibration now {}", self.calibration.state().as_str());
                self.apply_calibration(steps, now, actions);
            }
        }
    }

    fn handle_measurement(
        &mut self,
        measurement: Measurement,
        now: Tick,
        actions: &mut Vec<NodeAction>,
    ) {
        let phase = self.phase();

        match measurement {
            Measurement::Temperature(celsius) => {
                let channel = &mut self.channels.temperature;
                if Self::gate(channel, &self.config.temperature, phase, celsius, now, false) {
                    actions.push(NodeAction::Publish(RadioMessage::Temperature {
                        channel: channel.radio_channel(),
                        celsius,
                    }));
                }
            }
            Measurement::Humidity(percent) => {
                let channel = &mut self.channels.humidity;
                if Self::gate(channel, &self.config.humidity, phase, percent, now, false) {
                    actions.push(NodeAction::Publish(RadioMessage::Humidity {
                        channel: channel.radio_channel(),
                        percent,
                    }));
                }
            }
            Measurement::Barometer { pascal, altitude_m } => {
                if !pascal.is_finite() {
                    debug!("discarding non-finite pressure sample");
                    return;
                }

                let policy = PublishPolicy::for_phase(&self.config.barometer, phase);
                let channel = &mut self.channels.barometer;
                if !channel.should_publish(&policy, pascal, now, false) {
                    return;
                }

                // The pair goes out together or not at all.
                let Some(altitude_m) = altitude_m.filter(|value| value.is_finite()) else {
                    debug!("altitude read failed, abandoning barometer publish");
                    return;
                };

                channel.record(&policy, pascal, now);
                actions.push(NodeAction::Publish(RadioMessage::Barometer {
                    channel: channel.radio_channel(),
                    pascal,
                    altitude_m,
                }));
            }
            Measurement::Co2(ppm) => {
                let force = self.calibration.is_active();
                if Self::gate(&mut self.channels.co2, &self.config.co2, phase, ppm, now, force) {
                    actions.push(NodeAction::Publish(RadioMessage::Co2 { ppm }));
                }
            }
            Measurement::Battery(voltage) => {
                if voltage.is_finite() {
                    actions.push(NodeAction::Publish(RadioMessage::Battery { voltage }));
                }
            }
        }
    }

    fn gate(
        channel: &mut ChannelPublishState,
        config: &ChannelConfig,
        phase: SamplingPhase,
        sample: f32,
        now: Tick,
        force: bool,
    ) -> bool {
        if !sample.is_finite() {
            debug!("discarding non-finite sample");
            return false;
        }
        channel.offer(&PublishPolicy::for_phase(config, phase), sample, now, force)
    }

    fn switch_to_normal(&mut self, handle: TaskHandle, now: Tick, actions: &mut Vec<NodeAction>) {
        if self.phase.switch_to_normal() {
            for sensor in [Sensor::Temperature, Sensor::Humidity, Sensor::Barometer, Sensor::Co2] {
                let interval_ms = self.phase_interval_ms(sensor);
                self.set_interval(sensor, interval_ms, now, actions);
            }
            info!("switched to {} sampling phase", self.phase().as_str());
        }

        self.scheduler.unregister(handle);
        self.phase_task = None;
    }

    fn apply_calibration(
        &mut self,
        steps: Vec<CalibrationAction>,
        now: Tick,
        actions: &mut Vec<NodeAction>,
    ) {
        for step in steps {
            match step {
                CalibrationAction::SetLed(mode) => actions.push(NodeAction::SetLed(mode)),
                CalibrationAction::ArmStep(delay_ms) => {
                    let rearmed = self
                        .calibration_task
                        .map(|handle| self.scheduler.reschedule(handle, delay_ms, now))
                        .unwrap_or(false);
                    if !rearmed {
                        self.calibration_task = Some(self.scheduler.register(
                            NodeTask::CalibrationStep,
                            delay_ms,
                            now,
                        ));
                    }
                }
                CalibrationAction::DisarmStep => {
                    if let Some(handle) = self.calibration_task.take() {
                        self.scheduler.unregister(handle);
                    }
                }
                CalibrationAction::Co2ServiceInterval => {
                    let interval_ms = self.config.co2.service_interval_ms;
                    self.set_interval(Sensor::Co2, interval_ms, now, actions);
                }
                CalibrationAction::Co2NormalInterval => {
                    let interval_ms = self.config.co2.normal_interval_ms;
                    self.set_interval(Sensor::Co2, interval_ms, now, actions);
                }
                CalibrationAction::RunCalibration => actions.push(NodeAction::CalibrateCo2),
                CalibrationAction::Publish(status) => {
                    actions.push(NodeAction::Publish(RadioMessage::Calibration(status)))
                }
            }
        }
    }

    fn set_interval(
        &mut self,
        sensor: Sensor,
        interval_ms: u64,
        now: Tick,
        actions: &mut Vec<NodeAction>,
    ) {
        if self.intervals.get(&sensor) == Some(&interval_ms) {
            return;
        }
        self.intervals.insert(sensor, interval_ms);
        actions.push(NodeAction::SetSamplingInterval {
            sensor,
            interval_ms,
        });

        if let Some(handle) = self.sample_tasks.get(&sensor) {
            self.scheduler.reschedule(*handle, interval_ms, now);
        }
    }

    fn phase_interval_ms(&self, sensor: Sensor) -> u64 {
        let phase = self.phase();
        match sensor {
            Sensor::Temperature => self.config.temperature.interval_ms(phase),
            Sensor::Humidity => self.config.humidity.interval_ms(phase),
            Sensor::Barometer => self.config.barometer.interval_ms(phase),
            Sensor::Co2 => self.config.co2.interval_ms(phase),
            Sensor::Battery => self.config.battery_interval_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn booted() -> MonitorNode {
        let mut node = MonitorNode::new(NodeConfig::default());
        node.boot(0);
        node
    }

    #[test]
    fn boot_is_one_shot() {
        let mut node = MonitorNode::new(NodeConfig::default());

        let actions = node.boot(0);
        assert_eq!(actions.first(), Some(&NodeAction::SetLed(LedMode::Off)));
        assert_eq!(actions.last(), Some(&NodeAction::SetLed(LedMode::Pulse(2_000))));
        assert!(node.boot(10).is_empty());
    }

    #[test]
    fn first_poll_measures_every_sensor() {
        let mut node = booted();

        let actions = node.poll(0);

        for sensor in Sensor::ALL {
            assert!(actions.contains(&NodeAction::Measure(sensor)));
        }
        assert_eq!(node.next_due(), Some(5_000));
    }

    #[test]
    fn non_finite_sample_is_treated_as_unreadable() {
        let mut node = booted();

        let actions = node.handle_event(NodeEvent::Measurement(Measurement::Humidity(f32::NAN)), 0);

        assert!(actions.is_empty());
        assert_eq!(node.channel(Sensor::Humidity).unwrap().last_value(), None);
    }

    #[test]
    fn co2_override_covers_pending_session() {
        let mut node = booted();
        assert_eq!(
            node.handle_event(NodeEvent::Measurement(Measurement::Co2(400.0)), 0).len(),
            1
        );
        node.handle_event(NodeEvent::Button(ButtonEvent::Hold), 1_000);

        let actions = node.handle_event(NodeEvent::Measurement(Measurement::Co2(401.0)), 2_000);

        assert_eq!(actions, vec![NodeAction::Publish(RadioMessage::Co2 { ppm: 401.0 })]);
    }

    #[test]
    fn calibration_step_forces_fast_co2_sampling() {
        let mut node = booted();
        node.poll(3_600_000);
        assert_eq!(node.sampling_interval(Sensor::Co2), Some(300_000));

        node.handle_event(NodeEvent::Button(ButtonEvent::Hold), 3_600_000);
        let actions = node.poll(3_840_000);

        assert!(actions.contains(&NodeAction::SetSamplingInterval {
            sensor: Sensor::Co2,
            interval_ms: 60_000,
        }));
        assert!(actions.contains(&NodeAction::CalibrateCo2));
        assert_eq!(
            node.calibration_state(),
            CalibrationState::Running {
                remaining_steps: 31
            }
        );
    }
}
