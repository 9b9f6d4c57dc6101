use crate::{
    config::ChannelConfig,
    types::{RadioChannel, SamplingPhase, Tick},
};

/// Threshold and heartbeat in effect for one gate decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishPolicy {
    pub threshold: f32,
    pub heartbeat_ms: u64,
}

impl PublishPolicy {
    pub fn for_phase(config: &ChannelConfig, phase: SamplingPhase) -> Self {
        Self {
            threshold: config.threshold,
            heartbeat_ms: config.heartbeat_ms(phase),
        }
    }
}

/// Per-channel memory of the last published value.
///
/// `next_deadline` is always the tick of the last publish plus the heartbeat
/// used at that moment; a fresh state has no previous value and a deadline of
/// zero, so the first sample always goes out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelPublishState {
    last_value: Option<f32>,
    next_deadline: Tick,
    radio_channel: RadioChannel,
}

impl ChannelPublishState {
    pub fn new(radio_channel: RadioChannel) -> Self {
        Self {
            last_value: None,
            next_deadline: 0,
            radio_channel,
        }
    }

    pub fn last_value(&self) -> Option<f32> {
        self.last_value
    }

    pub fn next_deadline(&self) -> Tick {
        self.next_deadline
    }

    pub fn radio_channel(&self) -> RadioChannel {
        self.radio_channel
    }

    /// Pure decision. `force` bypasses both tests (CO2 during calibration).
    pub fn should_publish(&self, policy: &PublishPolicy, sample: f32, now: Tick, force: bool) -> bool {
        if force || now >= self.next_deadline {
            return true;
        }

        match self.last_value {
            Some(last) => (sample - last).abs() >= policy.threshold,
            None => true,
        }
    }

    pub fn record(&mut self, policy: &PublishPolicy, sample: f32, now: Tick) {
        self.last_value = Some(sample);
        self.next_deadline = now.saturating_add(policy.heartbeat_ms);
    }

    /// Decides and, on a positive verdict, records the publish in one step.
    pub fn offer(&mut self, policy: &PublishPolicy, sample: f32, now: Tick, force: bool) -> bool {
        if !self.should_publish(policy, sample, now, force) {
            return false;
        }
        self.record(policy, sample, now);
        true
    }
}
