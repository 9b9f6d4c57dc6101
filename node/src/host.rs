use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, info, warn};

use co2_monitor_common::{
    ButtonEvent, Led, LedMode, Measurement, MonitorNode, NodeConfig, Radio, RadioMessage, Runtime,
    Sensor, SensorError, Sensors, Tick, TOPIC_NODE_STATUS,
};

const IDLE_WAIT_MS: u64 = 1_000;
const SHUTDOWN_FLUSH_MS: u64 = 500;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config().await;

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new(
        format!("{}-node-rust", config.device_name),
        mqtt_host,
        mqtt_port,
    );

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 64);

    mqtt.publish(TOPIC_NODE_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish node online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("node mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    let mut inputs = spawn_button_reader();
    let mut button = ButtonTracker::new(config.button_hold_ms);
    info!(
        "button: type down/up (held {}s = hold), or press, click, hold",
        config.button_hold_ms / 1000
    );

    let radio = MqttRadio {
        client: mqtt,
        prefix: format!("node/{}", config.device_name),
    };
    let mut runtime = Runtime::new(
        MonitorNode::new(config),
        SimulatedSensors::default(),
        radio,
        LogLed,
    );
    runtime.boot(monotonic_ms());

    loop {
        let now = monotonic_ms();
        if let Some(event) = button.poll(now) {
            runtime.button(event, now);
        }
        runtime.run_due(now);

        let wait_ms = [runtime.next_due(), button.hold_due()]
            .into_iter()
            .flatten()
            .min()
            .map(|due| due.saturating_sub(monotonic_ms()))
            .unwrap_or(IDLE_WAIT_MS);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
            Some(input) = inputs.recv() => {
                let now = monotonic_ms();
                let event = match input {
                    ButtonInput::Down => button.down(now),
                    ButtonInput::Up => button.up(now),
                    ButtonInput::Event(event) => Some(event),
                };
                if let Some(event) = event {
                    runtime.button(event, now);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("node shutting down");
                runtime.abort_calibration(monotonic_ms());
                // let the eventloop flush the final status
                tokio::time::sleep(Duration::from_millis(SHUTDOWN_FLUSH_MS)).await;
                break;
            }
        }
    }

    Ok(())
}

async fn load_config() -> NodeConfig {
    match std::env::var("CO2_MONITOR_CONFIG") {
        Ok(path) => load_config_from(&path).await,
        Err(_) => NodeConfig::default(),
    }
}

async fn load_config_from(path: &str) -> NodeConfig {
    let loaded = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read node config at {path}"))
        .and_then(|raw| NodeConfig::from_json(&raw).map_err(anyhow::Error::from));

    loaded.unwrap_or_else(|err| {
        warn!("falling back to default node config: {err:#}");
        NodeConfig::default()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonInput {
    Down,
    Up,
    Event(ButtonEvent),
}

/// Turns raw down/up edges into press, click and hold events.
#[derive(Debug)]
struct ButtonTracker {
    hold_ms: u64,
    pressed_at: Option<Tick>,
    held: bool,
}

impl ButtonTracker {
    fn new(hold_ms: u64) -> Self {
        Self {
            hold_ms: hold_ms.max(1),
            pressed_at: None,
            held: false,
        }
    }

    fn down(&mut self, now: Tick) -> Option<ButtonEvent> {
        if self.pressed_at.is_some() {
            return None;
        }
        self.pressed_at = Some(now);
        self.held = false;
        Some(ButtonEvent::Press)
    }

    fn up(&mut self, now: Tick) -> Option<ButtonEvent> {
        let pressed_at = self.pressed_at.take()?;
        if self.held {
            return None;
        }
        if now.saturating_sub(pressed_at) >= self.hold_ms {
            Some(ButtonEvent::Hold)
        } else {
            Some(ButtonEvent::Click)
        }
    }

    fn hold_due(&self) -> Option<Tick> {
        if self.held {
            return None;
        }
        self.pressed_at
            .map(|pressed_at| pressed_at.saturating_add(self.hold_ms))
    }

    /// Hold fires once while the button is still down.
    fn poll(&mut self, now: Tick) -> Option<ButtonEvent> {
        let due = self.hold_due()?;
        if now < due {
            return None;
        }
        self.held = true;
        Some(ButtonEvent::Hold)
    }
}

fn spawn_button_reader() -> mpsc::Receiver<ButtonInput> {
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(input) = parse_button(&line) else {
                        warn!("unknown button input `{}`", line.trim());
                        continue;
                    };
                    if tx.send(input).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("button input error: {err}");
                    break;
                }
            }
        }
    });

    rx
}

fn parse_button(line: &str) -> Option<ButtonInput> {
    match line.trim().to_ascii_lowercase().as_str() {
        "down" => Some(ButtonInput::Down),
        "up" => Some(ButtonInput::Up),
        "press" => Some(ButtonInput::Event(ButtonEvent::Press)),
        "click" => Some(ButtonInput::Event(ButtonEvent::Click)),
        "hold" => Some(ButtonInput::Event(ButtonEvent::Hold)),
        _ => None,
    }
}

struct MqttRadio {
    client: AsyncClient,
    prefix: String,
}

impl Radio for MqttRadio {
    fn publish(&mut self, message: &RadioMessage) {
        for (topic, payload) in message.topics() {
            let topic = format!("{}/{topic}", self.prefix);
            debug!("radio publish {topic} = {payload}");
            if let Err(err) = self
                .client
                .try_publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
            {
                warn!("radio publish to {topic} failed: {err}");
            }
        }
    }

    fn pairing_request(&mut self, device_name: &str, version: &str) {
        let payload = serde_json::json!({ "name": device_name, "version": version }).to_string();
        let topic = format!("{}/pairing", self.prefix);
        if let Err(err) = self
            .client
            .try_publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
        {
            warn!("pairing request failed: {err}");
        }
    }
}

struct LogLed;

impl Led for LogLed {
    fn set_mode(&mut self, mode: LedMode) {
        match mode {
            LedMode::Off => info!("led off"),
            LedMode::Pulse(ms) => info!("led pulse {ms}ms"),
            LedMode::BlinkSlow => info!("led blink slow"),
            LedMode::BlinkFast => info!("led blink fast"),
        }
    }
}

/// Stand-in for the tag drivers on a host build.
#[derive(Default)]
struct SimulatedSensors {
    reads: u64,
    co2_offset: f32,
}

impl Sensors for SimulatedSensors {
    fn read(&mut self, sensor: Sensor) -> Result<Measurement, SensorError> {
        self.reads = self.reads.saturating_add(1);

        // Hardware integration point: replace with the I2C tag and LP8 drivers.
        if self.reads % 29 == 0 {
            return Err(SensorError::Unavailable(sensor));
        }

        let wave = (self.reads % 12) as f32;
        let measurement = match sensor {
            Sensor::Temperature => Measurement::Temperature(21.0 + wave * 0.05),
            Sensor::Humidity => Measurement::Humidity(45.0 + wave * 0.8),
            Sensor::Barometer => {
                let pascal = 98_200.0 + wave * 4.0;
                Measurement::Barometer {
                    pascal,
                    altitude_m: (self.reads % 53 != 0).then(|| pressure_altitude_m(pascal)),
                }
            }
            Sensor::Co2 => Measurement::Co2(650.0 + wave * 12.0 - self.co2_offset),
            Sensor::Battery => Measurement::Battery(3.0 - (self.reads as f32 * 0.0001).min(0.6)),
        };
        Ok(measurement)
    }

    fn set_sampling_interval(&mut self, sensor: Sensor, interval_ms: u64) {
        info!("{sensor} update interval {}s", interval_ms as f64 / 1000.0);
    }

    fn calibrate_co2(&mut self) {
        self.co2_offset = (self.co2_offset + 10.0).min(250.0);
        info!("co2 background calibration step");
    }
}

fn pressure_altitude_m(pascal: f32) -> f32 {
    44_330.0 * (1.0 - (pascal / 101_325.0).powf(0.1903))
}

fn monotonic_ms() -> Tick {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
