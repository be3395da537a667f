use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub mqtt: Mqtt,
    #[serde(default)]
    pub estimation: Estimation,

    #[serde(default = "Config::default_pending_capacity")]
    pub pending_capacity: usize,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Replace the device with a built-in simulator.
    #[serde(default)]
    pub fake: bool,
}

// Device {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    MppSolar,
    Serial,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub port: String,
    #[serde(default = "Config::default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "Config::default_transport")]
    pub transport: Transport,
    #[serde(default = "Config::default_mpp_solar_path")]
    pub mpp_solar_path: String,
    #[serde(default = "Config::default_dialects")]
    pub dialects: Vec<DialectKind>,

    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    pub poll_interval: Option<Duration>,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_command_timeout")]
    pub command_timeout: Duration,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            port: String::new(),
            baudrate: Config::default_baudrate(),
            transport: Config::default_transport(),
            mpp_solar_path: Config::default_mpp_solar_path(),
            dialects: Config::default_dialects(),
            poll_interval: None,
            command_timeout: Config::default_command_timeout(),
        }
    }
}

impl Device {
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn mpp_solar_path(&self) -> &str {
        &self.mpp_solar_path
    }

    pub fn dialects(&self) -> &[DialectKind] {
        &self.dialects
    }

    /// The external tool costs a process spawn per query, so it polls slower.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval.unwrap_or(match self.transport {
            Transport::MppSolar => Duration::from_secs(10),
            Transport::Serial => Duration::from_secs(2),
        })
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_mqtt_host")]
    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,
    #[serde(default = "Config::default_mqtt_service")]
    pub service: String,
    #[serde(default)]
    pub device_instance: u32,

    /// Topic carrying total DC system power, if the installation has one.
    pub system_power_topic: Option<String>,
}

impl Default for Mqtt {
    fn default() -> Self {
        Self {
            enabled: Config::default_enabled(),
            host: Config::default_mqtt_host(),
            port: Config::default_mqtt_port(),
            username: None,
            password: None,
            namespace: Config::default_mqtt_namespace(),
            service: Config::default_mqtt_service(),
            device_instance: 0,
            system_power_topic: None,
        }
    }
}

impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn device_instance(&self) -> u32 {
        self.device_instance
    }

    pub fn system_power_topic(&self) -> Option<&str> {
        self.system_power_topic.as_deref()
    }
} // }}}

// Estimation {{{
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Estimation {
    #[serde(default = "Config::default_baseline_power")]
    pub baseline_power: f64,
    #[serde(default = "Config::default_baseline_power")]
    pub floor: f64,
    #[serde(default = "Config::default_ceiling")]
    pub ceiling: f64,

    /// Treat "load off" as the inverter being bypassed. Installation specific.
    #[serde(default)]
    pub assume_bypass_when_load_off: bool,

    #[serde(default)]
    pub infer_charge_current: bool,
}

impl Default for Estimation {
    fn default() -> Self {
        Self {
            baseline_power: Config::default_baseline_power(),
            floor: Config::default_baseline_power(),
            ceiling: Config::default_ceiling(),
            assume_bypass_when_load_off: false,
            infer_charge_current: false,
        }
    }
} // }}}

#[derive(Debug)]
pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    /// Load the file, apply command-line overrides, then validate.
    pub fn new(options: &Options) -> Result<Self> {
        let mut config = Config::new(options.config_file.clone())?;
        config.apply_options(options);
        config.validate()?;

        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn device(&self) -> Device {
        self.lock().device.clone()
    }

    pub fn mqtt(&self) -> Mqtt {
        self.lock().mqtt.clone()
    }

    pub fn estimation(&self) -> Estimation {
        self.lock().estimation.clone()
    }

    pub fn pending_capacity(&self) -> usize {
        self.lock().pending_capacity
    }

    pub fn loglevel(&self) -> String {
        self.lock().loglevel.clone()
    }

    pub fn fake(&self) -> bool {
        self.lock().fake
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        let config = Self::from_yaml(&content)?;

        info!("Configuration loaded:");
        info!(
            "  Device: {} @ {} baud via {:?}, dialects {:?}",
            config.device.port, config.device.baudrate, config.device.transport, config.device.dialects
        );
        info!("    Poll interval: {:?}", config.device.poll_interval());
        info!("  MQTT: {}", if config.mqtt.enabled { "enabled" } else { "disabled" });
        if config.mqtt.enabled {
            info!("    Host: {}:{}", config.mqtt.host, config.mqtt.port);
            info!(
                "    Topic: {}/N/{}/{}",
                config.mqtt.namespace, config.mqtt.service, config.mqtt.device_instance
            );
            if let Some(topic) = &config.mqtt.system_power_topic {
                info!("    System power: {}", topic);
            }
        }
        info!("  Estimation: {:?}", config.estimation);
        info!("  Log Level: {}", config.loglevel);

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // an empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(serde_yaml::from_str("{}")?);
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_options(&mut self, options: &Options) {
        if let Some(port) = &options.serial {
            self.device.port = port.clone();
        }
        if let Some(baudrate) = options.baudrate {
            self.device.baudrate = baudrate;
        }
        if options.fake {
            self.fake = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fake && self.device.port.is_empty() {
            bail!("device.port must be set (or use --serial)");
        }
        if self.device.baudrate == 0 {
            bail!("device.baudrate must be greater than 0");
        }
        if self.device.dialects.is_empty() {
            bail!("device.dialects must list at least one dialect");
        }
        if self.device.poll_interval() == Duration::ZERO {
            bail!("device.poll_interval must be greater than 0");
        }

        let e = &self.estimation;
        for (name, value) in [
            ("baseline_power", e.baseline_power),
            ("floor", e.floor),
            ("ceiling", e.ceiling),
        ] {
            if !value.is_finite() {
                bail!("estimation.{} must be a finite number", name);
            }
        }
        if e.floor > e.ceiling {
            bail!("estimation.floor ({}) exceeds estimation.ceiling ({})", e.floor, e.ceiling);
        }

        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                bail!("mqtt.host cannot be empty");
            }
        }

        if self.pending_capacity == 0 {
            bail!("pending_capacity must be greater than 0");
        }

        Ok(())
    }

    fn default_baudrate() -> u32 {
        2400
    }

    fn default_transport() -> Transport {
        Transport::MppSolar
    }

    fn default_mpp_solar_path() -> String {
        "mpp-solar".to_string()
    }

    fn default_dialects() -> Vec<DialectKind> {
        vec![DialectKind::Pi30Revo, DialectKind::Pi30]
    }

    fn default_command_timeout() -> Duration {
        Duration::from_secs(5)
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_mqtt_host() -> String {
        "localhost".to_string()
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "venus".to_string()
    }

    fn default_mqtt_service() -> String {
        "multi".to_string()
    }

    fn default_baseline_power() -> f64 {
        27.0
    }

    fn default_ceiling() -> f64 {
        100.0
    }

    fn default_pending_capacity() -> usize {
        64
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
