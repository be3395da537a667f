// Module declarations for the application's core components
pub mod channels;    // Inter-component communication channels
pub mod command;     // Bus control paths and parsed commands
pub mod config;      // Configuration management
pub mod coordinator; // Poll cycle and command dispatch
pub mod dialect;     // PI30 dialect adapters and detection
pub mod error;       // Error helpers
pub mod mqtt;        // MQTT bus adapter
pub mod options;     // Command line options parsing
pub mod prelude;     // Common imports and types
pub mod protocol;    // Device transports
pub mod state;       // Published device state

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::config::Transport;
use crate::coordinator::Coordinator;
use crate::mqtt::Mqtt;
use crate::prelude::*;
use crate::protocol::{MppSolarTool, Scripted, SerialPi30};

use tokio_util::sync::CancellationToken;

/// Long-lived pieces that take part in shutdown.
#[derive(Clone)]
pub struct Components {
    pub coordinator: Coordinator,
    pub channels: Channels,
}

impl Components {
    pub fn new(coordinator: Coordinator, channels: Channels) -> Self {
        Self {
            coordinator,
            channels,
        }
    }

    /// Stop the coordinator first so no new device commands start, then
    /// everything else watching the shutdown token.
    pub fn stop(&self) {
        info!("Stopping all components...");
        self.coordinator.stop();
        let _ = self.channels.to_mqtt.send(mqtt::ChannelData::Shutdown);
        self.channels.shutdown.cancel();
    }
}

fn init_logging() {
    // filter wide open here; the effective level is set via log::set_max_level
    // once the config is read, unless RUST_LOG says otherwise
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

fn apply_loglevel(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    match log::LevelFilter::from_str(level) {
        Ok(filter) => log::set_max_level(filter),
        Err(_) => warn!("unknown loglevel {:?}, keeping info", level),
    }
}

/// Open the device through the configured transport and pick its dialect.
pub async fn connect(config: &ConfigWrapper) -> Result<Device> {
    let d = config.device();

    if config.fake() {
        info!("using a simulated device");
        return dialect::detect(d.dialects(), |dialect| Ok(Scripted::simulator(&dialect)?.boxed()))
            .await;
    }

    info!("probing {} for {:?}", d.port(), d.dialects());
    match d.transport() {
        Transport::MppSolar => {
            dialect::detect(d.dialects(), |dialect| {
                let tool = MppSolarTool::new(
                    d.mpp_solar_path(),
                    d.port(),
                    d.baudrate(),
                    d.command_timeout(),
                    &dialect,
                );
                Ok(Box::new(tool) as Box<dyn Protocol>)
            })
            .await
        }
        Transport::Serial => {
            dialect::detect(d.dialects(), |dialect| {
                let port = SerialPi30::open(d.port(), d.baudrate(), d.command_timeout(), dialect)?;
                Ok(Box::new(port) as Box<dyn Protocol>)
            })
            .await
        }
    }
}

/// Main application entry point
///
/// Loads configuration, detects the device, then runs the MQTT adapter and
/// the coordinator until `shutdown` is cancelled or polling fails.
pub async fn app(options: Options, shutdown: CancellationToken) -> Result<()> {
    init_logging();

    info!(
        "mppsolar-bridge {} starting with config file: {}",
        CARGO_PKG_VERSION, options.config_file
    );

    let config = ConfigWrapper::new(&options)
        .map_err(|err| anyhow!("failed to load config: {:#}", err))?;
    apply_loglevel(&config.loglevel());

    info!("Initializing channels...");
    let channels = Channels::with_shutdown(shutdown);

    info!("Initializing components...");
    let coordinator = Coordinator::new(config.clone(), channels.clone());
    let mqtt = Mqtt::new(config.clone(), channels.clone(), coordinator.stats.clone());
    let components = Components::new(coordinator.clone(), channels.clone());

    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt.start().await {
            error!("MQTT task failed: {:#}", e);
        }
    });

    let result = match connect(&config).await {
        Ok(device) => coordinator.start(device).await,
        Err(err) => Err(err.context("device detection failed")),
    };

    components.stop();
    if let Err(e) = mqtt_handle.await {
        error!("Error waiting for MQTT task: {}", e);
    }

    info!("Application shutdown complete");
    result
}
