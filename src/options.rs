use clap::Parser;

/// MPP Solar bridge - exposes a PI30 inverter as a Venus OS multi device
#[derive(Debug, Default, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Serial device, overrides device.port
    #[clap(short = 's', long = "serial")]
    pub serial: Option<String>,

    /// Baud rate, overrides device.baudrate
    #[clap(short = 'b', long = "baudrate")]
    pub baudrate: Option<u32>,

    /// Use a simulated inverter instead of real hardware
    #[clap(long = "fake")]
    pub fake: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
