pub mod cli;
pub mod device;
pub mod toml_config;

pub use toml_config::{AppConfig, MonitoringConfig, ServerConfig};

#[cfg(feature = "cli")]
use crate::domain::model::{OutputFormat, Panel, PanelView};
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "iot-image")]
#[command(version, about = "Renders dashboards for six-colour e-paper picture frames")]
pub struct Cli {
    /// TOML configuration file (defaults to ./iot-image.toml when present)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, short, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log CPU and memory usage per render phase")]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve frames over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Render one panel to a file under the output directory
    Render {
        #[arg(long)]
        panel: Panel,
        /// bin, svg or png
        #[arg(long, default_value = "bin")]
        format: OutputFormat,
        /// File name relative to the output directory
        #[arg(long)]
        output: Option<String>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        battery_pct: Option<u8>,
        #[arg(long, default_value = "forecast")]
        view: PanelView,
    },
    /// Write the client's config.h generated from the device profile
    DeviceHeader {
        #[arg(long, default_value = "config.h")]
        output: String,
    },
    /// Validate the configuration and exit
    Check,
}

#[cfg(feature = "cli")]
impl Cli {
    /// CLI values win over the file.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if self.monitor {
            config.monitoring.enabled = true;
        }
        if let Command::Serve { host, port } = &self.command {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }
    }
}
