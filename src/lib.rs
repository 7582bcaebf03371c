pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod sources;
pub mod utils;

pub use config::{cli::LocalStorage, device::DeviceProfile, AppConfig};
#[cfg(feature = "cli")]
pub use config::{Cli, Command};

pub use core::{engine::RenderEngine, PanelSource, Storage};
pub use domain::model::{OutputFormat, Panel, PanelView, RenderOptions, Rendered};
pub use server::{build_router, start_server, AppState};
pub use utils::error::{FrameError, Result};
