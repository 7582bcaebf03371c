pub mod bitmap;
pub mod dither;
pub mod engine;
pub mod raster;
pub mod svg;

pub use crate::domain::ports::{PanelSource, Storage};
pub use crate::utils::error::Result;
pub use engine::{PanelCache, RenderEngine};
