use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Weather,
    Stocks,
    Fred,
    Weight,
}

impl Panel {
    pub const ALL: [Panel; 4] = [Panel::Weather, Panel::Stocks, Panel::Fred, Panel::Weight];

    pub fn slug(self) -> &'static str {
        match self {
            Panel::Weather => "weather",
            Panel::Stocks => "stocks",
            Panel::Fred => "fred",
            Panel::Weight => "weight",
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Panel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Panel::ALL
            .into_iter()
            .find(|p| p.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown panel '{}'", s))
    }
}

/// Alternate layouts of a panel. Only the weight panel has a second view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelView {
    #[default]
    Forecast,
    Velocity,
}

impl FromStr for PanelView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forecast" => Ok(PanelView::Forecast),
            "velocity" => Ok(PanelView::Velocity),
            other => Err(format!("unknown view '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Raw EPBM frame for the device.
    Epbm,
    Svg,
    /// Dithered preview.
    Png,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Epbm => "application/octet-stream",
            OutputFormat::Svg => "image/svg+xml",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Epbm => "bin",
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bin" | "epbm" => Ok(OutputFormat::Epbm),
            "svg" => Ok(OutputFormat::Svg),
            "png" | "debug" => Ok(OutputFormat::Png),
            other => Err(format!("unknown format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub battery_pct: Option<u8>,
    pub show_alerts: bool,
    pub view: PanelView,
    /// Clock used for "last updated" footers and relative chart axes.
    pub now: DateTime<Utc>,
}

impl RenderOptions {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            battery_pct: None,
            show_alerts: true,
            view: PanelView::Forecast,
            now,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
    /// True when the content is the fallback test pattern or error page.
    pub fallback: bool,
}

impl Rendered {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}
