pub mod fred;
pub mod stocks;
pub mod weather;
pub mod weight;

use crate::domain::model::Panel;
use crate::utils::error::{FrameError, Result};
use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::path::Path;

/// Fetched data of any panel, as cached by the engine.
#[derive(Debug, Clone)]
pub enum PanelData {
    Weather(weather::WeatherData),
    Stocks(stocks::StocksData),
    Fred(fred::FredData),
    Weight(weight::WeightData),
}

impl PanelData {
    pub fn panel(&self) -> Panel {
        match self {
            PanelData::Weather(_) => Panel::Weather,
            PanelData::Stocks(_) => Panel::Stocks,
            PanelData::Fred(_) => Panel::Fred,
            PanelData::Weight(_) => Panel::Weight,
        }
    }

    pub(crate) fn mismatch(&self, expected: Panel) -> FrameError {
        FrameError::ProcessingError {
            message: format!("{} panel cannot draw {} data", expected, self.panel()),
        }
    }
}

/// Turns a non-2xx response into an upstream error carrying the body.
pub(crate) async fn expect_success(
    source_name: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FrameError::UpstreamError {
        source_name: source_name.to_string(),
        message: format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        ),
    })
}

/// SVG icons embedded as data URIs. The directory is read once, when the
/// set is built, so composing a frame never touches the disk.
#[derive(Debug, Clone, Default)]
pub struct IconSet {
    uris: HashMap<String, String>,
}

impl IconSet {
    /// Every `.svg` file in `dir`. Unreadable files are skipped.
    pub fn load(dir: Option<&Path>) -> Self {
        let Some(dir) = dir else {
            return Self::default();
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("⚠️ Icon directory {} unavailable: {}", dir.display(), e);
                return Self::default();
            }
        };

        let mut uris = HashMap::new();
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.extension().and_then(|ext| ext.to_str()) != Some("svg") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            match std::fs::read(&path) {
                Ok(content) => {
                    let uri = format!(
                        "data:image/svg+xml;base64,{}",
                        general_purpose::STANDARD.encode(content)
                    );
                    uris.insert(name.to_string(), uri);
                }
                Err(e) => tracing::debug!("Icon {} unreadable: {}", path.display(), e),
            }
        }
        tracing::debug!("Loaded {} icons from {}", uris.len(), dir.display());
        Self { uris }
    }

    /// `None` when no directory is configured or the icon is missing.
    pub fn data_uri(&self, file_name: &str) -> Option<&str> {
        self.uris.get(file_name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_icon_set_embeds_existing_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fog.svg"), "<svg/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an icon").unwrap();
        let icons = IconSet::load(Some(dir.path()));

        assert_eq!(icons.data_uri("fog.svg"), Some("data:image/svg+xml;base64,PHN2Zy8+"));
        assert!(icons.data_uri("snow.svg").is_none());
        assert!(icons.data_uri("notes.txt").is_none());
        assert!(IconSet::default().data_uri("fog.svg").is_none());
    }

    #[test]
    fn test_icons_are_read_once_at_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rain.svg");
        std::fs::write(&path, "<svg/>").unwrap();
        let icons = IconSet::load(Some(dir.path()));

        std::fs::remove_file(&path).unwrap();
        assert!(icons.data_uri("rain.svg").is_some());
    }

    #[test]
    fn test_missing_icon_directory_is_empty() {
        let icons = IconSet::load(Some(Path::new("/nonexistent/iot-image-icons")));
        assert!(icons.data_uri("fog.svg").is_none());
    }
}
