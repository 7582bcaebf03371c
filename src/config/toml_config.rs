use crate::config::device::DeviceProfile;
use crate::domain::model::Panel;
use crate::sources::fred::FredSettings;
use crate::sources::stocks::StocksSettings;
use crate::sources::weather::WeatherSettings;
use crate::sources::weight::WeightSettings;
use crate::utils::error::{FrameError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "iot-image.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub weather: Option<WeatherSettings>,
    pub stocks: Option<StocksSettings>,
    pub fred: Option<FredSettings>,
    pub weight: Option<WeightSettings>,
    #[serde(default)]
    pub device: DeviceProfile,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How long fetched panel data is reused.
    pub cache_ttl_seconds: u64,
    pub request_timeout_seconds: u64,
    /// Base directory for `render` and `device-header` outputs.
    pub output_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cache_ttl_seconds: 900,
            request_timeout_seconds: 30,
            output_path: "./output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub json_logs: bool,
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(FrameError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| FrameError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// An explicit path must exist. Without one, `iot-image.toml` in the
    /// working directory is used when present, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => {
                tracing::info!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                Ok(Self::default())
            }
        }
    }

    /// 替換環境變數 (例如 ${API_KEY})，未定義的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| FrameError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Panels whose source table is present.
    pub fn enabled_panels(&self) -> Vec<Panel> {
        Panel::ALL
            .into_iter()
            .filter(|panel| match panel {
                Panel::Weather => self.weather.is_some(),
                Panel::Stocks => self.stocks.is_some(),
                Panel::Fred => self.fred.is_some(),
                Panel::Weight => self.weight.is_some(),
            })
            .collect()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.server.cache_ttl_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("server.host", &self.server.host)?;
        validation::validate_range("server.port", self.server.port, 1, u16::MAX)?;
        validation::validate_path("server.output_path", &self.server.output_path)?;
        validation::validate_positive_number(
            "server.request_timeout_seconds",
            self.server.request_timeout_seconds as usize,
            1,
        )?;

        if let Some(weather) = &self.weather {
            weather.validate()?;
        }
        if let Some(stocks) = &self.stocks {
            stocks.validate()?;
        }
        if let Some(fred) = &self.fred {
            fred.validate()?;
        }
        if let Some(weight) = &self.weight {
            weight.validate()?;
        }
        self.device.validate()?;

        if self.enabled_panels().is_empty() {
            tracing::warn!("⚠️ No panel sources configured, only the test pattern will be served");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::device::{BufferSizing, UpdateSchedule};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache_ttl(), Duration::from_secs(900));
        assert!(config.enabled_panels().is_empty());
        assert_eq!(config.device, DeviceProfile::reterminal_e1002());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[server]
port = 9000
cache_ttl_seconds = 60

[weather]
api_key = "abc"
lat = 37.77
lon = -122.42
location_name = "San Francisco"

[stocks]
api_key = "def"
symbols = ["BTC/USD", "QQQ"]

[fred]
api_key = "ghi"
observations = 90

[weight]
csv_path = "data/weight.csv"

[device.network]
server_host = "frames.lan"

[device.schedule]
mode = "wake_hours"
hours = [6, 18]
utc_offset_seconds = -28800
dst_offset_seconds = 3600
fallback_sleep_seconds = 3600

[device.buffer]
mode = "image"
total_bytes = 384008

[monitoring]
enabled = true
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.enabled_panels(), Panel::ALL.to_vec());
        assert_eq!(config.stocks.as_ref().unwrap().outputsize, 60);
        assert_eq!(config.fred.as_ref().unwrap().observations, 90);
        assert_eq!(config.device.network.server_host, "frames.lan");
        assert_eq!(config.device.network.server_port, 8080);
        assert_eq!(config.device.buffer, BufferSizing::Image { total_bytes: 384_008 });
        assert!(matches!(config.device.schedule, UpdateSchedule::WakeHours { ref hours, .. } if hours == &vec![6, 18]));
        assert!(config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("IOT_IMAGE_TEST_FRED_KEY", "secret-key");

        let toml_content = r#"
[fred]
api_key = "${IOT_IMAGE_TEST_FRED_KEY}"

[stocks]
api_key = "${IOT_IMAGE_TEST_UNSET_VAR}"
symbols = ["QQQ"]
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.fred.unwrap().api_key, "secret-key");
        assert_eq!(config.stocks.unwrap().api_key, "${IOT_IMAGE_TEST_UNSET_VAR}");

        std::env::remove_var("IOT_IMAGE_TEST_FRED_KEY");
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[weather]
api_key = "abc"
lat = 137.0
lon = 0.0
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());

        let toml_content = r#"
[device.sd_card]
cs = 10
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml_str("[server\nport = 1").unwrap_err();
        assert!(matches!(err, FrameError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[server]\noutput_path = \"./frames\"\n")
            .unwrap();

        let config = AppConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.server.output_path, "./frames");
        assert!(AppConfig::load(Some(Path::new("/nonexistent/iot-image.toml"))).is_err());
    }
}
