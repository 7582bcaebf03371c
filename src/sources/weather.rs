//! OpenWeather One Call 3.0 dashboard: today's detail on the left, a five
//! day outlook on the right.

use crate::core::svg::{GaugeBar, GradientAxis, SvgDocument};
use crate::domain::model::{Panel, RenderOptions};
use crate::domain::ports::PanelSource;
use crate::sources::{expect_success, IconSet, PanelData};
use crate::utils::error::{FrameError, Result};
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc};
use reqwest::Client;
use reverse_geocoder::ReverseGeocoder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSettings {
    pub api_key: String,
    pub lat: f64,
    pub lon: f64,
    /// Shown under the date. Defaults to the nearest known place.
    pub location_name: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Directory holding the `fill-svg-static` weather icons.
    pub icons_dir: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Validate for WeatherSettings {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("weather.api_key", &self.api_key)?;
        validation::validate_range("weather.lat", self.lat, -90.0, 90.0)?;
        validation::validate_range("weather.lon", self.lon, -180.0, 180.0)?;
        validation::validate_url("weather.base_url", &self.base_url)?;
        if let Some(dir) = &self.icons_dir {
            validation::validate_path("weather.icons_dir", &dir.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WeatherData {
    pub lat: f32,
    pub lon: f32,
    pub timezone_offset: i32,
    pub current: CurrentWeather,
    pub daily: Vec<DailyWeather>,
    #[serde(default)]
    pub alerts: Vec<WeatherAlert>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WeatherAlert {
    pub event: String,
    #[serde(default)]
    pub description: String,
    pub start: i64,
    pub end: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CurrentWeather {
    pub dt: i64,
    pub temp: f32,
    pub humidity: i32,
    pub weather: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DailyWeather {
    pub dt: i64,
    pub temp: TempRange,
    pub feels_like: FeelsLike,
    pub humidity: i32,
    pub wind_speed: f32,
    pub wind_gust: Option<f32>,
    pub sunrise: i64,
    pub sunset: i64,
    pub weather: Vec<Condition>,
    pub uvi: Option<f32>,
    pub clouds: Option<i32>,
}

impl DailyWeather {
    /// Gusts matter more on the frame than the sustained speed.
    pub fn effective_wind(&self) -> f32 {
        self.wind_gust.unwrap_or(self.wind_speed)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TempRange {
    pub day: f32,
    pub min: f32,
    pub max: f32,
    pub morn: f32,
    pub night: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FeelsLike {
    pub day: f32,
    pub night: f32,
    pub eve: f32,
    pub morn: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Condition {
    pub description: String,
    pub main: String,
    pub icon: String,
}

pub fn icon_file(icon_code: &str) -> &'static str {
    match icon_code {
        "01d" => "clear-day.svg",
        "01n" => "clear-night.svg",
        "02d" => "partly-cloudy-day.svg",
        "02n" => "partly-cloudy-night.svg",
        "03d" | "03n" => "cloudy.svg",
        "04d" | "04n" => "overcast-day.svg",
        "09d" | "09n" => "rain.svg",
        "10d" => "overcast-day-rain.svg",
        "10n" => "overcast-night-rain.svg",
        "11d" => "thunderstorms-day.svg",
        "11n" => "thunderstorms-night.svg",
        "13d" | "13n" => "snow.svg",
        "50d" | "50n" => "fog.svg",
        _ => "cloudy.svg",
    }
}

// Gauge scales, all returning a 0..=100 fill percentage.

/// 20°F empty, 100°F full.
pub fn temperature_fill(temp: f32) -> f64 {
    ((temp as f64 - 20.0) / 80.0 * 100.0).clamp(0.0, 100.0)
}

pub fn humidity_fill(humidity: i32) -> f64 {
    humidity.clamp(0, 100) as f64
}

/// 60 mph full.
pub fn wind_fill(wind_mph: f32) -> f64 {
    (wind_mph as f64 / 60.0 * 100.0).clamp(0.0, 100.0)
}

pub fn cloudiness_fill(clouds: i32) -> f64 {
    clouds.clamp(0, 100) as f64
}

/// UV index 11 and above is full.
pub fn uvi_fill(uvi: f32) -> f64 {
    (uvi as f64 / 11.0 * 100.0).clamp(0.0, 100.0)
}

pub fn beaufort(wind_mph: f32) -> u8 {
    match wind_mph as i32 {
        i32::MIN..=0 => 0,
        1..=3 => 1,
        4..=7 => 2,
        8..=12 => 3,
        13..=18 => 4,
        19..=24 => 5,
        25..=31 => 6,
        32..=38 => 7,
        39..=46 => 8,
        47..=54 => 9,
        55..=63 => 10,
        64..=72 => 11,
        _ => 12,
    }
}

fn twelve_hour(hour: u32) -> (u32, &'static str) {
    match hour {
        0 => (12, "am"),
        1..=11 => (hour, "am"),
        12 => (12, "pm"),
        _ => (hour - 12, "pm"),
    }
}

/// `(M/D Ham - M/D Hpm)`, start floored and end rounded up to the hour.
pub fn alert_time_range(alert: &WeatherAlert, tz: &FixedOffset) -> String {
    let start = local_time(alert.start, tz);
    let mut end = local_time(alert.end, tz);
    if end.minute() > 0 || end.second() > 0 {
        end += Duration::hours(1);
    }
    let (start_h, start_ampm) = twelve_hour(start.hour());
    let (end_h, end_ampm) = twelve_hour(end.hour());

    format!(
        "({}/{} {}{} - {}/{} {}{})",
        start.month(),
        start.day(),
        start_h,
        start_ampm,
        end.month(),
        end.day(),
        end_h,
        end_ampm
    )
}

fn local_time(timestamp: i64, tz: &FixedOffset) -> DateTime<FixedOffset> {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .with_timezone(tz)
}

/// Nearest populated place in the GeoNames table bundled with
/// `reverse_geocoder`.
pub fn nearest_place(lat: f64, lon: f64) -> String {
    let geocoder = ReverseGeocoder::new();
    let result = geocoder.search((lat, lon));
    tracing::debug!(
        "Reverse geocoded ({}, {}) to {} ({:.3} away)",
        lat,
        lon,
        result.record.name,
        result.distance
    );
    result.record.name.clone()
}

pub struct WeatherSource {
    settings: WeatherSettings,
    client: Client,
    icons: IconSet,
    location: String,
}

impl WeatherSource {
    pub fn new(settings: WeatherSettings, client: Client) -> Self {
        let icons = IconSet::load(settings.icons_dir.as_deref());
        let location = match &settings.location_name {
            Some(name) => name.clone(),
            None => nearest_place(settings.lat, settings.lon),
        };
        tracing::info!("🌤️ Weather panel location: {}", location);
        Self {
            settings,
            client,
            icons,
            location,
        }
    }

    pub async fn fetch_weather(&self) -> Result<WeatherData> {
        let url = format!(
            "{}/data/3.0/onecall",
            self.settings.base_url.trim_end_matches('/')
        );
        tracing::debug!("Requesting OpenWeather forecast for ({}, {})", self.settings.lat, self.settings.lon);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", self.settings.lat.to_string()),
                ("lon", self.settings.lon.to_string()),
                ("units", "imperial".to_string()),
                ("exclude", "minutely,hourly".to_string()),
                ("appid", self.settings.api_key.clone()),
            ])
            .send()
            .await?;
        let response = expect_success("OpenWeather", response).await?;
        let weather: WeatherData = response.json().await?;

        if weather.daily.is_empty() {
            return Err(FrameError::UpstreamError {
                source_name: "OpenWeather".to_string(),
                message: "response has no daily forecast".to_string(),
            });
        }
        tracing::debug!("Received {} daily entries, {} alerts", weather.daily.len(), weather.alerts.len());
        Ok(weather)
    }

    pub fn compose_svg(&self, weather: &WeatherData, options: &RenderOptions) -> Result<String> {
        let today = weather.daily.first().ok_or_else(|| FrameError::ProcessingError {
            message: "weather data has no daily forecast".to_string(),
        })?;
        let tz = FixedOffset::east_opt(weather.timezone_offset).unwrap_or_else(|| Utc.fix());

        let mut doc = SvgDocument::frame();
        define_gradients(&mut doc);

        // 左側：今日詳細
        let left_width = 480.0;
        let header_time = local_time(today.dt, &tz);
        doc.text(20.0, 35.0, 28, "start", r#"font-weight="bold" fill="black""#, &header_time.format("%A, %b %e").to_string());
        doc.text(20.0, 58.0, 16, "start", r#"fill="black""#, &self.location);

        if let Some(uri) = today
            .weather
            .first()
            .and_then(|w| self.icons.data_uri(icon_file(&w.icon)))
        {
            doc.push(format!(r#"<image x="350" y="2" width="80" height="80" href="{}"/>"#, uri));
        }

        let temp_y = 120.0;
        let temp_spacing = 140.0;
        let periods = [
            ("Morning", today.feels_like.morn, "mornTempClip"),
            ("Day", today.feels_like.day, "dayTempClip"),
            ("Evening", today.feels_like.eve, "eveTempClip"),
        ];
        for (i, (label, temp, clip)) in periods.iter().enumerate() {
            let offset = i as f64 * temp_spacing;
            doc.text(40.0 + offset, temp_y - 10.0, 18, "start", r#"fill="black""#, label);
            let gauge = GaugeBar::new(35.0 + offset, temp_y + 5.0, 100.0, 20.0, "tempGradient", clip);
            doc.gauge_bar(&gauge, temperature_fill(*temp));
        }

        let detail_y = 200.0;
        let details = [
            ("Humidity", humidity_fill(today.humidity), "humidityGradient", "humClip"),
            ("Wind", wind_fill(today.effective_wind()), "windGradient", "windClip"),
            ("Cloudiness", cloudiness_fill(today.clouds.unwrap_or(0)), "cloudinessGradient", "cloudsClip"),
            ("UV Index", uvi_fill(today.uvi.unwrap_or(0.0)), "uviGradient", "uviClip"),
        ];
        for (i, (label, fill, gradient, clip)) in details.iter().enumerate() {
            let row_y = detail_y + i as f64 * 35.0;
            doc.text(40.0, row_y, 20, "start", r#"fill="black""#, label);
            let gauge = GaugeBar::new(170.0, row_y - 15.0, 150.0, 20.0, gradient, clip);
            doc.gauge_bar(&gauge, *fill);
        }

        let sunrise = local_time(today.sunrise, &tz);
        let sunset = local_time(today.sunset, &tz);
        doc.text(40.0, detail_y + 160.0, 20, "start", r#"fill="black""#, &format!("Sunrise: {}", sunrise.format("%l:%M %P")));
        doc.text(280.0, detail_y + 160.0, 20, "start", r#"fill="black""#, &format!("Sunset: {}", sunset.format("%l:%M %P")));

        if options.show_alerts {
            let mut alert_y = detail_y + 190.0;
            for alert in &weather.alerts {
                doc.text(40.0, alert_y, 16, "start", r#"font-weight="bold" fill="red""#, &alert.event);
                doc.text(260.0, alert_y, 16, "start", r#"fill="black""#, &alert_time_range(alert, &tz));
                alert_y += 18.0;
            }
        }

        doc.line(left_width, 20.0, left_width, 460.0, "black", 2.0);

        // 右側：五日預報
        let right_x = left_width + 20.0;
        doc.text(right_x, 35.0, 24, "start", r#"font-weight="bold" fill="black""#, "5-Day Forecast");

        for (idx, day) in weather.daily.iter().skip(1).take(5).enumerate() {
            let y = 70.0 + idx as f64 * 80.0;
            let day_name = local_time(day.dt, &tz).format("%A").to_string();
            doc.text(right_x, y + 5.0, 22, "start", r#"font-weight="bold" fill="black""#, &day_name);

            if let Some(uri) = day
                .weather
                .first()
                .and_then(|w| self.icons.data_uri(icon_file(&w.icon)))
            {
                doc.push(format!(
                    r#"<image x="{}" y="{}" width="80" height="80" href="{}"/>"#,
                    right_x + 150.0,
                    y - 20.0,
                    uri
                ));
            }

            let gauge = GaugeBar::new(
                right_x,
                y + 22.0,
                125.0,
                16.0,
                "tempGradient",
                &format!("forecastTempClip{}", idx),
            );
            doc.range_bar(&gauge, temperature_fill(day.temp.min), temperature_fill(day.temp.max));

            let scale = beaufort(day.effective_wind());
            if let Some(uri) = self.icons.data_uri(&format!("wind-beaufort-{}.svg", scale)) {
                doc.push(format!(
                    r#"<image x="{}" y="{}" width="80" height="80" href="{}"/>"#,
                    right_x + 220.0,
                    y - 10.0,
                    uri
                ));
            }
        }

        let footer_y = 470.0;
        doc.battery_gauge(75.0, footer_y - 10.0, options.battery_pct);
        let updated = options.now.with_timezone(&tz);
        doc.text(790.0, footer_y, 12, "end", r#"fill="black""#, &format!("Last updated: {}", updated.format("%H:%M:%S")));

        Ok(doc.finish())
    }
}

fn define_gradients(doc: &mut SvgDocument) {
    doc.linear_gradient("tempGradient", GradientAxis::Horizontal, &[(0.0, "blue"), (100.0, "red")]);
    doc.linear_gradient(
        "humidityGradient",
        GradientAxis::Horizontal,
        &[(0.0, "red"), (20.0, "orange"), (100.0, "blue")],
    );
    doc.linear_gradient(
        "windGradient",
        GradientAxis::Horizontal,
        &[(0.0, "green"), (50.0, "orange"), (100.0, "red")],
    );
    doc.linear_gradient(
        "cloudinessGradient",
        GradientAxis::Horizontal,
        &[(0.0, "lightblue"), (100.0, "black")],
    );
    doc.linear_gradient(
        "uviGradient",
        GradientAxis::Horizontal,
        &[(0.0, "green"), (27.0, "yellow"), (54.0, "orange"), (72.0, "red"), (100.0, "purple")],
    );
}

#[async_trait]
impl PanelSource for WeatherSource {
    fn panel(&self) -> Panel {
        Panel::Weather
    }

    async fn fetch(&self) -> Result<PanelData> {
        Ok(PanelData::Weather(self.fetch_weather().await?))
    }

    fn compose(&self, data: &PanelData, options: &RenderOptions) -> Result<String> {
        match data {
            PanelData::Weather(weather) => self.compose_svg(weather, options),
            other => Err(other.mismatch(Panel::Weather)),
        }
    }
}
