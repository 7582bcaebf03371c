//! Weight log from a CSV file, smoothed with a constant-velocity Kalman
//! filter and projected forward.

use crate::core::svg::SvgDocument;
use crate::domain::model::{Panel, PanelView, RenderOptions};
use crate::domain::ports::PanelSource;
use crate::sources::PanelData;
use crate::utils::error::{FrameError, Result};
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;

pub const PROJECTION_DAYS: i64 = 90;
/// Velocity gained per day as weight loss slows, in lb/day².
pub const DECAY_ACCELERATION: f64 = 0.0177 / 7.0;
const INITIAL_VELOCITY: f64 = -0.5;
const FORECAST_CLIP_ID: &str = "forecastPlotClip";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSettings {
    pub csv_path: PathBuf,
}

impl Validate for WeightSettings {
    fn validate(&self) -> Result<()> {
        let path = self.csv_path.to_string_lossy();
        validation::validate_path("weight.csv_path", &path)?;
        validation::validate_file_extension("weight.csv_path", &path, &["csv"])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightReading {
    pub timestamp: DateTime<Utc>,
    pub weight_lbs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState {
    pub timestamp: DateTime<Utc>,
    pub weight_lbs: f64,
    pub velocity_lbs_per_day: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionPoint {
    pub timestamp: DateTime<Utc>,
    pub weight_lbs: f64,
}

#[derive(Debug, Clone)]
pub struct WeightData {
    pub raw_readings: Vec<WeightReading>,
    pub kalman_states: Vec<KalmanState>,
    pub linear_projection: Vec<ProjectionPoint>,
    pub decay_projection: Vec<ProjectionPoint>,
    pub stall_point: Option<ProjectionPoint>,
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Actual Weight")]
    actual_weight: f64,
}

/// Readings stamped at noon UTC, oldest first.
pub fn parse_weight_csv(content: &[u8]) -> Result<Vec<WeightReading>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content);

    let mut readings = Vec::new();
    for (line, record) in reader.deserialize::<CsvRecord>().enumerate() {
        let record = record?;
        let date = NaiveDate::parse_from_str(&record.date, "%Y-%m-%d").map_err(|e| {
            FrameError::ProcessingError {
                message: format!("row {}: invalid date '{}': {}", line + 1, record.date, e),
            }
        })?;
        let timestamp = date
            .and_hms_opt(12, 0, 0)
            .ok_or_else(|| FrameError::ProcessingError {
                message: format!("row {}: cannot place '{}' at noon", line + 1, record.date),
            })?
            .and_utc();
        readings.push(WeightReading {
            timestamp,
            weight_lbs: record.actual_weight,
        });
    }

    readings.sort_by_key(|r| r.timestamp);
    Ok(readings)
}

/// State `[weight, velocity]` with position-only measurements.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    x: [f64; 2],
    p: [[f64; 2]; 2],
    q: [[f64; 2]; 2],
    r: f64,
}

impl KalmanFilter {
    pub fn new(initial_weight: f64) -> Self {
        Self {
            x: [initial_weight, INITIAL_VELOCITY],
            p: [[1.0, 0.0], [0.0, 1.0]],
            q: [[0.005, 0.0], [0.0, 0.0005]],
            r: 1.5,
        }
    }

    pub fn weight(&self) -> f64 {
        self.x[0]
    }

    pub fn velocity(&self) -> f64 {
        self.x[1]
    }

    pub fn predict(&mut self, dt_days: f64) {
        // F = [[1, dt], [0, 1]]
        self.x = [self.x[0] + self.x[1] * dt_days, self.x[1]];

        let p = self.p;
        let p00 = p[0][0] + 2.0 * dt_days * p[0][1] + dt_days * dt_days * p[1][1] + self.q[0][0];
        let p01 = p[0][1] + dt_days * p[1][1] + self.q[0][1];
        let p11 = p[1][1] + self.q[1][1];
        self.p = [[p00, p01], [p01, p11]];
    }

    pub fn update(&mut self, measurement: f64) {
        let innovation = measurement - self.x[0];
        let s = self.p[0][0] + self.r;
        let k0 = self.p[0][0] / s;
        let k1 = self.p[1][0] / s;

        self.x[0] += k0 * innovation;
        self.x[1] += k1 * innovation;

        let p = self.p;
        self.p = [
            [(1.0 - k0) * p[0][0], (1.0 - k0) * p[0][1]],
            [p[1][0] - k1 * p[0][0], p[1][1] - k1 * p[0][1]],
        ];
    }
}

/// One filtered state per reading. The first state is the first reading itself.
pub fn process_weight_data(readings: &[WeightReading]) -> Vec<KalmanState> {
    let Some(first) = readings.first() else {
        return Vec::new();
    };

    let mut filter = KalmanFilter::new(first.weight_lbs);
    let mut states = Vec::with_capacity(readings.len());
    states.push(KalmanState {
        timestamp: first.timestamp,
        weight_lbs: filter.weight(),
        velocity_lbs_per_day: filter.velocity(),
    });

    for pair in readings.windows(2) {
        let dt = (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64 / 86400.0;
        filter.predict(dt);
        filter.update(pair[1].weight_lbs);
        states.push(KalmanState {
            timestamp: pair[1].timestamp,
            weight_lbs: filter.weight(),
            velocity_lbs_per_day: filter.velocity(),
        });
    }
    states
}

pub fn calculate_linear_projection(last_state: &KalmanState, days_ahead: i64) -> Vec<ProjectionPoint> {
    (0..=days_ahead)
        .map(|day| ProjectionPoint {
            timestamp: last_state.timestamp + Duration::days(day),
            weight_lbs: last_state.weight_lbs + last_state.velocity_lbs_per_day * day as f64,
        })
        .collect()
}

/// Velocity creeps toward zero each day. The projection ends at the first
/// day the velocity is no longer negative, which is returned as the stall point.
pub fn calculate_decay_projection(
    last_state: &KalmanState,
    days_ahead: i64,
) -> (Vec<ProjectionPoint>, Option<ProjectionPoint>) {
    let mut projection = Vec::new();
    let mut weight = last_state.weight_lbs;
    let mut velocity = last_state.velocity_lbs_per_day;

    for day in 0..=days_ahead {
        let point = ProjectionPoint {
            timestamp: last_state.timestamp + Duration::days(day),
            weight_lbs: weight,
        };
        projection.push(point.clone());

        if velocity >= 0.0 {
            return (projection, Some(point));
        }
        weight += velocity;
        velocity += DECAY_ACCELERATION;
    }
    (projection, None)
}

pub fn analyze_readings(raw_readings: Vec<WeightReading>) -> Result<WeightData> {
    let kalman_states = process_weight_data(&raw_readings);
    let last_state = kalman_states.last().ok_or_else(|| FrameError::ProcessingError {
        message: "no weight readings found in CSV".to_string(),
    })?;

    let linear_projection = calculate_linear_projection(last_state, PROJECTION_DAYS);
    let (decay_projection, stall_point) = calculate_decay_projection(last_state, PROJECTION_DAYS);
    if let Some(stall) = &stall_point {
        tracing::debug!("Projected stall at {:.1} lbs on {}", stall.weight_lbs, stall.timestamp.date_naive());
    }

    Ok(WeightData {
        raw_readings,
        kalman_states,
        linear_projection,
        decay_projection,
        stall_point,
    })
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 86400.0
}

/// `M x,y L x,y ...`, or `None` for no points.
fn polyline(points: impl IntoIterator<Item = (f64, f64)>) -> Option<String> {
    let mut path = String::new();
    for (x, y) in points {
        let command = if path.is_empty() { "M" } else { " L" };
        let _ = write!(path, "{}{:.1},{:.1}", command, x, y);
    }
    (!path.is_empty()).then_some(path)
}

fn value_bounds(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    values.into_iter().fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((min, max)) => Some((min.min(v), max.max(v))),
    })
}

/// Steps of `ceil(range / divisions)` starting at the first multiple inside the range.
fn grid_steps(min: f64, max: f64, divisions: f64) -> Vec<f64> {
    let step = ((max - min) / divisions).ceil().max(1.0);
    let mut values = Vec::new();
    let mut value = (min / step).ceil() * step;
    while value <= max {
        values.push(value);
        value += step;
    }
    values
}

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const GRID_COLOR: &str = "#e0e0e0";

fn top_right_battery(doc: &mut SvgDocument, y: f64, battery_pct: Option<u8>) {
    if battery_pct.is_some() {
        doc.battery_gauge(WIDTH - MARGIN_RIGHT - 110.0, y, battery_pct);
    }
}

/// -60..+90 days around today with raw readings, Kalman trend and projections.
pub fn compose_forecast_svg(data: &WeightData, options: &RenderOptions) -> String {
    let (margin_top, margin_bottom) = (50.0, 50.0);
    let chart_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let chart_height = HEIGHT - margin_top - margin_bottom;
    let (x_min, x_max) = (-60.0, 90.0);
    let today = options.now;

    let (mut y_min, mut y_max) = value_bounds(
        data.raw_readings
            .iter()
            .map(|r| r.weight_lbs)
            .chain(data.linear_projection.iter().map(|p| p.weight_lbs))
            .chain(data.decay_projection.iter().map(|p| p.weight_lbs)),
    )
    .unwrap_or((0.0, 1.0));
    y_min -= 2.0;
    y_max += 2.0;

    let x_px = |days: f64| MARGIN_LEFT + (days - x_min) / (x_max - x_min) * chart_width;
    let y_px = |weight: f64| margin_top + (y_max - weight) / (y_max - y_min) * chart_height;
    let days_from_today = |timestamp: DateTime<Utc>| days_between(today, timestamp);
    let in_window = |days: f64| (x_min..=x_max).contains(&days);

    let mut doc = SvgDocument::frame();
    // 投影線只畫在 -60..+90 天的圖表區內
    doc.push_def(format!(
        r#"<clipPath id="{}"><rect x="{}" y="{}" width="{}" height="{}"/></clipPath>"#,
        FORECAST_CLIP_ID, MARGIN_LEFT, margin_top, chart_width, chart_height
    ));
    doc.text(WIDTH / 2.0, 30.0, 24, "middle", r#"font-weight="bold" fill="black""#, "90-Day Weight Forecast");
    top_right_battery(&mut doc, 10.0, options.battery_pct);

    let bottom = HEIGHT - margin_bottom;
    let ticks = [-60.0, -30.0, 0.0, 30.0, 60.0, 90.0];
    for days in ticks {
        let x = x_px(days);
        doc.line(x, margin_top, x, bottom, GRID_COLOR, 1.0);
    }
    let y_ticks = grid_steps(y_min, y_max, 5.0);
    for value in &y_ticks {
        let y = y_px(*value);
        doc.line(MARGIN_LEFT, y, WIDTH - MARGIN_RIGHT, y, GRID_COLOR, 1.0);
    }

    doc.line(MARGIN_LEFT, bottom, WIDTH - MARGIN_RIGHT, bottom, "black", 2.0);
    doc.line(MARGIN_LEFT, margin_top, MARGIN_LEFT, bottom, "black", 2.0);
    for days in ticks {
        doc.text(x_px(days), bottom + 20.0, 12, "middle", r#"fill="black""#, &format!("{}", days));
    }
    for value in &y_ticks {
        doc.text(MARGIN_LEFT - 10.0, y_px(*value) + 4.0, 12, "end", r#"fill="black""#, &format!("{:.0}", value));
    }

    for reading in &data.raw_readings {
        let days = days_from_today(reading.timestamp);
        if in_window(days) {
            doc.push(format!(
                r##"<circle cx="{:.1}" cy="{:.1}" r="2" fill="#aaaaaa" opacity="0.6"/>"##,
                x_px(days),
                y_px(reading.weight_lbs)
            ));
        }
    }

    let decay = polyline(
        data.decay_projection
            .iter()
            .map(|p| (x_px(days_from_today(p.timestamp)), y_px(p.weight_lbs))),
    );
    if let Some(path) = decay {
        doc.push(format!(
            r#"<path d="{}" stroke="orange" stroke-width="1.5" fill="none" clip-path="url(#{})"/>"#,
            path, FORECAST_CLIP_ID
        ));
    }

    let linear = polyline(
        data.linear_projection
            .iter()
            .map(|p| (x_px(days_from_today(p.timestamp)), y_px(p.weight_lbs))),
    );
    if let Some(path) = linear {
        doc.push(format!(
            r#"<path d="{}" stroke="blue" stroke-width="2" stroke-dasharray="5,3" fill="none" clip-path="url(#{})"/>"#,
            path, FORECAST_CLIP_ID
        ));
    }

    let trend = polyline(data.kalman_states.iter().filter_map(|state| {
        let days = days_from_today(state.timestamp);
        in_window(days).then(|| (x_px(days), y_px(state.weight_lbs)))
    }));
    if let Some(path) = trend {
        doc.push(format!(r#"<path d="{}" stroke="black" stroke-width="2" fill="none"/>"#, path));
    }

    if let Some(stall) = data
        .stall_point
        .as_ref()
        .filter(|stall| in_window(days_from_today(stall.timestamp)))
    {
        let x = x_px(days_from_today(stall.timestamp));
        let y = y_px(stall.weight_lbs);
        doc.push(format!(r#"<circle cx="{:.1}" cy="{:.1}" r="4" fill="red"/>"#, x, y));
        doc.text(x + 10.0, y - 5.0, 12, "start", r#"fill="red""#, "Stall Point");
    }

    doc.text(WIDTH / 2.0, HEIGHT - 10.0, 12, "middle", r#"fill="black""#, &today.format("%Y-%m-%d %H:%M UTC").to_string());
    doc.finish()
}

/// Past 90 days: weight with Kalman trend on top, velocity in lb/week below.
pub fn compose_velocity_svg(data: &WeightData, options: &RenderOptions) -> String {
    let (margin_top, margin_bottom, gap) = (40.0, 60.0, 10.0);
    let total_height = HEIGHT - margin_top - margin_bottom;
    let top_height = (total_height * 3.0 / 5.0).floor();
    let bottom_height = total_height - top_height - gap;
    let chart_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let total_days = 90.0;
    let start = options.now - Duration::days(90);
    let (vel_min, vel_max) = (-2.0, 2.0);

    let recent_readings: Vec<&WeightReading> = data.raw_readings.iter().filter(|r| r.timestamp >= start).collect();
    let recent_states: Vec<&KalmanState> = data.kalman_states.iter().filter(|s| s.timestamp >= start).collect();

    let (mut weight_min, mut weight_max) = value_bounds(
        recent_readings
            .iter()
            .map(|r| r.weight_lbs)
            .chain(recent_states.iter().map(|s| s.weight_lbs)),
    )
    .unwrap_or((0.0, 1.0));
    weight_min -= 1.0;
    weight_max += 1.0;

    let top_bottom = margin_top + top_height;
    let bottom_top = top_bottom + gap;
    let bottom_bottom = HEIGHT - margin_bottom;

    let x_px = |timestamp: DateTime<Utc>| MARGIN_LEFT + days_between(start, timestamp) / total_days * chart_width;
    let weight_px = |weight: f64| margin_top + (weight_max - weight) / (weight_max - weight_min) * top_height;
    let velocity_px = |per_week: f64| bottom_top + (vel_max - per_week) / (vel_max - vel_min) * bottom_height;

    let mut doc = SvgDocument::frame();
    doc.text(
        WIDTH / 2.0,
        25.0,
        20,
        "middle",
        r#"font-weight="bold" fill="black""#,
        "Weight Analysis: Actual vs. Kalman Trend",
    );
    top_right_battery(&mut doc, 5.0, options.battery_pct);

    let label_interval = 18;
    let day_ticks: Vec<DateTime<Utc>> = (0..=90).step_by(label_interval).map(|d| start + Duration::days(d)).collect();
    for tick in &day_ticks {
        let x = x_px(*tick);
        doc.line(x, margin_top, x, top_bottom, GRID_COLOR, 0.5);
        doc.line(x, bottom_top, x, bottom_bottom, GRID_COLOR, 0.5);
    }
    let weight_ticks = grid_steps(weight_min, weight_max, 4.0);
    for value in &weight_ticks {
        let y = weight_px(*value);
        doc.line(MARGIN_LEFT, y, WIDTH - MARGIN_RIGHT, y, GRID_COLOR, 0.5);
    }
    for step in 0..=8 {
        let y = velocity_px(vel_min + step as f64 * 0.5);
        doc.line(MARGIN_LEFT, y, WIDTH - MARGIN_RIGHT, y, GRID_COLOR, 0.5);
    }

    doc.line(MARGIN_LEFT, top_bottom, WIDTH - MARGIN_RIGHT, top_bottom, "black", 1.5);
    doc.line(MARGIN_LEFT, margin_top, MARGIN_LEFT, top_bottom, "black", 1.5);
    doc.line(MARGIN_LEFT, bottom_bottom, WIDTH - MARGIN_RIGHT, bottom_bottom, "black", 1.5);
    doc.line(MARGIN_LEFT, bottom_top, MARGIN_LEFT, bottom_bottom, "black", 1.5);

    for tick in &day_ticks {
        doc.text(x_px(*tick), bottom_bottom + 20.0, 10, "middle", r#"fill="black""#, &tick.format("%Y-%m-%d").to_string());
    }
    for value in &weight_ticks {
        doc.text(MARGIN_LEFT - 5.0, weight_px(*value) + 3.0, 10, "end", r#"fill="black""#, &format!("{:.0}", value));
    }
    for value in [-2.0, -1.0, 0.0, 1.0, 2.0] {
        doc.text(MARGIN_LEFT - 5.0, velocity_px(value) + 3.0, 10, "end", r#"fill="black""#, &format!("{:.1}", value));
    }

    let top_mid = margin_top + top_height / 2.0;
    let bottom_mid = bottom_top + bottom_height / 2.0;
    doc.text(15.0, top_mid, 11, "middle", &format!(r#"fill="black" transform="rotate(-90 15 {})""#, top_mid), "Weight (lbs)");
    doc.text(15.0, bottom_mid, 11, "middle", &format!(r#"fill="black" transform="rotate(-90 15 {})""#, bottom_mid), "Velocity (lbs/week)");

    // 上圖：體重
    for reading in &recent_readings {
        doc.push(format!(
            r##"<circle cx="{:.1}" cy="{:.1}" r="2.5" fill="#999999" opacity="0.6"/>"##,
            x_px(reading.timestamp),
            weight_px(reading.weight_lbs)
        ));
    }
    if let Some(path) = polyline(recent_states.iter().map(|s| (x_px(s.timestamp), weight_px(s.weight_lbs)))) {
        doc.push(format!(r#"<path d="{}" stroke="blue" stroke-width="2.5" fill="none"/>"#, path));
    }

    let legend_x = WIDTH - MARGIN_RIGHT - 200.0;
    doc.push(format!(
        r##"<circle cx="{}" cy="{}" r="3" fill="#999999" opacity="0.6"/>"##,
        legend_x,
        margin_top + 15.0
    ));
    doc.text(legend_x + 8.0, margin_top + 19.0, 11, "start", r#"fill="black""#, "Actual Scale Weight");
    doc.line(legend_x, margin_top + 30.0, legend_x + 20.0, margin_top + 30.0, "blue", 2.5);
    doc.text(legend_x + 28.0, margin_top + 34.0, 11, "start", r#"fill="black""#, "Kalman Trend (Denoised)");

    // 下圖：速度
    let zero_y = velocity_px(0.0);
    doc.line(MARGIN_LEFT, zero_y, WIDTH - MARGIN_RIGHT, zero_y, "black", 2.0);

    let velocity_points: Vec<(f64, f64)> = recent_states
        .iter()
        .map(|s| {
            let per_week = (s.velocity_lbs_per_day * 7.0).clamp(vel_min, vel_max);
            (x_px(s.timestamp), velocity_px(per_week))
        })
        .collect();
    if let Some(&(first_x, _)) = velocity_points.first() {
        let mut area = format!("M{:.1},{:.1}", first_x, zero_y);
        for (x, y) in &velocity_points {
            let _ = write!(area, " L{:.1},{:.1}", x, y);
        }
        let _ = write!(area, " L{:.1},{:.1} Z", WIDTH - MARGIN_RIGHT, zero_y);
        doc.push(format!(r#"<path d="{}" fill="red" opacity="0.3"/>"#, area));
    }
    if let Some(path) = polyline(velocity_points) {
        doc.push(format!(r#"<path d="{}" stroke="red" stroke-width="2" fill="none"/>"#, path));
    }

    doc.finish()
}

pub struct WeightSource {
    settings: WeightSettings,
}

impl WeightSource {
    pub fn new(settings: WeightSettings) -> Self {
        Self { settings }
    }

    pub async fn load(&self) -> Result<WeightData> {
        let content = tokio::fs::read(&self.settings.csv_path).await?;
        let readings = parse_weight_csv(&content)?;
        tracing::debug!("Read {} weight readings from {}", readings.len(), self.settings.csv_path.display());
        analyze_readings(readings)
    }
}

#[async_trait]
impl PanelSource for WeightSource {
    fn panel(&self) -> Panel {
        Panel::Weight
    }

    async fn fetch(&self) -> Result<PanelData> {
        Ok(PanelData::Weight(self.load().await?))
    }

    fn compose(&self, data: &PanelData, options: &RenderOptions) -> Result<String> {
        match data {
            PanelData::Weight(weight) => Ok(match options.view {
                PanelView::Forecast => compose_forecast_svg(weight, options),
                PanelView::Velocity => compose_velocity_svg(weight, options),
            }),
            other => Err(other.mismatch(Panel::Weight)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn state(velocity: f64) -> KalmanState {
        KalmanState {
            timestamp: noon(2024, 3, 1),
            weight_lbs: 200.0,
            velocity_lbs_per_day: velocity,
        }
    }

    fn daily_readings(days: i64, weight: impl Fn(i64) -> f64) -> Vec<WeightReading> {
        (0..days)
            .map(|d| WeightReading {
                timestamp: noon(2024, 1, 1) + Duration::days(d),
                weight_lbs: weight(d),
            })
            .collect()
    }

    #[test]
    fn test_csv_sorted_at_noon() {
        let csv = "Date,Actual Weight\n2024-01-03,201.5\n2024-01-01,203.0\n2024-01-02, 202.2\n";
        let readings = parse_weight_csv(csv.as_bytes()).unwrap();

        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].timestamp, noon(2024, 1, 1));
        assert_eq!(readings[1].weight_lbs, 202.2);
        assert_eq!(readings[2].weight_lbs, 201.5);
    }

    #[test]
    fn test_csv_bad_date_is_error() {
        let csv = "Date,Actual Weight\n01/03/2024,201.5\n";
        assert!(matches!(
            parse_weight_csv(csv.as_bytes()),
            Err(FrameError::ProcessingError { .. })
        ));
    }

    #[test]
    fn test_empty_log_is_error() {
        let readings = parse_weight_csv(b"Date,Actual Weight\n").unwrap();
        assert!(readings.is_empty());
        assert!(analyze_readings(readings).is_err());
    }

    #[test]
    fn test_first_state_is_first_reading() {
        let states = process_weight_data(&daily_readings(3, |_| 180.0));
        assert_eq!(states.len(), 3);
        assert_eq!(states[0].weight_lbs, 180.0);
        assert_eq!(states[0].velocity_lbs_per_day, -0.5);
    }

    #[test]
    fn test_flat_readings_pull_velocity_toward_zero() {
        let states = process_weight_data(&daily_readings(30, |_| 200.0));
        let last = states.last().unwrap();
        assert!(last.velocity_lbs_per_day > -0.5);
        assert!(last.weight_lbs > 195.0 && last.weight_lbs < 201.0);
    }

    #[test]
    fn test_filter_tracks_steady_loss() {
        let states = process_weight_data(&daily_readings(120, |d| 220.0 - 0.2 * d as f64));
        let last = states.last().unwrap();
        assert!((last.velocity_lbs_per_day + 0.2).abs() < 0.05);
        assert!((last.weight_lbs - (220.0 - 0.2 * 119.0)).abs() < 1.0);
    }

    #[test]
    fn test_linear_projection() {
        let projection = calculate_linear_projection(&state(-0.25), PROJECTION_DAYS);
        assert_eq!(projection.len(), 91);
        assert_eq!(projection[0].weight_lbs, 200.0);
        assert!((projection[90].weight_lbs - 177.5).abs() < 1e-9);
        assert_eq!(projection[90].timestamp, noon(2024, 5, 30));
    }

    #[test]
    fn test_decay_projection_stalls() {
        let (projection, stall) = calculate_decay_projection(&state(-0.1), PROJECTION_DAYS);
        let stall = stall.unwrap();
        assert_eq!(projection.len(), 41);
        assert_eq!(stall.timestamp, noon(2024, 3, 1) + Duration::days(40));
        assert_eq!(projection.last().unwrap(), &stall);
        assert!(stall.weight_lbs < 200.0);
    }

    #[test]
    fn test_decay_projection_without_stall() {
        let (projection, stall) = calculate_decay_projection(&state(-1.0), PROJECTION_DAYS);
        assert_eq!(projection.len(), 91);
        assert!(stall.is_none());
    }

    #[test]
    fn test_rising_weight_stalls_immediately() {
        let (projection, stall) = calculate_decay_projection(&state(0.2), PROJECTION_DAYS);
        assert_eq!(projection.len(), 1);
        assert_eq!(stall.unwrap().weight_lbs, 200.0);
    }

    #[test]
    fn test_forecast_view() {
        let data = analyze_readings(daily_readings(60, |d| 210.0 - 0.1 * d as f64)).unwrap();
        let options = RenderOptions::at(noon(2024, 3, 1));
        let svg = compose_forecast_svg(&data, &options);

        assert!(svg.contains("90-Day Weight Forecast"));
        assert!(svg.contains(r#"stroke="orange""#));
        assert!(svg.contains(r#"stroke="blue" stroke-width="2" stroke-dasharray="5,3""#));
        assert!(svg.contains(r#"stroke="black" stroke-width="2" fill="none""#));
        assert!(svg.contains("2024-03-01 12:00 UTC"));
        assert!(svg.contains("Stall Point"));
        assert!(!svg.contains("Battery:"));
    }

    #[test]
    fn test_forecast_projections_clipped_to_window() {
        // readings end 59 days after "today", so both projections run past +90
        let data = analyze_readings(daily_readings(60, |d| 210.0 - 0.1 * d as f64)).unwrap();
        let today = noon(2024, 1, 1);
        let svg = compose_forecast_svg(&data, &RenderOptions::at(today));

        assert!(svg.contains(r#"<clipPath id="forecastPlotClip"><rect x="#));
        assert!(svg.contains(r#"stroke="orange" stroke-width="1.5" fill="none" clip-path="url(#forecastPlotClip)""#));
        assert!(svg.contains(r#"stroke-dasharray="5,3" fill="none" clip-path="url(#forecastPlotClip)""#));

        let last_projected = data.linear_projection.last().unwrap();
        assert!(days_between(today, last_projected.timestamp) > 90.0);
        let stall_visible = data
            .stall_point
            .as_ref()
            .is_some_and(|stall| days_between(today, stall.timestamp) <= 90.0);
        assert_eq!(svg.contains("Stall Point"), stall_visible);
    }

    #[test]
    fn test_velocity_view_with_battery() {
        let data = analyze_readings(daily_readings(60, |d| 210.0 - 0.1 * d as f64)).unwrap();
        let mut options = RenderOptions::at(noon(2024, 3, 1));
        options.battery_pct = Some(80);
        options.view = PanelView::Velocity;

        let source = WeightSource::new(WeightSettings {
            csv_path: PathBuf::from("weight.csv"),
        });
        let svg = source.compose(&PanelData::Weight(data), &options).unwrap();

        assert!(svg.contains("Weight Analysis: Actual vs. Kalman Trend"));
        assert!(svg.contains("Velocity (lbs/week)"));
        assert!(svg.contains(r#"fill="red" opacity="0.3""#));
        assert!(svg.contains("Battery:"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weight.csv");
        std::fs::write(&path, "Date,Actual Weight\n2024-01-01,200\n2024-01-02,199.6\n").unwrap();

        let source = WeightSource::new(WeightSettings { csv_path: path });
        let data = source.load().await.unwrap();
        assert_eq!(data.raw_readings.len(), 2);
        assert_eq!(data.kalman_states.len(), 2);
        assert_eq!(data.linear_projection.len(), 91);
    }

    #[test]
    fn test_settings_require_csv() {
        let ok = WeightSettings {
            csv_path: PathBuf::from("data/weight.csv"),
        };
        assert!(ok.validate().is_ok());
        let bad = WeightSettings {
            csv_path: PathBuf::from("data/weight.json"),
        };
        assert!(bad.validate().is_err());
    }
}
