//! St. Louis Fed series drawn as regime-coloured area charts.

use crate::core::svg::{escape_text, GradientAxis, SvgDocument};
use crate::domain::model::{Panel, RenderOptions};
use crate::domain::ports::PanelSource;
use crate::sources::{expect_success, PanelData};
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FredSettings {
    pub api_key: String,
    /// Latest observations fetched per series.
    #[serde(default = "default_observations")]
    pub observations: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_observations() -> usize {
    120
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Validate for FredSettings {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("fred.api_key", &self.api_key)?;
        validation::validate_positive_number("fred.observations", self.observations, 2)?;
        validation::validate_url("fred.base_url", &self.base_url)
    }
}

#[derive(Debug, Deserialize)]
pub struct ObservationsResponse {
    pub observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
pub struct Observation {
    pub date: String,
    pub value: String,
}

/// How a series' thresholds are derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegimeBasis {
    /// Fixed levels. Higher values are worse.
    Absolute,
    /// Percent drawdown from the window high. Lower values are worse.
    DrawdownPct,
    /// Points below the window high. Lower values are worse.
    PointsBelowPeak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegimeLevel {
    Calm,
    Elevated,
    Stressed,
}

impl RegimeLevel {
    pub fn color(self) -> &'static str {
        match self {
            RegimeLevel::Calm => "green",
            RegimeLevel::Elevated => "orange",
            RegimeLevel::Stressed => "red",
        }
    }
}

/// Caution and stress bands of one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regime {
    pub basis: RegimeBasis,
    pub caution: f64,
    pub stress: f64,
}

impl Regime {
    pub fn higher_is_worse(&self) -> bool {
        self.basis == RegimeBasis::Absolute
    }

    /// `(caution, stress)` as values on the series' own scale.
    pub fn levels(&self, peak: f64) -> (f64, f64) {
        match self.basis {
            RegimeBasis::Absolute => (self.caution, self.stress),
            RegimeBasis::DrawdownPct => (
                peak * (1.0 - self.caution / 100.0),
                peak * (1.0 - self.stress / 100.0),
            ),
            RegimeBasis::PointsBelowPeak => (peak - self.caution, peak - self.stress),
        }
    }

    pub fn classify(&self, value: f64, peak: f64) -> RegimeLevel {
        let (caution, stress) = self.levels(peak);
        let (past_caution, past_stress) = if self.higher_is_worse() {
            (value >= caution, value >= stress)
        } else {
            (value <= caution, value <= stress)
        };
        match (past_caution, past_stress) {
            (_, true) => RegimeLevel::Stressed,
            (true, false) => RegimeLevel::Elevated,
            _ => RegimeLevel::Calm,
        }
    }

    /// Data range widened so both thresholds fit on the chart.
    pub fn chart_range(&self, data_min: f64, data_max: f64) -> (f64, f64) {
        let (caution, stress) = self.levels(data_max);
        (
            data_min.min(caution).min(stress),
            data_max.max(caution).max(stress),
        )
    }

    /// Bottom-to-top gradient stops over `[min, max]`.
    pub fn gradient_stops(&self, min: f64, max: f64) -> Vec<(f64, &'static str)> {
        let range = if max > min { max - min } else { 1.0 };
        let (caution, stress) = self.levels(max);
        let pct = |level: f64| ((level - min) / range * 100.0).clamp(0.0, 100.0);

        if self.higher_is_worse() {
            vec![
                (0.0, "green"),
                (pct(caution), "orange"),
                (pct(stress), "red"),
                (100.0, "red"),
            ]
        } else {
            vec![
                (0.0, "red"),
                (pct(stress), "orange"),
                (pct(caution), "green"),
                (100.0, "green"),
            ]
        }
    }
}

/// Static description of one chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub decimals: usize,
    pub suffix: &'static str,
    pub regime: Regime,
}

impl SeriesSpec {
    pub fn format_value(&self, value: f64) -> String {
        format!("{:.*}{}", self.decimals, value, self.suffix)
    }
}

/// Charts in grid order: top-left, top-right, bottom-left, bottom-right.
pub const SERIES: [SeriesSpec; 4] = [
    SeriesSpec {
        id: "VIXCLS",
        name: "VIX Fear Gauge",
        decimals: 1,
        suffix: "",
        regime: Regime { basis: RegimeBasis::Absolute, caution: 20.0, stress: 40.0 },
    },
    SeriesSpec {
        id: "SP500",
        name: "S&P 500",
        decimals: 0,
        suffix: "",
        regime: Regime { basis: RegimeBasis::DrawdownPct, caution: 7.0, stress: 20.0 },
    },
    SeriesSpec {
        id: "BAMLH0A0HYM2",
        name: "High Yield Spreads",
        decimals: 2,
        suffix: "%",
        regime: Regime { basis: RegimeBasis::Absolute, caution: 4.0, stress: 6.0 },
    },
    SeriesSpec {
        id: "DGS10",
        name: "10-Year Treasury",
        decimals: 1,
        suffix: "",
        regime: Regime { basis: RegimeBasis::PointsBelowPeak, caution: 0.5, stress: 1.0 },
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct SeriesData {
    pub spec: SeriesSpec,
    pub points: Vec<DataPoint>,
}

impl SeriesData {
    pub fn bounds(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let min = self.points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
        let max = self.points.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}

#[derive(Debug, Clone)]
pub struct FredData {
    pub window: usize,
    pub series: Vec<SeriesData>,
}

/// Drops FRED's `"."` placeholders and unparseable values. Output is oldest first.
pub fn parse_observations(response: ObservationsResponse) -> Vec<DataPoint> {
    let mut points: Vec<DataPoint> = response
        .observations
        .into_iter()
        .filter(|obs| obs.value != ".")
        .filter_map(|obs| {
            let value = obs.value.parse::<f64>().ok()?;
            Some(DataPoint { date: obs.date, value })
        })
        .collect();
    points.reverse();
    points
}

pub struct FredSource {
    settings: FredSettings,
    client: Client,
}

impl FredSource {
    pub fn new(settings: FredSettings, client: Client) -> Self {
        Self { settings, client }
    }

    pub async fn fetch_series(&self, series_id: &str) -> Result<Vec<DataPoint>> {
        let url = format!(
            "{}/fred/series/observations",
            self.settings.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("series_id", series_id.to_string()),
                ("api_key", self.settings.api_key.clone()),
                ("file_type", "json".to_string()),
                ("sort_order", "desc".to_string()),
                ("limit", self.settings.observations.to_string()),
            ])
            .send()
            .await?;
        let response = expect_success("FRED", response).await?;
        let parsed: ObservationsResponse = response.json().await?;
        let points = parse_observations(parsed);
        tracing::debug!("📊 {}: {} observations", series_id, points.len());
        Ok(points)
    }

    pub async fn fetch_fred(&self) -> Result<FredData> {
        let mut series = Vec::with_capacity(SERIES.len());
        for spec in SERIES {
            let points = self.fetch_series(spec.id).await?;
            series.push(SeriesData { spec, points });
        }
        Ok(FredData {
            window: self.settings.observations,
            series,
        })
    }
}

pub fn compose_fred_svg(fred: &FredData, options: &RenderOptions) -> String {
    let mut doc = SvgDocument::frame();
    let width = doc.width() as f64;
    let height = doc.height() as f64;

    doc.text(width / 2.0, 20.0, 22, "middle", r#"font-weight="bold" fill="black""#, "Market Crash Monitor");
    doc.text(width - 10.0, 20.0, 14, "end", r#"fill="black""#, &format!("{} days", fred.window));

    let positions = [(10.0, 35.0), (410.0, 35.0), (10.0, 245.0), (410.0, 245.0)];
    for (index, (series, (x, y))) in fred.series.iter().zip(positions).enumerate() {
        draw_regime_chart(&mut doc, series, index, x, y, 380.0, 200.0);
    }

    let footer_y = height - 10.0;
    let updated = options.now.with_timezone(&Local);
    doc.text(10.0, footer_y, 12, "start", r#"fill="black""#, &format!("Last updated: {}", updated.format("%H:%M:%S")));
    doc.battery_gauge(width - 110.0, footer_y - 10.0, options.battery_pct);

    doc.finish()
}

fn draw_regime_chart(
    doc: &mut SvgDocument,
    series: &SeriesData,
    index: usize,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
) {
    doc.push(format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="white" stroke="black" stroke-width="2"/>"#,
        x, y, width, height
    ));

    let (Some(last), Some((data_min, data_max))) = (series.points.last(), series.bounds()) else {
        return;
    };
    let spec = &series.spec;
    let regime = spec.regime;

    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="start" font-size="16" font-weight="bold" fill="black">{}</text>"#,
        x + 5.0,
        y + 20.0,
        escape_text(spec.name)
    ));
    let level = regime.classify(last.value, data_max);
    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="end" font-size="14" fill="{}">{}</text>"#,
        x + width - 5.0,
        y + 20.0,
        level.color(),
        spec.format_value(last.value)
    ));

    // 面積、漸層與門檻線共用同一個延伸範圍
    let (min_val, max_val) = regime.chart_range(data_min, data_max);
    let range = if max_val > min_val { max_val - min_val } else { 1.0 };
    let chart_x = x + 40.0;
    let chart_y = y + 35.0;
    let chart_w = width - 50.0;
    let chart_h = height - 55.0;
    let to_y = |value: f64| (chart_y + chart_h - (value - min_val) / range * chart_h).round();

    let gradient_id = format!("regimeGradient{}", index);
    doc.linear_gradient(&gradient_id, GradientAxis::Vertical, &regime.gradient_stops(min_val, max_val));

    let steps = (series.points.len() - 1).max(1) as f64;
    let mut path = format!("M {} {}", chart_x, chart_y + chart_h);
    for (i, point) in series.points.iter().enumerate() {
        let px = (chart_x + chart_w * i as f64 / steps).round();
        path.push_str(&format!(" L {} {}", px, to_y(point.value)));
    }
    path.push_str(&format!(" L {} {} Z", chart_x + chart_w, chart_y + chart_h));
    doc.push(format!(
        r#"<path d="{}" fill="url(#{})" fill-opacity="0.3" stroke="black" stroke-width="1"/>"#,
        path, gradient_id
    ));

    let (caution, stress) = regime.levels(data_max);
    for (threshold, color) in [(caution, "green"), (stress, "red")] {
        if threshold >= data_min && threshold <= data_max {
            let line_y = to_y(threshold);
            doc.push(format!(
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2" stroke-dasharray="8,4"/>"#,
                chart_x,
                line_y,
                chart_x + chart_w,
                line_y,
                color
            ));
        }
    }

    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="end" font-size="10" fill="black">{:.1}</text>"#,
        chart_x - 5.0,
        chart_y + 5.0,
        max_val
    ));
    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="end" font-size="10" fill="black">{:.1}</text>"#,
        chart_x - 5.0,
        chart_y + chart_h,
        min_val
    ));
}

#[async_trait]
impl PanelSource for FredSource {
    fn panel(&self) -> Panel {
        Panel::Fred
    }

    async fn fetch(&self) -> Result<PanelData> {
        Ok(PanelData::Fred(self.fetch_fred().await?))
    }

    fn compose(&self, data: &PanelData, options: &RenderOptions) -> Result<String> {
        match data {
            PanelData::Fred(fred) => Ok(compose_fred_svg(fred, options)),
            other => Err(other.mismatch(Panel::Fred)),
        }
    }
}
