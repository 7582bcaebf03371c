//! Twelve Data daily candlesticks in a 2x2 grid.

use crate::core::svg::{escape_text, SvgDocument};
use crate::domain::model::{Panel, RenderOptions};
use crate::domain::ports::PanelSource;
use crate::sources::{expect_success, PanelData};
use crate::utils::error::{FrameError, Result};
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";
const CHART_SLOTS: [(f64, f64); 4] = [(10.0, 10.0), (410.0, 10.0), (10.0, 230.0), (410.0, 230.0)];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StocksSettings {
    pub api_key: String,
    /// e.g. `["BTC/USD", "QQQ", "IONQ", "TSLA"]`
    pub symbols: Vec<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_outputsize")]
    pub outputsize: usize,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_outputsize() -> usize {
    60
}

impl Validate for StocksSettings {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("stocks.api_key", &self.api_key)?;
        validation::validate_url("stocks.base_url", &self.base_url)?;
        validation::validate_range("stocks.outputsize", self.outputsize, 1, 5000)?;
        if self.symbols.is_empty() {
            return Err(FrameError::MissingConfigError {
                field: "stocks.symbols".to_string(),
            });
        }
        for symbol in &self.symbols {
            validation::validate_non_empty_string("stocks.symbols", symbol)?;
        }
        if self.symbols.len() > CHART_SLOTS.len() {
            tracing::warn!(
                "⚠️ {} stock symbols configured, only the first {} are drawn",
                self.symbols.len(),
                CHART_SLOTS.len()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesResponse {
    #[serde(default)]
    pub values: Vec<TimeSeriesValue>,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesValue {
    pub datetime: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

#[derive(Debug, Clone)]
pub struct StockSeries {
    pub symbol: String,
    pub candles: Vec<Candle>,
}

impl StockSeries {
    /// Absolute and percentage change from first to last close. The
    /// percentage is 0 when the first close is 0.
    pub fn change(&self) -> Option<(f64, f64)> {
        let first = self.candles.first()?;
        let last = self.candles.last()?;
        let change = last.close - first.close;
        let pct = if first.close == 0.0 {
            0.0
        } else {
            change / first.close * 100.0
        };
        Some((change, pct))
    }

    pub fn price_range(&self) -> Option<(f64, f64)> {
        if self.candles.is_empty() {
            return None;
        }
        let low = self.candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let high = self.candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        Some((low, high))
    }
}

#[derive(Debug, Clone)]
pub struct StocksData {
    pub stocks: Vec<StockSeries>,
}

/// Rows that fail to parse are dropped. Output is oldest first.
pub fn parse_time_series(response: TimeSeriesResponse) -> Vec<Candle> {
    let mut candles: Vec<Candle> = response
        .values
        .iter()
        .filter_map(|value| {
            Some(Candle {
                date: value.datetime.clone(),
                open: value.open.parse().ok()?,
                high: value.high.parse().ok()?,
                low: value.low.parse().ok()?,
                close: value.close.parse().ok()?,
            })
        })
        .collect();
    candles.reverse();
    candles
}

/// `BTC/USD` shows as `BTC`; other symbols unchanged.
pub fn display_symbol(symbol: &str) -> String {
    match symbol.split_once('/') {
        Some((base, "USD")) => base.to_string(),
        _ => symbol.to_string(),
    }
}

pub fn format_price_label(price: f64) -> String {
    if price > 5000.0 {
        format!("${:.0}K", price / 1000.0)
    } else {
        format!("${:.0}", price)
    }
}

pub struct StocksSource {
    settings: StocksSettings,
    client: Client,
}

impl StocksSource {
    pub fn new(settings: StocksSettings, client: Client) -> Self {
        Self { settings, client }
    }

    async fn fetch_symbol(&self, symbol: &str) -> Result<StockSeries> {
        let url = format!("{}/time_series", self.settings.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", "1day".to_string()),
                ("outputsize", self.settings.outputsize.to_string()),
                ("apikey", self.settings.api_key.clone()),
            ])
            .send()
            .await?;
        let response = expect_success("Twelve Data", response).await?;
        let text = response.text().await?;
        tracing::debug!(
            "{} response (first 200 chars): {}",
            symbol,
            text.chars().take(200).collect::<String>()
        );

        let parsed: TimeSeriesResponse = serde_json::from_str(&text)?;
        if parsed.status != "ok" {
            return Err(FrameError::UpstreamError {
                source_name: "Twelve Data".to_string(),
                message: format!(
                    "{}: {}",
                    symbol,
                    parsed.message.as_deref().unwrap_or("request failed")
                ),
            });
        }

        Ok(StockSeries {
            symbol: display_symbol(symbol),
            candles: parse_time_series(parsed),
        })
    }

    pub async fn fetch_stocks(&self) -> Result<StocksData> {
        let mut stocks = Vec::with_capacity(self.settings.symbols.len());
        for symbol in self.settings.symbols.iter().take(CHART_SLOTS.len()) {
            stocks.push(self.fetch_symbol(symbol).await?);
        }
        Ok(StocksData { stocks })
    }
}

pub fn compose_stocks_svg(stocks: &StocksData, options: &RenderOptions) -> String {
    let mut doc = SvgDocument::frame();

    for (stock, (x, y)) in stocks.stocks.iter().zip(CHART_SLOTS) {
        draw_chart(&mut doc, stock, x, y, 380.0, 200.0);
    }

    let footer_y = 470.0;
    let updated = options.now.with_timezone(&Local);
    doc.text(10.0, footer_y, 12, "start", r#"fill="black""#, &format!("Last updated: {}", updated.format("%H:%M:%S")));
    doc.battery_gauge(690.0, footer_y - 10.0, options.battery_pct);

    doc.finish()
}

fn draw_chart(doc: &mut SvgDocument, stock: &StockSeries, x: f64, y: f64, width: f64, height: f64) {
    doc.push(format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="white" stroke="black" stroke-width="2"/>"#,
        x, y, width, height
    ));
    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-size="18" font-weight="bold" fill="black">{}</text>"#,
        x + width / 2.0,
        y + 20.0,
        escape_text(&stock.symbol)
    ));

    let (Some(last), Some((change, change_pct)), Some((min_price, max_price))) =
        (stock.candles.last(), stock.change(), stock.price_range())
    else {
        return;
    };

    let sign = if change >= 0.0 { "+" } else { "" };
    let change_color = if change >= 0.0 { "green" } else { "red" };
    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="start" font-size="14" fill="black">${:.2}</text>"#,
        x + 5.0,
        y + 20.0,
        last.close
    ));
    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="end" font-size="12" fill="{}">{}{:.2} ({}{:.1}%)</text>"#,
        x + width - 5.0,
        y + 20.0,
        change_color,
        sign,
        change,
        sign,
        change_pct
    ));

    let range = if max_price > min_price {
        max_price - min_price
    } else {
        1.0
    };
    let chart_x = x + 40.0;
    let chart_y = y + 35.0;
    let chart_w = width - 50.0;
    let chart_h = height - 55.0;
    let to_y = |price: f64| (chart_y + chart_h - (price - min_price) / range * chart_h).round();

    for i in 0..5 {
        let grid_y = chart_y + chart_h * i as f64 / 4.0;
        doc.line(chart_x, grid_y, chart_x + chart_w, grid_y, "#cccccc", 1.0);
    }

    let count = stock.candles.len();
    let candle_width = if count > 1 {
        (chart_w / count as f64 * 0.7).max(1.0).floor()
    } else {
        10.0
    };
    for (i, candle) in stock.candles.iter().enumerate() {
        let px = (chart_x + chart_w * i as f64 / count as f64 + candle_width / 2.0).round();
        let color = if candle.is_bullish() { "#00AA00" } else { "#CC0000" };
        doc.line(px, to_y(candle.high), px, to_y(candle.low), color, 1.0);

        let open_y = to_y(candle.open);
        let close_y = to_y(candle.close);
        let body_height = (open_y - close_y).abs().max(1.0);
        doc.push(format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" stroke="{}" stroke-width="1"/>"#,
            px - candle_width / 2.0,
            open_y.min(close_y),
            candle_width,
            body_height,
            color,
            color
        ));
    }

    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="end" font-size="10" fill="black">{}</text>"#,
        chart_x - 5.0,
        chart_y + 5.0,
        format_price_label(max_price)
    ));
    doc.push(format!(
        r#"<text x="{}" y="{}" text-anchor="end" font-size="10" fill="black">{}</text>"#,
        chart_x - 5.0,
        chart_y + chart_h,
        format_price_label(min_price)
    ));
}

#[async_trait]
impl PanelSource for StocksSource {
    fn panel(&self) -> Panel {
        Panel::Stocks
    }

    async fn fetch(&self) -> Result<PanelData> {
        Ok(PanelData::Stocks(self.fetch_stocks().await?))
    }

    fn compose(&self, data: &PanelData, options: &RenderOptions) -> Result<String> {
        match data {
            PanelData::Stocks(stocks) => Ok(compose_stocks_svg(stocks, options)),
            other => Err(other.mismatch(Panel::Stocks)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(date: &str, open: &str, close: &str) -> TimeSeriesValue {
        TimeSeriesValue {
            datetime: date.to_string(),
            open: open.to_string(),
            high: "110".to_string(),
            low: "90".to_string(),
            close: close.to_string(),
        }
    }

    #[test]
    fn test_parse_skips_bad_rows_and_orders_oldest_first() {
        let response = TimeSeriesResponse {
            values: vec![
                value("2024-03-03", "100", "105"),
                value("2024-03-02", "n/a", "101"),
                value("2024-03-01", "98", "100"),
            ],
            status: "ok".to_string(),
            message: None,
        };

        let candles = parse_time_series(response);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].date, "2024-03-01");
        assert_eq!(candles[1].close, 105.0);
    }

    #[test]
    fn test_display_symbol() {
        assert_eq!(display_symbol("BTC/USD"), "BTC");
        assert_eq!(display_symbol("EUR/GBP"), "EUR/GBP");
        assert_eq!(display_symbol("TSLA"), "TSLA");
    }

    #[test]
    fn test_price_labels() {
        assert_eq!(format_price_label(64250.0), "$64K");
        assert_eq!(format_price_label(412.4), "$412");
    }

    #[test]
    fn test_series_change() {
        let series = StockSeries {
            symbol: "QQQ".to_string(),
            candles: vec![
                Candle { date: "a".into(), open: 99.0, high: 101.0, low: 98.0, close: 100.0 },
                Candle { date: "b".into(), open: 100.0, high: 112.0, low: 95.0, close: 110.0 },
            ],
        };
        let (change, pct) = series.change().unwrap();
        assert_eq!(change, 10.0);
        assert!((pct - 10.0).abs() < 1e-9);
        assert_eq!(series.price_range(), Some((95.0, 112.0)));
    }

    #[test]
    fn test_zero_first_close_has_no_percent_change() {
        let data = StocksData {
            stocks: vec![StockSeries {
                symbol: "NEWCO".to_string(),
                candles: vec![
                    Candle { date: "a".into(), open: 0.0, high: 0.0, low: 0.0, close: 0.0 },
                    Candle { date: "b".into(), open: 0.0, high: 2.5, low: 0.0, close: 2.0 },
                ],
            }],
        };
        assert_eq!(data.stocks[0].change(), Some((2.0, 0.0)));

        let svg = compose_stocks_svg(&data, &RenderOptions::default());
        assert!(svg.contains(r#"fill="green">+2.00 (+0.0%)</text>"#));
        assert!(!svg.contains("NaN"));
        assert!(!svg.contains("inf"));
    }

    #[test]
    fn test_svg_shows_change_and_candles() {
        let data = StocksData {
            stocks: vec![StockSeries {
                symbol: "IONQ".to_string(),
                candles: vec![
                    Candle { date: "a".into(), open: 10.0, high: 11.0, low: 9.0, close: 10.5 },
                    Candle { date: "b".into(), open: 10.5, high: 10.6, low: 8.0, close: 8.4 },
                ],
            }],
        };
        let svg = compose_stocks_svg(&data, &RenderOptions::default());

        assert!(svg.contains(">IONQ</text>"));
        assert!(svg.contains(">$8.40</text>"));
        assert!(svg.contains(r#"fill="red">-2.10 (-20.0%)</text>"#));
        assert!(svg.contains("#00AA00"));
        assert!(svg.contains("#CC0000"));
    }

    #[test]
    fn test_empty_series_draws_symbol_only() {
        let data = StocksData {
            stocks: vec![StockSeries {
                symbol: "TSLA".to_string(),
                candles: vec![],
            }],
        };
        let svg = compose_stocks_svg(&data, &RenderOptions::default());
        assert!(svg.contains(">TSLA</text>"));
        assert!(!svg.contains("#00AA00"));
    }
}
