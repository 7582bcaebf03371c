use anyhow::Result;
use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use iot_image::core::bitmap::EpdBitmap;
use iot_image::core::raster::FontBook;
use iot_image::sources::fred::{compose_fred_svg, FredSettings, FredSource};
use iot_image::sources::stocks::{compose_stocks_svg, StocksSettings, StocksSource};
use iot_image::sources::weight::{WeightSettings, WeightSource};
use iot_image::{
    AppConfig, FrameError, LocalStorage, OutputFormat, Panel, PanelSource, PanelView, RenderEngine,
    RenderOptions, Storage,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn candles_body(closes: &[f64]) -> serde_json::Value {
    // Twelve Data returns newest first
    let values: Vec<serde_json::Value> = closes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, close)| {
            serde_json::json!({
                "datetime": format!("2024-05-{:02}", i + 1),
                "open": format!("{:.2}", close - 1.0),
                "high": format!("{:.2}", close + 2.0),
                "low": format!("{:.2}", close - 3.0),
                "close": format!("{:.2}", close),
                "volume": "1000"
            })
        })
        .collect();
    serde_json::json!({
        "meta": {"symbol": "AAPL", "interval": "1day"},
        "values": values,
        "status": "ok"
    })
}

#[tokio::test]
async fn test_stocks_fetch_and_compose() -> Result<()> {
    let server = MockServer::start_async().await;
    let aapl = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/time_series")
                .query_param("symbol", "AAPL")
                .query_param("interval", "1day")
                .query_param("outputsize", "30");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(candles_body(&[180.0, 182.5, 181.0, 185.25]));
        })
        .await;
    let msft = server
        .mock_async(|when, then| {
            when.method(GET).path("/time_series").query_param("symbol", "MSFT");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(candles_body(&[410.0, 405.0]));
        })
        .await;

    let source = StocksSource::new(
        StocksSettings {
            api_key: "demo".to_string(),
            symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
            base_url: server.base_url(),
            outputsize: 30,
        },
        reqwest::Client::new(),
    );
    let data = source.fetch_stocks().await?;

    aapl.assert_async().await;
    msft.assert_async().await;
    assert_eq!(data.stocks.len(), 2);
    assert_eq!(data.stocks[0].symbol, "AAPL");
    // oldest first
    assert_eq!(data.stocks[0].candles[0].date, "2024-05-01");
    assert_eq!(data.stocks[0].candles[3].close, 185.25);

    let svg = compose_stocks_svg(&data, &RenderOptions::default());
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains("AAPL"));
    assert!(svg.contains("MSFT"));
    Ok(())
}

#[tokio::test]
async fn test_stocks_error_status_is_upstream_error() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/time_series");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "code": 401,
                    "message": "**apikey** parameter is incorrect",
                    "status": "error"
                }));
        })
        .await;

    let source = StocksSource::new(
        StocksSettings {
            api_key: "wrong".to_string(),
            symbols: vec!["AAPL".to_string()],
            base_url: server.base_url(),
            outputsize: 30,
        },
        reqwest::Client::new(),
    );

    match source.fetch_stocks().await {
        Err(FrameError::UpstreamError { source_name, message }) => {
            assert_eq!(source_name, "Twelve Data");
            assert!(message.contains("apikey"));
        }
        other => panic!("expected upstream error, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[tokio::test]
async fn test_fred_fetches_every_series() -> Result<()> {
    let server = MockServer::start_async().await;
    let observations = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/fred/series/observations")
                .query_param("file_type", "json")
                .query_param("sort_order", "desc")
                .query_param("limit", "3");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "observations": [
                        {"date": "2024-05-03", "value": "18.4"},
                        {"date": "2024-05-02", "value": "."},
                        {"date": "2024-05-01", "value": "16.9"}
                    ]
                }));
        })
        .await;

    let source = FredSource::new(
        FredSettings {
            api_key: "fred-key".to_string(),
            observations: 3,
            base_url: server.base_url(),
        },
        reqwest::Client::new(),
    );
    let data = source.fetch_fred().await?;

    observations.assert_hits_async(4).await;
    assert_eq!(data.window, 3);
    assert_eq!(data.series.len(), 4);
    for series in &data.series {
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0].date, "2024-05-01");
    }

    let svg = compose_fred_svg(&data, &RenderOptions::default());
    assert!(svg.contains("Market Crash Monitor"));
    assert!(svg.contains("regimeGradient0"));
    Ok(())
}

#[tokio::test]
async fn test_weight_panel_renders_both_views() -> Result<()> {
    let dir = TempDir::new()?;
    let csv_path = dir.path().join("weight.csv");
    let mut csv = String::from("Date,Actual Weight\n");
    for day in 1..=28 {
        csv.push_str(&format!("2024-02-{:02},{:.1}\n", day, 210.0 - day as f64 * 0.2));
    }
    std::fs::write(&csv_path, csv)?;

    let source: Arc<dyn PanelSource> = Arc::new(WeightSource::new(WeightSettings { csv_path }));
    let engine = RenderEngine::new(vec![source], Duration::from_secs(60), 80, 48, FontBook::empty());

    let mut options = RenderOptions::at(Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());
    let forecast = engine.render(Panel::Weight, OutputFormat::Svg, &options).await?;
    assert!(String::from_utf8(forecast.bytes)?.contains("90-Day Weight Forecast"));

    options.view = PanelView::Velocity;
    let velocity = engine.render(Panel::Weight, OutputFormat::Svg, &options).await?;
    assert!(String::from_utf8(velocity.bytes)?.contains("Velocity (lbs/week)"));

    let frame = engine.render(Panel::Weight, OutputFormat::Epbm, &options).await?;
    let bitmap = EpdBitmap::from_bytes(&frame.bytes)?;
    assert_eq!((bitmap.width(), bitmap.height()), (80, 48));
    Ok(())
}

#[tokio::test]
async fn test_render_to_output_directory() -> Result<()> {
    let dir = TempDir::new()?;
    let csv_path = dir.path().join("weight.csv");
    std::fs::write(
        &csv_path,
        "Date,Actual Weight\n2024-03-01,200.0\n2024-03-02,199.6\n2024-03-03,199.9\n",
    )?;
    let output_dir = dir.path().join("output");

    let config = AppConfig::from_toml_str(&format!(
        r#"
[server]
output_path = "{}"

[weight]
csv_path = "{}"
"#,
        output_dir.display(),
        csv_path.display()
    ))?;
    assert_eq!(config.enabled_panels(), vec![Panel::Weight]);

    let source: Arc<dyn PanelSource> = Arc::new(WeightSource::new(config.weight.clone().unwrap()));
    let engine = RenderEngine::new(vec![source], config.cache_ttl(), 80, 48, FontBook::empty());
    let rendered = engine
        .render(Panel::Weight, OutputFormat::Png, &RenderOptions::default())
        .await?;

    let storage = LocalStorage::new(config.server.output_path.clone());
    storage.write_file("weight.png", &rendered.bytes).await?;

    let written = std::fs::read(output_dir.join("weight.png"))?;
    assert_eq!(&written[1..4], b"PNG");
    Ok(())
}

#[test]
fn test_device_header_written_through_storage() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::default();
    let storage = LocalStorage::new(dir.path().to_string_lossy().to_string());

    tokio_test::block_on(storage.write_file("client/config.h", config.device.render_header().as_bytes()))
        .unwrap();

    let header = std::fs::read_to_string(dir.path().join("client/config.h")).unwrap();
    assert!(header.contains("#define SERVER_PORT"));
    assert!(header.trim_end().ends_with("#endif // IOT_IMAGE_CONFIG_H"));
}
