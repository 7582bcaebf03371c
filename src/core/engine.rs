//! Extract → transform → load for one frame: fetch (or reuse) panel data,
//! compose the SVG, then encode it for the requested output.

use crate::config::AppConfig;
use crate::core::bitmap::generate_test_bitmap;
use crate::core::raster::{bitmap_to_png, render_svg_to_bitmap, FontBook};
use crate::core::svg::error_svg;
use crate::domain::model::{OutputFormat, Panel, RenderOptions, Rendered};
use crate::domain::ports::PanelSource;
use crate::sources::fred::FredSource;
use crate::sources::stocks::StocksSource;
use crate::sources::weather::WeatherSource;
use crate::sources::weight::WeightSource;
use crate::sources::PanelData;
use crate::utils::error::{FrameError, Result};
use crate::utils::monitor::SystemMonitor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct CacheEntry {
    data: PanelData,
    fetched_at: Instant,
}

/// Last fetched data per panel. Entries older than the TTL are only used
/// when a refetch fails.
pub struct PanelCache {
    ttl: Duration,
    entries: Mutex<HashMap<Panel, CacheEntry>>,
}

impl PanelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fresh(&self, panel: Panel) -> Option<PanelData> {
        let entries = self.entries.lock().await;
        entries
            .get(&panel)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.data.clone())
    }

    /// Any entry regardless of age, with its age.
    pub async fn stale(&self, panel: Panel) -> Option<(PanelData, Duration)> {
        let entries = self.entries.lock().await;
        entries
            .get(&panel)
            .map(|entry| (entry.data.clone(), entry.fetched_at.elapsed()))
    }

    pub async fn store(&self, data: PanelData) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            data.panel(),
            CacheEntry {
                data,
                fetched_at: Instant::now(),
            },
        );
    }
}

pub struct RenderEngine {
    sources: HashMap<Panel, Arc<dyn PanelSource>>,
    cache: PanelCache,
    fonts: FontBook,
    width: u16,
    height: u16,
    monitor: SystemMonitor,
}

impl RenderEngine {
    pub fn new(
        sources: Vec<Arc<dyn PanelSource>>,
        cache_ttl: Duration,
        width: u16,
        height: u16,
        fonts: FontBook,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.panel(), s)).collect(),
            cache: PanelCache::new(cache_ttl),
            fonts,
            width,
            height,
            monitor: SystemMonitor::new(false),
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = SystemMonitor::new(enabled);
        self
    }

    /// Sources for every configured table, frame size from the device profile.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("iot-image/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut sources: Vec<Arc<dyn PanelSource>> = Vec::new();
        if let Some(weather) = &config.weather {
            sources.push(Arc::new(WeatherSource::new(weather.clone(), client.clone())));
        }
        if let Some(stocks) = &config.stocks {
            sources.push(Arc::new(StocksSource::new(stocks.clone(), client.clone())));
        }
        if let Some(fred) = &config.fred {
            sources.push(Arc::new(FredSource::new(fred.clone(), client.clone())));
        }
        if let Some(weight) = &config.weight {
            sources.push(Arc::new(WeightSource::new(weight.clone())));
        }

        let engine = Self::new(
            sources,
            config.cache_ttl(),
            config.device.display.width,
            config.device.display.height,
            FontBook::system(),
        )
        .with_monitoring(config.monitoring_enabled());
        tracing::info!(
            "🖼️ Render engine ready: panels {:?}, frame {}x{}, {} font faces",
            engine.panels(),
            engine.width,
            engine.height,
            engine.fonts.face_count()
        );
        Ok(engine)
    }

    /// Enabled panels in display order.
    pub fn panels(&self) -> Vec<Panel> {
        Panel::ALL
            .into_iter()
            .filter(|panel| self.sources.contains_key(panel))
            .collect()
    }

    pub fn is_enabled(&self, panel: Panel) -> bool {
        self.sources.contains_key(&panel)
    }

    fn source(&self, panel: Panel) -> Result<&Arc<dyn PanelSource>> {
        self.sources.get(&panel).ok_or_else(|| FrameError::PanelDisabled {
            panel: panel.to_string(),
        })
    }

    async fn extract(&self, source: &dyn PanelSource) -> Result<PanelData> {
        let panel = source.panel();
        if let Some(data) = self.cache.fresh(panel).await {
            tracing::debug!("Cache hit for {}", panel);
            return Ok(data);
        }

        match source.fetch().await {
            Ok(data) => {
                self.cache.store(data.clone()).await;
                Ok(data)
            }
            Err(e) => match self.cache.stale(panel).await {
                Some((data, age)) => {
                    tracing::warn!(
                        "⚠️ {} fetch failed ({}), serving data from {}s ago",
                        panel,
                        e,
                        age.as_secs()
                    );
                    Ok(data)
                }
                None => Err(e),
            },
        }
    }

    async fn load(&self, svg: String, format: OutputFormat) -> Result<Vec<u8>> {
        if format == OutputFormat::Svg {
            return Ok(svg.into_bytes());
        }

        let (width, height) = (self.width, self.height);
        let fonts = self.fonts.clone();
        // 光柵化與抖動是 CPU 密集工作
        let bitmap = tokio::task::spawn_blocking(move || render_svg_to_bitmap(&svg, width, height, &fonts))
            .await
            .map_err(|e| FrameError::RenderError {
                message: format!("render task failed: {}", e),
            })??;

        match format {
            OutputFormat::Epbm => Ok(bitmap.to_bytes()),
            _ => bitmap_to_png(&bitmap),
        }
    }

    pub async fn render(&self, panel: Panel, format: OutputFormat, options: &RenderOptions) -> Result<Rendered> {
        let source = self.source(panel)?;
        let started = Instant::now();

        // Extract
        let data = self.extract(source.as_ref()).await?;
        self.monitor.log_stats("extract");

        // Transform
        let svg = source.compose(&data, options)?;
        self.monitor.log_stats("transform");

        // Load
        let bytes = self.load(svg, format).await?;
        self.monitor.log_stats("load");

        tracing::info!(
            "✅ Rendered {} as {} ({} bytes) in {:?}",
            panel,
            format.extension(),
            bytes.len(),
            started.elapsed()
        );
        Ok(Rendered {
            format,
            bytes,
            fallback: false,
        })
    }

    /// Frames always come back for `.bin` (the test pattern) and `svg` (an
    /// error page). PNG previews and disabled panels return the error.
    pub async fn render_or_fallback(
        &self,
        panel: Panel,
        format: OutputFormat,
        options: &RenderOptions,
    ) -> Result<Rendered> {
        let error = match self.render(panel, format, options).await {
            Ok(rendered) => return Ok(rendered),
            Err(e @ FrameError::PanelDisabled { .. }) => return Err(e),
            Err(e) => e,
        };

        tracing::error!(
            "❌ {} render failed: {} (Category: {:?}, Severity: {:?}, retryable: {})",
            panel,
            error,
            error.category(),
            error.severity(),
            error.is_retryable()
        );

        match format {
            OutputFormat::Epbm => Ok(Rendered {
                format,
                bytes: generate_test_bitmap(self.width, self.height).to_bytes(),
                fallback: true,
            }),
            OutputFormat::Svg => Ok(Rendered {
                format,
                bytes: error_svg(&error.to_string()).into_bytes(),
                fallback: true,
            }),
            OutputFormat::Png => Err(error),
        }
    }

    pub fn frame_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }
}
