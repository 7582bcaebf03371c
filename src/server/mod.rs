//! HTTP front end. Each panel gets explicit routes for the device frame,
//! the SVG source and a dithered PNG preview.

use crate::config::device::DeviceProfile;
use crate::core::engine::RenderEngine;
use crate::domain::model::{OutputFormat, Panel, PanelView, RenderOptions, Rendered};
use crate::utils::error::{FrameError, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{de, Deserialize, Deserializer};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: RenderEngine,
    pub device: DeviceProfile,
}

/// Query accepted by every frame route.
#[derive(Debug, Default, Deserialize)]
pub struct FrameQuery {
    /// Reported by the device. Values outside 0..=100 are clamped.
    pub battery_pct: Option<i64>,
    pub show_alerts: Option<bool>,
    /// Any letter case, e.g. `velocity` or `Velocity`.
    #[serde(default, deserialize_with = "deserialize_view")]
    pub view: Option<PanelView>,
}

fn deserialize_view<'de, D>(deserializer: D) -> std::result::Result<Option<PanelView>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| raw.parse().map_err(de::Error::custom))
        .transpose()
}

impl FrameQuery {
    pub fn to_options(&self) -> RenderOptions {
        let mut options = RenderOptions::default();
        options.battery_pct = self.battery_pct.map(|pct| pct.clamp(0, 100) as u8);
        if let Some(show_alerts) = self.show_alerts {
            options.show_alerts = show_alerts;
        }
        if let Some(view) = self.view {
            options.view = view;
        }
        options
    }
}

/// Maps render failures to HTTP statuses.
pub struct FrameResponseError(FrameError);

impl IntoResponse for FrameResponseError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            FrameError::PanelDisabled { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, self.0.user_friendly_message()).into_response()
    }
}

fn frame_response(rendered: Rendered) -> Response {
    let mut response = (
        [
            (header::CONTENT_TYPE, rendered.content_type()),
            (header::CACHE_CONTROL, "no-store"),
        ],
        rendered.bytes,
    )
        .into_response();
    if rendered.fallback {
        response
            .headers_mut()
            .insert("x-frame-fallback", HeaderValue::from_static("true"));
    }
    response
}

async fn serve_frame(
    state: Arc<AppState>,
    panel: Panel,
    format: OutputFormat,
    query: FrameQuery,
) -> std::result::Result<Response, FrameResponseError> {
    tracing::debug!("GET {} as {} with {:?}", panel, format.extension(), query);
    let options = query.to_options();
    state
        .engine
        .render_or_fallback(panel, format, &options)
        .await
        .map(frame_response)
        .map_err(FrameResponseError)
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({"status": "ok", "panels": state.engine.panels()}))
}

async fn handle_device_header(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.device.render_header(),
    )
}

async fn handle_device_profile(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.device.clone())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(handle_health))
        .route("/device/config.h", get(handle_device_header))
        .route("/device/profile", get(handle_device_profile));

    for panel in Panel::ALL {
        let routes = [
            ("seed-e1002.bin", OutputFormat::Epbm),
            ("svg", OutputFormat::Svg),
            ("debug", OutputFormat::Png),
        ];
        for (suffix, format) in routes {
            router = router.route(
                &format!("/{}/{}", panel.slug(), suffix),
                get(
                    move |State(state): State<Arc<AppState>>, Query(query): Query<FrameQuery>| async move {
                        serve_frame(state, panel, format, query).await
                    },
                ),
            );
        }
    }

    router.with_state(state)
}

async fn bind(host: &str, port: u16) -> Result<tokio::net::TcpListener> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    Ok(listener)
}

/// Binds and serves in the background. Returns the bound address, so port 0
/// picks a free port.
pub async fn start_server(state: Arc<AppState>, host: &str, port: u16) -> Result<SocketAddr> {
    let listener = bind(host, port).await?;
    let actual_addr = listener.local_addr()?;
    let app = build_router(state);

    tracing::info!("🚀 Server listening on {}", actual_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("❌ Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

/// Serves in the foreground until Ctrl-C.
pub async fn run_server(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let listener = bind(host, port).await?;
    tracing::info!("🚀 Server listening on {}", listener.local_addr()?);
    for panel in state.engine.panels() {
        tracing::info!("   /{}/seed-e1002.bin, /{}/svg, /{}/debug", panel, panel, panel);
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Cannot listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
