use clap::Parser;
use iot_image::domain::model::RenderOptions;
use iot_image::utils::error::FrameError;
use iot_image::utils::{logger, validation::Validate};
use iot_image::{AppConfig, AppState, Cli, Command, LocalStorage, RenderEngine, Storage};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(cli.verbose);
            exit_with(&e);
        }
    };
    cli.apply_overrides(&mut config);

    // 初始化日誌
    if config.monitoring.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("Starting iot-image {}", env!("CARGO_PKG_VERSION"));
    if cli.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }
    if config.monitoring_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    if let Err(e) = run(cli.command, config).await {
        tracing::error!(
            "❌ {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        exit_with(&e);
    }
}

async fn run(command: Command, config: AppConfig) -> iot_image::Result<()> {
    match command {
        Command::Serve { .. } => {
            let engine = RenderEngine::from_config(&config)?;
            let state = Arc::new(AppState {
                engine,
                device: config.device.clone(),
            });
            println!("📡 Device should fetch {}", config.device.image_url());
            iot_image::server::run_server(state, &config.server.host, config.server.port).await
        }
        Command::Render {
            panel,
            format,
            output,
            battery_pct,
            view,
        } => {
            let engine = RenderEngine::from_config(&config)?;
            let options = RenderOptions {
                battery_pct,
                view,
                ..RenderOptions::default()
            };

            let rendered = engine.render(panel, format, &options).await?;
            let file_name = output.unwrap_or_else(|| format!("{}.{}", panel, format.extension()));
            let storage = LocalStorage::new(config.server.output_path.clone());
            storage.write_file(&file_name, &rendered.bytes).await?;

            tracing::info!("📁 Output saved to: {}", storage.full_path(&file_name).display());
            println!("✅ Rendered {} panel ({} bytes)", panel, rendered.bytes.len());
            println!("📁 Output saved to: {}", storage.full_path(&file_name).display());
            Ok(())
        }
        Command::DeviceHeader { output } => {
            let storage = LocalStorage::new(config.server.output_path.clone());
            storage
                .write_file(&output, config.device.render_header().as_bytes())
                .await?;
            println!("📁 Header saved to: {}", storage.full_path(&output).display());
            Ok(())
        }
        Command::Check => {
            let panels = config.enabled_panels();
            println!("✅ Configuration is valid");
            println!("📊 Enabled panels: {:?}", panels);
            println!("🖼️ Frame: {} bytes per EPBM image", config.device.frame_len());
            Ok(())
        }
    }
}

fn exit_with(e: &FrameError) -> ! {
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    std::process::exit(e.severity().exit_code());
}
