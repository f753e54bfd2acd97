use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum_server::tls_rustls::RustlsConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roboscope_server::control::LatestControlSink;
use roboscope_server::scene::DemoScene;
use roboscope_server::state::{AppState, Config, VideoMode};
use roboscope_server::create_router;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roboscope_server=debug,webrtc=warn,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Roboscope teleoperation server...");

    let config = Config::load()?;
    tracing::info!(
        "Streaming {}x{} @ {} fps, {} mode{}",
        config.width,
        config.height,
        config.fps,
        match config.video_mode {
            VideoMode::Combined => "side-by-side",
            VideoMode::Dual => "dual-track",
        },
        if config.test_pattern {
            " (test pattern)"
        } else {
            ""
        }
    );

    let renderer = DemoScene::new(
        config.width,
        config.height,
        config.eye_separation_m,
        config.fov_degrees,
    );
    let control = Arc::new(LatestControlSink::new());
    let state = AppState::new(config.clone(), renderer, control);
    let app = create_router(state.clone());

    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key).await?;
            let addr: SocketAddr = config.bind_address.parse()?;
            tracing::info!("Signaling on wss://{}", addr);

            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_handle.graceful_shutdown(None);
            });

            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        _ => {
            tracing::warn!(
                "No TLS certificate configured; signaling runs over plaintext ws:// \
                 (set ROBOSCOPE_TLS_CERT and ROBOSCOPE_TLS_KEY)"
            );
            let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
            tracing::info!("Signaling on ws://{}", listener.local_addr()?);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    tracing::info!("Shutting down, closing sessions...");
    state.sessions.close_all().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C handler: {}", e);
    }
}
