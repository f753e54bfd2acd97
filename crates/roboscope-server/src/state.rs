use std::path::PathBuf;
use std::sync::Arc;

use roboscope_media::{FrameSource, SceneRenderer};

use crate::control::ControlSink;
use crate::session::SessionRegistry;

/// How stereo video travels over the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    /// Both eyes concatenated into one wide track
    Combined,
    /// Separate left and right tracks
    Dual,
}

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    pub video_mode: VideoMode,
    pub fps: u32,
    pub test_pattern: bool,
    pub width: u32,
    pub height: u32,
    pub eye_separation_m: f32,
    pub fov_degrees: f32,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub stun_servers: Vec<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let bind_address =
            std::env::var("ROBOSCOPE_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let video_mode = match std::env::var("ROBOSCOPE_VIDEO_MODE").as_deref() {
            Ok("dual") => VideoMode::Dual,
            Ok("combined") | Ok("sbs") | Err(_) => VideoMode::Combined,
            Ok(other) => anyhow::bail!("unknown ROBOSCOPE_VIDEO_MODE: {other:?}"),
        };

        let fps: u32 = env_parsed("ROBOSCOPE_FPS", 30)?;
        anyhow::ensure!(fps > 0, "ROBOSCOPE_FPS must be positive");

        let width: u32 = env_parsed("ROBOSCOPE_WIDTH", 640)?;
        let height: u32 = env_parsed("ROBOSCOPE_HEIGHT", 480)?;
        anyhow::ensure!(width > 0 && height > 0, "frame dimensions must be positive");
        // H.264 4:2:0 encoding requires even dimensions.
        anyhow::ensure!(
            width % 2 == 0 && height % 2 == 0,
            "frame dimensions must be even, got {width}x{height}"
        );

        let test_pattern = std::env::var("ROBOSCOPE_TEST_PATTERN")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let eye_separation_m: f32 = env_parsed("ROBOSCOPE_EYE_SEPARATION_M", 0.064)?;
        let fov_degrees: f32 = env_parsed("ROBOSCOPE_FOV_DEGREES", 90.0)?;

        let tls_cert_path = std::env::var("ROBOSCOPE_TLS_CERT").ok().map(PathBuf::from);
        let tls_key_path = std::env::var("ROBOSCOPE_TLS_KEY").ok().map(PathBuf::from);

        let stun_servers = std::env::var("ROBOSCOPE_STUN_SERVERS")
            .map(|s| s.split(',').map(String::from).collect())
            .unwrap_or_else(|_| vec!["stun:stun.l.google.com:19302".to_string()]);

        Ok(Config {
            bind_address,
            video_mode,
            fps,
            test_pattern,
            width,
            height,
            eye_separation_m,
            fov_degrees,
            tls_cert_path,
            tls_key_path,
            stun_servers,
        })
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("could not parse {name}={raw:?}")),
        Err(_) => Ok(default),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionRegistry>,
    pub source: Arc<FrameSource>,
    pub control: Arc<dyn ControlSink>,
}

impl AppState {
    pub fn new(
        config: Config,
        renderer: Arc<dyn SceneRenderer>,
        control: Arc<dyn ControlSink>,
    ) -> Self {
        let source = Arc::new(FrameSource::new(renderer, config.width, config.height));

        Self {
            config,
            sessions: Arc::new(SessionRegistry::new()),
            source,
            control,
        }
    }
}
