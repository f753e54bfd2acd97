//! Integration tests for the signaling relay
//!
//! Boots the server on a random port and drives it over a real WebSocket,
//! the same way the browser viewer does.
//!
//! Run with: cargo test -p roboscope-server --test signaling

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use roboscope_protocol::{ClientMessage, ServerMessage};
use roboscope_server::control::LatestControlSink;
use roboscope_server::scene::DemoScene;
use roboscope_server::state::{AppState, Config, VideoMode};

use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

struct TestServer {
    addr: std::net::SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(video_mode: VideoMode) -> anyhow::Result<Self> {
        let config = Config {
            bind_address: "127.0.0.1:0".to_string(),
            video_mode,
            fps: 30,
            test_pattern: true,
            width: 64,
            height: 48,
            eye_separation_m: 0.064,
            fov_degrees: 90.0,
            tls_cert_path: None,
            tls_key_path: None,
            stun_servers: vec![],
        };

        let renderer = DemoScene::new(
            config.width,
            config.height,
            config.eye_separation_m,
            config.fov_degrees,
        );
        let state = AppState::new(config, renderer, Arc::new(LatestControlSink::new()));
        let router = roboscope_server::create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn recv_server_message(ws: &mut WsStream) -> anyhow::Result<ServerMessage> {
    loop {
        let msg = timeout(Duration::from_secs(10), ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
        if let Message::Text(text) = msg {
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

async fn send_client_message(ws: &mut WsStream, msg: &ClientMessage) -> anyhow::Result<()> {
    ws.send(Message::Text(serde_json::to_string(msg)?.into()))
        .await?;
    Ok(())
}

/// Offer as the browser builds it: a control data channel plus recvonly
/// video transceivers for the expected track count.
async fn build_viewer_offer(video_lines: usize) -> anyhow::Result<String> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;
    pc.create_data_channel("control", None).await?;
    for _ in 0..video_lines {
        pc.add_transceiver_from_kind(RTPCodecType::Video, None)
            .await?;
    }

    let offer = pc.create_offer(None).await?;
    pc.close().await?;
    Ok(offer.sdp)
}

#[tokio::test]
async fn ping_gets_exactly_one_pong() {
    let server = TestServer::start(VideoMode::Combined).await.unwrap();
    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();

    send_client_message(&mut ws, &ClientMessage::Ping)
        .await
        .unwrap();
    let reply = recv_server_message(&mut ws).await.unwrap();
    assert!(matches!(reply, ServerMessage::Pong));

    // Any stray extra reply would arrive ahead of the next pong.
    send_client_message(&mut ws, &ClientMessage::Ping)
        .await
        .unwrap();
    let reply = recv_server_message(&mut ws).await.unwrap();
    assert!(matches!(reply, ServerMessage::Pong));
}

#[tokio::test]
async fn loop_survives_malformed_messages() {
    let server = TestServer::start(VideoMode::Combined).await.unwrap();
    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();

    for garbage in ["not json at all", "{\"type\":", "{\"type\":\"mystery\"}"] {
        ws.send(Message::Text(garbage.to_string().into()))
            .await
            .unwrap();
    }

    send_client_message(&mut ws, &ClientMessage::Ping)
        .await
        .unwrap();
    let reply = recv_server_message(&mut ws).await.unwrap();
    assert!(matches!(reply, ServerMessage::Pong));
}

#[tokio::test]
async fn candidate_without_session_is_ignored() {
    let server = TestServer::start(VideoMode::Combined).await.unwrap();
    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();

    let raw = serde_json::json!({
        "type": "ice-candidate",
        "candidate": {
            "candidate": "candidate:1 1 udp 2122260223 127.0.0.1 50000 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        }
    });
    ws.send(Message::Text(raw.to_string().into())).await.unwrap();

    // No error reply, loop still alive.
    send_client_message(&mut ws, &ClientMessage::Ping)
        .await
        .unwrap();
    let reply = recv_server_message(&mut ws).await.unwrap();
    assert!(matches!(reply, ServerMessage::Pong));
}

#[tokio::test]
async fn offer_is_answered_in_combined_mode() {
    let server = TestServer::start(VideoMode::Combined).await.unwrap();
    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();

    let sdp = build_viewer_offer(1).await.unwrap();
    send_client_message(&mut ws, &ClientMessage::Offer { sdp })
        .await
        .unwrap();

    match recv_server_message(&mut ws).await.unwrap() {
        ServerMessage::Answer { sdp } => {
            assert!(sdp.contains("m=video"), "answer should carry video");
            assert!(
                sdp.contains("m=application"),
                "answer should carry the data channel"
            );
        }
        other => panic!("expected answer, got {:?}", other),
    }
}

#[tokio::test]
async fn offer_is_answered_in_dual_mode() {
    let server = TestServer::start(VideoMode::Dual).await.unwrap();
    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();

    let sdp = build_viewer_offer(2).await.unwrap();
    send_client_message(&mut ws, &ClientMessage::Offer { sdp })
        .await
        .unwrap();

    match recv_server_message(&mut ws).await.unwrap() {
        ServerMessage::Answer { sdp } => {
            let video_lines = sdp.matches("m=video").count();
            assert_eq!(video_lines, 2, "dual mode answers both video lines");
        }
        other => panic!("expected answer, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_offer_reports_error_without_killing_the_loop() {
    let server = TestServer::start(VideoMode::Combined).await.unwrap();
    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();

    send_client_message(
        &mut ws,
        &ClientMessage::Offer {
            sdp: "definitely not sdp".to_string(),
        },
    )
    .await
    .unwrap();

    let reply = recv_server_message(&mut ws).await.unwrap();
    assert!(matches!(reply, ServerMessage::Error { .. }));

    send_client_message(&mut ws, &ClientMessage::Ping)
        .await
        .unwrap();
    let reply = recv_server_message(&mut ws).await.unwrap();
    assert!(matches!(reply, ServerMessage::Pong));
}
