//! Web server for the push channels, the control API and the optional web UI.
//! Uses axum framework with tower middleware support.

use std::{net::SocketAddr, path::PathBuf};

use axum::{
    Router,
    routing::{get, post, put},
};
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{info, warn};

use super::{WebState, api, push};

pub struct WebServer {
    bind_addr: SocketAddr,
    web_assets_path: Option<PathBuf>,
    state: WebState,
}

impl WebServer {
    pub fn new(bind_addr: SocketAddr, web_assets_path: Option<PathBuf>, state: WebState) -> Self {
        Self {
            bind_addr,
            web_assets_path,
            state,
        }
    }

    /// Build the application router with all routes
    fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/ws", get(push::ws_handler))
            .route("/api/events", get(push::sse_handler))
            .route("/api/status", get(api::get_status))
            .route("/api/device", put(api::put_device))
            .route("/api/source", post(api::post_source))
            .route("/api/standby", post(api::post_standby))
            .route("/api/wake", post(api::post_wake))
            .with_state(self.state.clone());

        // Add static file serving if web UI is enabled
        if let Some(assets_path) = &self.web_assets_path {
            if assets_path.join("index.html").is_file() {
                let serve_dir = tower_http::services::ServeDir::new(assets_path)
                    .append_index_html_on_directories(true);
                router = router.fallback_service(serve_dir);
                info!("Web UI serving enabled from {}", assets_path.display());
            } else {
                warn!(
                    "Web UI directory doesn't contain index.html: {}",
                    assets_path.display()
                );
            }
        } else {
            info!("Web UI serving disabled (no web assets path configured)");
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!("Starting web server on {}", self.bind_addr);
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .context("Failed to bind to address")?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("Shutting down web server...");
        })
        .await
        .context("Server error")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::BroadcastHub;
    use crate::session::SessionManager;
    use crate::supervisor::Backoff;
    use crate::testing::{MockConnector, MockProperties};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::{Stream, StreamExt};
    use serde_json::{Value, json};
    use speaker_client::{DeviceInfo, VendorEvent, paths};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
    use tower::ServiceExt;

    type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    fn test_server() -> (WebServer, Arc<MockConnector>) {
        let connector = MockConnector::new();
        let hub = Arc::new(BroadcastHub::default());
        let sessions = Arc::new(SessionManager::new(
            hub.clone(),
            connector.clone(),
            Backoff::default(),
            CancellationToken::new(),
        ));
        let server = WebServer::new(
            "127.0.0.1:0".parse().unwrap(),
            None,
            WebState { sessions, hub },
        );
        (server, connector)
    }

    async fn spawn_server(server: &WebServer) -> SocketAddr {
        let router = server.build_router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        addr
    }

    /// Start a session on a mock speaker that has an open event stream.
    async fn connect_speaker(
        server: &WebServer,
        connector: &MockConnector,
        properties: MockProperties,
    ) -> tokio::sync::mpsc::UnboundedSender<VendorEvent> {
        let speaker = connector.speaker("10.0.0.5");
        *speaker.properties.lock() = properties;
        let tx = speaker.push_stream();
        server
            .state
            .sessions
            .set_active_device(DeviceInfo::new("10.0.0.5").with_name("Den"))
            .await;
        timeout(Duration::from_secs(2), async {
            while !server.state.sessions.is_connected().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("supervisor never connected");
        tx
    }

    async fn next_ws_json(ws: &mut WsClient) -> Value {
        loop {
            let msg = timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("socket closed")
                .expect("socket error");
            if let tungstenite::Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn next_sse_json<S, B>(stream: &mut S, buf: &mut String) -> Value
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
        B: AsRef<[u8]>,
    {
        loop {
            if let Some(end) = buf.find("\n\n") {
                let block: String = buf.drain(..end + 2).collect();
                let data: Vec<&str> = block
                    .lines()
                    .filter_map(|l| l.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect();
                if data.is_empty() {
                    continue;
                }
                return serde_json::from_str(&data.join("\n")).unwrap();
            }
            let chunk = timeout(Duration::from_secs(2), stream.next())
                .await
                .expect("timed out waiting for event")
                .expect("stream ended")
                .expect("stream error");
            buf.push_str(std::str::from_utf8(chunk.as_ref()).unwrap());
        }
    }

    async fn request(
        server: &WebServer,
        method: &str,
        uri: &str,
        body: &str,
    ) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = server.build_router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_websocket_snapshot_then_live_events() {
        let (server, connector) = test_server();
        let tx = connect_speaker(
            &server,
            &connector,
            MockProperties {
                volume: Some(25),
                mute: Some(false),
                ..Default::default()
            },
        )
        .await;
        let addr = spawn_server(&server).await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("Failed to connect");

        let connected = next_ws_json(&mut ws).await;
        assert_eq!(connected["type"], "connected");
        assert!(connected["data"]["clientId"].is_u64());

        assert_eq!(
            next_ws_json(&mut ws).await,
            json!({"type": "speakerHealth", "data": {"connected": true}})
        );
        assert_eq!(
            next_ws_json(&mut ws).await,
            json!({"type": "speaker", "data": {"name": "Den", "address": "10.0.0.5"}})
        );
        assert_eq!(
            next_ws_json(&mut ws).await,
            json!({"type": "volume", "data": {"volume": 25}})
        );
        assert_eq!(
            next_ws_json(&mut ws).await,
            json!({"type": "mute", "data": {"muted": false}})
        );

        tx.send(VendorEvent::new(paths::VOLUME, json!({"type": "i32_", "i32_": 60})))
            .unwrap();
        assert_eq!(
            next_ws_json(&mut ws).await,
            json!({"type": "volume", "data": {"volume": 60}})
        );
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_websocket_close_unregisters() {
        let (server, _connector) = test_server();
        let hub = server.state.hub.clone();
        let addr = spawn_server(&server).await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        assert_eq!(next_ws_json(&mut ws).await["type"], "connected");
        assert_eq!(hub.client_count(), 1);

        ws.close(None).await.unwrap();
        timeout(Duration::from_secs(2), async {
            while hub.client_count() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client was never unregistered");
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_sse_standby_snapshot() {
        let (server, connector) = test_server();
        let _tx = connect_speaker(
            &server,
            &connector,
            MockProperties {
                volume: Some(25),
                ..Default::default()
            },
        )
        .await;
        server.state.sessions.notify_standby();
        let addr = spawn_server(&server).await;

        let resp = reqwest::get(format!("http://{addr}/api/events")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let mut stream = Box::pin(resp.bytes_stream());
        let mut buf = String::new();

        assert_eq!(next_sse_json(&mut stream, &mut buf).await["type"], "connected");
        assert_eq!(
            next_sse_json(&mut stream, &mut buf).await,
            json!({"type": "source", "data": {"name": "standby"}})
        );
        assert_eq!(
            next_sse_json(&mut stream, &mut buf).await,
            json!({"type": "power", "data": {"status": "standby"}})
        );
        assert_eq!(connector.speaker("10.0.0.5").query_count(), 0);

        // Nothing else until something is published
        server.state.hub.publish(&crate::event::NormalizedEvent::Mute { muted: true });
        assert_eq!(
            next_sse_json(&mut stream, &mut buf).await,
            json!({"type": "mute", "data": {"muted": true}})
        );
    }

    #[tokio::test]
    async fn test_status_and_device_routes() {
        let (server, connector) = test_server();
        let _tx = connector.speaker("10.0.0.9").push_stream();

        let (status, body) = request(&server, "GET", "/api/status", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"connected": false, "inStandby": false, "device": null, "clients": 0})
        );

        let (status, body) = request(&server, "PUT", "/api/device", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "parse_error");

        let (status, body) = request(&server, "PUT", "/api/device", r#"{"address": " "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let payload = r#"{"address": "10.0.0.9", "name": "Kitchen"}"#;
        let (status, body) = request(&server, "PUT", "/api/device", payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"changed": true}));

        let (_, body) = request(&server, "PUT", "/api/device", payload).await;
        assert_eq!(body, json!({"changed": false}));

        let (_, body) = request(&server, "GET", "/api/status", "").await;
        assert_eq!(body["device"], json!({"address": "10.0.0.9", "name": "Kitchen"}));
    }

    #[tokio::test]
    async fn test_source_and_standby_routes() {
        let (server, connector) = test_server();

        let (status, body) =
            request(&server, "POST", "/api/source", r#"{"source": "wifi"}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let _tx = connect_speaker(&server, &connector, MockProperties::default()).await;

        let (status, _) = request(&server, "POST", "/api/source", r#"{"source": ""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            request(&server, "POST", "/api/source", r#"{"source": "standby"}"#).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(server.state.sessions.is_in_standby());

        let (status, _) = request(&server, "POST", "/api/wake", "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!server.state.sessions.is_in_standby());

        let (status, _) = request(&server, "POST", "/api/standby", "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = request(&server, "GET", "/api/status", "").await;
        assert_eq!(body["inStandby"], true);

        assert_eq!(
            connector.speaker("10.0.0.5").sources_set(),
            vec!["standby".to_string()]
        );
    }

    #[tokio::test]
    async fn test_static_assets_fallback() {
        let web_dir = std::env::temp_dir().join("speakerlink_test_assets");
        let _ = std::fs::remove_dir_all(&web_dir);
        std::fs::create_dir_all(&web_dir).unwrap();
        std::fs::write(web_dir.join("index.html"), "<html>speakerlink</html>").unwrap();

        let (mut server, _connector) = test_server();
        server.web_assets_path = Some(web_dir.clone());

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = server.build_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"<html>speakerlink</html>");

        let _ = std::fs::remove_dir_all(&web_dir);
    }
}
