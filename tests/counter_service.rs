//! Integration tests for the counter service: HTTP routes and the live
//! counter channel.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::frame::coding::CloseCode, tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tower::ServiceExt;

use live_counter::config::Settings;
use live_counter::server::{create_app, AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.host = "127.0.0.1".to_string();
    settings.server.port = 0;
    settings
}

async fn spawn_server(settings: Settings) -> (SocketAddr, AppState) {
    let state = AppState::new(settings);
    let app = create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let url = format!("ws://{}/ws/counter", addr);
    let (client, _) = connect_async(url).await.unwrap();
    client
}

/// Next pushed count, skipping control frames
async fn next_count(client: &mut Client) -> u64 {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("no message from server")
            .expect("stream ended")
            .expect("transport error");

        if let Message::Text(text) = msg {
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            return value["activeConnections"].as_u64().unwrap();
        }
    }
}

async fn wait_for_count(state: &AppState, expected: usize) {
    let mut rx = state.connection_manager.subscribe_count();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|n| *n == expected))
        .await
        .expect("registry did not reach the expected count")
        .unwrap();
}

mod routes {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_app(AppState::new(test_settings()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["active_connections"], 0);
        assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let mut settings = test_settings();
        settings.websocket.max_connections = 25;
        let app = create_app(AppState::new(settings));

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["active_connections"], 0);
        assert_eq!(stats["peak_connections"], 0);
        assert_eq!(stats["max_connections"], 25);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_app(AppState::new(test_settings()));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("live_counter_active_connections"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = create_app(AppState::new(test_settings()));

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_counter_path_requires_upgrade() {
        let app = create_app(AppState::new(test_settings()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ws/counter")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}

mod counter_channel {
    use super::*;

    #[tokio::test]
    async fn test_first_message_includes_self() {
        let (addr, _state) = spawn_server(test_settings()).await;

        let mut client = connect(addr).await;
        assert_eq!(next_count(&mut client).await, 1);
    }

    #[tokio::test]
    async fn test_counts_follow_arrivals_and_departures() {
        let (addr, state) = spawn_server(test_settings()).await;

        let mut first = connect(addr).await;
        assert_eq!(next_count(&mut first).await, 1);

        let mut second = connect(addr).await;
        assert_eq!(next_count(&mut second).await, 2);
        assert_eq!(next_count(&mut first).await, 2);

        second.close(None).await.unwrap();
        assert_eq!(next_count(&mut first).await, 1);
        wait_for_count(&state, 1).await;

        let stats = state.connection_manager.stats();
        assert_eq!(stats.peak_connections, 2);
        assert_eq!(stats.total_opened, 2);
        assert_eq!(stats.total_closed, 1);
    }

    #[tokio::test]
    async fn test_dropped_client_is_unregistered() {
        let (addr, state) = spawn_server(test_settings()).await;

        let client = connect(addr).await;
        wait_for_count(&state, 1).await;

        drop(client);
        wait_for_count(&state, 0).await;
    }

    #[tokio::test]
    async fn test_terminated_connection_is_torn_down_then_unregistered() {
        let (addr, state) = spawn_server(test_settings()).await;

        let mut client = connect(addr).await;
        assert_eq!(next_count(&mut client).await, 1);

        let handle = state.connection_manager.get_all_connections().remove(0);
        handle.terminate();
        wait_for_count(&state, 0).await;

        // Socket tasks are gone, so the client sees the stream end
        let end = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(Ok(_)) = client.next().await {}
        })
        .await;
        assert!(end.is_ok());
    }

    #[tokio::test]
    async fn test_inbound_messages_are_ignored() {
        let (addr, state) = spawn_server(test_settings()).await;

        let mut client = connect(addr).await;
        assert_eq!(next_count(&mut client).await, 1);

        client
            .send(Message::Text(r#"{"activeConnections":99}"#.into()))
            .await
            .unwrap();
        client.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.connection_manager.active_count(), 1);

        // Still open and still receiving real counts
        let mut other = connect(addr).await;
        assert_eq!(next_count(&mut other).await, 2);
        assert_eq!(next_count(&mut client).await, 2);
    }

    #[tokio::test]
    async fn test_connection_limit_closes_extra_clients() {
        let mut settings = test_settings();
        settings.websocket.max_connections = 1;
        let (addr, state) = spawn_server(settings).await;

        let mut admitted = connect(addr).await;
        assert_eq!(next_count(&mut admitted).await, 1);

        let mut rejected = connect(addr).await;
        let msg = tokio::time::timeout(Duration::from_secs(2), rejected.next())
            .await
            .expect("no close frame")
            .expect("stream ended")
            .expect("transport error");

        match msg {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Again),
            other => panic!("expected close frame, got {:?}", other),
        }
        assert_eq!(state.connection_manager.active_count(), 1);
    }

    #[tokio::test]
    async fn test_custom_channel_path() {
        let mut settings = test_settings();
        settings.websocket.path = "/live".to_string();
        let (addr, _state) = spawn_server(settings).await;

        let (mut client, _) = connect_async(format!("ws://{}/live", addr)).await.unwrap();
        assert_eq!(next_count(&mut client).await, 1);
    }
}
