use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::response::IntoResponse;
use axum::routing::get;
use hyperfoil_term_core::client::effect::Effect;
use hyperfoil_term_core::client::{ClientSession, InputEvent, RESTART_WARNING, SessionOptions};
use hyperfoil_term_core::protocol::sentinel::{AUTH_TOKEN, SESSION_START};
use hyperfoil_term_core::session::TransportState;
use hyperfoil_term_core::transport::{
    ReconnectPolicy, TransportEvent, WebSocketConfig, WebSocketTransport,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::time::timeout;
use url::Url;

#[derive(Default)]
struct ServerState {
    /// Query string and first message of every connection.
    connections: Mutex<Vec<(Option<String>, String)>>,
    /// Text messages after the first, across connections.
    received: Mutex<Vec<String>>,
    started: Mutex<HashSet<String>>,
}

async fn cli_socket(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_connection(socket, query, state))
}

/// Mimics the web CLI endpoint: a fresh session gets the start marker and a
/// prompt; the first connection is dropped right after authentication.
async fn serve_connection(mut socket: WebSocket, query: Option<String>, state: Arc<ServerState>) {
    let Some(Ok(WsMessage::Text(first))) = socket.recv().await else {
        return;
    };
    let connection = {
        let mut connections = state.connections.lock().await;
        connections.push((query.clone(), first));
        connections.len()
    };

    let fresh = state
        .started
        .lock()
        .await
        .insert(query.clone().unwrap_or_default());
    if fresh {
        let _ = socket
            .send(WsMessage::Text(format!("{SESSION_START}[hyperfoil]$ ")))
            .await;
    }
    if connection == 1 {
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }
    let _ = socket
        .send(WsMessage::Text("reconnected\n[hyperfoil]$ ".into()))
        .await;
    while let Some(Ok(message)) = socket.recv().await {
        if let WsMessage::Text(text) = message {
            state.received.lock().await.push(text);
        }
    }
}

async fn start_server() -> (String, Arc<ServerState>, oneshot::Sender<()>) {
    let state = Arc::new(ServerState::default());
    let router = Router::new()
        .route("/", get(cli_socket))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener bind");
    let addr = listener.local_addr().expect("local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });
    (format!("http://{addr}"), state, shutdown_tx)
}

fn send_all(transport: &WebSocketTransport, effects: Vec<Effect>) {
    for effect in effects {
        if let Effect::Send(message) = effect {
            for frame in message.into_frames() {
                transport.send(frame).expect("transport send");
            }
        }
    }
}

/// Feeds transport events into the session until `done` holds.
async fn drive_until(
    client: &mut ClientSession,
    transport: &mut WebSocketTransport,
    done: impl Fn(&ClientSession) -> bool,
) {
    while !done(client) {
        let event = timeout(Duration::from_secs(5), transport.recv())
            .await
            .expect("transport event timeout")
            .expect("transport alive");
        let effects = match event {
            TransportEvent::Connecting { .. } => client.connection_opening(),
            TransportEvent::Opened => client.connection_opened(),
            TransportEvent::Frame(frame) => client.handle_frame(frame),
            TransportEvent::Closed { .. } => client.connection_closed(),
            TransportEvent::Reconnecting { .. } => client.reconnecting(),
            TransportEvent::GaveUp => panic!("transport gave up"),
        };
        send_all(transport, effects);
    }
}

fn transcript_text(client: &ClientSession) -> String {
    client
        .transcript()
        .lines()
        .iter()
        .map(|line| line.plain_text())
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn reconnect_keeps_session_id_and_authenticates_first() {
    let (base, state, shutdown) = start_server().await;

    let mut client = ClientSession::new(SessionOptions::default());
    client.set_auth_token("secret");
    let policy = ReconnectPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..ReconnectPolicy::default()
    };
    let config = WebSocketConfig::new(
        Url::parse(&base).expect("server url"),
        client.session_id().clone(),
    );
    let mut transport = WebSocketTransport::spawn(config, policy).expect("spawn transport");

    drive_until(&mut client, &mut transport, |client| {
        transcript_text(client).contains("reconnected")
    })
    .await;
    assert_eq!(client.transport_state(), TransportState::Open);
    assert!(client.session_started());
    assert!(!transcript_text(&client).contains(RESTART_WARNING));

    for ch in "help".chars() {
        send_all(&transport, client.handle_input(InputEvent::Char(ch)));
    }
    send_all(&transport, client.handle_input(InputEvent::Submit));

    let received = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(first) = state.received.lock().await.first().cloned() {
                return first;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("command delivered");
    assert_eq!(received, "help\n");

    let connections = state.connections.lock().await.clone();
    assert_eq!(connections.len(), 2);
    let expected_query = client.session_id().to_string();
    for (query, first) in &connections {
        assert_eq!(query.as_deref(), Some(expected_query.as_str()));
        assert_eq!(first, &format!("{AUTH_TOKEN}secret"));
    }

    transport.close().await;
    shutdown.send(()).ok();
}
