//! WebSocket and HTTP routes for observers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use vaporboost_core::ManagerSnapshot;

use crate::{
    control::SessionControl,
    protocol::{ClientMessage, ServerMessage, dispatch},
};

/// Route state.
#[derive(Clone)]
pub struct WsState {
    pub control: Arc<dyn SessionControl>,
}

impl WsState {
    #[must_use]
    pub fn new(control: Arc<dyn SessionControl>) -> Self {
        Self { control }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Current report as JSON.
pub async fn snapshot_handler(State(state): State<WsState>) -> Json<ManagerSnapshot> {
    Json(state.control.report())
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // History first, then live events
    let mut events = state.control.feed().history_plus_stream();
    let event_tx = tx.clone();
    let feed_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event_tx.send(ServerMessage::Event { event }).is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(request) => dispatch(state.control.as_ref(), request).await,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                }
            }
        };
        if tx.send(reply).is_err() {
            break;
        }
    }

    feed_task.abort();
    send_task.abort();
}

/// Create the observer router: `GET /ws` and `GET /snapshot`.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(SessionManager::new(factory, settings));
/// let app = create_router(manager);
/// ```
#[must_use]
pub fn create_router(control: Arc<dyn SessionControl>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/snapshot", get(snapshot_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(WsState::new(control))
}
