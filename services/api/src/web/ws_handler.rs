//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a chat WebSocket
//! connection. It forwards client messages to the orchestrator, pushes the
//! counter once a minute, and tears everything down when the socket closes.

use crate::web::{
    chat_task::{ChatOrchestrator, SubmitOutcome},
    counter::read_counter,
    middleware::CurrentUser,
    protocol::{ChatModeParam, ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use chrono::Utc;
use exit_core::counter::REFRESH_INTERVAL_SECS;
use exit_core::ports::DatabaseService;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct ChatParams {
    #[serde(default)]
    pub mode: ChatModeParam,
    pub device_id: Option<String>,
}

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(params): Query<ChatParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id, params))
}

async fn handle_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    user_id: Option<Uuid>,
    params: ChatParams,
) {
    match user_id {
        Some(user_id) => info!("Chat connection opened for user {}", user_id),
        None => info!("Chat connection opened without a session"),
    }

    let (mut sender, mut receiver) = socket.split();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // --- 1. Writer: the only task that touches the socket sink ---
    let writer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize chat event: {:?}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                info!("Client went away while sending.");
                break;
            }
        }
    });

    // --- 2. Counter ticker ---
    let ticker_token = CancellationToken::new();
    let ticker = tokio::spawn(run_counter_ticker(
        app_state.db.clone(),
        user_id,
        params.device_id.clone(),
        events_tx.clone(),
        ticker_token.clone(),
    ));

    // --- 3. Main Message Loop ---
    let orchestrator = ChatOrchestrator::new(
        app_state.chat_adapter.clone(),
        user_id,
        params.mode.into(),
        events_tx.clone(),
    );

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text_message(text.as_str(), &orchestrator, &events_tx).await;
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error: {:?}", e);
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    orchestrator.shutdown().await;
    ticker_token.cancel();
    if let Err(e) = ticker.await {
        error!("Counter ticker ended abnormally: {:?}", e);
    }
    writer.abort();
    info!("Chat connection closed.");
}

/// Pushes the counter once on start and then every refresh interval until
/// `token` is cancelled or the connection's event channel closes.
pub async fn run_counter_ticker(
    db: Arc<dyn DatabaseService>,
    user_id: Option<Uuid>,
    device_id: Option<String>,
    events: mpsc::UnboundedSender<ServerMessage>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(REFRESH_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        match read_counter(db.as_ref(), user_id, device_id.as_deref(), Utc::now()).await {
            Ok(reading) => {
                if events.send(ServerMessage::Counter { days: reading.days }).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Failed to refresh counter: {:?}", e),
        }
    }
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: &str,
    orchestrator: &ChatOrchestrator,
    events: &mpsc::UnboundedSender<ServerMessage>,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Submit { text }) => {
            if let SubmitOutcome::Ignored(reason) = orchestrator.submit(&text).await {
                info!("Ignored chat submission: {:?}", reason);
            }
        }
        Ok(ClientMessage::SetMode { mode }) => orchestrator.set_mode(mode.into()).await,
        Ok(ClientMessage::ClearConversation) => orchestrator.clear_conversation().await,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            let reply = ServerMessage::Error {
                message: "Unrecognized message".to_string(),
            };
            if events.send(reply).is_err() {
                debug!("Dropping error reply for a closed connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CannedReplyAdapter, InMemoryDb};
    use chrono::Duration as ChronoDuration;
    use exit_core::counter::format_local_start;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn ticker_pushes_on_start_and_every_minute() {
        let db = Arc::new(InMemoryDb::new());
        let start = Utc::now() - ChronoDuration::days(3);
        db.set_device_start("device-1", &format_local_start(start))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let ticker = tokio::spawn(run_counter_ticker(
            db,
            None,
            Some("device-1".to_string()),
            tx,
            token.clone(),
        ));

        let opened = Instant::now();
        assert_eq!(rx.recv().await, Some(ServerMessage::Counter { days: 3 }));
        assert!(opened.elapsed() < Duration::from_secs(1));

        assert_eq!(rx.recv().await, Some(ServerMessage::Counter { days: 3 }));
        assert!(opened.elapsed() >= Duration::from_secs(REFRESH_INTERVAL_SECS));

        token.cancel();
        ticker.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_stops_when_the_connection_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let ticker = tokio::spawn(run_counter_ticker(
            Arc::new(InMemoryDb::new()),
            None,
            None,
            tx,
            CancellationToken::new(),
        ));
        ticker.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_message_gets_an_error_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = ChatOrchestrator::new(
            Arc::new(CannedReplyAdapter::new()),
            None,
            Default::default(),
            tx.clone(),
        );

        handle_text_message(r#"{"type":"shout","text":"hi"}"#, &orchestrator, &tx).await;
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::Error {
                message: "Unrecognized message".to_string()
            })
        );

        handle_text_message("not json", &orchestrator, &tx).await;
        assert!(matches!(rx.recv().await, Some(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn error_reply_to_a_closed_connection_is_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = ChatOrchestrator::new(
            Arc::new(CannedReplyAdapter::new()),
            None,
            Default::default(),
            tx.clone(),
        );
        drop(rx);
        handle_text_message("not json", &orchestrator, &tx).await;
    }
}
