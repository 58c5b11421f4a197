//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::Config;
use exit_core::chat::Conversation;
use exit_core::domain::ChatMode;
use exit_core::ports::{DatabaseService, FederatedTokenVerifier, GenerativeTextService, SmsSender};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub chat_adapter: Arc<dyn GenerativeTextService>,
    /// `None` when phone sign-in has no delivery channel configured.
    pub sms_sender: Option<Arc<dyn SmsSender>>,
    pub federated_verifier: Arc<dyn FederatedTokenVerifier>,
}

//=========================================================================================
// ChatSession (Specific to One WebSocket Connection)
//=========================================================================================

/// Where the current chat turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    Sending,
    Displaying,
    Fading,
}

/// The state for a single chat connection.
pub struct ChatSession {
    pub user_id: Option<Uuid>,
    pub mode: ChatMode,
    pub phase: ChatPhase,
    pub conversation: Conversation,
    /// Number of the most recent request. Replies tagged with anything else are dropped.
    pub latest_seq: u64,
    /// The request whose failure notice is still on screen, if any.
    pub notice_seq: Option<u64>,
    /// Cancels the timers of whatever is currently on screen.
    pub display_token: CancellationToken,
}

impl ChatSession {
    pub fn new(user_id: Option<Uuid>, mode: ChatMode) -> Self {
        Self {
            user_id,
            mode,
            phase: ChatPhase::Idle,
            conversation: Conversation::new(),
            latest_seq: 0,
            notice_seq: None,
            display_token: CancellationToken::new(),
        }
    }
}
