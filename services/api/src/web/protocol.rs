//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! chat companion.

use exit_core::domain::ChatMode;
use serde::{Deserialize, Serialize};

/// The chat mode as it appears on the wire.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatModeParam {
    #[default]
    Normal,
    AlreadyContacted,
}

impl From<ChatModeParam> for ChatMode {
    fn from(mode: ChatModeParam) -> Self {
        match mode {
            ChatModeParam::Normal => ChatMode::Normal,
            ChatModeParam::AlreadyContacted => ChatMode::AlreadyContacted,
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sends a message to the companion.
    Submit { text: String },

    /// Switches the instruction block used for the following turns.
    SetMode { mode: ChatModeParam },

    /// Forgets the conversation and drops any reply still on its way.
    ClearConversation,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The current no-contact day count. Sent on connect and once a minute.
    Counter { days: i64 },

    /// A request was accepted and is waiting on the companion.
    Sending { seq: u64 },

    /// Show this reply for `duration_ms`.
    ReplyDisplayed {
        seq: u64,
        text: String,
        duration_ms: u64,
    },

    /// Start the fade-out animation of the reply.
    ReplyFading { seq: u64 },

    /// Remove the reply from the screen.
    ReplyCleared { seq: u64 },

    /// A request failed. Rendered apart from the conversation and never sent
    /// back to the companion.
    SystemNotice {
        seq: u64,
        message: String,
        duration_ms: u64,
    },

    /// Remove the failure notice from the screen.
    NoticeCleared { seq: u64 },

    /// Reports a protocol error to the client.
    Error { message: String },
}
