//! services/api/src/adapters/canned_llm.rs
//!
//! A `GenerativeTextService` that answers from a fixed list. Wired in when no
//! Gemini key is configured so the chat flow still works end to end.

use async_trait::async_trait;
use exit_core::ports::{GenerativeTextService, PortResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

const RESPONSES: &[&str] = &[
    "Take a deep breath. You are doing the right thing for yourself.",
    "Remember why you chose to step away. Growth happens in the discomfort.",
    "This feeling will pass. You are stronger than this moment.",
    "Don't trade your long-term peace for temporary relief.",
    "Focus on yourself today. You deserve your own energy.",
    "Healing isn't linear, but you are moving forward.",
    "Contacting them now resets the clock. Keep your streak alive.",
    "Your future self will thank you for staying strong right now.",
];

/// Rotates through the canned replies in order.
#[derive(Default)]
pub struct CannedReplyAdapter {
    next: AtomicUsize,
}

impl CannedReplyAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GenerativeTextService for CannedReplyAdapter {
    async fn generate_reply(&self, _prompt: &str) -> PortResult<String> {
        warn!("GEMINI_API_KEY is missing. Returning a canned reply.");
        let index = self.next.fetch_add(1, Ordering::Relaxed) % RESPONSES.len();
        Ok(RESPONSES[index].to_string())
    }
}
