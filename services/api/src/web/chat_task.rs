//! services/api/src/web/chat_task.rs
//!
//! Drives one chat connection: accepts submissions, calls the companion in the
//! background, and walks each reply through its display, fade and clear steps.
//!
//! Every transition happens under the session lock and is announced on the
//! `events` channel in the same critical section, so the client sees events in
//! the order the state changed.

use crate::web::{
    protocol::ServerMessage,
    state::{ChatPhase, ChatSession},
};
use exit_core::chat::{
    build_prompt, display_duration_ms, ReplyPlan, FADE_MS, NOTICE_DISPLAY_MS, ROLEPLAY_CLOSING,
};
use exit_core::domain::ChatMode;
use exit_core::ports::{GenerativeTextService, PortResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Message shown when the companion cannot be reached.
const FAILURE_NOTICE: &str = "Sorry, I couldn't respond right now. Please try again.";

/// Why a submission was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyMessage,
    SignInRequired,
    RequestInFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { seq: u64 },
    Ignored(IgnoreReason),
}

/// The work to do for an accepted submission.
enum ReplyJob {
    Generate(String),
    Closing,
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    llm: Arc<dyn GenerativeTextService>,
    session: Arc<Mutex<ChatSession>>,
    events: mpsc::UnboundedSender<ServerMessage>,
}

impl ChatOrchestrator {
    pub fn new(
        llm: Arc<dyn GenerativeTextService>,
        user_id: Option<Uuid>,
        mode: ChatMode,
        events: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            llm,
            session: Arc::new(Mutex::new(ChatSession::new(user_id, mode))),
            events,
        }
    }

    pub async fn phase(&self) -> ChatPhase {
        self.session.lock().await.phase
    }

    fn emit(&self, message: ServerMessage) {
        // The receiver only goes away when the socket is closing.
        if self.events.send(message).is_err() {
            debug!("Dropping chat event for a closed connection");
        }
    }

    /// Takes whatever is on screen down. Must be called with the session locked.
    fn clear_screen(&self, session: &mut ChatSession) {
        session.display_token.cancel();
        if matches!(session.phase, ChatPhase::Displaying | ChatPhase::Fading) {
            self.emit(ServerMessage::ReplyCleared {
                seq: session.latest_seq,
            });
            session.phase = ChatPhase::Idle;
        }
        if let Some(seq) = session.notice_seq.take() {
            self.emit(ServerMessage::NoticeCleared { seq });
        }
    }

    /// Sends a user message to the companion.
    ///
    /// A submission made while a reply is on screen interrupts it. One made
    /// while a request is still in flight is dropped.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::EmptyMessage);
        }

        let (seq, job) = {
            let mut session = self.session.lock().await;
            if session.user_id.is_none() {
                return SubmitOutcome::Ignored(IgnoreReason::SignInRequired);
            }
            if session.phase == ChatPhase::Sending {
                return SubmitOutcome::Ignored(IgnoreReason::RequestInFlight);
            }

            self.clear_screen(&mut session);

            session.latest_seq += 1;
            session.phase = ChatPhase::Sending;
            let job = match session.conversation.next_reply_plan() {
                ReplyPlan::Generate => ReplyJob::Generate(build_prompt(
                    session.conversation.recent(),
                    text,
                    session.mode,
                    session.conversation.roleplay(),
                )),
                ReplyPlan::BreakCharacter => {
                    info!("Roleplay limit reached, breaking character");
                    ReplyJob::Closing
                }
            };
            session.conversation.push_user(text);
            self.emit(ServerMessage::Sending {
                seq: session.latest_seq,
            });
            (session.latest_seq, job)
        };

        let this = self.clone();
        tokio::spawn(async move {
            let result = match job {
                ReplyJob::Generate(prompt) => this.llm.generate_reply(&prompt).await,
                ReplyJob::Closing => Ok(ROLEPLAY_CLOSING.to_string()),
            };
            this.complete(seq, result).await;
        });

        SubmitOutcome::Accepted { seq }
    }

    /// Applies the outcome of request `seq`, unless a newer request superseded it.
    async fn complete(&self, seq: u64, result: PortResult<String>) {
        let mut session = self.session.lock().await;
        if seq != session.latest_seq || session.phase != ChatPhase::Sending {
            debug!("Discarding stale reply for request {}", seq);
            return;
        }

        session.display_token = CancellationToken::new();
        let token = session.display_token.clone();

        match result {
            Ok(reply) => {
                session.conversation.record_assistant(&reply);
                session.phase = ChatPhase::Displaying;
                let duration_ms = display_duration_ms(&reply);
                self.emit(ServerMessage::ReplyDisplayed {
                    seq,
                    text: reply,
                    duration_ms,
                });
                tokio::spawn(self.clone().run_reply_timers(seq, duration_ms, token));
            }
            Err(e) => {
                error!("Chat request {} failed: {:?}", seq, e);
                session.phase = ChatPhase::Idle;
                session.notice_seq = Some(seq);
                self.emit(ServerMessage::SystemNotice {
                    seq,
                    message: FAILURE_NOTICE.to_string(),
                    duration_ms: NOTICE_DISPLAY_MS,
                });
                tokio::spawn(self.clone().run_notice_timer(seq, token));
            }
        }
    }

    async fn run_reply_timers(self, seq: u64, duration_ms: u64, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(duration_ms)) => {}
        }
        {
            let mut session = self.session.lock().await;
            if token.is_cancelled() || session.latest_seq != seq || session.phase != ChatPhase::Displaying {
                return;
            }
            session.phase = ChatPhase::Fading;
            self.emit(ServerMessage::ReplyFading { seq });
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(FADE_MS)) => {}
        }
        let mut session = self.session.lock().await;
        if token.is_cancelled() || session.latest_seq != seq || session.phase != ChatPhase::Fading {
            return;
        }
        session.phase = ChatPhase::Idle;
        self.emit(ServerMessage::ReplyCleared { seq });
    }

    async fn run_notice_timer(self, seq: u64, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(NOTICE_DISPLAY_MS)) => {}
        }
        let mut session = self.session.lock().await;
        if token.is_cancelled() || session.notice_seq != Some(seq) {
            return;
        }
        session.notice_seq = None;
        self.emit(ServerMessage::NoticeCleared { seq });
    }

    pub async fn set_mode(&self, mode: ChatMode) {
        let mut session = self.session.lock().await;
        if session.mode != mode {
            info!("Chat mode changed to {:?}", mode);
            session.mode = mode;
        }
    }

    /// Forgets the conversation. A reply still in flight is discarded when it lands.
    pub async fn clear_conversation(&self) {
        let mut session = self.session.lock().await;
        self.clear_screen(&mut session);
        session.latest_seq += 1;
        session.phase = ChatPhase::Idle;
        session.conversation.clear();
    }

    /// Stops all timers and abandons any pending request.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        session.display_token.cancel();
        session.latest_seq += 1;
        session.phase = ChatPhase::Idle;
        session.notice_seq = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use exit_core::chat::ROLEPLAY_CONFIRMATION;
    use exit_core::ports::PortError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers based on the last user line of the prompt.
    #[derive(Default)]
    struct ScriptedLlm {
        calls: AtomicUsize,
    }

    fn last_user_line(prompt: &str) -> &str {
        prompt
            .rsplit("\nUser: ")
            .next()
            .and_then(|tail| tail.strip_suffix("\nAssistant:"))
            .unwrap_or("")
    }

    #[async_trait]
    impl GenerativeTextService for ScriptedLlm {
        async fn generate_reply(&self, prompt: &str) -> PortResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let message = last_user_line(prompt);
            if message.contains("slow") {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            if message.contains("fail") {
                return Err(PortError::Unavailable("model offline".to_string()));
            }
            if message.contains("pretend") {
                return Ok(ROLEPLAY_CONFIRMATION.to_string());
            }
            Ok(format!("echo {}", message))
        }
    }

    fn orchestrator(
        user: Option<Uuid>,
    ) -> (
        ChatOrchestrator,
        Arc<ScriptedLlm>,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let llm = Arc::new(ScriptedLlm::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let chat = ChatOrchestrator::new(llm.clone(), user, ChatMode::Normal, tx);
        (chat, llm, rx)
    }

    async fn next_displayed(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> (u64, String) {
        loop {
            match rx.recv().await {
                Some(ServerMessage::ReplyDisplayed { seq, text, .. }) => return (seq, text),
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_submit_is_a_no_op() {
        let (chat, llm, mut rx) = orchestrator(None);
        let outcome = chat.submit("hello there").await;
        assert_eq!(outcome, SubmitOutcome::Ignored(IgnoreReason::SignInRequired));
        assert_eq!(chat.phase().await, ChatPhase::Idle);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_and_in_flight_submissions_are_ignored() {
        let (chat, _llm, _rx) = orchestrator(Some(Uuid::new_v4()));
        assert_eq!(
            chat.submit("   ").await,
            SubmitOutcome::Ignored(IgnoreReason::EmptyMessage)
        );
        assert_eq!(chat.submit("slow one").await, SubmitOutcome::Accepted { seq: 1 });
        assert_eq!(
            chat.submit("another").await,
            SubmitOutcome::Ignored(IgnoreReason::RequestInFlight)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reply_walks_through_display_fade_and_clear() {
        let (chat, _llm, mut rx) = orchestrator(Some(Uuid::new_v4()));
        chat.submit("hi").await;

        assert_eq!(rx.recv().await, Some(ServerMessage::Sending { seq: 1 }));
        let displayed = rx.recv().await;
        assert_eq!(
            displayed,
            Some(ServerMessage::ReplyDisplayed {
                seq: 1,
                text: "echo hi".to_string(),
                duration_ms: display_duration_ms("echo hi"),
            })
        );
        assert_eq!(rx.recv().await, Some(ServerMessage::ReplyFading { seq: 1 }));
        assert_eq!(rx.recv().await, Some(ServerMessage::ReplyCleared { seq: 1 }));
        assert_eq!(chat.phase().await, ChatPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn new_submission_interrupts_displayed_reply() {
        let (chat, _llm, mut rx) = orchestrator(Some(Uuid::new_v4()));
        chat.submit("first").await;
        next_displayed(&mut rx).await;
        assert_eq!(chat.phase().await, ChatPhase::Displaying);

        chat.submit("second").await;
        assert_eq!(rx.recv().await, Some(ServerMessage::ReplyCleared { seq: 1 }));
        assert_eq!(rx.recv().await, Some(ServerMessage::Sending { seq: 2 }));
        let (seq, text) = next_displayed(&mut rx).await;
        assert_eq!((seq, text.as_str()), (2, "echo second"));

        // The first reply's timers were cancelled, so it never fades.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!drain(&mut rx).contains(&ServerMessage::ReplyFading { seq: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_to_a_cleared_conversation_is_discarded() {
        let (chat, _llm, mut rx) = orchestrator(Some(Uuid::new_v4()));
        assert_eq!(chat.submit("slow question").await, SubmitOutcome::Accepted { seq: 1 });
        chat.clear_conversation().await;
        assert_eq!(chat.submit("quick").await, SubmitOutcome::Accepted { seq: 3 });

        let (seq, _) = next_displayed(&mut rx).await;
        assert_eq!(seq, 3);

        tokio::time::sleep(Duration::from_secs(20)).await;
        let late = drain(&mut rx);
        assert!(!late
            .iter()
            .any(|e| matches!(e, ServerMessage::ReplyDisplayed { seq: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_becomes_a_notice_outside_history() {
        let (chat, _llm, mut rx) = orchestrator(Some(Uuid::new_v4()));
        chat.submit("please fail").await;

        assert_eq!(rx.recv().await, Some(ServerMessage::Sending { seq: 1 }));
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::SystemNotice {
                seq: 1,
                message: FAILURE_NOTICE.to_string(),
                duration_ms: NOTICE_DISPLAY_MS,
            })
        );
        assert_eq!(chat.phase().await, ChatPhase::Idle);
        assert_eq!(rx.recv().await, Some(ServerMessage::NoticeCleared { seq: 1 }));

        let session = chat.session.lock().await;
        assert_eq!(session.conversation.turns().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn roleplay_breaks_character_after_five_replies() {
        let (chat, llm, mut rx) = orchestrator(Some(Uuid::new_v4()));
        chat.submit("can you pretend to be my ex").await;
        let (_, text) = next_displayed(&mut rx).await;
        assert_eq!(text, ROLEPLAY_CONFIRMATION);

        for i in 0..5 {
            chat.submit(&format!("line {}", i)).await;
            next_displayed(&mut rx).await;
        }
        assert_eq!(llm.calls.load(Ordering::SeqCst), 6);

        chat.submit("one more").await;
        let (_, text) = next_displayed(&mut rx).await;
        assert_eq!(text, ROLEPLAY_CLOSING);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 6);

        let session = chat.session.lock().await;
        assert!(!session.conversation.roleplay().active);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timers() {
        let (chat, _llm, mut rx) = orchestrator(Some(Uuid::new_v4()));
        chat.submit("hi").await;
        next_displayed(&mut rx).await;
        chat.shutdown().await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(drain(&mut rx).is_empty());
    }
}
