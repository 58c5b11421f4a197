//! crates/exit_core/src/chat.rs
//!
//! Conversation bookkeeping for the chat companion: prompt assembly, the
//! roleplay turn counter, and how long a reply stays on screen.

use crate::domain::{ChatMode, ChatRole, ChatTurn};

/// Average adult reading speed.
pub const WORDS_PER_MINUTE: f64 = 238.0;
/// Minimum time any reply stays on screen, in milliseconds.
pub const BASE_DISPLAY_MS: u64 = 2_000;
/// Length of the fade-out before a reply is cleared.
pub const FADE_MS: u64 = 800;
/// How long a system notice (failed request) stays on screen.
pub const NOTICE_DISPLAY_MS: u64 = 5_000;
/// Prior turns included in each prompt.
pub const MAX_HISTORY_TURNS: usize = 20;
/// In-character replies allowed before the companion breaks character.
pub const ROLEPLAY_REPLY_LIMIT: u32 = 5;

/// The exact sentence the model must answer with to start a roleplay.
pub const ROLEPLAY_CONFIRMATION: &str =
    "Okay, I'll play your ex for a few messages so you can say what you need to say.";

/// Sent instead of a sixth in-character reply.
pub const ROLEPLAY_CLOSING: &str = "I'm stepping out of the roleplay now. You said what you needed to say, and that took courage. How are you feeling?";

const SYSTEM_PERSONA: &str = r#"You are a supportive, empathetic, and firm companion for someone going through a breakup who is trying to keep "No Contact" with their ex.
Your goal is to discourage them from reaching out, remind them of their worth, and help them process their emotions constructively.
Be kind but direct. Never encourage contact. Validate their feelings, then steer them towards self-care and growth.
Keep responses concise (under 50 words) and impactful."#;

const NORMAL_MODE_INSTRUCTIONS: &str = r#"MODE: The user has NOT contacted their ex.
- They may be feeling an urge to reach out. Help them ride out the urge.
- If they draft a message to their ex, do not help polish it. Ask what they hope it would change.
- Remind them that every day of no contact counts."#;

const ALREADY_CONTACTED_INSTRUCTIONS: &str = r#"MODE: The user HAS already contacted their ex.
- Do not shame or scold them. Slips happen and the streak can start again today.
- Help them decide what to do next: not sending follow-ups, not waiting on a reply.
- Focus on the feelings that led to reaching out and one small step for right now."#;

//=========================================================================================
// Reply Timing
//=========================================================================================

/// How long a reply should stay visible: a fixed base plus reading time.
pub fn display_duration_ms(text: &str) -> u64 {
    let words = text.split_whitespace().count() as f64;
    let reading_ms = words * 60_000.0 / WORDS_PER_MINUTE;
    (BASE_DISPLAY_MS as f64 + reading_ms).ceil() as u64
}

//=========================================================================================
// Roleplay Tracking
//=========================================================================================

/// Explicit state of the "talk to your ex" roleplay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleplayState {
    pub active: bool,
    /// In-character replies given since the confirmation sentence.
    pub replies: u32,
}

/// What the orchestrator should do for the next assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPlan {
    /// Ask the model.
    Generate,
    /// Answer with [`ROLEPLAY_CLOSING`] without asking the model.
    BreakCharacter,
}

/// An append-only conversation with its roleplay counter.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
    roleplay: RoleplayState,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// The most recent turns that fit in a prompt.
    pub fn recent(&self) -> &[ChatTurn] {
        let skip = self.turns.len().saturating_sub(MAX_HISTORY_TURNS);
        &self.turns[skip..]
    }

    pub fn roleplay(&self) -> RoleplayState {
        self.roleplay
    }

    pub fn push_user(&mut self, text: &str) {
        self.turns.push(ChatTurn {
            role: ChatRole::User,
            text: text.to_string(),
        });
    }

    /// Appends an assistant reply and advances the roleplay counter.
    pub fn record_assistant(&mut self, text: &str) {
        if text.contains(ROLEPLAY_CONFIRMATION) {
            self.roleplay = RoleplayState {
                active: true,
                replies: 0,
            };
        } else if self.roleplay.active && text == ROLEPLAY_CLOSING {
            self.roleplay = RoleplayState::default();
        } else if self.roleplay.active {
            self.roleplay.replies += 1;
        }
        self.turns.push(ChatTurn {
            role: ChatRole::Assistant,
            text: text.to_string(),
        });
    }

    pub fn next_reply_plan(&self) -> ReplyPlan {
        if self.roleplay.active && self.roleplay.replies >= ROLEPLAY_REPLY_LIMIT {
            ReplyPlan::BreakCharacter
        } else {
            ReplyPlan::Generate
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.roleplay = RoleplayState::default();
    }
}

//=========================================================================================
// Prompt Assembly
//=========================================================================================

fn mode_instructions(mode: ChatMode) -> &'static str {
    match mode {
        ChatMode::Normal => NORMAL_MODE_INSTRUCTIONS,
        ChatMode::AlreadyContacted => ALREADY_CONTACTED_INSTRUCTIONS,
    }
}

fn roleplay_instructions(state: RoleplayState) -> String {
    let mut block = format!(
        "ROLEPLAY:\n- If the user asks you to pretend to be their ex, reply with exactly this sentence and nothing else: \"{}\"",
        ROLEPLAY_CONFIRMATION
    );
    if state.active {
        block.push_str(&format!(
            "\n- Roleplay is ACTIVE. You have given {} of {} in-character replies.\n- Reply as the user's ex-partner, in character, with no extra commentary.",
            state.replies, ROLEPLAY_REPLY_LIMIT
        ));
    }
    block
}

/// Renders the full prompt for one request.
///
/// `history` holds the turns before `user_message`; only the last
/// [`MAX_HISTORY_TURNS`] of them are included.
pub fn build_prompt(
    history: &[ChatTurn],
    user_message: &str,
    mode: ChatMode,
    roleplay: RoleplayState,
) -> String {
    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
    let mut prompt = format!(
        "System: {}\n\n{}\n\n{}\n",
        SYSTEM_PERSONA,
        mode_instructions(mode),
        roleplay_instructions(roleplay)
    );

    if history.len() > skip {
        prompt.push_str("\nConversation so far:\n");
        for turn in &history[skip..] {
            let speaker = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, turn.text));
        }
    }

    prompt.push_str(&format!("\nUser: {}\nAssistant:", user_message));
    prompt
}
