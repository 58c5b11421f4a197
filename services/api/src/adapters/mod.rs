pub mod canned_llm;
pub mod db;
pub mod federated;
pub mod gemini_llm;
pub mod memory;
pub mod sms;

pub use canned_llm::CannedReplyAdapter;
pub use db::DbAdapter;
pub use federated::{EmulatorTokenVerifier, OidcTokenVerifier, ProviderSettings};
pub use gemini_llm::GeminiChatAdapter;
pub use memory::InMemoryDb;
pub use sms::{TracingSmsSender, WebhookSmsSender};
