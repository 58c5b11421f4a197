//! crates/exit_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use crate::domain::{
    CounterState, FederatedIdentity, IdentityProvider, PendingLink, PhoneVerification, Quote, User,
    UserCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, display_name: &str, email: Option<&str>) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    /// Returns `None` when no account owns this email.
    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>>;

    // --- Password Accounts ---
    async fn create_user_with_email(
        &self,
        email: &str,
        display_name: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    // --- Linked Identities ---
    async fn find_identity(
        &self,
        provider: IdentityProvider,
        subject: &str,
    ) -> PortResult<Option<Uuid>>;

    /// Fails with `Conflict` when the (provider, subject) pair is owned by someone else.
    async fn link_identity(
        &self,
        user_id: Uuid,
        provider: IdentityProvider,
        subject: &str,
    ) -> PortResult<()>;

    async fn list_identities(&self, user_id: Uuid) -> PortResult<Vec<IdentityProvider>>;

    async fn save_pending_link(&self, link: PendingLink) -> PortResult<()>;

    /// Removes and returns the pending link.
    async fn take_pending_link(&self, link_id: Uuid) -> PortResult<PendingLink>;

    async fn save_phone_verification(&self, verification: PhoneVerification) -> PortResult<()>;

    /// Removes and returns the verification, so each code can be tried once.
    async fn take_phone_verification(&self, verification_id: Uuid)
        -> PortResult<PhoneVerification>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Quotes ---
    /// Up to `limit` quotes, most votes first.
    async fn top_quotes(&self, limit: usize) -> PortResult<Vec<Quote>>;

    async fn create_quote(&self, text: &str, user_id: Uuid, username: &str) -> PortResult<Quote>;

    /// Adds exactly one vote. A second vote by the same user on the same
    /// quote fails with `Conflict` and leaves the count untouched.
    async fn record_vote(&self, quote_id: Uuid, user_id: Uuid) -> PortResult<Quote>;

    // --- No-Contact Counter ---
    async fn get_counter_state(&self, user_id: Uuid) -> PortResult<Option<CounterState>>;

    /// Merges the start date into the user's record, creating it if needed.
    async fn set_counter_start(&self, user_id: Uuid, start: DateTime<Utc>) -> PortResult<()>;

    /// The raw ISO-8601 string stored for a device, if any.
    async fn get_device_start(&self, device_id: &str) -> PortResult<Option<String>>;

    async fn set_device_start(&self, device_id: &str, start: &str) -> PortResult<()>;
}

#[async_trait]
pub trait GenerativeTextService: Send + Sync {
    /// Sends a single plain-text prompt and returns the model's plain-text reply.
    async fn generate_reply(&self, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Delivers a one-time sign-in code to a phone number.
    async fn send_code(&self, phone_number: &str, code: &str) -> PortResult<()>;
}

#[async_trait]
pub trait FederatedTokenVerifier: Send + Sync {
    /// Verifies a provider-issued ID token and returns the identity it asserts.
    async fn verify(
        &self,
        provider: IdentityProvider,
        id_token: &str,
    ) -> PortResult<FederatedIdentity>;
}
