//! crates/exit_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Represents a user - used throughout the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: Uuid,
    /// The name shown next to quotes: a chosen display name, or the email.
    pub display_name: String,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: Option<String>,
}

/// The ways a user can prove who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityProvider {
    Password,
    Phone,
    Google,
    Apple,
}

impl IdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProvider::Password => "password",
            IdentityProvider::Phone => "phone",
            IdentityProvider::Google => "google.com",
            IdentityProvider::Apple => "apple.com",
        }
    }
}

impl fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(IdentityProvider::Password),
            "phone" => Ok(IdentityProvider::Phone),
            "google.com" | "google" => Ok(IdentityProvider::Google),
            "apple.com" | "apple" => Ok(IdentityProvider::Apple),
            other => Err(format!("unknown identity provider '{}'", other)),
        }
    }
}

/// An identity asserted by a federated provider after token verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub provider: IdentityProvider,
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// A federated credential that could not be signed in because its email
/// already belongs to another account. Held until the caller links it.
#[derive(Debug, Clone)]
pub struct PendingLink {
    pub id: Uuid,
    pub provider: IdentityProvider,
    pub subject: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// An outstanding SMS one-time code.
#[derive(Debug, Clone)]
pub struct PhoneVerification {
    pub id: Uuid,
    pub phone_number: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// A short community-submitted motivational text (a "blurb").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub id: Uuid,
    pub text: String,
    pub votes: i64,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// The start of a no-contact streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub start_date: DateTime<Utc>,
}

/// Where a resolved start instant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartSource {
    Remote,
    Local,
    Fresh,
}

/// A counter value ready to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    pub start_date: DateTime<Utc>,
    pub days: i64,
    pub source: StartSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single message within a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// Selects the instruction block used when prompting the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    #[default]
    Normal,
    AlreadyContacted,
}

/// A static educational entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceModule {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub content: &'static str,
}
