//! services/api/src/adapters/memory.rs
//!
//! A process-local implementation of the `DatabaseService` port. Used when no
//! `DATABASE_URL` is configured and as the store behind the router tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exit_core::domain::{
    CounterState, IdentityProvider, PendingLink, PhoneVerification, Quote, User, UserCredentials,
};
use exit_core::ports::{DatabaseService, PortError, PortResult};
use exit_core::quotes::rank_top;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    passwords: HashMap<Uuid, String>,
    identities: HashMap<(IdentityProvider, String), Uuid>,
    auth_sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    pending_links: HashMap<Uuid, PendingLink>,
    phone_verifications: HashMap<Uuid, PhoneVerification>,
    /// Insertion order doubles as the tie-break for equal vote counts.
    quotes: Vec<Quote>,
    votes: HashSet<(Uuid, Uuid)>,
    counters: HashMap<Uuid, CounterState>,
    devices: HashMap<String, String>,
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        self.users
            .values()
            .any(|u| u.email.as_deref() == Some(email))
    }

    /// Drops sessions, pending links and phone codes that can no longer be used.
    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.auth_sessions.retain(|_, (_, expires_at)| *expires_at > now);
        self.pending_links.retain(|_, link| link.expires_at > now);
        self.phone_verifications.retain(|_, v| v.expires_at > now);
    }
}

/// An in-memory store. Everything is lost when the process exits.
#[derive(Default)]
pub struct InMemoryDb {
    tables: Mutex<Tables>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn create_user(&self, display_name: &str, email: Option<&str>) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        if let Some(email) = email {
            if tables.email_taken(email) {
                return Err(PortError::Conflict(
                    "An account already exists for this email".to_string(),
                ));
            }
        }
        let user = User {
            user_id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            email: email.map(str::to_string),
        };
        tables.users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let tables = self.tables.lock().await;
        tables
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_user_with_email(
        &self,
        email: &str,
        display_name: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.email_taken(email) {
            return Err(PortError::Conflict(
                "An account already exists for this email".to_string(),
            ));
        }
        let user = User {
            user_id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            email: Some(email.to_string()),
        };
        tables.users.insert(user.user_id, user.clone());
        tables
            .passwords
            .insert(user.user_id, hashed_password.to_string());
        tables
            .identities
            .insert((IdentityProvider::Password, email.to_string()), user.user_id);
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let tables = self.tables.lock().await;
        let user = tables
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .ok_or_else(|| PortError::NotFound(format!("No user with email {}", email)))?;
        Ok(UserCredentials {
            user_id: user.user_id,
            email: email.to_string(),
            hashed_password: tables.passwords.get(&user.user_id).cloned(),
        })
    }

    async fn find_identity(
        &self,
        provider: IdentityProvider,
        subject: &str,
    ) -> PortResult<Option<Uuid>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .identities
            .get(&(provider, subject.to_string()))
            .copied())
    }

    async fn link_identity(
        &self,
        user_id: Uuid,
        provider: IdentityProvider,
        subject: &str,
    ) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        let owner = *tables
            .identities
            .entry((provider, subject.to_string()))
            .or_insert(user_id);
        if owner != user_id {
            return Err(PortError::Conflict(format!(
                "This {} credential is already linked to another account",
                provider
            )));
        }
        Ok(())
    }

    async fn list_identities(&self, user_id: Uuid) -> PortResult<Vec<IdentityProvider>> {
        let tables = self.tables.lock().await;
        let mut providers: Vec<IdentityProvider> = tables
            .identities
            .iter()
            .filter(|(_, owner)| **owner == user_id)
            .map(|((provider, _), _)| *provider)
            .collect();
        providers.sort_by_key(|p| p.as_str());
        providers.dedup();
        Ok(providers)
    }

    async fn save_pending_link(&self, link: PendingLink) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        tables.purge_expired(Utc::now());
        tables.pending_links.insert(link.id, link);
        Ok(())
    }

    async fn take_pending_link(&self, link_id: Uuid) -> PortResult<PendingLink> {
        self.tables
            .lock()
            .await
            .pending_links
            .remove(&link_id)
            .ok_or_else(|| PortError::NotFound(format!("Pending credential {} not found", link_id)))
    }

    async fn save_phone_verification(&self, verification: PhoneVerification) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        tables.purge_expired(Utc::now());
        tables
            .phone_verifications
            .insert(verification.id, verification);
        Ok(())
    }

    async fn take_phone_verification(
        &self,
        verification_id: Uuid,
    ) -> PortResult<PhoneVerification> {
        self.tables
            .lock()
            .await
            .phone_verifications
            .remove(&verification_id)
            .ok_or_else(|| {
                PortError::NotFound(format!("Verification {} not found", verification_id))
            })
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        tables.purge_expired(Utc::now());
        tables
            .auth_sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let tables = self.tables.lock().await;
        match tables.auth_sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.lock().await.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn top_quotes(&self, limit: usize) -> PortResult<Vec<Quote>> {
        let tables = self.tables.lock().await;
        Ok(rank_top(tables.quotes.clone(), limit))
    }

    async fn create_quote(&self, text: &str, user_id: Uuid, username: &str) -> PortResult<Quote> {
        let quote = Quote {
            id: Uuid::new_v4(),
            text: text.to_string(),
            votes: 0,
            user_id,
            username: username.to_string(),
            created_at: Utc::now(),
        };
        self.tables.lock().await.quotes.push(quote.clone());
        Ok(quote)
    }

    async fn record_vote(&self, quote_id: Uuid, user_id: Uuid) -> PortResult<Quote> {
        let mut tables = self.tables.lock().await;
        if !tables.quotes.iter().any(|q| q.id == quote_id) {
            return Err(PortError::NotFound(format!("Quote {} not found", quote_id)));
        }
        if !tables.votes.insert((quote_id, user_id)) {
            return Err(PortError::Conflict(format!(
                "Already voted for quote {}",
                quote_id
            )));
        }
        let quote = tables
            .quotes
            .iter_mut()
            .find(|q| q.id == quote_id)
            .ok_or_else(|| PortError::NotFound(format!("Quote {} not found", quote_id)))?;
        quote.votes += 1;
        Ok(quote.clone())
    }

    async fn get_counter_state(&self, user_id: Uuid) -> PortResult<Option<CounterState>> {
        Ok(self.tables.lock().await.counters.get(&user_id).copied())
    }

    async fn set_counter_start(&self, user_id: Uuid, start: DateTime<Utc>) -> PortResult<()> {
        self.tables
            .lock()
            .await
            .counters
            .insert(user_id, CounterState { start_date: start });
        Ok(())
    }

    async fn get_device_start(&self, device_id: &str) -> PortResult<Option<String>> {
        Ok(self.tables.lock().await.devices.get(device_id).cloned())
    }

    async fn set_device_start(&self, device_id: &str, start: &str) -> PortResult<()> {
        self.tables
            .lock()
            .await
            .devices
            .insert(device_id.to_string(), start.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn expired_entries_are_purged_on_insert() {
        let db = InMemoryDb::new();
        let user = Uuid::new_v4();
        let past = Utc::now() - Duration::minutes(1);
        let future = Utc::now() + Duration::minutes(10);

        for i in 0..3 {
            db.create_auth_session(&format!("old-{}", i), user, past)
                .await
                .unwrap();
            db.save_pending_link(PendingLink {
                id: Uuid::new_v4(),
                provider: IdentityProvider::Google,
                subject: format!("g-{}", i),
                email: "sam@example.com".to_string(),
                expires_at: past,
            })
            .await
            .unwrap();
            db.save_phone_verification(PhoneVerification {
                id: Uuid::new_v4(),
                phone_number: "+15551234567".to_string(),
                code_hash: "hash".to_string(),
                expires_at: past,
            })
            .await
            .unwrap();
        }

        db.create_auth_session("fresh", user, future).await.unwrap();

        let tables = db.tables.lock().await;
        assert_eq!(tables.auth_sessions.len(), 1);
        assert!(tables.auth_sessions.contains_key("fresh"));
        assert!(tables.pending_links.is_empty());
        assert!(tables.phone_verifications.is_empty());
    }

    #[tokio::test]
    async fn votes_are_counted_once_per_user() {
        let db = InMemoryDb::new();
        let author = db.create_user("sam", None).await.unwrap();
        let voter = db.create_user("alex", None).await.unwrap();
        let quote = db
            .create_quote("You deserve peace.", author.user_id, "sam")
            .await
            .unwrap();
        assert_eq!(quote.votes, 0);

        let voted = db.record_vote(quote.id, voter.user_id).await.unwrap();
        assert_eq!(voted.votes, 1);

        let again = db.record_vote(quote.id, voter.user_id).await;
        assert!(matches!(again, Err(PortError::Conflict(_))));

        let by_author = db.record_vote(quote.id, author.user_id).await.unwrap();
        assert_eq!(by_author.votes, 2);
    }

    #[tokio::test]
    async fn vote_on_missing_quote_is_not_found() {
        let db = InMemoryDb::new();
        let result = db.record_vote(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn top_quotes_sorted_by_votes() {
        let db = InMemoryDb::new();
        let author = db.create_user("sam", None).await.unwrap();
        let mut ids = Vec::new();
        for text in ["first quote here", "second quote here", "third quote here"] {
            ids.push(db.create_quote(text, author.user_id, "sam").await.unwrap().id);
        }
        for _ in 0..2 {
            let user = db.create_user("voter", None).await.unwrap();
            db.record_vote(ids[2], user.user_id).await.unwrap();
        }
        let user = db.create_user("voter", None).await.unwrap();
        db.record_vote(ids[1], user.user_id).await.unwrap();

        let top = db.top_quotes(10).await.unwrap();
        let votes: Vec<i64> = top.iter().map(|q| q.votes).collect();
        assert_eq!(votes, vec![2, 1, 0]);
        assert!(db.top_quotes(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn identity_cannot_be_linked_twice() {
        let db = InMemoryDb::new();
        let first = db.create_user("a", None).await.unwrap();
        let second = db.create_user("b", None).await.unwrap();

        db.link_identity(first.user_id, IdentityProvider::Google, "sub-1")
            .await
            .unwrap();
        // Re-linking to the same owner is fine.
        db.link_identity(first.user_id, IdentityProvider::Google, "sub-1")
            .await
            .unwrap();
        let stolen = db
            .link_identity(second.user_id, IdentityProvider::Google, "sub-1")
            .await;
        assert!(matches!(stolen, Err(PortError::Conflict(_))));
    }
}
