//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exit_core::domain::{
    CounterState, IdentityProvider, PendingLink, PhoneVerification, Quote, User, UserCredentials,
};
use exit_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn parse_provider(raw: &str) -> PortResult<IdentityProvider> {
    raw.parse::<IdentityProvider>().map_err(PortError::Unexpected)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    display_name: String,
    email: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            display_name: self.display_name,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: Option<String>,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct PendingLinkRecord {
    id: Uuid,
    provider: String,
    subject: String,
    email: String,
    expires_at: DateTime<Utc>,
}
impl PendingLinkRecord {
    fn to_domain(self) -> PortResult<PendingLink> {
        Ok(PendingLink {
            id: self.id,
            provider: parse_provider(&self.provider)?,
            subject: self.subject,
            email: self.email,
            expires_at: self.expires_at,
        })
    }
}

#[derive(FromRow)]
struct PhoneVerificationRecord {
    id: Uuid,
    phone_number: String,
    code_hash: String,
    expires_at: DateTime<Utc>,
}
impl PhoneVerificationRecord {
    fn to_domain(self) -> PhoneVerification {
        PhoneVerification {
            id: self.id,
            phone_number: self.phone_number,
            code_hash: self.code_hash,
            expires_at: self.expires_at,
        }
    }
}

#[derive(FromRow)]
struct QuoteRecord {
    id: Uuid,
    text: String,
    votes: i64,
    user_id: Uuid,
    username: String,
    created_at: DateTime<Utc>,
}
impl QuoteRecord {
    fn to_domain(self) -> Quote {
        Quote {
            id: self.id,
            text: self.text,
            votes: self.votes,
            user_id: self.user_id,
            username: self.username,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CounterRecord {
    nc_start_date: DateTime<Utc>,
}
impl CounterRecord {
    fn to_domain(self) -> CounterState {
        CounterState {
            start_date: self.nc_start_date,
        }
    }
}

const QUOTE_COLUMNS: &str = "id, text, votes, user_id, username, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, display_name: &str, email: Option<&str>) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, display_name, email) VALUES ($1, $2, $3) RETURNING user_id, display_name, email",
        )
        .bind(Uuid::new_v4())
        .bind(display_name)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict("An account already exists for this email".to_string())
            } else {
                unexpected(e)
            }
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, display_name, email FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, display_name, email FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn create_user_with_email(
        &self,
        email: &str,
        display_name: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, display_name, email, hashed_password) VALUES ($1, $2, $3, $4) RETURNING user_id, display_name, email",
        )
        .bind(Uuid::new_v4())
        .bind(display_name)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict("An account already exists for this email".to_string())
            } else {
                unexpected(e)
            }
        })?;

        sqlx::query("INSERT INTO identities (provider, subject, user_id) VALUES ($1, $2, $3)")
            .bind(IdentityProvider::Password.as_str())
            .bind(email)
            .bind(record.user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("No user with email {}", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn find_identity(
        &self,
        provider: IdentityProvider,
        subject: &str,
    ) -> PortResult<Option<Uuid>> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM identities WHERE provider = $1 AND subject = $2",
        )
        .bind(provider.as_str())
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(user_id)
    }

    async fn link_identity(
        &self,
        user_id: Uuid,
        provider: IdentityProvider,
        subject: &str,
    ) -> PortResult<()> {
        let owner: Uuid = sqlx::query_scalar(
            "INSERT INTO identities (provider, subject, user_id) VALUES ($1, $2, $3) \
             ON CONFLICT (provider, subject) DO UPDATE SET provider = EXCLUDED.provider \
             RETURNING user_id",
        )
        .bind(provider.as_str())
        .bind(subject)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        if owner != user_id {
            return Err(PortError::Conflict(format!(
                "This {} credential is already linked to another account",
                provider
            )));
        }
        Ok(())
    }

    async fn list_identities(&self, user_id: Uuid) -> PortResult<Vec<IdentityProvider>> {
        let providers: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT provider FROM identities WHERE user_id = $1 ORDER BY provider",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        providers.iter().map(|p| parse_provider(p)).collect()
    }

    async fn save_pending_link(&self, link: PendingLink) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO pending_links (id, provider, subject, email, expires_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(link.id)
        .bind(link.provider.as_str())
        .bind(&link.subject)
        .bind(&link.email)
        .bind(link.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn take_pending_link(&self, link_id: Uuid) -> PortResult<PendingLink> {
        let record = sqlx::query_as::<_, PendingLinkRecord>(
            "DELETE FROM pending_links WHERE id = $1 RETURNING id, provider, subject, email, expires_at",
        )
        .bind(link_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Pending credential {} not found", link_id))
            }
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn save_phone_verification(&self, verification: PhoneVerification) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO phone_verifications (id, phone_number, code_hash, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(verification.id)
        .bind(&verification.phone_number)
        .bind(&verification.code_hash)
        .bind(verification.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn take_phone_verification(
        &self,
        verification_id: Uuid,
    ) -> PortResult<PhoneVerification> {
        let record = sqlx::query_as::<_, PhoneVerificationRecord>(
            "DELETE FROM phone_verifications WHERE id = $1 RETURNING id, phone_number, code_hash, expires_at",
        )
        .bind(verification_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Verification {} not found", verification_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn top_quotes(&self, limit: usize) -> PortResult<Vec<Quote>> {
        let records = sqlx::query_as::<_, QuoteRecord>(&format!(
            "SELECT {} FROM quotes ORDER BY votes DESC, created_at ASC LIMIT $1",
            QUOTE_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_quote(&self, text: &str, user_id: Uuid, username: &str) -> PortResult<Quote> {
        let record = sqlx::query_as::<_, QuoteRecord>(&format!(
            "INSERT INTO quotes (id, text, votes, user_id, username) VALUES ($1, $2, 0, $3, $4) RETURNING {}",
            QUOTE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(text)
        .bind(user_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn record_vote(&self, quote_id: Uuid, user_id: Uuid) -> PortResult<Quote> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM quotes WHERE id = $1 FOR UPDATE")
                .bind(quote_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unexpected)?;
        if exists.is_none() {
            return Err(PortError::NotFound(format!("Quote {} not found", quote_id)));
        }

        let inserted = sqlx::query(
            "INSERT INTO quote_votes (quote_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(quote_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        if inserted.rows_affected() == 0 {
            return Err(PortError::Conflict(format!(
                "Already voted for quote {}",
                quote_id
            )));
        }

        let record = sqlx::query_as::<_, QuoteRecord>(&format!(
            "UPDATE quotes SET votes = votes + 1 WHERE id = $1 RETURNING {}",
            QUOTE_COLUMNS
        ))
        .bind(quote_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_counter_state(&self, user_id: Uuid) -> PortResult<Option<CounterState>> {
        let record = sqlx::query_as::<_, CounterRecord>(
            "SELECT nc_start_date FROM counter_records WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(CounterRecord::to_domain))
    }

    async fn set_counter_start(&self, user_id: Uuid, start: DateTime<Utc>) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO counter_records (user_id, nc_start_date) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET nc_start_date = EXCLUDED.nc_start_date, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(start)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_device_start(&self, device_id: &str) -> PortResult<Option<String>> {
        let start: Option<String> =
            sqlx::query_scalar("SELECT nc_start_date FROM device_counters WHERE device_id = $1")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(start)
    }

    async fn set_device_start(&self, device_id: &str, start: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO device_counters (device_id, nc_start_date) VALUES ($1, $2) \
             ON CONFLICT (device_id) DO UPDATE SET nc_start_date = EXCLUDED.nc_start_date",
        )
        .bind(device_id)
        .bind(start)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
