//! services/api/src/adapters/federated.rs
//!
//! Verifies Google and Apple ID tokens. Implements the `FederatedTokenVerifier`
//! port from the `core` crate.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use exit_core::domain::{FederatedIdentity, IdentityProvider};
use exit_core::ports::{FederatedTokenVerifier, PortError, PortResult};
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Google sends `email_verified` as a bool or a string, Apple as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_true(&self) -> bool {
        match self {
            Flag::Bool(value) => *value,
            Flag::Text(value) => value.eq_ignore_ascii_case("true"),
        }
    }
}

/// The claims we read from a provider's ID token.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<Flag>,
    #[serde(default)]
    name: Option<String>,
}

impl IdTokenClaims {
    /// An email the provider has not verified is dropped, so it can neither
    /// claim nor collide with an account.
    fn into_identity(self, provider: IdentityProvider) -> FederatedIdentity {
        let verified = self.email_verified.as_ref().is_some_and(Flag::is_true);
        FederatedIdentity {
            provider,
            subject: self.sub,
            email: self
                .email
                .filter(|_| verified)
                .map(|e| e.trim().to_lowercase()),
            display_name: self.name,
        }
    }
}

/// Where to find a provider's signing keys and what its tokens must say.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub jwks_url: String,
    pub issuers: Vec<String>,
    pub audience: Option<String>,
}

impl ProviderSettings {
    pub fn google(client_id: Option<String>) -> Self {
        Self {
            jwks_url: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            issuers: vec![
                "https://accounts.google.com".to_string(),
                "accounts.google.com".to_string(),
            ],
            audience: client_id,
        }
    }

    pub fn apple(client_id: Option<String>) -> Self {
        Self {
            jwks_url: "https://appleid.apple.com/auth/keys".to_string(),
            issuers: vec!["https://appleid.apple.com".to_string()],
            audience: client_id,
        }
    }
}

//=========================================================================================
// Signed Token Verification
//=========================================================================================

/// Checks RS256 signatures against each provider's published JWKS.
pub struct OidcTokenVerifier {
    http: reqwest::Client,
    google: ProviderSettings,
    apple: ProviderSettings,
    keys: RwLock<HashMap<IdentityProvider, JwkSet>>,
}

impl OidcTokenVerifier {
    pub fn new(http: reqwest::Client, google: ProviderSettings, apple: ProviderSettings) -> Self {
        Self {
            http,
            google,
            apple,
            keys: RwLock::new(HashMap::new()),
        }
    }

    fn settings(&self, provider: IdentityProvider) -> PortResult<&ProviderSettings> {
        match provider {
            IdentityProvider::Google => Ok(&self.google),
            IdentityProvider::Apple => Ok(&self.apple),
            other => Err(PortError::InvalidInput(format!(
                "{} is not a federated provider",
                other
            ))),
        }
    }

    async fn fetch_keys(&self, provider: IdentityProvider, url: &str) -> PortResult<JwkSet> {
        info!("Fetching signing keys for {}", provider);
        let keys = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| PortError::Unavailable(format!("Failed to fetch {} keys: {}", provider, e)))?
            .json::<JwkSet>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed {} key set: {}", provider, e)))?;
        self.keys.write().await.insert(provider, keys.clone());
        Ok(keys)
    }

    /// Looks up a key by id, refreshing the cached set once on a miss.
    async fn decoding_key(
        &self,
        provider: IdentityProvider,
        url: &str,
        kid: &str,
    ) -> PortResult<DecodingKey> {
        let cached = self
            .keys
            .read()
            .await
            .get(&provider)
            .and_then(|set| set.find(kid).cloned());

        let jwk = match cached {
            Some(jwk) => jwk,
            None => self
                .fetch_keys(provider, url)
                .await?
                .find(kid)
                .cloned()
                .ok_or(PortError::Unauthorized)?,
        };

        DecodingKey::from_jwk(&jwk).map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

#[async_trait]
impl FederatedTokenVerifier for OidcTokenVerifier {
    async fn verify(
        &self,
        provider: IdentityProvider,
        id_token: &str,
    ) -> PortResult<FederatedIdentity> {
        let settings = self.settings(provider)?;
        let audience = settings.audience.as_deref().ok_or_else(|| {
            PortError::Unavailable(format!("{} sign-in is not configured", provider))
        })?;

        let header = decode_header(id_token).map_err(|e| {
            warn!("Rejected {} token with bad header: {}", provider, e);
            PortError::Unauthorized
        })?;
        let kid = header.kid.ok_or(PortError::Unauthorized)?;
        let key = self.decoding_key(provider, &settings.jwks_url, &kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(settings.issuers.as_slice());

        let data = decode::<IdTokenClaims>(id_token, &key, &validation).map_err(|e| {
            warn!("Rejected {} token: {}", provider, e);
            PortError::Unauthorized
        })?;
        Ok(data.claims.into_identity(provider))
    }
}

//=========================================================================================
// Emulator Verification
//=========================================================================================

/// Reads the claims of a token without checking its signature, like the
/// auth emulator does. Only wired in when `USE_AUTH_EMULATOR` is set.
#[derive(Clone, Default)]
pub struct EmulatorTokenVerifier;

#[async_trait]
impl FederatedTokenVerifier for EmulatorTokenVerifier {
    async fn verify(
        &self,
        provider: IdentityProvider,
        id_token: &str,
    ) -> PortResult<FederatedIdentity> {
        if !matches!(provider, IdentityProvider::Google | IdentityProvider::Apple) {
            return Err(PortError::InvalidInput(format!(
                "{} is not a federated provider",
                provider
            )));
        }
        let payload = id_token.split('.').nth(1).ok_or(PortError::Unauthorized)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| PortError::Unauthorized)?;
        let claims: IdTokenClaims =
            serde_json::from_slice(&bytes).map_err(|_| PortError::Unauthorized)?;
        Ok(claims.into_identity(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned_token(claims: &str) -> String {
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[tokio::test]
    async fn emulator_reads_claims() {
        let token = unsigned_token(r#"{"sub":"g-123","email":"Sam@Example.com","email_verified":true,"name":"Sam"}"#);
        let identity = EmulatorTokenVerifier
            .verify(IdentityProvider::Google, &token)
            .await
            .unwrap();
        assert_eq!(identity.subject, "g-123");
        assert_eq!(identity.email.as_deref(), Some("sam@example.com"));
        assert_eq!(identity.display_name.as_deref(), Some("Sam"));
    }

    #[tokio::test]
    async fn unverified_email_is_dropped() {
        for claims in [
            r#"{"sub":"a-1","email":"sam@example.com","email_verified":"false"}"#,
            r#"{"sub":"a-1","email":"sam@example.com","email_verified":false}"#,
            r#"{"sub":"a-1","email":"sam@example.com"}"#,
        ] {
            let identity = EmulatorTokenVerifier
                .verify(IdentityProvider::Apple, &unsigned_token(claims))
                .await
                .unwrap();
            assert_eq!(identity.subject, "a-1");
            assert!(identity.email.is_none(), "kept email for {}", claims);
        }

        let identity = EmulatorTokenVerifier
            .verify(
                IdentityProvider::Apple,
                &unsigned_token(r#"{"sub":"a-2","email":"sam@example.com","email_verified":"true"}"#),
            )
            .await
            .unwrap();
        assert_eq!(identity.email.as_deref(), Some("sam@example.com"));
    }

    #[tokio::test]
    async fn emulator_rejects_garbage() {
        let result = EmulatorTokenVerifier
            .verify(IdentityProvider::Apple, "not-a-token")
            .await;
        assert!(matches!(result, Err(PortError::Unauthorized)));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_unavailable() {
        let verifier = OidcTokenVerifier::new(
            reqwest::Client::new(),
            ProviderSettings::google(None),
            ProviderSettings::apple(None),
        );
        let result = verifier
            .verify(IdentityProvider::Google, &unsigned_token(r#"{"sub":"x"}"#))
            .await;
        assert!(matches!(result, Err(PortError::Unavailable(_))));
    }
}
