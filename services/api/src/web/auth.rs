//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: email/password accounts, SMS one-time codes,
//! Google/Apple sign-in and linking of a federated credential to an
//! existing account.

use crate::error::port_rejection;
use crate::web::middleware::session_cookie;
use crate::web::state::AppState;
use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration, Utc};
use exit_core::domain::{IdentityProvider, PendingLink, PhoneVerification, User};
use exit_core::ports::PortError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const MIN_PASSWORD_CHARS: usize = 6;
const PHONE_CODE_TTL_MINUTES: i64 = 10;
const PENDING_LINK_TTL_MINUTES: i64 = 15;

/// Error code returned when a federated sign-in collides with an existing account.
pub const ACCOUNT_EXISTS_CODE: &str = "account-exists-with-different-credential";

static E164: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{6,14}$").expect("E.164 pattern compiles"));

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
}

impl From<User> for AuthResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            display_name: user.display_name,
            email: user.email,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    /// Linked sign-in methods, e.g. `password`, `phone`, `google.com`.
    pub providers: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct PhoneStartRequest {
    /// E.164 formatted, e.g. `+15555555555`.
    pub phone_number: String,
}

#[derive(Serialize, ToSchema)]
pub struct PhoneStartResponse {
    pub verification_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct PhoneVerifyRequest {
    pub verification_id: Uuid,
    pub code: String,
}

#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FederatedProvider {
    Google,
    Apple,
}

impl From<FederatedProvider> for IdentityProvider {
    fn from(provider: FederatedProvider) -> Self {
        match provider {
            FederatedProvider::Google => IdentityProvider::Google,
            FederatedProvider::Apple => IdentityProvider::Apple,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct FederatedRequest {
    pub provider: FederatedProvider,
    pub id_token: String,
}

/// Returned with 409 when the token's email already belongs to another account.
#[derive(Serialize, ToSchema)]
pub struct AccountConflictResponse {
    pub code: String,
    pub email: String,
    /// Pass this to `/auth/link` after signing in with one of `existing_providers`.
    pub pending_credential_id: Uuid,
    pub existing_providers: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LinkRequest {
    pub pending_credential_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct LinkResponse {
    pub providers: Vec<String>,
}

//=========================================================================================
// Helpers
//=========================================================================================

type Rejection = (StatusCode, String);

fn hash_secret(secret: &str) -> Result<String, Rejection> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash secret: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })
}

fn verify_secret(secret: &str, hash: &str) -> Result<bool, Rejection> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication error".to_string(),
        )
    })?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}

fn normalize_email(raw: &str) -> Result<String, Rejection> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        && !email.contains(char::is_whitespace);
    if !valid {
        return Err((StatusCode::BAD_REQUEST, "Invalid email address".to_string()));
    }
    Ok(email)
}

fn is_e164(phone_number: &str) -> bool {
    E164.is_match(phone_number)
}

fn generate_code() -> String {
    format!("{:06}", OsRng.next_u32() % 1_000_000)
}

fn provider_names(providers: &[IdentityProvider]) -> Vec<String> {
    providers.iter().map(|p| p.as_str().to_string()).collect()
}

/// Creates an auth session for the user and returns the `Set-Cookie` value.
async fn start_session(state: &AppState, user_id: Uuid) -> Result<String, Rejection> {
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(state.config.session_ttl_days);

    state
        .db
        .create_auth_session(&auth_session_id, user_id, Utc::now() + ttl)
        .await
        .map_err(|e| port_rejection("Failed to create session", e))?;

    Ok(format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        auth_session_id,
        ttl.num_seconds()
    ))
}

async fn signed_in(
    state: &AppState,
    status: StatusCode,
    user: User,
) -> Result<Response, Rejection> {
    let cookie = start_session(state, user.user_id).await?;
    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(user)),
    )
        .into_response())
}

//=========================================================================================
// Email & Password
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid email or password too short"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Response, Rejection> {
    let email = normalize_email(&req.email)?;
    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_CHARS),
        ));
    }
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&email)
        .to_string();

    let password_hash = hash_secret(&req.password)?;
    let user = state
        .db
        .create_user_with_email(&email, &display_name, &password_hash)
        .await
        .map_err(|e| port_rejection("Failed to create user", e))?;

    info!("Created password account for user {}", user.user_id);
    signed_in(&state, StatusCode::CREATED, user).await
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, Rejection> {
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        )
    };
    let email = req.email.trim().to_lowercase();

    let user_creds = state.db.get_user_by_email(&email).await.map_err(|e| {
        warn!("Login failed: {:?}", e);
        invalid()
    })?;

    // Accounts created through phone or federated sign-in have no password.
    let hash = user_creds.hashed_password.as_deref().ok_or_else(invalid)?;
    if !verify_secret(&req.password, hash)? {
        return Err(invalid());
    }

    let user = state
        .db
        .get_user_by_id(user_creds.user_id)
        .await
        .map_err(|e| port_rejection("Failed to load user", e))?;
    signed_in(&state, StatusCode::OK, user).await
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Rejection> {
    let auth_session_id = session_cookie(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| port_rejection("Failed to logout", e))?;

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

/// GET /auth/me - The signed-in user
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The current user", body = MeResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<MeResponse>, Rejection> {
    let user = state
        .db
        .get_user_by_id(user_id)
        .await
        .map_err(|e| port_rejection("Failed to load user", e))?;
    let providers = state
        .db
        .list_identities(user_id)
        .await
        .map_err(|e| port_rejection("Failed to load identities", e))?;

    Ok(Json(MeResponse {
        user_id: user.user_id,
        display_name: user.display_name,
        email: user.email,
        providers: provider_names(&providers),
    }))
}

//=========================================================================================
// Phone Sign-In
//=========================================================================================

/// POST /auth/phone/start - Send a one-time code by SMS
#[utoipa::path(
    post,
    path = "/auth/phone/start",
    request_body = PhoneStartRequest,
    responses(
        (status = 200, description = "Code sent", body = PhoneStartResponse),
        (status = 400, description = "Not an E.164 phone number"),
        (status = 503, description = "Phone sign-in is not configured")
    )
)]
pub async fn phone_start_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PhoneStartRequest>,
) -> Result<Json<PhoneStartResponse>, Rejection> {
    let sender = state.sms_sender.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Phone sign-in is not configured".to_string(),
    ))?;

    let phone_number = req.phone_number.trim();
    if !is_e164(phone_number) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Phone number must be in E.164 format, e.g. +15555555555".to_string(),
        ));
    }

    let code = generate_code();
    let verification = PhoneVerification {
        id: Uuid::new_v4(),
        phone_number: phone_number.to_string(),
        code_hash: hash_secret(&code)?,
        expires_at: Utc::now() + Duration::minutes(PHONE_CODE_TTL_MINUTES),
    };
    let verification_id = verification.id;

    state
        .db
        .save_phone_verification(verification)
        .await
        .map_err(|e| port_rejection("Failed to start phone verification", e))?;
    sender
        .send_code(phone_number, &code)
        .await
        .map_err(|e| port_rejection("Failed to send verification code", e))?;

    Ok(Json(PhoneStartResponse { verification_id }))
}

/// POST /auth/phone/verify - Exchange a one-time code for a session
#[utoipa::path(
    post,
    path = "/auth/phone/verify",
    request_body = PhoneVerifyRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Unknown, expired or wrong code")
    )
)]
pub async fn phone_verify_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PhoneVerifyRequest>,
) -> Result<Response, Rejection> {
    let rejected = || {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid or expired code".to_string(),
        )
    };

    let verification = match state.db.take_phone_verification(req.verification_id).await {
        Ok(verification) => verification,
        Err(PortError::NotFound(_)) => return Err(rejected()),
        Err(e) => return Err(port_rejection("Failed to load verification", e)),
    };
    if verification.expires_at <= Utc::now() {
        return Err(rejected());
    }
    if !verify_secret(req.code.trim(), &verification.code_hash)? {
        return Err(rejected());
    }

    let phone_number = verification.phone_number;
    let existing = state
        .db
        .find_identity(IdentityProvider::Phone, &phone_number)
        .await
        .map_err(|e| port_rejection("Failed to look up phone identity", e))?;

    let user = match existing {
        Some(user_id) => state.db.get_user_by_id(user_id).await,
        None => {
            let created = state.db.create_user(&phone_number, None).await;
            match created {
                Ok(user) => state
                    .db
                    .link_identity(user.user_id, IdentityProvider::Phone, &phone_number)
                    .await
                    .map(|_| user),
                Err(e) => Err(e),
            }
        }
    }
    .map_err(|e| port_rejection("Failed to sign in with phone", e))?;

    signed_in(&state, StatusCode::OK, user).await
}

//=========================================================================================
// Federated Sign-In & Linking
//=========================================================================================

/// POST /auth/federated - Sign in with a Google or Apple ID token
#[utoipa::path(
    post,
    path = "/auth/federated",
    request_body = FederatedRequest,
    responses(
        (status = 200, description = "Signed in to a linked account", body = AuthResponse),
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 401, description = "Token rejected"),
        (status = 409, description = "Email belongs to an account with a different credential", body = AccountConflictResponse),
        (status = 503, description = "Provider not configured")
    )
)]
pub async fn federated_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FederatedRequest>,
) -> Result<Response, Rejection> {
    let provider = IdentityProvider::from(req.provider);
    let identity = state
        .federated_verifier
        .verify(provider, &req.id_token)
        .await
        .map_err(|e| port_rejection("Failed to verify ID token", e))?;

    let linked = state
        .db
        .find_identity(provider, &identity.subject)
        .await
        .map_err(|e| port_rejection("Failed to look up identity", e))?;
    if let Some(user_id) = linked {
        let user = state
            .db
            .get_user_by_id(user_id)
            .await
            .map_err(|e| port_rejection("Failed to load user", e))?;
        return signed_in(&state, StatusCode::OK, user).await;
    }

    if let Some(email) = identity.email.as_deref() {
        let owner = state
            .db
            .find_user_by_email(email)
            .await
            .map_err(|e| port_rejection("Failed to look up email", e))?;
        if let Some(owner) = owner {
            let existing = state
                .db
                .list_identities(owner.user_id)
                .await
                .map_err(|e| port_rejection("Failed to load identities", e))?;
            let pending = PendingLink {
                id: Uuid::new_v4(),
                provider,
                subject: identity.subject.clone(),
                email: email.to_string(),
                expires_at: Utc::now() + Duration::minutes(PENDING_LINK_TTL_MINUTES),
            };
            let pending_credential_id = pending.id;
            state
                .db
                .save_pending_link(pending)
                .await
                .map_err(|e| port_rejection("Failed to save pending credential", e))?;

            info!(
                "{} sign-in collided with existing account {}",
                provider, owner.user_id
            );
            let body = AccountConflictResponse {
                code: ACCOUNT_EXISTS_CODE.to_string(),
                email: email.to_string(),
                pending_credential_id,
                existing_providers: provider_names(&existing),
            };
            return Ok((StatusCode::CONFLICT, Json(body)).into_response());
        }
    }

    let display_name = identity
        .display_name
        .clone()
        .or_else(|| identity.email.clone())
        .unwrap_or_else(|| "Friend".to_string());
    let user = state
        .db
        .create_user(&display_name, identity.email.as_deref())
        .await
        .map_err(|e| port_rejection("Failed to create user", e))?;
    state
        .db
        .link_identity(user.user_id, provider, &identity.subject)
        .await
        .map_err(|e| port_rejection("Failed to link identity", e))?;

    info!("Created {} account for user {}", provider, user.user_id);
    signed_in(&state, StatusCode::CREATED, user).await
}

/// POST /auth/link - Attach a pending federated credential to the current user
#[utoipa::path(
    post,
    path = "/auth/link",
    request_body = LinkRequest,
    responses(
        (status = 200, description = "Credential linked", body = LinkResponse),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Signed in as a different account"),
        (status = 404, description = "Unknown or expired pending credential"),
        (status = 409, description = "Credential already linked elsewhere")
    )
)]
pub async fn link_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<LinkRequest>,
) -> Result<Json<LinkResponse>, Rejection> {
    let pending = state
        .db
        .take_pending_link(req.pending_credential_id)
        .await
        .map_err(|e| port_rejection("Failed to load pending credential", e))?;
    if pending.expires_at <= Utc::now() {
        return Err((
            StatusCode::NOT_FOUND,
            "Pending credential has expired".to_string(),
        ));
    }

    // A rejected attempt leaves the credential in place for the rightful owner.
    let user = match state.db.get_user_by_id(user_id).await {
        Ok(user) => user,
        Err(e) => {
            restore_pending_link(&state, pending).await;
            return Err(port_rejection("Failed to load user", e));
        }
    };
    if user.email.as_deref() != Some(pending.email.as_str()) {
        let message = format!(
            "Sign in to the account that owns {} before linking",
            pending.email
        );
        restore_pending_link(&state, pending).await;
        return Err((StatusCode::FORBIDDEN, message));
    }

    let linked = state
        .db
        .link_identity(user_id, pending.provider, &pending.subject)
        .await;
    if let Err(e) = linked {
        restore_pending_link(&state, pending).await;
        return Err(port_rejection("Failed to link identity", e));
    }
    let providers = state
        .db
        .list_identities(user_id)
        .await
        .map_err(|e| port_rejection("Failed to load identities", e))?;

    info!("Linked {} to user {}", pending.provider, user_id);
    Ok(Json(LinkResponse {
        providers: provider_names(&providers),
    }))
}

async fn restore_pending_link(state: &AppState, pending: PendingLink) {
    let pending_id = pending.id;
    if let Err(e) = state.db.save_pending_link(pending).await {
        warn!("Failed to restore pending credential {}: {:?}", pending_id, e);
    }
}
