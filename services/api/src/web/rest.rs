//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the quote board and the master
//! definition for the OpenAPI specification.

use crate::error::port_rejection;
use crate::web::{auth, content, counter, state::AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use exit_core::domain::Quote;
use exit_core::quotes::{validate_quote_text, DEFAULT_TOP_LIMIT, MAX_TOP_LIMIT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        auth::phone_start_handler,
        auth::phone_verify_handler,
        auth::federated_handler,
        auth::link_handler,
        top_quotes_handler,
        create_quote_handler,
        vote_quote_handler,
        counter::get_counter_handler,
        counter::reset_counter_handler,
        content::list_resources_handler,
        content::get_resource_handler,
        content::support_cards_handler,
        content::warning_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::MeResponse,
            auth::PhoneStartRequest,
            auth::PhoneStartResponse,
            auth::PhoneVerifyRequest,
            auth::FederatedProvider,
            auth::FederatedRequest,
            auth::AccountConflictResponse,
            auth::LinkRequest,
            auth::LinkResponse,
            QuoteResponse,
            CreateQuoteRequest,
            counter::CounterResponse,
            content::ResourceSummary,
            content::ResourceDetail,
            content::CardActionResponse,
            content::SupportCardResponse,
            content::WarningResponse,
        )
    ),
    tags(
        (name = "Ex-It API", description = "No-contact counter, community quotes and support content.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema, Debug)]
pub struct QuoteResponse {
    pub id: Uuid,
    pub text: String,
    pub votes: i64,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<Quote> for QuoteResponse {
    fn from(quote: Quote) -> Self {
        Self {
            id: quote.id,
            text: quote.text,
            votes: quote.votes,
            user_id: quote.user_id,
            username: quote.username,
            created_at: quote.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateQuoteRequest {
    pub text: String,
}

#[derive(Deserialize, IntoParams)]
pub struct TopQuotesQuery {
    /// How many quotes to return. Defaults to 10, at most 100.
    pub limit: Option<usize>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the most-voted quotes.
#[utoipa::path(
    get,
    path = "/quotes",
    params(TopQuotesQuery),
    responses(
        (status = 200, description = "Quotes, most votes first", body = [QuoteResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn top_quotes_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<TopQuotesQuery>,
) -> Result<Json<Vec<QuoteResponse>>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).min(MAX_TOP_LIMIT);
    let quotes = app_state
        .db
        .top_quotes(limit)
        .await
        .map_err(|e| port_rejection("Failed to load quotes", e))?;
    Ok(Json(quotes.into_iter().map(QuoteResponse::from).collect()))
}

/// Submit a quote as the signed-in user.
///
/// The text is trimmed and must be 10 to 200 characters long.
#[utoipa::path(
    post,
    path = "/quotes",
    request_body = CreateQuoteRequest,
    responses(
        (status = 201, description = "Quote created", body = QuoteResponse),
        (status = 400, description = "Text too short or too long"),
        (status = 401, description = "Not signed in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_quote_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateQuoteRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let text = validate_quote_text(&req.text)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let db = &app_state.db;
    let result = async {
        let author = db.get_user_by_id(user_id).await?;
        db.create_quote(&text, user_id, &author.display_name).await
    }
    .await;

    let quote = result.map_err(|e| port_rejection("Failed to create quote", e))?;
    info!("User {} posted quote {}", user_id, quote.id);
    Ok((StatusCode::CREATED, Json(QuoteResponse::from(quote))))
}

/// Upvote a quote. Each user can vote for a quote once.
#[utoipa::path(
    post,
    path = "/quotes/{id}/vote",
    responses(
        (status = 200, description = "Vote recorded", body = QuoteResponse),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No quote with this id"),
        (status = 409, description = "Already voted for this quote")
    ),
    params(("id" = Uuid, Path, description = "Quote id"))
)]
pub async fn vote_quote_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(quote_id): Path<Uuid>,
) -> Result<Json<QuoteResponse>, (StatusCode, String)> {
    let quote = app_state
        .db
        .record_vote(quote_id, user_id)
        .await
        .map_err(|e| port_rejection("Failed to record vote", e))?;
    Ok(Json(quote.into()))
}
