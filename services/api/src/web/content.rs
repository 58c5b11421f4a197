//! services/api/src/web/content.rs
//!
//! Static content served to the client: resource modules, support cards and
//! the warning dialog copy.

use axum::{extract::Path, http::StatusCode, Json};
use exit_core::catalog::{
    find_resource, resource_modules, support_cards, CardAction, SupportCard, WARNING_DIALOG,
};
use exit_core::domain::ResourceModule;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ResourceSummary {
    pub id: String,
    pub title: String,
    pub description: String,
}

#[derive(Serialize, ToSchema)]
pub struct ResourceDetail {
    pub id: String,
    pub title: String,
    pub description: String,
    pub content: String,
}

impl From<&ResourceModule> for ResourceSummary {
    fn from(module: &ResourceModule) -> Self {
        Self {
            id: module.id.to_string(),
            title: module.title.to_string(),
            description: module.description.to_string(),
        }
    }
}

impl From<&ResourceModule> for ResourceDetail {
    fn from(module: &ResourceModule) -> Self {
        Self {
            id: module.id.to_string(),
            title: module.title.to_string(),
            description: module.description.to_string(),
            content: module.content.to_string(),
        }
    }
}

/// What the client should do when a card is chosen.
#[derive(Serialize, ToSchema, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardActionResponse {
    /// Switch to another page.
    Navigate { page: String },
    /// Show a transient notice.
    Notice { message: String },
}

#[derive(Serialize, ToSchema)]
pub struct SupportCardResponse {
    pub id: String,
    pub icon: String,
    pub title: String,
    pub description: String,
    pub action: CardActionResponse,
}

impl From<&SupportCard> for SupportCardResponse {
    fn from(card: &SupportCard) -> Self {
        let action = match card.action {
            CardAction::Navigate(page) => CardActionResponse::Navigate {
                page: page.as_str().to_string(),
            },
            CardAction::Notice(message) => CardActionResponse::Notice {
                message: message.to_string(),
            },
        };
        Self {
            id: card.id.to_string(),
            icon: card.icon.to_string(),
            title: card.title.to_string(),
            description: card.description.to_string(),
            action,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct WarningResponse {
    pub title: String,
    pub paragraphs: Vec<String>,
    pub stay_label: String,
    pub proceed_label: String,
    pub proceed_message: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the resource modules.
#[utoipa::path(
    get,
    path = "/resources",
    responses((status = 200, description = "All resource modules", body = [ResourceSummary]))
)]
pub async fn list_resources_handler() -> Json<Vec<ResourceSummary>> {
    Json(resource_modules().iter().map(ResourceSummary::from).collect())
}

/// Read one resource module.
#[utoipa::path(
    get,
    path = "/resources/{id}",
    responses(
        (status = 200, description = "The module", body = ResourceDetail),
        (status = 404, description = "No module with this id")
    ),
    params(("id" = String, Path, description = "Module id"))
)]
pub async fn get_resource_handler(
    Path(id): Path<String>,
) -> Result<Json<ResourceDetail>, (StatusCode, String)> {
    find_resource(&id)
        .map(|module| Json(ResourceDetail::from(module)))
        .ok_or((StatusCode::NOT_FOUND, format!("Resource {} not found", id)))
}

/// List the cards on the support page.
#[utoipa::path(
    get,
    path = "/support/cards",
    responses((status = 200, description = "Support cards in display order", body = [SupportCardResponse]))
)]
pub async fn support_cards_handler() -> Json<Vec<SupportCardResponse>> {
    Json(support_cards().iter().map(SupportCardResponse::from).collect())
}

/// Copy for the dialog shown before contacting an ex.
#[utoipa::path(
    get,
    path = "/warning",
    responses((status = 200, description = "Warning dialog copy", body = WarningResponse))
)]
pub async fn warning_handler() -> Json<WarningResponse> {
    Json(WarningResponse {
        title: WARNING_DIALOG.title.to_string(),
        paragraphs: WARNING_DIALOG
            .paragraphs
            .iter()
            .map(|p| p.to_string())
            .collect(),
        stay_label: WARNING_DIALOG.stay_label.to_string(),
        proceed_label: WARNING_DIALOG.proceed_label.to_string(),
        proceed_message: WARNING_DIALOG.proceed_message.to_string(),
    })
}
