//! services/api/src/web/counter.rs
//!
//! The no-contact counter: resolves a start date from the user's record and
//! the device record, and keeps the two in step.

use crate::error::port_rejection;
use crate::web::{middleware::CurrentUser, state::AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use exit_core::counter::{elapsed_days, format_local_start, parse_local_start, resolve_start};
use exit_core::domain::{CounterReading, StartSource};
use exit_core::ports::{DatabaseService, PortResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

/// Header carrying the browser's stable device id.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

const MAX_DEVICE_ID_LEN: usize = 128;

#[derive(Serialize, ToSchema, Debug)]
pub struct CounterResponse {
    pub start_date: DateTime<Utc>,
    pub days: i64,
    /// `remote`, `local` or `fresh`.
    pub source: String,
}

impl From<CounterReading> for CounterResponse {
    fn from(reading: CounterReading) -> Self {
        let source = match reading.source {
            StartSource::Remote => "remote",
            StartSource::Local => "local",
            StartSource::Fresh => "fresh",
        };
        Self {
            start_date: reading.start_date,
            days: reading.days,
            source: source.to_string(),
        }
    }
}

/// Extracts and checks the device id header, if present.
pub fn device_id(headers: &HeaderMap) -> Result<Option<String>, (StatusCode, String)> {
    let Some(raw) = headers.get(DEVICE_ID_HEADER) else {
        return Ok(None);
    };
    let id = raw
        .to_str()
        .map(str::trim)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid x-device-id header".to_string()))?;
    if id.is_empty() || id.len() > MAX_DEVICE_ID_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            "Invalid x-device-id header".to_string(),
        ));
    }
    Ok(Some(id.to_string()))
}

//=========================================================================================
// Counter Resolution
//=========================================================================================

/// Resolves the start date and brings every available store in line with it.
///
/// The user's record wins over the device record, which wins over `now`.
/// Whatever wins is written to the stores that were missing it.
pub async fn read_counter(
    db: &dyn DatabaseService,
    user_id: Option<Uuid>,
    device_id: Option<&str>,
    now: DateTime<Utc>,
) -> PortResult<CounterReading> {
    let remote = match user_id {
        Some(user_id) => db.get_counter_state(user_id).await?.map(|s| s.start_date),
        None => None,
    };
    let local = match device_id {
        Some(device_id) => db
            .get_device_start(device_id)
            .await?
            .as_deref()
            .and_then(parse_local_start),
        None => None,
    };

    let resolved = resolve_start(remote, local, now);

    if let Some(user_id) = user_id {
        if remote.is_none() {
            debug!("Seeding counter record for user {}", user_id);
            db.set_counter_start(user_id, resolved.start).await?;
        }
    }
    if let Some(device_id) = device_id {
        if local != Some(resolved.start) {
            db.set_device_start(device_id, &format_local_start(resolved.start))
                .await?;
        }
    }

    Ok(CounterReading {
        start_date: resolved.start,
        days: elapsed_days(resolved.start, now),
        source: resolved.source,
    })
}

/// Restarts the streak at `now` in every available store.
pub async fn reset_counter(
    db: &dyn DatabaseService,
    user_id: Option<Uuid>,
    device_id: Option<&str>,
    now: DateTime<Utc>,
) -> PortResult<CounterReading> {
    if let Some(user_id) = user_id {
        db.set_counter_start(user_id, now).await?;
    }
    if let Some(device_id) = device_id {
        db.set_device_start(device_id, &format_local_start(now)).await?;
    }
    Ok(CounterReading {
        start_date: now,
        days: 0,
        source: StartSource::Fresh,
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /counter - Days since the streak started
#[utoipa::path(
    get,
    path = "/counter",
    responses(
        (status = 200, description = "The current count", body = CounterResponse),
        (status = 400, description = "Malformed device id")
    ),
    params(
        ("x-device-id" = Option<String>, Header, description = "Stable id of the browser.")
    )
)]
pub async fn get_counter_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<Json<CounterResponse>, (StatusCode, String)> {
    let device_id = device_id(&headers)?;
    let reading = read_counter(state.db.as_ref(), user_id, device_id.as_deref(), Utc::now())
        .await
        .map_err(|e| port_rejection("Failed to read counter", e))?;
    Ok(Json(reading.into()))
}

/// POST /counter/reset - Start the streak over
#[utoipa::path(
    post,
    path = "/counter/reset",
    responses(
        (status = 200, description = "The counter was reset", body = CounterResponse),
        (status = 400, description = "Malformed device id")
    ),
    params(
        ("x-device-id" = Option<String>, Header, description = "Stable id of the browser.")
    )
)]
pub async fn reset_counter_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<Json<CounterResponse>, (StatusCode, String)> {
    let device_id = device_id(&headers)?;
    let reading = reset_counter(state.db.as_ref(), user_id, device_id.as_deref(), Utc::now())
        .await
        .map_err(|e| port_rejection("Failed to reset counter", e))?;
    info!("Counter reset (signed in: {})", user_id.is_some());
    Ok(Json(reading.into()))
}
