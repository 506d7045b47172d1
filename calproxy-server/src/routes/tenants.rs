//! Tenant registration and teardown endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use calproxy_core::state::TenantConfig;
use calproxy_core::store::{load_tenant_config, save_tenant_config, teardown_tenant};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tenants", post(register))
        .route("/tenants/{id}", get(show).delete(remove))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTenantRequest {
    pub id: String,
    pub source_url: String,
    pub timezone: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTenantResponse {
    pub id: String,
    pub feed_url: String,
}

/// Tenant ids become state-store key prefixes, so the charset is strict.
fn valid_tenant_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// POST /tenants - register a tenant and hand back its feed URL
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterTenantRequest>,
) -> Result<(StatusCode, Json<RegisterTenantResponse>), AppError> {
    if !valid_tenant_id(&request.id) {
        return Err(AppError::bad_request(
            "tenant id must be 1-64 chars of [A-Za-z0-9_-]",
        ));
    }

    let store = state.store.as_ref();
    if load_tenant_config(store, &request.id).await?.is_some() {
        return Err(AppError::conflict(format!(
            "tenant already registered: {}",
            request.id
        )));
    }

    let config = TenantConfig {
        source_url: request.source_url,
        created_at: Utc::now().timestamp_millis(),
        timezone: request.timezone,
    };
    save_tenant_config(store, &request.id, &config).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterTenantResponse {
            feed_url: format!("/calendars/{}/feed.ics", request.id),
            id: request.id,
        }),
    ))
}

/// GET /tenants/:id - show a tenant's configuration
async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TenantConfig>, AppError> {
    let config = load_tenant_config(state.store.as_ref(), &id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("tenant not registered: {id}")))?;
    Ok(Json(config))
}

/// DELETE /tenants/:id - drop the tenant and every key under its prefix
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let store = state.store.as_ref();
    if load_tenant_config(store, &id).await?.is_none() {
        return Err(AppError::not_found(format!("tenant not registered: {id}")));
    }

    teardown_tenant(store, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
