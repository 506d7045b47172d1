//! The normalized feed endpoint.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::warn;

use calproxy_core::constants::DEFAULT_TIMEZONE;
use calproxy_core::proxy::{self, FeedOutput};
use calproxy_core::state::TenantConfig;
use calproxy_core::store::{self, KvStore};
use calproxy_core::CalProxyError;

use crate::fetch;
use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/calendars/{tenant}/feed.ics", get(serve_feed))
}

async fn load_tenant(store: &dyn KvStore, tenant: &str) -> Result<TenantConfig, AppError> {
    store::load_tenant_config(store, tenant)
        .await?
        .ok_or_else(|| AppError::not_found(format!("tenant not registered: {tenant}")))
}

/// The stored last-known-good output, if any, dressed up as a feed response.
async fn last_known_good(store: &dyn KvStore, tenant: &str) -> Option<FeedOutput> {
    let body = store
        .get(&store::snapshot_latest_key(tenant))
        .await
        .ok()
        .flatten()?;
    Some(FeedOutput {
        etag: proxy::sha256_hex(body.as_bytes()),
        body,
        from_snapshot: true,
    })
}

/// GET /calendars/{tenant}/feed.ics - fetch, normalize, and serve the feed.
///
/// Fallback policy: unreachable upstream or an internal fault serve the
/// last-known-good snapshot when one exists; invalid upstream bytes are a
/// hard 502 and never touch the snapshot.
async fn serve_feed(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let config = load_tenant(store, &tenant).await?;
    let default_tz = config
        .timezone
        .as_deref()
        .unwrap_or(DEFAULT_TIMEZONE)
        .to_string();

    let output = match fetch::fetch_ics(&state.http, &config.source_url).await {
        Ok(upstream) => {
            match proxy::process_feed(store, &tenant, &default_tz, &upstream).await {
                Ok(output) => output,
                Err(CalProxyError::UpstreamInvalid(reason)) => {
                    return Err(AppError::bad_gateway(format!(
                        "upstream feed invalid: {reason}"
                    )));
                }
                Err(err) => {
                    warn!(%tenant, error = %err, "normalization failed, trying last known good");
                    last_known_good(store, &tenant)
                        .await
                        .ok_or_else(|| AppError::from(err))?
                }
            }
        }
        Err(err) => {
            warn!(%tenant, error = %err, "upstream fetch failed, trying last known good");
            last_known_good(store, &tenant)
                .await
                .ok_or_else(|| AppError::bad_gateway(format!("upstream unavailable: {err}")))?
        }
    };

    let etag = format!("\"{}\"", output.etag);
    if let Some(candidate) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if candidate.trim().trim_matches('"') == output.etag {
            return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
        }
    }

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "text/calendar; charset=utf-8".to_string(),
            ),
            (header::ETAG, etag),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
        ],
        output.body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use calproxy_core::store::MemoryStore;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn test_app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_store(store.clone()).expect("state should build");
        (router().with_state(state), store)
    }

    async fn register_tenant(store: &MemoryStore, id: &str, source_url: &str) {
        let config = TenantConfig {
            source_url: source_url.to_string(),
            created_at: 0,
            timezone: None,
        };
        store
            .put(
                &store::tenant_config_key(id),
                &serde_json::to_string(&config).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_404() {
        let (app, _store) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/calendars/nope/feed.ics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_serves_last_known_good() {
        let (app, store) = test_app();
        // Port 9 refuses connections immediately.
        register_tenant(&store, "t1", "http://127.0.0.1:9/feed.ics").await;
        store
            .put(
                &store::snapshot_latest_key("t1"),
                "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n",
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/calendars/t1/feed.ics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_without_snapshot_is_502() {
        let (app, store) = test_app();
        register_tenant(&store, "t1", "http://127.0.0.1:9/feed.ics").await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/calendars/t1/feed.ics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_if_none_match_yields_304() {
        let (app, store) = test_app();
        register_tenant(&store, "t1", "http://127.0.0.1:9/feed.ics").await;
        let snapshot = "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n";
        store
            .put(&store::snapshot_latest_key("t1"), snapshot)
            .await
            .unwrap();
        let etag = proxy::sha256_hex(snapshot.as_bytes());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/calendars/t1/feed.ics")
                    .header("if-none-match", format!("\"{etag}\""))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }
}
