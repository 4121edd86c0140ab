//! Axum router and handlers for the audit service's read API (spec §4.8,
//! §6): `GET /v1/reports` with `{appName, timeRange, riskLevel, sqlPattern}`
//! filters and pagination, plus `GET /v1/health`. Composed from `AppState`
//! the way `mqk-daemon::routes::build_router` does.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    state::{AppState, BuildInfo},
    store::{Page, Report, ReportFilter}
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/reports", get(list_reports))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    ok:      bool,
    service: &'static str,
    version: &'static str
}

async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let BuildInfo {
        service,
        version
    } = st.build.clone();
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service,
            version
        })
    )
}

/// Query-string shape for `GET /v1/reports` (spec §6). `since`/`until`
/// accept RFC 3339 timestamps; `sqlPattern` substring-matches the original
/// SQL text of the audited statement (see [`ReportFilter`]).
#[derive(Debug, Deserialize)]
struct ReportsQuery {
    #[serde(rename = "appName")]
    app_name:   Option<String>,
    since:      Option<DateTime<Utc>>,
    until:      Option<DateTime<Utc>>,
    #[serde(rename = "riskLevel")]
    risk_level: Option<String>,
    #[serde(rename = "sqlPattern")]
    sql_pattern: Option<String>,
    offset:     Option<usize>,
    limit:      Option<usize>
}

#[derive(Serialize)]
struct ReportsResponse {
    total:   usize,
    reports: Vec<Report>
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String
}

async fn list_reports(State(st): State<Arc<AppState>>, Query(q): Query<ReportsQuery>) -> Response {
    let risk_level = match q.risk_level.as_deref().map(str::parse) {
        Some(Ok(level)) => Some(level),
        Some(Err(())) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("invalid riskLevel: {}", q.risk_level.unwrap_or_default())
                })
            )
                .into_response();
        }
        None => None
    };

    let filter = ReportFilter {
        app_name: q.app_name,
        since: q.since,
        until: q.until,
        risk_level,
        sql_pattern: q.sql_pattern
    };
    let page = Page {
        offset: q.offset.unwrap_or(0),
        limit:  q.limit.unwrap_or(50)
    };

    match st.store.query(&filter, &page).await {
        Ok(reports) => (
            StatusCode::OK,
            Json(ReportsResponse {
                total: reports.len(),
                reports
            })
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string()
            })
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode}
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{bus::InMemoryBus, store::InMemoryReportStore};

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(Arc::new(InMemoryBus::new()), Arc::new(InMemoryReportStore::new())))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let router = build_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn reports_rejects_an_unparseable_risk_level() {
        let router = build_router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/v1/reports?riskLevel=not-a-level")
                    .body(Body::empty())
                    .unwrap()
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reports_with_no_filters_returns_empty_list_on_a_fresh_store() {
        let router = build_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/v1/reports").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
