//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and staging disk I/O

use crate::services::upload_service::UploadService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness probe: always 200, never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe: a `SELECT 1` against SQLite plus a best-effort
/// write/read/delete in the staging namespace. 200 when both pass, 503
/// otherwise, with per-check detail in the body.
pub async fn readyz(State(service): State<UploadService>) -> impl IntoResponse {
    let sqlite = sqlite_check(&service).await;
    let staging = staging_check(&service).await;

    let overall_ok = sqlite.ok && staging.ok;
    let mut checks = HashMap::new();
    checks.insert("sqlite", sqlite);
    checks.insert("staging", staging);

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if overall_ok { "ok".into() } else { "error".into() },
        checks,
    };
    (status, Json(body))
}

async fn sqlite_check(service: &UploadService) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(1) => CheckStatus { ok: true, error: None },
        Ok(other) => CheckStatus {
            ok: false,
            error: Some(format!("unexpected result: {other}")),
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(format!("error: {err}")),
        },
    }
}

async fn staging_check(service: &UploadService) -> CheckStatus {
    let probe = service
        .staging
        .root()
        .join(format!(".readyz-{}", Uuid::new_v4()));

    let result = async {
        fs::write(&probe, b"readyz").await?;
        let bytes = fs::read(&probe).await?;
        if bytes != b"readyz" {
            return Err(std::io::Error::other("probe content mismatch"));
        }
        fs::remove_file(&probe).await
    }
    .await;

    match result {
        Ok(_) => CheckStatus { ok: true, error: None },
        Err(err) => {
            let _ = fs::remove_file(&probe).await;
            CheckStatus {
                ok: false,
                error: Some(err.to_string()),
            }
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
