use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use deskpilot_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    /// Informational; an unindexed knowledge base never fails readiness.
    pub knowledge: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let knowledge = knowledge_check(&state.db_pool).await;

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "deskpilot-server runtime initialized".to_string(),
        },
        database,
        knowledge,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn knowledge_check(pool: &DbPool) -> HealthCheck {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN embedding_json IS NULL THEN 1 ELSE 0 END), 0) \
         FROM knowledge_documents",
    )
    .fetch_one(pool)
    .await;
    match counts {
        Ok((0, _)) => HealthCheck { status: "empty", detail: "no knowledge documents".to_string() },
        Ok((total, 0)) => {
            HealthCheck { status: "ready", detail: format!("{total} documents indexed") }
        }
        Ok((total, missing)) => HealthCheck {
            status: "partial",
            detail: format!("{missing} of {total} documents lack embeddings; run reindex"),
        },
        Err(error) => HealthCheck {
            status: "unknown",
            detail: format!("knowledge query failed: {error}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use deskpilot_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_is_ready_and_reports_unindexed_documents() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.knowledge.status, "empty");

        sqlx::query(
            "INSERT INTO knowledge_documents (id, title, content, updated_at) \
             VALUES ('kb-1', 'VPN', 'Como conectar na VPN', '2026-03-01T00:00:00.000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert document");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.knowledge.status, "partial");
        assert!(payload.knowledge.detail.contains("1 of 1"));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.knowledge.status, "unknown");
    }
}
