use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use optimistic_cache::{apply_patch, PatchRequest, PatchResponse};
use serde_json::{json, Value};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ============================================================================
// State
// ============================================================================

const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// Authoritative entity store backing `PATCH /entity/:id`.
struct AppState {
    entities: RwLock<HashMap<String, Value>>,
}

impl AppState {
    fn seeded() -> Self {
        let mut entities = HashMap::new();
        entities.insert(
            "1".to_string(),
            json!({"id": "1", "name": "Alice", "token": "demo-token"}),
        );
        Self {
            entities: RwLock::new(entities),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demo_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = Arc::new(AppState::seeded());

    let app = Router::new()
        .route("/entity/:id", get(get_entity).patch(patch_entity))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = std::env::var("DEMO_SERVER_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;
    tracing::info!("Entity server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_entity(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.entities.read().await.get(&id) {
        Some(entity) => Json(PatchResponse {
            entity: Some(entity.clone()),
        })
        .into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown entity {}", id)).into_response(),
    }
}

async fn patch_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PatchRequest>,
) -> Response {
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if !authorized {
        tracing::warn!("Rejected unauthenticated patch for entity {}", id);
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    }

    let mut entities = state.entities.write().await;
    let Some(current) = entities.get(&id) else {
        return (StatusCode::NOT_FOUND, format!("unknown entity {}", id)).into_response();
    };

    match apply_patch(current, &request.patch) {
        Ok(updated) => {
            tracing::debug!("Applied {} ops to entity {}", request.patch.len(), id);
            entities.insert(id, updated.clone());
            Json(PatchResponse {
                entity: Some(updated),
            })
            .into_response()
        }
        Err(e) => {
            tracing::warn!("Patch for entity {} failed: {}", id, e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}
