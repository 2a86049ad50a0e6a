use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use ledger_core::models::EntityType;
use ledger_core::wire::{HealthBody, SuccessBody};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::guard::VersionedBody;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: EntityStore,
}

impl AppState {
    pub const fn new(config: Arc<AppConfig>, store: EntityStore) -> Self {
        Self { config, store }
    }
}

pub fn app_router(state: AppState) -> Router {
    let entity_routes = Router::new()
        .route("/{entity_type}", get(list_entities).post(create_entity))
        .route(
            "/{entity_type}/{id}",
            get(get_entity).put(update_entity).delete(delete_entity),
        )
        .route("/{entity_type}/{id}/version", put(repair_entity_version));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", entity_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

type ApiResponse = Result<(StatusCode, Json<SuccessBody<Value>>), AppError>;

fn ok(status: StatusCode, data: Value) -> ApiResponse {
    Ok((status, Json(SuccessBody::new(data))))
}

fn entity_type_from_path(segment: &str) -> Result<EntityType, AppError> {
    EntityType::from_collection_path(segment)
        .ok_or_else(|| AppError::not_found(format!("unknown entity type '{segment}'")))
}

async fn healthz() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        timestamp: Utc::now().timestamp(),
    })
}

async fn list_entities(State(state): State<AppState>, Path(entity_type): Path<String>) -> ApiResponse {
    let entity_type = entity_type_from_path(&entity_type)?;
    let entities = state.store.list(entity_type).await?;
    ok(
        StatusCode::OK,
        Value::Array(entities.iter().map(|entity| entity.to_json()).collect()),
    )
}

async fn get_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> ApiResponse {
    let entity_type = entity_type_from_path(&entity_type)?;
    let entity = state
        .store
        .get(entity_type, &id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{entity_type} {id}")))?;
    ok(StatusCode::OK, entity.to_json())
}

async fn create_entity(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    body: VersionedBody,
) -> ApiResponse {
    let entity_type = entity_type_from_path(&entity_type)?;
    let client_id = body.client_id.clone();
    let (entity, created) = state.store.create(entity_type, body).await?;

    if created {
        tracing::info!(
            entity_type = %entity_type,
            id = %entity.id,
            version = entity.version,
            client_id = client_id.as_deref().unwrap_or("unknown"),
            "Created entity"
        );
        ok(StatusCode::CREATED, entity.to_json())
    } else {
        tracing::debug!(entity_type = %entity_type, id = %entity.id, "Create replayed for existing entity");
        ok(StatusCode::OK, entity.to_json())
    }
}

async fn update_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
    body: VersionedBody,
) -> ApiResponse {
    let entity_type = entity_type_from_path(&entity_type)?;
    let client_version = body.client_version;
    let client_id = body.client_id.clone();

    match state.store.update(entity_type, &id, body).await {
        Ok(entity) => {
            tracing::info!(
                entity_type = %entity_type,
                id = %id,
                version = entity.version,
                client_id = client_id.as_deref().unwrap_or("unknown"),
                "Updated entity"
            );
            ok(StatusCode::OK, entity.to_json())
        }
        Err(error) => {
            if matches!(error, crate::store::StoreError::Conflict { .. }) {
                tracing::warn!(
                    entity_type = %entity_type,
                    id = %id,
                    client_version = ?client_version,
                    client_id = client_id.as_deref().unwrap_or("unknown"),
                    "Rejected stale update: {error}"
                );
            }
            Err(error.into())
        }
    }
}

async fn delete_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> ApiResponse {
    let entity_type = entity_type_from_path(&entity_type)?;
    let entity = state.store.delete(entity_type, &id).await?;
    tracing::info!(
        entity_type = %entity_type,
        id = %id,
        version = entity.version,
        "Deleted entity"
    );
    ok(StatusCode::OK, entity.to_json())
}

/// Admin repair: pin an entity's version without touching its fields.
async fn repair_entity_version(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let entity_type = entity_type_from_path(&entity_type)?;
    let version = body
        .get("version")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::bad_request("version must be an integer"))?;

    let entity = state.store.repair_version(entity_type, &id, version).await?;
    ok(StatusCode::OK, entity.to_json())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn router() -> Router {
        let config = Arc::new(AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: ":memory:".to_string(),
        });
        let store = EntityStore::open_in_memory().unwrap();
        app_router(AppState::new(config, store))
    }

    fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        match body {
            Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn create_supplier(router: &Router) -> Value {
        let (status, body) = send(
            router,
            json_request(
                Method::POST,
                "/v1/suppliers",
                Some(json!({ "name": "Acme", "code": "SUP-1", "version": null })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"].clone()
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (status, body) = send(
            &router(),
            json_request(Method::GET, "/healthz", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
    }

    #[tokio::test]
    async fn create_assigns_version_one() {
        let router = router();
        let created = create_supplier(&router).await;

        assert_eq!(created["version"], json!(1));
        assert_eq!(created["name"], json!("Acme"));
        assert!(created["id"].is_string());
    }

    #[tokio::test]
    async fn update_with_stale_version_returns_conflict() {
        let router = router();
        let created = create_supplier(&router).await;
        let uri = format!("/v1/suppliers/{}", created["id"].as_str().unwrap());

        let (status, body) = send(
            &router,
            json_request(
                Method::PUT,
                &uri,
                Some(json!({ "version": 1, "name": "Acme Ltd" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["version"], json!(2));

        let (status, body) = send(
            &router,
            json_request(
                Method::PUT,
                &uri,
                Some(json!({ "version": 1, "name": "Stale" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["conflict"], json!(true));
        assert_eq!(body["data"]["client_version"], json!(1));
        assert_eq!(body["data"]["server_version"], json!(2));
        assert_eq!(body["data"]["current_data"]["name"], json!("Acme Ltd"));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let router = router();
        let created = create_supplier(&router).await;
        let uri = format!("/v1/suppliers/{}", created["id"].as_str().unwrap());

        let (status, body) = send(&router, json_request(Method::DELETE, &uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["version"], json!(2));

        let (status, body) = send(&router, json_request(Method::GET, &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));

        let (status, body) = send(&router, json_request(Method::GET, "/v1/suppliers", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn invalid_payload_is_bad_request() {
        let (status, body) = send(
            &router(),
            json_request(
                Method::POST,
                "/v1/payments",
                Some(json!({ "supplier_id": null, "amount": 10 })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("Missing supplier_id"));
    }

    #[tokio::test]
    async fn repair_pins_version_and_keeps_fields() {
        let router = router();
        let created = create_supplier(&router).await;
        let uri = format!("/v1/suppliers/{}", created["id"].as_str().unwrap());

        let (status, body) = send(
            &router,
            json_request(
                Method::PUT,
                &format!("{uri}/version"),
                Some(json!({ "version": 7 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["version"], json!(7));
        assert_eq!(body["data"]["name"], json!("Acme"));

        let (status, _) = send(
            &router,
            json_request(
                Method::PUT,
                &uri,
                Some(json!({ "version": 1, "name": "Stale" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn repair_rejects_missing_version() {
        let router = router();
        let created = create_supplier(&router).await;
        let uri = format!("/v1/suppliers/{}/version", created["id"].as_str().unwrap());

        for body in [json!({}), json!({ "version": 0 })] {
            let (status, _) = send(&router, json_request(Method::PUT, &uri, Some(body))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn unknown_entity_type_is_not_found() {
        let (status, _) = send(
            &router(),
            json_request(Method::GET, "/v1/invoices", None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
