use application::index_registry::IndexRegistry;
use application::rag_service::{PipelineSettings, RagService};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use domain::models::InventoryRecord;
use domain::ports::{Embedder, InventoryStore};
use infrastructure::embedder::HashingEmbedder;
use infrastructure::inventory_store::SqliteInventoryStore;
use presentation::http::{router, AppState};
use serde_json::{json, Value};
use shared::types::Error;
use std::sync::Arc;
use tests::{FailingEmbedder, ScriptedGenerator};
use tower::ServiceExt;

async fn app_with(embedder: Arc<dyn Embedder>, generator: Arc<ScriptedGenerator>) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteInventoryStore::open(dir.path().join("inventory.db")).unwrap();
    for (id, name) in [("1", "Rice"), ("2", "Red Lentils"), ("3", "Onions")] {
        store
            .insert_record("user123", InventoryRecord::new(id, name).with_quantity(1.0))
            .await
            .unwrap();
    }
    let store: Arc<dyn InventoryStore> = Arc::new(store);
    let registry = IndexRegistry::new(store, embedder);
    let service = RagService::new(Arc::new(registry), generator, PipelineSettings::default());
    (router(AppState::new(Arc::new(service))), dir)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn recipe_names_round_trip_over_http() {
    let generator = ScriptedGenerator::new([r#"["Parippu", "Kiri Bath"]"#]);
    let (app, _dir) = app_with(Arc::new(HashingEmbedder::new(128)), generator).await;

    let (status, body) = post(&app, "/itemrag", json!({"query": "lunch", "userid": "user123"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"answer": ["Parippu", "Kiri Bath"]}));
}

#[tokio::test]
async fn suggestions_keep_field_order_and_split() {
    let generator = ScriptedGenerator::new([r#"[{"recipe_name": "Parippu",
        "ingredients": ["red lentil", "onion", "turmeric", "  "]}]"#]);
    let (app, _dir) = app_with(Arc::new(HashingEmbedder::new(128)), generator).await;

    let (status, body) = post(
        &app,
        "/new_item_recipe_suggestions_query",
        json!({"query": "dhal", "userid": "user123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"suggestions": [{
            "recipe_name": "Parippu",
            "additions": ["turmeric"],
            "base_ingredients": ["red lentil", "onion"],
        }]})
    );
}

#[tokio::test]
async fn generator_failure_maps_to_bad_gateway() {
    let generator = ScriptedGenerator::new(Vec::<String>::new());
    generator.push_error(Error::generation("model not loaded"));
    let (app, _dir) = app_with(Arc::new(HashingEmbedder::new(128)), generator).await;

    let (status, body) = post(&app, "/rag", json!({"query": "hi", "userid": "user123"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["kind"], "generation");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("model not loaded"));
}

#[tokio::test]
async fn refresh_success_and_failure_shapes() {
    let (app, _dir) = app_with(
        Arc::new(HashingEmbedder::new(128)),
        ScriptedGenerator::new(Vec::<String>::new()),
    )
    .await;
    let (status, body) = post(&app, "/refresh", json!({"userid": "user123"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "success", "message": "Index refreshed successfully", "document_count": 3})
    );

    let (broken, _dir) = app_with(
        Arc::new(FailingEmbedder { dimension: 8 }),
        ScriptedGenerator::new(Vec::<String>::new()),
    )
    .await;
    let (status, body) = post(&broken, "/refresh", json!({"userid": "user123"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["document_count"], 0);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to refresh index: "));
}

#[tokio::test]
async fn embedding_outage_is_unavailable_not_bad_request() {
    let generator = ScriptedGenerator::new(["never used"]);
    let (app, _dir) = app_with(Arc::new(FailingEmbedder { dimension: 8 }), generator.clone()).await;

    for uri in ["/rag", "/itemrag", "/new_item_recipe_suggestions_query"] {
        let (status, body) = post(&app, uri, json!({"query": "dinner", "userid": "user123"})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        assert_eq!(body["error"]["kind"], "index_unavailable");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("embedding backend unreachable"));
    }
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn malformed_bodies_are_rejected_with_structured_errors() {
    let (app, _dir) = app_with(
        Arc::new(HashingEmbedder::new(128)),
        ScriptedGenerator::new(Vec::<String>::new()),
    )
    .await;
    let request = Request::builder()
        .method("POST")
        .uri("/rag")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["kind"], "invalid_input");

    let (status, _) = post(&app, "/itemrag", json!({"userid": "user123"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
