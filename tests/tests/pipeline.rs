use application::index_registry::IndexRegistry;
use application::rag_service::{PipelineSettings, RagService};
use domain::models::{InventoryRecord, RecordSource, RefreshReport, RefreshStatus};
use domain::ports::InventoryStore;
use infrastructure::embedder::HashingEmbedder;
use infrastructure::inventory_store::SqliteInventoryStore;
use shared::types::Error;
use std::sync::Arc;
use std::time::Duration;
use tests::{CountingStore, FailingEmbedder, ScriptedGenerator};

fn service_over(store: Arc<dyn InventoryStore>, generator: Arc<ScriptedGenerator>) -> RagService {
    let registry = IndexRegistry::new(store, Arc::new(HashingEmbedder::new(256)));
    RagService::new(Arc::new(registry), generator, PipelineSettings::default())
}

async fn sqlite_pantry() -> Arc<SqliteInventoryStore> {
    let store = SqliteInventoryStore::in_memory().unwrap();
    let items = [
        InventoryRecord::new("inv-1", "Basmati Rice")
            .with_quantity(2.0)
            .with_price(850.0)
            .with_month("March"),
        InventoryRecord::new("inv-2", "Coconut Milk").with_quantity(1.0),
        InventoryRecord::new("bill-1", "Chicken")
            .with_quantity(1.5)
            .with_price(1800.0)
            .with_source(RecordSource::Bill),
    ];
    for item in items {
        store.insert_record("user123", item).await.unwrap();
    }
    Arc::new(store)
}

#[tokio::test]
async fn suggestions_from_a_chatty_reply_are_split_against_the_pantry() {
    let generator = ScriptedGenerator::new([r#"Here you go!
```json
{"suggestions": [
  {"recipe_name": "Chicken Curry",
   "base_ingredients": ["Chicken", "coconut milk"],
   "additions": ["curry powder", "rice"]}
]}
```"#]);
    let service = service_over(sqlite_pantry().await, generator.clone());

    let suggestions = service
        .recipe_suggestions("user123", "something with chicken")
        .await
        .unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].recipe_name, "Chicken Curry");
    assert_eq!(
        suggestions[0].base_ingredients,
        vec!["Chicken", "coconut milk", "rice"]
    );
    assert_eq!(suggestions[0].additions, vec!["curry powder"]);

    let prompt = &generator.prompts()[0];
    assert!(prompt.user.contains("Item: Basmati Rice, Quantity: 2, Price: 850, Month: March"));
    assert!(prompt.user.contains("Month: Unknown Month"));
    assert!(prompt.user.contains("Sri Lankan"));
}

#[tokio::test]
async fn second_invalid_reply_fails_instead_of_returning_nothing() {
    let generator = ScriptedGenerator::new(["Kottu, Lamprais", "[]"]);
    let service = service_over(sqlite_pantry().await, generator.clone());

    let err = service.recipe_names("user123", "lunch").await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn empty_pantry_still_answers_without_context() {
    let store = CountingStore::new(Duration::ZERO);
    let generator = ScriptedGenerator::new(["You have no items recorded yet."]);
    let service = service_over(store, generator.clone());

    let answer = service.general_query("nobody", "what do I have?").await.unwrap();
    assert_eq!(answer, "You have no items recorded yet.");
    assert!(generator.prompts()[0].user.contains("No inventory data found."));
}

#[tokio::test]
async fn empty_pantry_puts_every_ingredient_in_additions() {
    let store = CountingStore::new(Duration::ZERO);
    let generator = ScriptedGenerator::new([r#"[
        {"recipe_name": "Pol Sambol", "ingredients": ["coconut", "chili flakes", "lime"]},
        {"recipe_name": "Plain Rice", "ingredients": ["rice"]}
    ]"#]);
    let service = service_over(store, generator);

    let suggestions = service.recipe_suggestions("nobody", "lunch").await.unwrap();
    assert_eq!(suggestions.len(), 2);
    for suggestion in &suggestions {
        assert!(suggestion.base_ingredients.is_empty());
    }
    assert_eq!(suggestions[0].additions, vec!["coconut", "chili flakes", "lime"]);
    assert_eq!(suggestions[1].additions, vec!["rice"]);
}

#[tokio::test]
async fn generator_outage_is_reported_as_retryable() {
    let generator = ScriptedGenerator::new(Vec::<String>::new());
    generator.push_error(Error::generation("connection refused"));
    let service = service_over(sqlite_pantry().await, generator);

    let err = service.general_query("user123", "hello").await.unwrap_err();
    assert!(matches!(err, Error::Generation(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn refresh_counts_every_record() {
    let store = CountingStore::new(Duration::ZERO);
    let names: Vec<String> = (0..42).map(|i| format!("item {i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    store.seed("u42", &names).await;
    let service = service_over(store, ScriptedGenerator::new(Vec::<String>::new()));

    assert_eq!(service.refresh("u42").await, RefreshReport::success(42));
}

#[tokio::test]
async fn refresh_failure_is_reported_not_raised() {
    let store = CountingStore::new(Duration::ZERO);
    store.seed("u1", &["rice"]).await;
    let registry = IndexRegistry::new(store, Arc::new(FailingEmbedder { dimension: 8 }));
    let service = RagService::new(
        Arc::new(registry),
        ScriptedGenerator::new(Vec::<String>::new()),
        PipelineSettings::default(),
    );

    let report = service.refresh("u1").await;
    assert_eq!(report.status, RefreshStatus::Error);
    assert_eq!(report.document_count, 0);
    assert!(report.message.starts_with("Failed to refresh index: "));

    let err = service.general_query("u1", "hello").await.unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable { .. }));
    assert!(err.is_retryable());
}
