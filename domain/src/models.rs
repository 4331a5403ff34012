use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a record came from in the inventory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    #[default]
    Inventory,
    Bill,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Inventory => "inventory",
            RecordSource::Bill => "bill",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "inventory" => Some(RecordSource::Inventory),
            "bill" => Some(RecordSource::Bill),
            _ => None,
        }
    }
}

/// One item owned by a user, read as a snapshot from the inventory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub source: RecordSource,
}

impl InventoryRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity: 0.0,
            price: 0.0,
            month: None,
            source: RecordSource::Inventory,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_month(mut self, month: impl Into<String>) -> Self {
        self.month = Some(month.into());
        self
    }

    pub fn with_source(mut self, source: RecordSource) -> Self {
        self.source = source;
        self
    }

    /// Text that gets embedded and shown to the generator as context.
    pub fn display_text(&self) -> String {
        format!(
            "Item: {}, Quantity: {}, Price: {}, Month: {}",
            self.name,
            self.quantity,
            self.price,
            self.month.as_deref().unwrap_or("Unknown Month")
        )
    }
}

/// Fixed-dimension vector produced by an embedder. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Scales the vector to unit length; zero vectors are returned unchanged.
    pub fn normalized(values: Vec<f32>) -> Self {
        let mut values = values;
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub record: InventoryRecord,
    pub score: f32,
}

/// Top-k records for one query, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievedContext {
    items: Vec<ScoredRecord>,
}

impl RetrievedContext {
    pub const EMPTY_CONTEXT_TEXT: &'static str = "No inventory data found.";

    pub fn new(items: Vec<ScoredRecord>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ScoredRecord] {
        &self.items
    }

    pub fn records(&self) -> impl Iterator<Item = &InventoryRecord> {
        self.items.iter().map(|item| &item.record)
    }

    /// Renders the context as bullet lines for a prompt.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return Self::EMPTY_CONTEXT_TEXT.to_string();
        }
        self.items
            .iter()
            .map(|item| format!("- {}", item.record.display_text()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse progress of one generator response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseState {
    Raw,
    Parsed,
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub raw: String,
    pub state: ParseState,
}

impl GenerationResult {
    pub fn raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            state: ParseState::Raw,
        }
    }

    pub fn mark_parsed(&mut self) {
        self.state = ParseState::Parsed;
    }

    pub fn mark_invalid(&mut self, diagnostic: impl Into<String>) {
        self.state = ParseState::Invalid(diagnostic.into());
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match &self.state {
            ParseState::Invalid(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }
}

/// A generated recipe before it is checked against the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecipe {
    pub recipe_name: String,
    pub ingredients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSuggestion {
    pub recipe_name: String,
    pub additions: Vec<String>,
    pub base_ingredients: Vec<String>,
}

/// Which response shape a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Text,
    RecipeList,
    Structured,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputKind::Text => "text",
            OutputKind::RecipeList => "recipe_list",
            OutputKind::Structured => "structured",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RagAnswer {
    Text(String),
    RecipeNames(Vec<String>),
    Suggestions(Vec<RecipeSuggestion>),
}

impl RagAnswer {
    pub fn kind(&self) -> OutputKind {
        match self {
            RagAnswer::Text(_) => OutputKind::Text,
            RagAnswer::RecipeNames(_) => OutputKind::RecipeList,
            RagAnswer::Suggestions(_) => OutputKind::Structured,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Success,
    Error,
}

/// Outcome of an explicit refresh, shaped for callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub status: RefreshStatus,
    pub message: String,
    pub document_count: usize,
}

impl RefreshReport {
    pub fn success(document_count: usize) -> Self {
        Self {
            status: RefreshStatus::Success,
            message: "Index refreshed successfully".to_string(),
            document_count,
        }
    }

    pub fn failure(reason: impl fmt::Display) -> Self {
        Self {
            status: RefreshStatus::Error,
            message: format!("Failed to refresh index: {reason}"),
            document_count: 0,
        }
    }
}
