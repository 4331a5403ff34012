//! Retrieval-augmented generation pipeline.
//!
//! Each request walks a fixed sequence of stages:
//! `Retrieve -> Prompt -> Generate -> Parse -> Format`, ending in
//! `Completed` or `Failed`. The only backwards edge is `Parse -> Generate`,
//! taken once with a stricter prompt when the reply does not validate.

use crate::classifier::IngredientClassifier;
use crate::index_registry::IndexRegistry;
use crate::parser::{parse_recipe_names, parse_recipes};
use crate::prompts::{build_prompt, strict_reminder};
use crate::retriever::Retriever;
use domain::models::{
    GenerationResult, OutputKind, ParsedRecipe, RagAnswer, RecipeSuggestion, RefreshReport,
    RetrievedContext,
};
use domain::ports::Generator;
use domain::prompt::Prompt;
use shared::telemetry::Telemetry;
use shared::types::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Context size for the retrieve stage; not caller-controlled.
    pub top_k: usize,
    pub generation_timeout: Duration,
    /// Total generate attempts allowed when parsing fails.
    pub max_parse_attempts: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            generation_timeout: Duration::from_secs(60),
            max_parse_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retrieve,
    Prompt,
    Generate,
    Parse,
    Format,
    Completed,
    Failed,
}

enum Parsed {
    Text(String),
    Names(Vec<String>),
    Recipes(Vec<ParsedRecipe>),
}

/// Per-request pipeline state; never shared between requests.
struct PipelineRun<'a> {
    service: &'a RagService,
    user_id: &'a str,
    query: &'a str,
    kind: OutputKind,
    context: Option<RetrievedContext>,
    base_prompt: Option<Prompt>,
    attempt: usize,
    generation: Option<GenerationResult>,
    parsed: Option<Parsed>,
    answer: Option<RagAnswer>,
}

impl<'a> PipelineRun<'a> {
    fn new(service: &'a RagService, user_id: &'a str, query: &'a str, kind: OutputKind) -> Self {
        Self {
            service,
            user_id,
            query,
            kind,
            context: None,
            base_prompt: None,
            attempt: 0,
            generation: None,
            parsed: None,
            answer: None,
        }
    }

    async fn step(&mut self, stage: Stage) -> Result<Stage> {
        match stage {
            Stage::Retrieve => {
                let context = self
                    .service
                    .retriever
                    .retrieve(self.user_id, self.query, self.service.settings.top_k)
                    .await?;
                debug!(user_id = self.user_id, items = context.len(), "context retrieved");
                self.context = Some(context);
                Ok(Stage::Prompt)
            }
            Stage::Prompt => {
                let context = self.context.as_ref().ok_or_else(|| missing("context"))?;
                self.base_prompt = Some(build_prompt(self.kind, context, self.query));
                Ok(Stage::Generate)
            }
            Stage::Generate => {
                self.attempt += 1;
                let base = self.base_prompt.as_ref().ok_or_else(|| missing("prompt"))?;
                let prompt = match (self.attempt, strict_reminder(self.kind)) {
                    (1, _) | (_, None) => base.clone(),
                    (_, Some(reminder)) => base.with_reminder(reminder),
                };
                let raw = self.service.generate(&prompt).await?;
                self.generation = Some(GenerationResult::raw(raw));
                Ok(Stage::Parse)
            }
            Stage::Parse => {
                let generation = self.generation.as_mut().ok_or_else(|| missing("generation"))?;
                let outcome = match self.kind {
                    OutputKind::Text => Ok(Parsed::Text(generation.raw.clone())),
                    OutputKind::RecipeList => parse_recipe_names(&generation.raw).map(Parsed::Names),
                    OutputKind::Structured => parse_recipes(&generation.raw).map(Parsed::Recipes),
                };
                match outcome {
                    Ok(parsed) => {
                        generation.mark_parsed();
                        self.parsed = Some(parsed);
                        Ok(Stage::Format)
                    }
                    Err(err) => {
                        generation.mark_invalid(err.to_string());
                        if self.attempt < self.service.settings.max_parse_attempts {
                            warn!(
                                user_id = self.user_id,
                                kind = %self.kind,
                                attempt = self.attempt,
                                error = %err,
                                "generator reply did not parse, retrying with stricter prompt"
                            );
                            Ok(Stage::Generate)
                        } else {
                            Err(Error::parse(format!(
                                "reply still invalid after {} attempts: {}",
                                self.attempt,
                                generation.diagnostic().unwrap_or("unknown")
                            )))
                        }
                    }
                }
            }
            Stage::Format => {
                let parsed = self.parsed.take().ok_or_else(|| missing("parsed reply"))?;
                self.answer = Some(match parsed {
                    Parsed::Text(text) => RagAnswer::Text(text),
                    Parsed::Names(names) => RagAnswer::RecipeNames(names),
                    Parsed::Recipes(recipes) => {
                        let context = self.context.as_ref().ok_or_else(|| missing("context"))?;
                        let classifier = IngredientClassifier::from_context(context);
                        RagAnswer::Suggestions(
                            recipes
                                .iter()
                                .map(|recipe| {
                                    classifier.classify(&recipe.recipe_name, &recipe.ingredients)
                                })
                                .collect(),
                        )
                    }
                });
                Ok(Stage::Completed)
            }
            Stage::Completed | Stage::Failed => Ok(stage),
        }
    }

    async fn run(mut self) -> Result<RagAnswer> {
        let telemetry = Telemetry::new();
        let mut stage = Stage::Retrieve;
        loop {
            debug!(user_id = self.user_id, stage = ?stage, attempt = self.attempt, "pipeline stage");
            match self.step(stage).await {
                Ok(Stage::Completed) => break,
                Ok(next) => stage = next,
                Err(err) => {
                    error!(
                        user_id = self.user_id,
                        kind = %self.kind,
                        stage = ?stage,
                        next = ?Stage::Failed,
                        error_kind = err.kind().as_str(),
                        error = %err,
                        "pipeline failed"
                    );
                    return Err(err);
                }
            }
        }
        info!(
            user_id = self.user_id,
            kind = %self.kind,
            attempts = self.attempt,
            elapsed_ms = telemetry.elapsed_ms(),
            "pipeline completed"
        );
        self.answer.ok_or_else(|| missing("answer"))
    }
}

fn missing(what: &str) -> Error {
    Error::generation(format!("pipeline reached a stage without its {what}"))
}

/// Generation orchestrator plus the index refresh entry point.
pub struct RagService {
    registry: Arc<IndexRegistry>,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    settings: PipelineSettings,
}

impl RagService {
    pub fn new(registry: Arc<IndexRegistry>, generator: Arc<dyn Generator>, settings: PipelineSettings) -> Self {
        Self {
            retriever: Retriever::new(Arc::clone(&registry)),
            registry,
            generator,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    pub async fn answer(&self, user_id: &str, query: &str, kind: OutputKind) -> Result<RagAnswer> {
        let user_id = user_id.trim();
        let query = query.trim();
        if user_id.is_empty() {
            return Err(Error::invalid_input("user id is required"));
        }
        if query.is_empty() {
            return Err(Error::invalid_input("query is required"));
        }
        PipelineRun::new(self, user_id, query, kind).run().await
    }

    pub async fn general_query(&self, user_id: &str, query: &str) -> Result<String> {
        match self.answer(user_id, query, OutputKind::Text).await? {
            RagAnswer::Text(text) => Ok(text),
            other => Err(unexpected(other.kind())),
        }
    }

    pub async fn recipe_names(&self, user_id: &str, query: &str) -> Result<Vec<String>> {
        match self.answer(user_id, query, OutputKind::RecipeList).await? {
            RagAnswer::RecipeNames(names) => Ok(names),
            other => Err(unexpected(other.kind())),
        }
    }

    pub async fn recipe_suggestions(&self, user_id: &str, query: &str) -> Result<Vec<RecipeSuggestion>> {
        match self.answer(user_id, query, OutputKind::Structured).await? {
            RagAnswer::Suggestions(suggestions) => Ok(suggestions),
            other => Err(unexpected(other.kind())),
        }
    }

    /// Rebuilds the user's index and reports the outcome; failures are
    /// reported, not raised.
    pub async fn refresh(&self, user_id: &str) -> RefreshReport {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return RefreshReport::failure("user id is required");
        }
        match self.registry.force_refresh(user_id).await {
            Ok(count) => {
                info!(user_id, document_count = count, "index refreshed");
                RefreshReport::success(count)
            }
            Err(err) => {
                error!(user_id, error = %err, "index refresh failed");
                RefreshReport::failure(err)
            }
        }
    }

    /// The only stage with external latency: bounded by the configured
    /// timeout and never retried here.
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let timeout = self.settings.generation_timeout;
        match tokio::time::timeout(timeout, self.generator.generate(prompt)).await {
            Err(_) => Err(Error::GenerationTimeout(timeout.as_secs())),
            Ok(Err(err @ (Error::Generation(_) | Error::GenerationTimeout(_)))) => Err(err),
            Ok(Err(other)) => Err(Error::generation(other.to_string())),
            Ok(Ok(raw)) => Ok(raw),
        }
    }
}

fn unexpected(kind: OutputKind) -> Error {
    Error::generation(format!("pipeline produced a {kind} answer for a different request"))
}
