use crate::http::{self, AppState};
use anyhow::Context;
use application::index_registry::IndexRegistry;
use application::rag_service::{PipelineSettings, RagService};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use domain::models::{InventoryRecord, OutputKind, RagAnswer, RefreshStatus};
use domain::ports::{Embedder, Generator, InventoryStore};
use infrastructure::config::{Config, EmbeddingBackend};
use infrastructure::embedder::{HashingEmbedder, OllamaEmbedder};
use infrastructure::index_snapshot::IndexSnapshotStore;
use infrastructure::inventory_store::SqliteInventoryStore;
use infrastructure::ollama_client::OllamaClient;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "pantry_rag")]
#[command(about = "Inventory-grounded recipe assistant with per-user retrieval indices")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Overrides BIND_ADDR for `serve`
    #[arg(long, env = "BIND_ADDR", global = true)]
    pub bind: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service
    Serve,
    /// Ask a question against a user's inventory
    Ask {
        #[arg(long)]
        user: String,
        #[arg(long, value_enum, default_value_t = AnswerKind::Text)]
        kind: AnswerKind,
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
    },
    /// Rebuild a user's index now
    Refresh {
        #[arg(long)]
        user: String,
    },
    /// Mark a user's index stale if the inventory count changed
    Check {
        #[arg(long)]
        user: String,
    },
    /// Load records from a JSON array file into the inventory database
    Import {
        #[arg(long)]
        user: String,
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnswerKind {
    Text,
    Recipes,
    Suggestions,
}

impl From<AnswerKind> for OutputKind {
    fn from(kind: AnswerKind) -> Self {
        match kind {
            AnswerKind::Text => OutputKind::Text,
            AnswerKind::Recipes => OutputKind::RecipeList,
            AnswerKind::Suggestions => OutputKind::Structured,
        }
    }
}

/// Everything a command needs, wired from [`Config`].
pub struct Components {
    pub config: Config,
    pub inventory: Arc<SqliteInventoryStore>,
    pub service: Arc<RagService>,
}

impl Components {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        ensure_parent_dir(&config.inventory_db_path)?;
        let inventory = Arc::new(
            SqliteInventoryStore::open(&config.inventory_db_path)
                .with_context(|| format!("opening inventory store {}", config.inventory_db_path))?,
        );

        let client = OllamaClient::new(
            &config.ollama_base_url,
            &config.ollama_model,
            config.generation_timeout,
        )?;
        let embedder: Arc<dyn Embedder> = match config.embedding_backend {
            EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.embedding_dimension)),
            EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(
                client.clone(),
                config.ollama_embed_model.clone(),
                config.embedding_dimension,
            )),
        };
        debug!(
            embedder = %embedder.signature(),
            generator = client.model(),
            "model backends ready"
        );

        let store: Arc<dyn InventoryStore> = inventory.clone();
        let mut registry = IndexRegistry::new(store, embedder);
        if let Some(path) = &config.index_db_path {
            ensure_parent_dir(path)?;
            let snapshots = IndexSnapshotStore::open(path)
                .with_context(|| format!("opening index snapshot store {path}"))?;
            registry = registry.with_snapshots(snapshots);
        }

        let generator: Arc<dyn Generator> = Arc::new(client);
        let settings = PipelineSettings {
            top_k: config.retrieval_top_k,
            generation_timeout: config.generation_timeout,
            ..PipelineSettings::default()
        };
        let service = Arc::new(RagService::new(Arc::new(registry), generator, settings));
        Ok(Self {
            config,
            inventory,
            service,
        })
    }
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }
    Ok(())
}

pub struct CliApp {
    components: Components,
}

impl CliApp {
    pub async fn new() -> anyhow::Result<Self> {
        let config = Config::load()?;
        Ok(Self {
            components: Components::from_config(config).await?,
        })
    }

    pub async fn run(&self, cli: Cli) -> anyhow::Result<()> {
        match cli.command {
            Command::Serve => {
                let bind = cli
                    .bind
                    .unwrap_or_else(|| self.components.config.bind_addr.clone());
                self.handle_serve(&bind).await
            }
            Command::Ask { user, kind, query } => {
                self.handle_ask(&user, kind.into(), &query.join(" ")).await
            }
            Command::Refresh { user } => self.handle_refresh(&user).await,
            Command::Check { user } => self.handle_check(&user).await,
            Command::Import { user, file } => self.handle_import(&user, &file).await,
        }
    }

    async fn handle_serve(&self, bind: &str) -> anyhow::Result<()> {
        eprintln!("{} {}", "Serving on".green(), bind.bold());
        http::serve(bind, AppState::new(Arc::clone(&self.components.service)))
            .await
            .with_context(|| format!("HTTP server on {bind}"))
    }

    async fn handle_ask(&self, user: &str, kind: OutputKind, query: &str) -> anyhow::Result<()> {
        let answer = self.components.service.answer(user, query, kind).await?;
        let body = match answer {
            RagAnswer::Text(text) => json!({ "answer": text }),
            RagAnswer::RecipeNames(names) => json!({ "answer": names }),
            RagAnswer::Suggestions(suggestions) => json!({ "suggestions": suggestions }),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        Ok(())
    }

    async fn handle_refresh(&self, user: &str) -> anyhow::Result<()> {
        let report = self.components.service.refresh(user).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if report.status == RefreshStatus::Error {
            eprintln!("{}", report.message.red());
            anyhow::bail!("{}", report.message);
        }
        Ok(())
    }

    async fn handle_check(&self, user: &str) -> anyhow::Result<()> {
        let registry = self.components.service.registry();
        let marked = registry.check_freshness(user).await?;
        let phase = registry.phase(user).await;
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "marked_stale": marked, "phase": phase }))?
        );
        Ok(())
    }

    async fn handle_import(&self, user: &str, file: &Path) -> anyhow::Result<()> {
        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        let records: Vec<InventoryRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of records", file.display()))?;
        for record in &records {
            self.components
                .inventory
                .insert_record(user, record.clone())
                .await?;
        }
        let total = self.components.inventory.count(user).await?;
        // Keeps an already-built index from serving the old record set.
        let phase = self.components.service.registry().mark_stale(user).await;
        info!(user_id = user, imported = records.len(), total, "records imported");
        eprintln!(
            "{} {} records for {}",
            "Imported".green(),
            records.len(),
            user.bold()
        );
        println!(
            "{}",
            serde_json::to_string_pretty(
                &json!({ "imported": records.len(), "total": total, "phase": phase })
            )?
        );
        Ok(())
    }
}
