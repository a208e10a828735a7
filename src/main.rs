use nlq_engine::assistant::Assistant;
use nlq_engine::config::AppConfig;
use nlq_engine::db::{init_pool, PgHistoryStore, PgStatementStore};
use nlq_engine::execution::TrinoEngine;
use nlq_engine::history::{HistoryStore, InMemoryHistory};
use nlq_engine::llm::{Generator, LlmClient, LlmConfig};
use nlq_engine::repair::{ExecutionRepairController, LlmCorrectionService};
use nlq_engine::schema::{EngineSchemaProvider, SchemaProvider, StaticSchemaProvider};
use nlq_engine::synthesis::{SynthesisConfig, SynthesisController};
use nlq_engine::validator::{ExecutionValidator, FixedIntervalWait};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nlq")]
#[command(about = "Natural-language questions answered with self-correcting SQL")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question by generating and validating SQL
    Ask {
        /// The question in natural language
        question: String,

        /// Conversation id; a new one is generated when omitted
        #[arg(long)]
        session: Option<String>,

        /// JSON schema snapshot to use instead of the engine catalog
        #[arg(long)]
        schema_file: Option<PathBuf>,
    },
    /// Execute a statement against DATABASE_URL, repairing it on failure
    Repair {
        /// The SQL statement to run
        statement: String,

        /// What the statement is meant to do
        #[arg(long)]
        intent: String,
    },
    /// Print the engine catalog snapshot as JSON
    Schema,
}

fn validator(config: &AppConfig) -> Result<Arc<ExecutionValidator>> {
    let engine = TrinoEngine::new(config.engine.coordinator_url.clone(), config.engine.user.clone())?;
    Ok(Arc::new(ExecutionValidator::new(
        Arc::new(engine),
        Arc::new(FixedIntervalWait::new(config.engine.poll_interval)),
        config.engine.submit.clone(),
    )))
}

fn generator(llm: &LlmConfig) -> Result<Arc<dyn Generator>> {
    Ok(Arc::new(LlmClient::from_config(llm)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;

    match args.command {
        Commands::Ask {
            question,
            session,
            schema_file,
        } => {
            let llm = LlmConfig::from_env()?;
            let generator = generator(&llm)?;
            let validator = validator(&config)?;

            let schema: Arc<dyn SchemaProvider> = match schema_file {
                Some(path) => Arc::new(StaticSchemaProvider::new(path)),
                None => Arc::new(EngineSchemaProvider::new(validator.clone())),
            };
            let history: Arc<dyn HistoryStore> = match &config.database_url {
                Some(url) => {
                    let store = PgHistoryStore::new(init_pool(url).await?);
                    store.ensure_schema().await?;
                    Arc::new(store)
                }
                None => Arc::new(InMemoryHistory::new()),
            };

            let synthesis = SynthesisController::new(
                generator.clone(),
                validator,
                SynthesisConfig {
                    max_attempts: config.synthesis_attempts,
                    sampling: llm.sampling,
                    system_instruction: Some(llm.system_instruction.clone()),
                    ..SynthesisConfig::default()
                },
            );
            let assistant = Assistant::new(schema, history, synthesis, generator, llm.sampling);

            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            info!("Session: {}", session);
            let answer = assistant.ask(&session, &question).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Commands::Repair { statement, intent } => {
            let llm = LlmConfig::from_env()?;
            let pool = init_pool(config.require_database_url()?)
                .await
                .context("connecting to DATABASE_URL")?;

            let controller = ExecutionRepairController::new(
                Arc::new(PgStatementStore::new(pool)),
                Arc::new(LlmCorrectionService::new(generator(&llm)?, llm.sampling)),
                config.repair_attempts,
            );
            let result = controller.execute(&statement, &intent).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Schema => {
            let provider = EngineSchemaProvider::new(validator(&config)?);
            let snapshot = provider.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
