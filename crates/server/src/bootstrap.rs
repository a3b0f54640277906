use std::sync::Arc;
use std::time::Duration;

use tellr_agent::collaborators::{LedgerService, SecretVerifier};
use tellr_agent::retrieval::{Embedder, HashingEmbedder, HttpEmbedder, InMemoryVectorIndex};
use tellr_agent::supervisor::{Collaborators, Supervisor};
use tellr_agent::OpenAiCompatibleModel;
use tellr_core::audit::TracingAuditSink;
use tellr_core::chunker::{Chunker, SourceDocument};
use tellr_core::config::AppConfig;
use tellr_core::errors::CollaboratorError;
use tellr_db::{connect_with_config, migrations, DbPool, SqlSessionStore};
use thiserror::Error;
use tracing::{info, warn};

use crate::adapters::{HttpLedgerClient, HttpSecretVerifier};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub supervisor: Arc<Supervisor>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("collaborator setup failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("knowledge directory {path} could not be read: {source}")]
    Knowledge {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let db_pool = connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    let applied = migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        applied,
        "database migrations applied"
    );

    let embedder = embedder(&config)?;
    let index = Arc::new(InMemoryVectorIndex::new());
    let indexed = load_knowledge(&config, embedder.as_ref(), &index).await?;
    info!(
        event_name = "system.bootstrap.knowledge_indexed",
        correlation_id = "bootstrap",
        passages = indexed,
        "knowledge index ready"
    );

    let ledger: Arc<dyn LedgerService> = Arc::new(HttpLedgerClient::from_config(&config.ledger)?);
    let verifier: Arc<dyn SecretVerifier> = Arc::new(HttpSecretVerifier::from_config(&config.verification)?);
    let supervisor = Supervisor::from_config(
        &config,
        Collaborators {
            model: Arc::new(OpenAiCompatibleModel::from_config(&config.llm)?),
            embedder,
            index,
            ledger,
            verifier,
            store: Arc::new(SqlSessionStore::new(db_pool.clone())),
            audit: Arc::new(TracingAuditSink),
        },
    );

    Ok(Application { config, db_pool, supervisor: Arc::new(supervisor) })
}

/// Remote embeddings when an endpoint is configured, otherwise the offline hashing embedder.
fn embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>, CollaboratorError> {
    match &config.embedding.base_url {
        Some(base_url) => {
            let timeout = Duration::from_secs(config.llm.timeout_secs);
            Ok(Arc::new(HttpEmbedder::new(base_url, &config.embedding, timeout)?))
        }
        None => {
            warn!(
                event_name = "system.bootstrap.offline_embedder",
                correlation_id = "bootstrap",
                dimensions = config.embedding.dimensions,
                "no embedding endpoint configured; using hashing embedder"
            );
            Ok(Arc::new(HashingEmbedder::new(config.embedding.dimensions)))
        }
    }
}

async fn load_knowledge(
    config: &AppConfig,
    embedder: &dyn Embedder,
    index: &InMemoryVectorIndex,
) -> Result<usize, BootstrapError> {
    let Some(dir) = &config.retrieval.knowledge_dir else {
        return Ok(0);
    };
    let documents = SourceDocument::load_directory(dir)
        .map_err(|source| BootstrapError::Knowledge { path: dir.display().to_string(), source })?;

    let chunker = Chunker::default();
    let passages = documents.iter().flat_map(|document| chunker.chunk(document)).collect::<Vec<_>>();
    Ok(index.insert(embedder, passages).await?)
}
