use anyhow::Context;
use clap::{Args, ValueEnum};
use docuchat_core::embeddings::{COHERE_DEFAULT_MODEL, DEFAULT_EMBEDDING_DIMENSIONS};
use docuchat_core::llm::{DEFAULT_CLAUDE_MODEL, DEFAULT_MAX_TOKENS};
use docuchat_core::models::DEFAULT_TOP_K;
use docuchat_core::stores::chroma::DEFAULT_CHROMA_URL;
use docuchat_core::stores::qdrant::DEFAULT_QDRANT_URL;
use docuchat_core::{
    CharacterNgramEmbedder, ChromaStore, ChunkingConfig, ClaudeProvider, CohereEmbedder,
    EmbeddingService, InMemoryVectorDatabase, IngestionOptions, LanguageModel, QdrantStore,
    StoreOptions, VectorDatabase, DEFAULT_COLLECTION,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VectorBackend {
    Chroma,
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    Cohere,
    /// Offline character n-gram hashing, no API key needed.
    Local,
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Directory holding uploaded documents
    #[arg(long, env = "DOCUMENTS_DIR", default_value = "documents")]
    pub documents_dir: PathBuf,

    /// Vector database backend
    #[arg(long, env = "VECTOR_BACKEND", value_enum, default_value = "chroma")]
    pub vector_backend: VectorBackend,

    /// Chroma base URL
    #[arg(long, env = "CHROMA_URL", default_value = DEFAULT_CHROMA_URL)]
    pub chroma_url: String,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = DEFAULT_QDRANT_URL)]
    pub qdrant_url: String,

    /// Name of the embedding collection
    #[arg(long, env = "COLLECTION_NAME", default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Embedding service
    #[arg(long, env = "EMBEDDER", value_enum, default_value = "cohere")]
    pub embedder: EmbedderKind,

    #[arg(long, env = "COHERE_API_KEY", hide_env_values = true)]
    pub cohere_api_key: Option<String>,

    #[arg(long, env = "COHERE_MODEL", default_value = COHERE_DEFAULT_MODEL)]
    pub cohere_model: String,

    /// Vector size of the Cohere model; derived from the model name when unset
    #[arg(long, env = "COHERE_DIMENSIONS")]
    pub cohere_dimensions: Option<usize>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_MODEL", default_value = DEFAULT_CLAUDE_MODEL)]
    pub anthropic_model: String,

    #[arg(long, env = "ANTHROPIC_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub anthropic_max_tokens: u32,

    /// Chunks retrieved as context for each question
    #[arg(long, env = "TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Maximum characters per chunk
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Characters repeated between adjacent chunks
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 200)]
    pub chunk_overlap: usize,

    /// Upper bound for every embedding, vector database and model call
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Address the HTTP server listens on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn ingestion_options(&self) -> anyhow::Result<IngestionOptions> {
        let options = IngestionOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        };
        ChunkingConfig::from(&options)
            .validate()
            .context("invalid chunking settings")?;
        Ok(options)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            collection: self.collection.clone(),
            request_timeout: self.request_timeout(),
            ..StoreOptions::default()
        }
    }

    pub fn vector_database(&self) -> anyhow::Result<Arc<dyn VectorDatabase>> {
        let database: Arc<dyn VectorDatabase> = match self.vector_backend {
            VectorBackend::Chroma => Arc::new(
                ChromaStore::new(&self.chroma_url)
                    .with_context(|| format!("invalid chroma url {}", self.chroma_url))?,
            ),
            VectorBackend::Qdrant => Arc::new(QdrantStore::new(&self.qdrant_url)),
            VectorBackend::Memory => Arc::new(InMemoryVectorDatabase::new()),
        };
        Ok(database)
    }

    pub fn embedding_service(&self) -> Arc<dyn EmbeddingService> {
        match self.embedder {
            EmbedderKind::Cohere => {
                let api_key = self.cohere_api_key.clone().unwrap_or_default();
                if api_key.trim().is_empty() {
                    warn!("COHERE_API_KEY is not set; embedding requests will fail");
                }
                let embedder = CohereEmbedder::new(api_key, &self.cohere_model);
                match self.cohere_dimensions {
                    Some(dimensions) => Arc::new(embedder.with_dimensions(dimensions)),
                    None => Arc::new(embedder),
                }
            }
            EmbedderKind::Local => Arc::new(CharacterNgramEmbedder {
                dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            }),
        }
    }

    pub fn language_model(&self) -> Arc<dyn LanguageModel> {
        let api_key = self.anthropic_api_key.clone().unwrap_or_default();
        if api_key.trim().is_empty() {
            warn!("ANTHROPIC_API_KEY is not set; chat requests will fail");
        }
        Arc::new(
            ClaudeProvider::new(api_key, &self.anthropic_model)
                .with_max_tokens(self.anthropic_max_tokens),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Result<Settings, clap::Error> {
        let argv = std::iter::once("docuchat").chain(args.iter().copied());
        TestCli::try_parse_from(argv).map(|cli| cli.settings)
    }

    #[test]
    fn flags_override_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let settings = parse(&[
            "--vector-backend",
            "memory",
            "--embedder",
            "local",
            "--collection",
            "test_docs",
            "--chunk-size",
            "500",
            "--chunk-overlap",
            "50",
            "--bind",
            "0.0.0.0:8080",
        ])?;

        assert_eq!(settings.vector_backend, VectorBackend::Memory);
        assert_eq!(settings.embedder, EmbedderKind::Local);
        assert_eq!(settings.store_options().collection, "test_docs");
        assert_eq!(settings.bind.port(), 8080);

        let options = settings.ingestion_options()?;
        assert_eq!(options.chunk_size, 500);
        assert_eq!(options.chunk_overlap, 50);
        Ok(())
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let settings = parse(&["--chunk-size", "100", "--chunk-overlap", "100"])?;
        assert!(settings.ingestion_options().is_err());
        Ok(())
    }

    #[test]
    fn unknown_backend_fails_to_parse() {
        assert!(parse(&["--vector-backend", "pinecone"]).is_err());
    }

    #[test]
    fn memory_backend_needs_no_network() -> Result<(), Box<dyn std::error::Error>> {
        let settings = parse(&["--vector-backend", "memory", "--embedder", "local"])?;
        let database = settings.vector_database()?;
        assert_eq!(database.backend(), "memory");
        assert_eq!(settings.embedding_service().dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);
        Ok(())
    }

    #[test]
    fn cohere_dimensions_follow_model_unless_set() -> Result<(), Box<dyn std::error::Error>> {
        let default = parse(&[])?;
        assert_eq!(default.embedding_service().dimensions(), 1024);

        let light = parse(&["--cohere-model", "embed-english-light-v3.0"])?;
        assert_eq!(light.embedding_service().dimensions(), 384);

        let explicit = parse(&[
            "--cohere-model",
            "embed-english-light-v3.0",
            "--cohere-dimensions",
            "512",
        ])?;
        assert_eq!(explicit.embedding_service().dimensions(), 512);
        Ok(())
    }

    #[test]
    fn retrieval_and_model_budgets_are_configurable() -> Result<(), Box<dyn std::error::Error>> {
        let default = parse(&[])?;
        assert_eq!(default.top_k, DEFAULT_TOP_K);
        assert_eq!(default.anthropic_max_tokens, DEFAULT_MAX_TOKENS);

        let settings = parse(&["--top-k", "6", "--anthropic-max-tokens", "2048"])?;
        assert_eq!(settings.top_k, 6);
        assert_eq!(settings.anthropic_max_tokens, 2048);
        Ok(())
    }
}
