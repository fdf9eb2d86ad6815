use crate::config::Settings;
use docuchat_core::{
    is_supported, sanitize_file_name, AnswerGenerator, ChatAnswer, DocumentStore, EmbeddingService,
    FileExtractor, IngestReport, IngestionError, IngestionOptions, IngestionPipeline,
    LanguageModel, QueryError, ReindexError, ReindexOrchestrator, ReindexReport, StoreOptions,
    VectorDatabase, VectorStore,
};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::path::Path;
use std::sync::Arc;
use tracing::error;

/// Service handles built once at start-up and shared by every request.
pub struct Services {
    pub documents: DocumentStore,
    pub store: Arc<VectorStore>,
    pub pipeline: Arc<IngestionPipeline>,
    pub reindexer: ReindexOrchestrator,
    pub answers: AnswerGenerator,
}

impl Services {
    pub fn new(
        documents: DocumentStore,
        database: Arc<dyn VectorDatabase>,
        embedder: Arc<dyn EmbeddingService>,
        model: Arc<dyn LanguageModel>,
        store_options: StoreOptions,
        ingestion: IngestionOptions,
        top_k: usize,
    ) -> Self {
        let request_timeout = store_options.request_timeout;
        let store = Arc::new(VectorStore::new(database, embedder, store_options));
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::new(FileExtractor::default()),
            store.clone(),
            ingestion,
        ));
        let reindexer =
            ReindexOrchestrator::new(documents.clone(), pipeline.clone(), store.clone());
        let answers =
            AnswerGenerator::new(store.clone(), model, request_timeout).with_top_k(top_k);

        Self {
            documents,
            store,
            pipeline,
            reindexer,
            answers,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(
            DocumentStore::new(&settings.documents_dir),
            settings.vector_database()?,
            settings.embedding_service(),
            settings.language_model(),
            settings.store_options(),
            settings.ingestion_options()?,
            settings.top_k,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    Extraction,
    Timeout,
    Upstream,
    Internal,
}

/// Failure half of every action. Serializes as `{success:false, error, code}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionError {
    pub code: ErrorCode,
    pub message: String,
}

impl ActionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }
}

impl Serialize for ActionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ActionError", 3)?;
        state.serialize_field("success", &false)?;
        state.serialize_field("error", &self.message)?;
        state.serialize_field("code", &self.code)?;
        state.end()
    }
}

impl From<IngestionError> for ActionError {
    fn from(error: IngestionError) -> Self {
        let code = match &error {
            _ if error.is_timeout() => ErrorCode::Timeout,
            IngestionError::Extraction(_) => ErrorCode::Extraction,
            IngestionError::MissingFileName(_) => ErrorCode::BadRequest,
            IngestionError::Save { .. } => ErrorCode::Internal,
            IngestionError::Chunking(_) => ErrorCode::Internal,
            IngestionError::Store(_) => ErrorCode::Upstream,
        };
        Self::new(code, error.to_string())
    }
}

impl From<ReindexError> for ActionError {
    fn from(error: ReindexError) -> Self {
        let code = match &error {
            _ if error.is_timeout() => ErrorCode::Timeout,
            ReindexError::Io(_) => ErrorCode::Internal,
            ReindexError::Store(_) => ErrorCode::Upstream,
        };
        Self::new(code, error.to_string())
    }
}

impl From<QueryError> for ActionError {
    fn from(error: QueryError) -> Self {
        let code = match &error {
            _ if error.is_timeout() => ErrorCode::Timeout,
            QueryError::EmptyQuestion => ErrorCode::BadRequest,
            QueryError::Store(_) | QueryError::Model(_) => ErrorCode::Upstream,
        };
        Self::new(code, error.to_string())
    }
}

/// Outcome of the upload and reindex actions.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult<T> {
    Ok(T),
    Err(ActionError),
}

impl<T> From<Result<T, ActionError>> for ActionResult<T> {
    fn from(result: Result<T, ActionError>) -> Self {
        match result {
            Ok(metadata) => ActionResult::Ok(metadata),
            Err(error) => ActionResult::Err(error),
        }
    }
}

impl<T: Serialize> Serialize for ActionResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ActionResult::Ok(metadata) => {
                let mut state = serializer.serialize_struct("ActionResult", 2)?;
                state.serialize_field("success", &true)?;
                state.serialize_field("metadata", metadata)?;
                state.end()
            }
            ActionResult::Err(error) => error.serialize(serializer),
        }
    }
}

/// Store the upload under its file name, then extract, chunk and index it.
pub async fn upload_document(
    services: &Services,
    file_name: &str,
    mime_type: Option<&str>,
    bytes: &[u8],
) -> ActionResult<IngestReport> {
    upload(services, file_name, mime_type, bytes).await.into()
}

async fn upload(
    services: &Services,
    file_name: &str,
    mime_type: Option<&str>,
    bytes: &[u8],
) -> Result<IngestReport, ActionError> {
    let name = sanitize_file_name(file_name)
        .ok_or_else(|| ActionError::bad_request("No file uploaded"))?;
    if !is_supported(Path::new(&name)) {
        return Err(ActionError::bad_request(format!(
            "Unsupported file type: {name}. Upload a PDF, text, markdown, HTML or JSON file."
        )));
    }

    let mime_type = mime_type.map(str::trim).filter(|value| !value.is_empty());
    services
        .pipeline
        .ingest_upload(&services.documents, &name, bytes, mime_type)
        .await
        .map_err(|source| {
            error!(file = %name, %source, "failed to process document");
            ActionError::from(source)
        })
}

pub async fn reindex(services: &Services) -> ActionResult<ReindexReport> {
    services
        .reindexer
        .reindex_all()
        .await
        .map_err(|source| {
            error!(%source, "reindex failed");
            ActionError::from(source)
        })
        .into()
}

pub async fn chat(services: &Services, query: &str) -> Result<ChatAnswer, ActionError> {
    services.answers.answer(query).await.map_err(|source| {
        if !matches!(source, QueryError::EmptyQuestion) {
            error!(%source, "chat failed");
        }
        ActionError::from(source)
    })
}
