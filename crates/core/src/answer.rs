use crate::error::{LlmError, QueryError};
use crate::models::{ChatAnswer, Source, DEFAULT_TOP_K};
use crate::store::VectorStore;
use crate::traits::LanguageModel;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Returned without calling the model when retrieval finds nothing.
pub const NO_INFORMATION_ANSWER: &str =
    "I don't know about that. The information isn't in my documents.";

/// The phrase the model is told to use when the context does not cover the question.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "I don't have information about that in my documents.";

pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant that only provides information from the given documents.\n\n\
         Context information from documents:\n{context}\n\n\
         User Question: {question}\n\n\
         If the information to answer the question isn't contained in the context, respond with \"{INSUFFICIENT_CONTEXT_ANSWER}\"\n\n\
         Answer:"
    )
}

pub struct AnswerGenerator {
    store: Arc<VectorStore>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    request_timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(store: Arc<VectorStore>, model: Arc<dyn LanguageModel>, request_timeout: Duration) -> Self {
        Self {
            store,
            model,
            top_k: DEFAULT_TOP_K,
            request_timeout,
        }
    }

    /// Chunks handed to the model per question, at least one.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Retrieve the closest chunks and ask the model once, at temperature 0,
    /// to answer from them alone.
    pub async fn answer(&self, question: &str) -> Result<ChatAnswer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let hits = self.store.query(question, self.top_k).await?;
        if hits.is_empty() {
            info!("no relevant chunks, answering without the model");
            return Ok(ChatAnswer {
                answer: NO_INFORMATION_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render_prompt(&context, question);
        debug!(hits = hits.len(), prompt_chars = prompt.len(), "prompting language model");

        let after = self.request_timeout;
        let answer = tokio::time::timeout(after, self.model.complete(&prompt, 0.0))
            .await
            .map_err(|_| LlmError::Timeout { after })??;

        Ok(ChatAnswer {
            answer,
            sources: hits.iter().map(Source::preview).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::Chunk;
    use crate::store::StoreOptions;
    use crate::stores::InMemoryVectorDatabase;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<(String, f32)>>,
    }

    impl RecordingModel {
        fn calls(&self) -> Vec<(String, f32)> {
            self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push((prompt.to_string(), temperature));
            }
            Ok("The sky is blue.".to_string())
        }
    }

    struct StalledModel;

    #[async_trait]
    impl LanguageModel for StalledModel {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    fn store() -> Arc<VectorStore> {
        Arc::new(VectorStore::new(
            Arc::new(InMemoryVectorDatabase::new()),
            Arc::new(CharacterNgramEmbedder::default()),
            StoreOptions::default(),
        ))
    }

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            text: text.to_string(),
            source_file_name: "sky.pdf".to_string(),
            page_number: Some(1),
            uploaded_at: Utc::now(),
            mime_type: Some("application/pdf".to_string()),
        }
    }

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = render_prompt("The sky is blue.", "What color is the sky?");
        assert!(prompt.starts_with("You are a helpful assistant"));
        assert!(prompt.contains("Context information from documents:\nThe sky is blue.\n\n"));
        assert!(prompt.contains("User Question: What color is the sky?"));
        assert!(prompt.contains(INSUFFICIENT_CONTEXT_ANSWER));
        assert!(prompt.ends_with("Answer:"));
    }

    #[tokio::test]
    async fn empty_collection_answers_without_the_model() -> Result<(), Box<dyn std::error::Error>> {
        let model = Arc::new(RecordingModel::default());
        let generator = AnswerGenerator::new(store(), model.clone(), Duration::from_secs(5));

        let answer = generator.answer("What is the capital of France?").await?;

        assert_eq!(answer.answer, NO_INFORMATION_ANSWER);
        assert!(answer.sources.is_empty());
        assert!(model.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn answers_from_retrieved_chunks_with_previews() -> Result<(), Box<dyn std::error::Error>> {
        let store = store();
        let long = format!("The sky is blue. {}", "x".repeat(200));
        store.add_chunks(&[chunk("c1", &long)]).await?;

        let model = Arc::new(RecordingModel::default());
        let generator = AnswerGenerator::new(store, model.clone(), Duration::from_secs(5));
        let answer = generator.answer("  What color is the sky?  ").await?;

        assert_eq!(answer.answer, "The sky is blue.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].metadata.source, "sky.pdf");
        assert_eq!(answer.sources[0].metadata.page, Some(1));
        assert_eq!(answer.sources[0].content.chars().count(), 153);
        assert!(answer.sources[0].content.ends_with("..."));

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, 0.0);
        assert!(calls[0].0.contains("User Question: What color is the sky?\n"));
        Ok(())
    }

    #[tokio::test]
    async fn context_holds_at_most_top_k_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let store = store();
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| chunk(&format!("c{i}"), &format!("fact number {i}")))
            .collect();
        store.add_chunks(&chunks).await?;

        let model = Arc::new(RecordingModel::default());
        let generator = AnswerGenerator::new(store.clone(), model.clone(), Duration::from_secs(5));
        let answer = generator.answer("fact").await?;
        assert_eq!(answer.sources.len(), DEFAULT_TOP_K);

        let wider = AnswerGenerator::new(store.clone(), model.clone(), Duration::from_secs(5))
            .with_top_k(5);
        assert_eq!(wider.answer("fact").await?.sources.len(), 5);

        let floored = AnswerGenerator::new(store, model, Duration::from_secs(5)).with_top_k(0);
        assert_eq!(floored.answer("fact").await?.sources.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let generator = AnswerGenerator::new(
            store(),
            Arc::new(RecordingModel::default()),
            Duration::from_secs(5),
        );
        let result = generator.answer("   ").await;
        assert!(matches!(result, Err(QueryError::EmptyQuestion)));
    }

    #[tokio::test]
    async fn slow_model_surfaces_as_timeout() -> Result<(), Box<dyn std::error::Error>> {
        let store = store();
        store.add_chunks(&[chunk("c1", "The sky is blue.")]).await?;

        let generator = AnswerGenerator::new(store, Arc::new(StalledModel), Duration::from_millis(20));
        let error = match generator.answer("sky?").await {
            Ok(_) => return Err("expected a timeout".into()),
            Err(error) => error,
        };

        assert!(error.is_timeout());
        assert!(matches!(error, QueryError::Model(LlmError::Timeout { .. })));
        Ok(())
    }
}
