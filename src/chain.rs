//! Retrieval-augmented answering chain.
//!
//! [`QaChain`] is the one answering unit: built once per process (index,
//! embedding model, and generation backend all load here) and reused for
//! every question. `answer` is a pure function of the index contents and
//! the question, given the fixed backend and sampling policy.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::{self, GenerationBackend, SamplingPolicy};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider, LocalEmbedder};
use crate::index::VectorIndex;
use crate::models::{Answer, Citation, ScoredChunk};

/// The exact sentence the model is instructed to reply with when the
/// retrieved context cannot answer the question.
pub const FALLBACK_SENTENCE: &str =
    "The provided documents do not contain enough information to answer this question.";

const PROMPT_TEMPLATE: &str = "\
You are an expert research assistant. Your task is to provide detailed, accurate, and comprehensive answers based ONLY on the provided context. Do not use any of your prior knowledge.

CONTEXT:
{context}

QUESTION:
{question}

INSTRUCTIONS:
1. Synthesize the information from the context to answer the question thoroughly.
2. If the context does not contain the answer, state clearly: \"{fallback}\"
3. Quote relevant phrases or sentences from the context to support your answer where possible.
4. Structure your answer in a clear, easy-to-read format. Use bullet points or numbered lists if it helps clarity.
5. Do not make up any information. Your response must be grounded in the text provided.

ANSWER:
";

/// Approximate chars-per-token ratio used to budget the prompt.
const CHARS_PER_TOKEN: usize = 4;
/// Tokens reserved for the template text and the question itself.
const PROMPT_RESERVE_TOKENS: usize = 512;

/// Fill the two template slots with the retrieved context and the user's
/// literal question.
pub fn render_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{fallback}", FALLBACK_SENTENCE)
        .replace("{context}", context)
        .replace("{question}", question)
}

fn context_char_budget(context_window: usize, max_tokens: usize) -> usize {
    context_window.saturating_sub(max_tokens + PROMPT_RESERVE_TOKENS) * CHARS_PER_TOKEN
}

/// Concatenate retrieved chunk texts, in retrieval order, within a character
/// budget. The last chunk is truncated on a character boundary if needed.
fn assemble_context(hits: &[ScoredChunk], budget_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for hit in hits {
        let separator = if out.is_empty() { 0 } else { 2 };
        if used + separator >= budget_chars {
            break;
        }
        if separator > 0 {
            out.push_str("\n\n");
            used += separator;
        }

        let room = budget_chars - used;
        let len = hit.chunk.text.chars().count();
        if len <= room {
            out.push_str(&hit.chunk.text);
            used += len;
        } else {
            out.extend(hit.chunk.text.chars().take(room));
            break;
        }
    }

    out
}

fn file_name(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| source.to_string())
}

/// The process-wide answering unit.
pub struct QaChain {
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    backend: Box<dyn GenerationBackend>,
    top_k: usize,
    policy: SamplingPolicy,
    timeout: Duration,
}

impl QaChain {
    /// Load everything the chain needs. Expensive (index + two model loads);
    /// call once and pass the handle around.
    pub async fn build(config: &Config) -> Result<Self> {
        let index_dir = &config.index.dir;
        if !VectorIndex::exists(index_dir) {
            bail!(
                "No index found at {}. Run `dqa ingest` to build it first.",
                index_dir.display()
            );
        }

        let index = VectorIndex::load(index_dir)?;
        if index.model_name() != config.embedding.model {
            bail!(
                "Index at {} was built with embedding model '{}', but the config selects '{}'. \
                 Re-run `dqa ingest` or change [embedding].model.",
                index_dir.display(),
                index.model_name(),
                config.embedding.model
            );
        }

        let embedder = LocalEmbedder::load(&config.embedding).await?;
        let backend = backend::create_backend(&config.generation).await?;

        Ok(Self::from_parts(
            index,
            embedder,
            backend,
            config.retrieval.top_k,
            SamplingPolicy::from_config(&config.generation),
            Duration::from_secs(config.generation.timeout_secs),
        ))
    }

    /// Assemble a chain from already-constructed parts.
    pub fn from_parts(
        index: VectorIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        backend: Box<dyn GenerationBackend>,
        top_k: usize,
        policy: SamplingPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            embedder,
            backend,
            top_k,
            policy,
            timeout,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn backend_model(&self) -> &str {
        self.backend.model_name()
    }

    /// Answer one question: embed it, retrieve the nearest chunks, prompt
    /// the backend, and return the generated text with (file, page)
    /// citations in retrieval-similarity order.
    ///
    /// Zero retrieved chunks is not an error; the template's fallback
    /// instruction governs the reply.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let query = embedding::embed_query(Arc::clone(&self.embedder), question).await?;
        let hits = self.index.search(&query, self.top_k);

        let budget = context_char_budget(self.backend.context_window(), self.policy.max_tokens);
        let context = assemble_context(&hits, budget);
        let prompt = render_prompt(&context, question);

        debug!(
            chunks = hits.len(),
            prompt_chars = prompt.len(),
            model = self.backend.model_name(),
            "dispatching generation"
        );

        let text = tokio::time::timeout(
            self.timeout,
            self.backend.generate(&prompt, &self.policy),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "generation timed out after {}s",
                self.timeout.as_secs()
            )
        })??;

        let sources = hits
            .iter()
            .map(|hit| Citation {
                file: file_name(&hit.chunk.source),
                page: hit.chunk.page,
            })
            .collect();

        Ok(Answer { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::models::Chunk;
    use async_trait::async_trait;

    fn chunk(source: &str, page: u32, text: &str) -> Chunk {
        Chunk {
            id: format!("{}:{}", source, page),
            source: source.to_string(),
            page,
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    fn scored(source: &str, page: u32, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: chunk(source, page, text),
            score,
        }
    }

    /// Maps texts to fixed vectors by keyword, so retrieval order is known.
    struct KeywordEmbedder;

    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-test"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    if text.contains("feline") {
                        vec![1.0, 0.0]
                    } else if text.contains("canine") {
                        vec![0.0, 1.0]
                    } else {
                        vec![0.5, 0.5]
                    }
                })
                .collect())
        }
    }

    /// Echoes the prompt back, so tests can inspect what the model saw.
    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        fn model_name(&self) -> &str {
            "echo"
        }
        fn context_window(&self) -> usize {
            8192
        }
        async fn generate(
            &self,
            prompt: &str,
            _policy: &SamplingPolicy,
        ) -> Result<String, BackendError> {
            Ok(prompt.to_string())
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl GenerationBackend for SlowBackend {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn context_window(&self) -> usize {
            8192
        }
        async fn generate(
            &self,
            _prompt: &str,
            _policy: &SamplingPolicy,
        ) -> Result<String, BackendError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(String::new())
        }
    }

    fn test_policy() -> SamplingPolicy {
        SamplingPolicy {
            max_tokens: 512,
            top_k: 10,
            temperature: 0.7,
        }
    }

    fn test_chain(backend: Box<dyn GenerationBackend>, timeout: Duration) -> QaChain {
        let chunks = vec![
            chunk("pets/cats.pdf", 4, "The feline sleeps all day."),
            chunk("pets/dogs.pdf", 7, "The canine fetches the ball."),
        ];
        let embedder = KeywordEmbedder;
        let vectors = embedder
            .embed_batch(chunks.iter().map(|c| c.text.clone()).collect())
            .unwrap();
        let index = VectorIndex::build("keyword-test", 2, chunks, vectors).unwrap();
        QaChain::from_parts(index, Arc::new(KeywordEmbedder), backend, 5, test_policy(), timeout)
    }

    #[test]
    fn prompt_substitutes_both_slots() {
        let prompt = render_prompt("some context here", "what is this?");
        assert!(prompt.contains("some context here"));
        assert!(prompt.contains("what is this?"));
        assert!(prompt.contains(FALLBACK_SENTENCE));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn context_preserves_retrieval_order() {
        let hits = vec![
            scored("a.pdf", 1, "first chunk", 0.9),
            scored("b.pdf", 2, "second chunk", 0.5),
        ];
        let context = assemble_context(&hits, 10_000);
        let first = context.find("first chunk").unwrap();
        let second = context.find("second chunk").unwrap();
        assert!(first < second);
    }

    #[test]
    fn context_respects_budget() {
        let hits = vec![
            scored("a.pdf", 1, &"x".repeat(100), 0.9),
            scored("b.pdf", 2, &"y".repeat(100), 0.5),
        ];
        let context = assemble_context(&hits, 120);
        assert!(context.chars().count() <= 120);
        assert!(context.contains('x'));
    }

    #[test]
    fn empty_hits_give_empty_context() {
        assert_eq!(assemble_context(&[], 1000), "");
    }

    #[tokio::test]
    async fn answer_cites_sources_in_similarity_order() {
        let chain = test_chain(Box::new(EchoBackend), Duration::from_secs(5));
        let answer = chain.answer("tell me about the feline").await.unwrap();

        assert_eq!(answer.sources.len(), 2);
        assert_eq!(
            answer.sources[0],
            Citation {
                file: "cats.pdf".to_string(),
                page: 4
            }
        );
        assert_eq!(answer.sources[1].file, "dogs.pdf");

        // The echoed prompt shows the model saw the retrieved text and the
        // literal question.
        assert!(answer.text.contains("The feline sleeps all day."));
        assert!(answer.text.contains("tell me about the feline"));
    }

    #[tokio::test]
    async fn answer_times_out() {
        let chain = test_chain(Box::new(SlowBackend), Duration::from_millis(20));
        let err = chain.answer("anything").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn answer_on_empty_index_still_generates() {
        let index = VectorIndex::build("keyword-test", 2, vec![], vec![]).unwrap();
        let chain = QaChain::from_parts(
            index,
            Arc::new(KeywordEmbedder),
            Box::new(EchoBackend),
            5,
            test_policy(),
            Duration::from_secs(5),
        );
        let answer = chain.answer("anything at all").await.unwrap();
        assert!(answer.sources.is_empty());
        assert!(answer.text.contains(FALLBACK_SENTENCE));
    }

    #[test]
    fn citation_uses_file_name_only() {
        assert_eq!(file_name("papers/deep/rlhf.pdf"), "rlhf.pdf");
        assert_eq!(file_name("rlhf.pdf"), "rlhf.pdf");
    }
}
