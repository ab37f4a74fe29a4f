//! Retrieval-augmented generation collaborators.
//!
//! Nothing in the group chat calls into this module; agents or applications use it to
//! ground answers in a document collection:
//!
//! ```text
//! ingest:  records ──embed (concurrently)──▶ VectorStore::upsert
//! answer:  question ──embed──▶ VectorStore::search(top_k) ──▶ grounded prompt ──▶ ClientWrapper
//! ```
//!
//! [`InMemoryVectorStore`] is a reference store ranking by cosine similarity.

use crate::agentchat::client_wrapper::{ClientWrapper, Message, Role};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Produces fixed-length vectors for text.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>>;

    /// Length of every vector returned by [`embed`](EmbeddingService::embed).
    fn dimensions(&self) -> usize;
}

/// One document in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagRecord {
    pub key: String,
    pub content: String,
    /// Where the content came from; cited in grounded answers.
    pub url: String,
    /// Empty until the record has been embedded.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl RagRecord {
    pub fn new(key: impl Into<String>, content: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            url: url.into(),
            embedding: Vec::new(),
        }
    }
}

/// Search hit with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: RagRecord,
    pub score: f32,
}

/// Errors for RAG operations
#[derive(Debug, Clone)]
pub enum RagError {
    /// A vector does not have the store's dimension.
    DimensionMismatch { expected: usize, actual: usize },
    /// The embedding service failed.
    Embedding(String),
    /// The vector store failed.
    Store(String),
    /// The text generation service failed while answering.
    Generation(String),
}

impl fmt::Display for RagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RagError::DimensionMismatch { expected, actual } => write!(
                f,
                "Embedding dimension mismatch: expected {}, got {}",
                expected, actual
            ),
            RagError::Embedding(msg) => write!(f, "Embedding failed: {}", msg),
            RagError::Store(msg) => write!(f, "Vector store error: {}", msg),
            RagError::Generation(msg) => write!(f, "Answer generation failed: {}", msg),
        }
    }
}

impl Error for RagError {}

/// Keyed storage with similarity search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the record with the same key.
    async fn upsert(&self, record: RagRecord) -> Result<(), RagError>;

    async fn get(&self, key: &str) -> Result<Option<RagRecord>, RagError>;

    /// Up to `top_k` records, most similar first.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, RagError>;
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// In-process store with a fixed vector dimension.
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    records: RwLock<HashMap<String, RagRecord>>,
}

impl InMemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), RagError> {
        if vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, record: RagRecord) -> Result<(), RagError> {
        self.check_dimensions(&record.embedding)?;
        self.records.write().await.insert(record.key.clone(), record);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<RagRecord>, RagError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, RagError> {
        self.check_dimensions(query)?;
        let records = self.records.read().await;
        let mut hits: Vec<ScoredRecord> = records
            .values()
            .map(|record| ScoredRecord {
                score: cosine_similarity(query, &record.embedding),
                record: record.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.key.cmp(&b.record.key))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Embed every record concurrently, then upsert them. Returns the keys in input order.
///
/// Nothing is stored unless every embedding succeeds.
pub async fn ingest(
    records: Vec<RagRecord>,
    embedder: &dyn EmbeddingService,
    store: &dyn VectorStore,
) -> Result<Vec<String>, RagError> {
    let embeddings = try_join_all(records.iter().map(|r| embedder.embed(&r.content)))
        .await
        .map_err(|e| RagError::Embedding(e.to_string()))?;

    let mut keys = Vec::with_capacity(records.len());
    for (mut record, embedding) in records.into_iter().zip(embeddings) {
        record.embedding = embedding;
        keys.push(record.key.clone());
        store.upsert(record).await?;
    }
    log::info!("agentchat::rag::ingest(...): upserted {} records", keys.len());
    Ok(keys)
}

/// Prompt asking for an answer drawn only from `sources`, citing their URLs.
pub fn build_grounded_prompt(question: &str, sources: &[ScoredRecord]) -> String {
    let mut prompt = String::from(
        "<SYSTEM>\n\
         Answer the user's question only with information available in the context.\n\
         If the information is not available in the context, answer that you don't know.\n\
         Cite the source using the URL in brackets like [hello.com]\n\
         <CONTEXT>\n",
    );
    for source in sources {
        prompt.push_str(&format!(
            "CONTENT:{}\nURL:{}\n",
            source.record.content, source.record.url
        ));
    }
    prompt.push_str("<USER>\n");
    prompt.push_str(question);
    prompt
}

/// Grounded answer plus the records it was grounded on.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<ScoredRecord>,
}

/// Question answering over a vector store.
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
    client: Arc<dyn ClientWrapper>,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            embedder,
            store,
            client,
        }
    }

    /// Ingest `records` into this pipeline's store.
    pub async fn ingest(&self, records: Vec<RagRecord>) -> Result<Vec<String>, RagError> {
        ingest(records, self.embedder.as_ref(), self.store.as_ref()).await
    }

    /// Search for the `top_k` closest records to `query`.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredRecord>, RagError> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        self.store.search(&vector, top_k).await
    }

    /// Answer `question` from the `top_k` closest records. With no hits the model still
    /// gets the prompt, with an empty context.
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<RagAnswer, RagError> {
        let sources = self.search(question, top_k).await?;
        if sources.is_empty() {
            log::warn!("agentchat::rag::RagPipeline::answer(...): no context found");
        }
        let prompt = build_grounded_prompt(question, &sources);
        let reply = self
            .client
            .send_message(&[Message::new(Role::User, prompt)], None)
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;
        Ok(RagAnswer {
            answer: reply.content.to_string(),
            sources,
        })
    }
}
