//! Knowledge Retrieval
//!
//! Turns a free-text question into a bounded, deduplicated and ranked
//! context string for an LLM prompt. The pipeline expands the query, fans
//! the variants out to both search backends, scores every snippet against
//! the original query, removes near-duplicates and truncates. When nothing
//! survives it retries with narrower queries before returning an empty
//! context. It never returns an error.

mod context;
mod dedup;
mod expander;
mod scoring;

pub use context::{
    ConversationItem, ConversationMemory, DynamicContext, DynamicContextBuilder, PromptAdditions,
    TopicMetadata, UserProgressSnapshot,
};
pub use dedup::{Deduplicator, normalized_prefix};
pub use expander::QueryExpander;
pub use scoring::RelevanceScorer;

use crate::intent::extract_keywords;
use crate::search::{SearchBackend, SearchHit};
use futures::future::join_all;
use std::{cmp::Ordering, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

const KNOWLEDGE_SORT: &str = "created_at:desc";
const MAX_CONCEPT_FALLBACKS: usize = 2;
const DEFAULT_SOURCE_LABEL: &str = "Aisystant materials";

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub guides_limit: usize,
    pub knowledge_limit: usize,
    pub max_results: usize,
    pub max_snippet_chars: usize,
    pub min_snippet_chars: usize,
    pub min_relevance_score: f64,
    pub similarity_threshold: f64,
    pub max_expansions: usize,
    pub backend_timeout: Duration,
    pub enable_fallback: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            guides_limit: 5,
            knowledge_limit: 5,
            max_results: 5,
            max_snippet_chars: 1500,
            min_snippet_chars: 30,
            min_relevance_score: 0.0,
            similarity_threshold: 0.6,
            max_expansions: 2,
            backend_timeout: Duration::from_secs(8),
            enable_fallback: true,
        }
    }
}

/// Which backend a snippet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Guides,
    Knowledge,
}

impl SourceKind {
    /// Knowledge-feed results win ties.
    fn priority(&self) -> u8 {
        match self {
            SourceKind::Knowledge => 1,
            SourceKind::Guides => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSnippet {
    pub text: String,
    pub source: String,
    pub kind: SourceKind,
    pub score: f64,
    pub created_at: Option<String>,
}

/// Final ranking: score, then backend priority, then recency.
pub(crate) fn rank_order(a: &ScoredSnippet, b: &ScoredSnippet) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.kind.priority().cmp(&a.kind.priority()))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// What the caller knows beyond the query text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    /// Search keywords; derived from the query when empty.
    pub keywords: &'a [String],
    pub context_topic: Option<&'a str>,
    pub dynamic: Option<&'a DynamicContext>,
}

impl<'a> RetrievalRequest<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutput {
    pub context: String,
    pub sources: Vec<String>,
    pub snippets: Vec<ScoredSnippet>,
}

impl RetrievalOutput {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

pub struct RetrievalEngine {
    guides: Option<Arc<dyn SearchBackend>>,
    knowledge: Option<Arc<dyn SearchBackend>>,
    config: RetrievalConfig,
    expander: QueryExpander,
    scorer: RelevanceScorer,
    dedup: Deduplicator,
}

impl RetrievalEngine {
    /// A missing backend simply contributes nothing.
    pub fn new(
        guides: Option<Arc<dyn SearchBackend>>,
        knowledge: Option<Arc<dyn SearchBackend>>,
        config: RetrievalConfig,
    ) -> Self {
        let expander = QueryExpander::default();
        Self {
            guides,
            knowledge,
            scorer: RelevanceScorer::new(expander.clone()),
            dedup: Deduplicator::new(config.similarity_threshold),
            expander,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn search(&self, request: RetrievalRequest<'_>) -> RetrievalOutput {
        let query = request.query.trim();
        if query.is_empty() {
            return RetrievalOutput::default();
        }

        let keywords = if request.keywords.is_empty() {
            extract_keywords(query)
        } else {
            request.keywords.to_vec()
        };
        let boost_terms = request
            .dynamic
            .map(DynamicContext::boost_terms)
            .unwrap_or_default();

        let mut base_query = match request.context_topic {
            Some(topic) if !topic.trim().is_empty() => format!("{topic} {query}"),
            _ => query.to_string(),
        };
        let search_query = if boost_terms.is_empty() {
            base_query.clone()
        } else {
            format!("{base_query} {}", boost_terms[..boost_terms.len().min(3)].join(" "))
        };
        info!(query = %truncate_chars(query, 80), boost_terms = boost_terms.len(), "Retrieval started");

        let mut tried = self.expander.expand(&search_query, self.config.max_expansions);
        debug!(variants = tried.len(), "Query variants");
        let mut snippets = self
            .rank(self.dispatch(&tried).await, &base_query, &keywords, &boost_terms);

        if snippets.is_empty() && self.config.enable_fallback {
            // The unexpanded query on its own.
            if !tried.iter().any(|q| q == query) {
                info!("No results, retrying with the unexpanded query");
                tried.push(query.to_string());
                base_query = query.to_string();
                let hits = self.dispatch(&[query.to_string()]).await;
                snippets = self.rank(hits, &base_query, &keywords, &boost_terms);
            }
        }

        if snippets.is_empty() && self.config.enable_fallback {
            let mut fallbacks = self.expander.fallback_queries(query, &tried);
            fallbacks.truncate(MAX_CONCEPT_FALLBACKS);
            if !fallbacks.is_empty() {
                info!(queries = ?fallbacks, "No results, retrying with concept queries");
                let hits = self.dispatch(&fallbacks).await;
                snippets = self.rank(hits, query, &keywords, &boost_terms);
            }
        }

        let (context, sources) = format_results(&snippets);
        info!(
            results = snippets.len(),
            context_chars = context.chars().count(),
            "Retrieval finished"
        );
        RetrievalOutput {
            context,
            sources,
            snippets,
        }
    }

    /// Scores, filters, deduplicates and truncates raw snippets.
    fn rank(
        &self,
        raw: Vec<ScoredSnippet>,
        query: &str,
        keywords: &[String],
        boost_terms: &[String],
    ) -> Vec<ScoredSnippet> {
        let total = raw.len();
        let scored: Vec<ScoredSnippet> = raw
            .into_iter()
            .map(|mut s| {
                s.score = self.scorer.score(&s.text, query, keywords, boost_terms);
                s
            })
            .filter(|s| s.score >= self.config.min_relevance_score)
            .collect();
        if scored.len() < total {
            debug!(dropped = total - scored.len(), "Low-relevance snippets dropped");
        }

        let mut unique = self.dedup.deduplicate(scored);
        unique.truncate(self.config.max_results);
        unique
    }

    /// Runs every query against both backends concurrently.
    async fn dispatch(&self, queries: &[String]) -> Vec<ScoredSnippet> {
        join_all(queries.iter().map(|q| self.search_both(q)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn search_both(&self, query: &str) -> Vec<ScoredSnippet> {
        let (guides, knowledge) = tokio::join!(
            self.query_backend(self.guides.as_deref(), query, self.config.guides_limit, None),
            self.query_backend(
                self.knowledge.as_deref(),
                query,
                self.config.knowledge_limit,
                Some(KNOWLEDGE_SORT),
            ),
        );

        guides
            .into_iter()
            .filter_map(|hit| self.to_snippet(hit, SourceKind::Guides))
            .chain(
                knowledge
                    .into_iter()
                    .filter_map(|hit| self.to_snippet(hit, SourceKind::Knowledge)),
            )
            .collect()
    }

    /// One bounded backend call; timeouts and errors yield nothing.
    async fn query_backend(
        &self,
        backend: Option<&dyn SearchBackend>,
        query: &str,
        limit: usize,
        sort_hint: Option<&str>,
    ) -> Vec<SearchHit> {
        let Some(backend) = backend else {
            return Vec::new();
        };
        match tokio::time::timeout(
            self.config.backend_timeout,
            backend.search(query, limit, sort_hint),
        )
        .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(backend = backend.name(), query, error = ?e, "Search backend failed");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    query,
                    timeout_ms = self.config.backend_timeout.as_millis() as u64,
                    "Search backend timed out"
                );
                Vec::new()
            }
        }
    }

    fn to_snippet(&self, hit: SearchHit, kind: SourceKind) -> Option<ScoredSnippet> {
        let text = hit.text.trim();
        if text.chars().count() < self.config.min_snippet_chars {
            return None;
        }
        let source = hit
            .source
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                let head: String = text.chars().take(50).collect();
                head.split('.')
                    .next()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_SOURCE_LABEL.to_string());

        Some(ScoredSnippet {
            text: truncate_chars(text, self.config.max_snippet_chars),
            source,
            kind,
            score: 0.0,
            created_at: hit.created_at,
        })
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Renders snippets as prompt context, knowledge feed first, plus citations.
fn format_results(snippets: &[ScoredSnippet]) -> (String, Vec<String>) {
    if snippets.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut parts: Vec<String> = Vec::new();
    let mut sources: Vec<String> = Vec::new();
    let mut cite = |label: String| {
        if !sources.contains(&label) {
            sources.push(label);
        }
    };

    let knowledge: Vec<&ScoredSnippet> =
        snippets.iter().filter(|s| s.kind == SourceKind::Knowledge).collect();
    let guides: Vec<&ScoredSnippet> =
        snippets.iter().filter(|s| s.kind == SourceKind::Guides).collect();

    if !knowledge.is_empty() {
        parts.push("RECENT MATERIALS:".to_string());
        for s in &knowledge {
            match &s.created_at {
                Some(date) => parts.push(format!("[{date}] {}", s.text)),
                None => parts.push(s.text.clone()),
            }
            cite(format!("Knowledge base: {}", s.source));
        }
    }
    if !guides.is_empty() {
        if !knowledge.is_empty() {
            parts.push("---".to_string());
        }
        parts.push("FROM THE GUIDES:".to_string());
        for s in &guides {
            parts.push(s.text.clone());
            cite(format!("Guide: {}", s.source));
        }
    }

    (parts.join("\n\n"), sources)
}
