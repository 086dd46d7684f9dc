//! The question-answering engine.
//!
//! Ties retrieval, generation, and memory together. Per question:
//! validate → attempt retrieval against the vector index → generate from
//! retrieved passages, or fall back to direct generation when no index is
//! configured, nothing relevant is found, or the retrieve attempt fails.
//!
//! `answer_question` never returns an error: every failure mode produces
//! a structured [`AnswerResult`]. Memory is updated exactly once per
//! answered question, and never for rejected empty input.

use tracing::{debug, warn};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::create_embedder;
use crate::generation::{create_generator, Generator};
use crate::index::VectorIndex;
use crate::memory::ConversationMemory;
use crate::models::{AnswerResult, ConversationTurn};

const EMPTY_QUESTION_ANSWER: &str = "I received an empty question. Please provide some text.";

pub struct QaEngine {
    index: Option<VectorIndex>,
    generator: Box<dyn Generator>,
    memory: ConversationMemory,
    retrieval: RetrievalConfig,
}

impl QaEngine {
    pub fn new(
        index: Option<VectorIndex>,
        generator: Box<dyn Generator>,
        memory: ConversationMemory,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            generator,
            memory,
            retrieval,
        }
    }

    /// Build an engine from configuration: open (or create) the index,
    /// construct the providers, load the memory log.
    pub async fn from_config(config: &Config) -> crate::error::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let index = VectorIndex::open(
            &config.db.path,
            embedder,
            config.embedding.batch_size,
        )
        .await?;
        let generator = create_generator(&config.generation)?;
        let memory = ConversationMemory::load(&config.memory.path);
        Ok(Self::new(
            Some(index),
            generator,
            memory,
            config.retrieval.clone(),
        ))
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer a question, from the knowledge base when possible.
    pub async fn answer_question(&mut self, question: &str) -> AnswerResult {
        let question = question.trim();
        if question.is_empty() {
            return AnswerResult {
                answer: EMPTY_QUESTION_ANSWER.to_string(),
                sources: Vec::new(),
                from_knowledge_base: false,
            };
        }

        if let Some(answer) = self.try_knowledge_base(question).await {
            return answer;
        }
        self.answer_direct(question).await
    }

    /// Drop all conversation turns and persist the empty log.
    pub fn clear_memory(&mut self) -> crate::error::Result<()> {
        self.memory.clear()
    }

    /// The retrieve attempt. `None` means "fall back to direct": no index,
    /// an empty index, nothing above the similarity threshold, or a failure
    /// anywhere in the attempt.
    async fn try_knowledge_base(&mut self, question: &str) -> Option<AnswerResult> {
        let index = self.index.as_ref()?;

        match index.is_empty().await {
            Ok(true) => {
                debug!("vector index has no entries, answering directly");
                return None;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "could not inspect vector index, answering directly");
                return None;
            }
        }

        let hits = match index
            .search_with_threshold(
                question,
                self.retrieval.top_k,
                self.retrieval.score_threshold,
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering directly");
                return None;
            }
        };

        if hits.is_empty() {
            debug!("no chunks above the similarity threshold, answering directly");
            return None;
        }

        let passages: Vec<String> = hits.into_iter().map(|h| h.text).collect();
        let turns = self.context_turns(question);

        match self.generator.generate(&turns, &passages).await {
            Ok(answer) => {
                self.record_turn(question, &answer);
                Some(AnswerResult {
                    answer,
                    sources: passages,
                    from_knowledge_base: true,
                })
            }
            Err(e) => {
                warn!(error = %e, "grounded generation failed, answering directly");
                None
            }
        }
    }

    async fn answer_direct(&mut self, question: &str) -> AnswerResult {
        let turns = self.context_turns(question);

        match self.generator.generate(&turns, &[]).await {
            Ok(answer) => {
                self.record_turn(question, &answer);
                AnswerResult {
                    answer,
                    sources: Vec::new(),
                    from_knowledge_base: false,
                }
            }
            Err(e) => AnswerResult {
                answer: format!("I'm sorry, I encountered an error: {}", e),
                sources: Vec::new(),
                from_knowledge_base: false,
            },
        }
    }

    /// Bounded context window: the most recent valid turns plus the current
    /// question as the final entry.
    fn context_turns(&self, question: &str) -> Vec<ConversationTurn> {
        let mut turns = self.memory.recent(self.retrieval.history_turns);
        turns.push(ConversationTurn::user(question));
        turns
    }

    /// A failed memory save must not cost the caller an already-computed
    /// answer; it is reported as a warning instead.
    fn record_turn(&mut self, question: &str, answer: &str) {
        if let Err(e) = self.memory.append(question, answer) {
            warn!(error = %e, "could not persist conversation memory");
        }
    }
}
