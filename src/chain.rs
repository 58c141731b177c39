//! Answer chain.
//!
//! One question in, one answer out: embed the question, pull the closest
//! chunks from the index, fold them into a system message with page
//! citations, replay the session's prior turns, and hand the whole thing
//! to the chat model. Successful turns are appended to memory; failed
//! ones are not.

use std::sync::Arc;
use std::time::Instant;

use crate::embeddings::{embed_one, EmbeddingBackend};
use crate::errors::ChainError;
use crate::index::{ScoredChunk, VectorStore};
use crate::llm::{ChatMessage, ChatModel};
use crate::memory::ConversationMemory;

const SYSTEM_PREAMBLE: &str = "You are an assistant answering questions about a single document.\n\
Answer using only the numbered context excerpts below. Cite excerpts by\n\
their number where it helps. If the context does not contain the answer,\n\
say that the document does not cover it.";

pub struct AnswerChain {
    llm: Arc<dyn ChatModel>,
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn VectorStore>,
    memory: ConversationMemory,
    top_k: usize,
}

impl AnswerChain {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingBackend>,
        index: Arc<dyn VectorStore>,
        memory: ConversationMemory,
        top_k: usize,
    ) -> Self {
        Self {
            llm,
            embedder,
            index,
            memory,
            top_k: top_k.max(1),
        }
    }

    pub async fn answer(
        &self,
        session_id: Option<&str>,
        question: &str,
    ) -> Result<String, ChainError> {
        let started = Instant::now();

        let query_embedding = embed_one(self.embedder.as_ref(), question).await?;
        let hits = self.index.search(&query_embedding, self.top_k).await?;

        let messages = self.build_messages(session_id, question, &hits);
        let answer = self.llm.generate(&messages).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ChainError::EmptyAnswer);
        }

        self.memory.record(session_id, question, answer);
        tracing::info!(
            "Response generated in {:.2} seconds ({} context chunks, model {})",
            started.elapsed().as_secs_f64(),
            hits.len(),
            self.llm.model_id()
        );
        Ok(answer.to_string())
    }

    fn build_messages(
        &self,
        session_id: Option<&str>,
        question: &str,
        hits: &[ScoredChunk],
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(format_system_prompt(hits))];
        for turn in self.memory.history(session_id) {
            messages.push(ChatMessage::user(turn.question));
            messages.push(ChatMessage::assistant(turn.answer));
        }
        messages.push(ChatMessage::user(question));
        messages
    }
}

fn format_system_prompt(hits: &[ScoredChunk]) -> String {
    if hits.is_empty() {
        return format!(
            "{}\n\nNo context excerpts matched this question.",
            SYSTEM_PREAMBLE
        );
    }

    let mut context = String::new();
    for (i, hit) in hits.iter().enumerate() {
        context.push_str(&format!(
            "[{}] (Source: page {}, relevance: {:.2})\n{}\n\n",
            i + 1,
            hit.chunk.page,
            hit.score,
            hit.chunk.content
        ));
    }

    format!("{}\n\nContext:\n{}", SYSTEM_PREAMBLE, context.trim_end())
}
