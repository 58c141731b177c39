//! Readiness controller for the answer pipeline.
//!
//! The pipeline is built exactly once per process. `Chatbot` tracks the
//! phases Idle, Starting, Ready and Failed behind one `RwLock`; the flip
//! from Idle to Starting and the spawn of the build task happen under the
//! write lock, so concurrent callers can never start a second build.
//! Ready and Failed are terminal until the process restarts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, RwLock};

use crate::chain::AnswerChain;
use crate::chunker::Chunker;
use crate::config::AppConfig;
use crate::document;
use crate::embeddings;
use crate::errors::InitError;
use crate::index;
use crate::llm::OllamaChat;
use crate::memory::ConversationMemory;

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Ready,
    Failed(String),
}

/// What a request sees after asking for the pipeline.
pub enum Readiness {
    Ready(Arc<AnswerChain>),
    Starting,
    Failed(String),
}

enum State {
    Idle,
    Starting,
    Ready(Arc<AnswerChain>),
    Failed(String),
}

type BuildFuture = Pin<Box<dyn Future<Output = Result<Arc<AnswerChain>, InitError>> + Send>>;
type Builder = Arc<dyn Fn(Arc<AppConfig>) -> BuildFuture + Send + Sync>;

#[derive(Clone)]
pub struct Chatbot {
    inner: Arc<ChatbotInner>,
}

struct ChatbotInner {
    config: Arc<AppConfig>,
    state: RwLock<State>,
    settled: Notify,
    builder: Builder,
}

impl Chatbot {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self::with_builder(
            config,
            Arc::new(|config| -> BuildFuture { Box::pin(build_pipeline(config)) }),
        )
    }

    fn with_builder(config: Arc<AppConfig>, builder: Builder) -> Self {
        Self {
            inner: Arc::new(ChatbotInner {
                config,
                state: RwLock::new(State::Idle),
                settled: Notify::new(),
                builder,
            }),
        }
    }

    /// Reports the current phase and, from `Idle`, kicks off the build.
    ///
    /// Never waits for the build itself. The Idle-to-Starting flip and the
    /// task spawn share one critical section, so exactly one build runs no
    /// matter how many requests race here.
    pub async fn ensure_started(&self) -> Readiness {
        let mut state = self.inner.state.write().await;
        match &*state {
            State::Ready(chain) => Readiness::Ready(chain.clone()),
            State::Starting => Readiness::Starting,
            State::Failed(cause) => Readiness::Failed(cause.clone()),
            State::Idle => {
                *state = State::Starting;
                self.spawn_build();
                Readiness::Starting
            }
        }
    }

    /// Non-blocking phase snapshot.
    pub async fn phase(&self) -> Phase {
        match &*self.inner.state.read().await {
            State::Idle => Phase::Idle,
            State::Starting => Phase::Starting,
            State::Ready(_) => Phase::Ready,
            State::Failed(cause) => Phase::Failed(cause.clone()),
        }
    }

    /// Waits until the build has reached `Ready` or `Failed`.
    ///
    /// A build must have been kicked off first, otherwise this waits
    /// forever on an `Idle` controller.
    pub async fn settled(&self) -> Phase {
        loop {
            // Register before reading the state so a transition between
            // the read and the await still wakes us.
            let notified = self.inner.settled.notified();
            match self.phase().await {
                phase @ (Phase::Ready | Phase::Failed(_)) => return phase,
                Phase::Idle | Phase::Starting => {}
            }
            notified.await;
        }
    }

    fn spawn_build(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_build().await;
        });
    }

    async fn run_build(self) {
        let budget_secs = self.inner.config.init_timeout_secs;
        // The build gets its own task so a panic in any step comes back as
        // a JoinError here instead of unwinding past the state update below
        // and stranding the phase at Starting.
        let mut build = tokio::spawn((self.inner.builder)(self.inner.config.clone()));

        let result = match tokio::time::timeout(Duration::from_secs(budget_secs), &mut build).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(InitError::Panicked(panic_message(join_err))),
            Err(_) => {
                // Aborting cancels the pending async step. The one blocking
                // step, PDF parsing, runs on the blocking pool and is
                // abandoned rather than interrupted.
                build.abort();
                tracing::error!("Initialization timed out after {} seconds", budget_secs);
                Err(InitError::TimedOut(budget_secs))
            }
        };

        let mut state = self.inner.state.write().await;
        match result {
            Ok(chain) => {
                *state = State::Ready(chain);
            }
            Err(err) => {
                tracing::error!("Initialization failed: {}", err);
                *state = State::Failed(err.to_string());
            }
        }
        drop(state);
        self.inner.settled.notify_waiters();
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(msg) = payload.downcast_ref::<&'static str>() {
                (*msg).to_string()
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                msg.clone()
            } else {
                "non-string panic payload".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}

/// Runs the five startup steps in order and assembles the answer chain.
async fn build_pipeline(config: Arc<AppConfig>) -> Result<Arc<AnswerChain>, InitError> {
    let total = Instant::now();
    tracing::info!("=== Starting chatbot initialization ===");

    tracing::info!(
        "Step 1/5: Loading PDF document from {}",
        config.document_path.display()
    );
    let step = Instant::now();
    let document_path = config.document_path.clone();
    let pages = tokio::task::spawn_blocking(move || document::extract_pages(&document_path))
        .await
        .map_err(|err| InitError::PdfParse(format!("page extraction task failed: {}", err)))??;
    let pdf_time = step.elapsed();
    tracing::info!(
        "PDF loaded in {:.2} seconds ({} pages)",
        pdf_time.as_secs_f64(),
        pages.len()
    );
    if let Some(first) = pages.first() {
        let preview: String = first.text.chars().take(100).collect();
        tracing::info!("First page preview: {}", preview.trim());
    }

    tracing::info!("Step 2/5: Splitting {} pages into chunks", pages.len());
    let step = Instant::now();
    let source = config.document_path.to_string_lossy().into_owned();
    let chunks = Chunker::from_config(&config)?.split(&source, &pages)?;
    let chunk_time = step.elapsed();
    tracing::info!(
        "Document split in {:.2} seconds ({} chunks)",
        chunk_time.as_secs_f64(),
        chunks.len()
    );
    if let Some(first) = chunks.first() {
        let preview: String = first.content.chars().take(100).collect();
        tracing::info!("First chunk preview: {}", preview.trim());
    }

    tracing::info!("Step 3/5: Preparing embeddings and vector index");
    let step = Instant::now();
    let backend = embeddings::select_backend(&config).await?;
    let (store, outcome) =
        index::get_or_build(&config.index_db_path(), backend.clone(), &chunks).await?;
    let index_time = step.elapsed();
    tracing::info!(
        "Vector index ready in {:.2} seconds ({:?})",
        index_time.as_secs_f64(),
        outcome
    );

    tracing::info!("Step 4/5: Initializing chat model {}", config.chat_model);
    let step = Instant::now();
    let llm = OllamaChat::new(&config.ollama_url, &config.chat_model);
    let llm_time = step.elapsed();
    tracing::info!(
        "Chat model client ready in {:.2} seconds",
        llm_time.as_secs_f64()
    );

    tracing::info!("Step 5/5: Building answer chain");
    let step = Instant::now();
    let memory = ConversationMemory::new(config.memory_mode, config.max_history_turns);
    let chain = AnswerChain::new(
        Arc::new(llm),
        backend,
        store,
        memory,
        config.retrieval_top_k,
    );
    let chain_time = step.elapsed();

    let total_time = total.elapsed();
    tracing::info!("=== Initialization summary ===");
    tracing::info!("PDF loading:      {:>8.2}s", pdf_time.as_secs_f64());
    tracing::info!("Chunking:         {:>8.2}s", chunk_time.as_secs_f64());
    tracing::info!("Vector index:     {:>8.2}s", index_time.as_secs_f64());
    tracing::info!("Chat model:       {:>8.2}s", llm_time.as_secs_f64());
    tracing::info!("Chain assembly:   {:>8.2}s", chain_time.as_secs_f64());
    tracing::info!("Total:            {:>8.2}s", total_time.as_secs_f64());
    tracing::info!("=== Initialization complete ===");

    Ok(Arc::new(chain))
}
