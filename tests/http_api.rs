//! End-to-end tests of the HTTP contract, driven over real sockets.
//!
//! A stub Ollama-compatible server stands in for the real one so the
//! whole pipeline (PDF, chunks, index, chat) runs without external
//! services.

use std::path::Path;
use std::sync::Arc;

use axum::{routing::get, routing::post, Json, Router};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use askpaper::bootstrap::Phase;
use askpaper::config::AppConfig;
use askpaper::server::router::router;
use askpaper::state::AppState;

/// Writes a minimal PDF with one page per entry in `page_texts`.
fn write_pdf(path: &Path, page_texts: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(*text)]),
            Operation::new("ET", vec![]),
        ];
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Deterministic non-zero embedding so probes and searches return rows.
fn embed_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    for (i, b) in text.bytes().enumerate() {
        v[i % 8] += b as f32;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
    v.iter().map(|x| x / norm).collect()
}

/// Serves just enough of the Ollama API for the pipeline.
async fn spawn_fake_ollama() -> String {
    async fn tags() -> Json<Value> {
        Json(json!({ "models": [{ "name": "nomic-embed-text" }, { "name": "mistral" }] }))
    }

    async fn embed(Json(payload): Json<Value>) -> Json<Value> {
        let empty = Vec::new();
        let inputs = payload["input"].as_array().unwrap_or(&empty);
        let embeddings: Vec<Value> = inputs
            .iter()
            .map(|item| json!(embed_vector(item.as_str().unwrap_or_default())))
            .collect();
        Json(json!({ "embeddings": embeddings }))
    }

    // Echoes the message count so tests can see history replay.
    async fn chat(Json(payload): Json<Value>) -> Json<Value> {
        let count = payload["messages"].as_array().map(|m| m.len()).unwrap_or(0);
        Json(json!({
            "message": {
                "role": "assistant",
                "content": format!("Stub answer ({} messages seen)", count)
            }
        }))
    }

    let app = Router::new()
        .route("/api/tags", get(tags))
        .route("/api/embed", post(embed))
        .route("/api/chat", post(chat));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_app(config: AppConfig) -> (String, Arc<AppState>) {
    let state = AppState::new(config);
    let app = router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn test_config(dir: &Path, ollama_url: String) -> AppConfig {
    AppConfig {
        document_path: dir.join("document.pdf"),
        index_dir: dir.join("index"),
        log_dir: dir.join("logs"),
        ollama_url,
        ollama_probe_timeout_secs: 1,
        chunk_size: 120,
        chunk_overlap: 20,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn home_page_serves_the_chat_client() {
    let dir = tempfile::tempdir().unwrap();
    let (base, _state) = spawn_app(test_config(dir.path(), "http://127.0.0.1:9".into())).await;

    let res = reqwest::get(format!("{}/", base)).await.unwrap();
    assert_eq!(res.status(), 200);
    let content_type = res.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    assert!(res.text().await.unwrap().contains("askpaper"));
}

#[tokio::test]
async fn blank_or_missing_message_is_a_400() {
    let dir = tempfile::tempdir().unwrap();
    let (base, _state) = spawn_app(test_config(dir.path(), "http://127.0.0.1:9".into())).await;
    let client = reqwest::Client::new();

    for body in [json!({}), json!({ "message": "   " })] {
        let res = client
            .post(format!("{}/chat", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let payload: Value = res.json().await.unwrap();
        assert_eq!(payload["error"], "No message provided");
    }
}

#[tokio::test]
async fn first_request_starts_the_build_and_gets_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let ollama = spawn_fake_ollama().await;
    write_pdf(
        &dir.path().join("document.pdf"),
        &[
            "Attention lets a model weigh token pairs. It replaced recurrence in modern encoders.",
            "The second page discusses positional encodings and their role in sequence order.",
        ],
    );

    let (base, state) = spawn_app(test_config(dir.path(), ollama)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "What is attention?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    let payload: Value = res.json().await.unwrap();
    assert_eq!(payload["error"], "Chatbot not ready. Please try again.");

    assert_eq!(state.chatbot.settled().await, Phase::Ready);

    // First answered turn: system message plus the question.
    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "What is attention?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let payload: Value = res.json().await.unwrap();
    assert_eq!(payload["response"], "Stub answer (2 messages seen)");

    // Second turn sees the first one replayed into the prompt.
    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "And positional encodings?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let payload: Value = res.json().await.unwrap();
    assert_eq!(payload["response"], "Stub answer (4 messages seen)");

    // The index landed on disk for the next restart.
    assert!(state.config.index_db_path().exists());
}

#[tokio::test]
async fn health_tracks_the_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let ollama = spawn_fake_ollama().await;
    write_pdf(
        &dir.path().join("document.pdf"),
        &["One page of content is enough for this check."],
    );

    let (base, state) = spawn_app(test_config(dir.path(), ollama)).await;

    // Nothing has touched the controller yet.
    let res = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(res.status(), 200);
    let payload: Value = res.json().await.unwrap();
    assert_eq!(payload["status"], "initializing");
    assert_eq!(payload["chatbot"], "not_ready");

    state.chatbot.ensure_started().await;
    assert_eq!(state.chatbot.settled().await, Phase::Ready);

    let res = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(res.status(), 200);
    let payload: Value = res.json().await.unwrap();
    assert_eq!(payload["status"], "healthy");
    assert_eq!(payload["chatbot"], "ready");
}

#[tokio::test]
async fn failed_startup_reports_unhealthy_and_asks_for_restart() {
    let dir = tempfile::tempdir().unwrap();
    // No document.pdf is written, so initialization fails at step one.
    let (base, state) = spawn_app(test_config(dir.path(), "http://127.0.0.1:9".into())).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);

    match state.chatbot.settled().await {
        Phase::Failed(cause) => assert!(cause.contains("document not found")),
        other => panic!("expected Failed, got {:?}", other),
    }

    let res = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(res.status(), 500);
    let payload: Value = res.json().await.unwrap();
    assert_eq!(payload["status"], "unhealthy");
    assert!(payload["error"]
        .as_str()
        .unwrap()
        .contains("document not found"));

    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "hello again" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    let payload: Value = res.json().await.unwrap();
    assert_eq!(
        payload["error"],
        "Chatbot initialization failed. Restart the service to retry."
    );
}

#[tokio::test]
async fn chat_model_failure_maps_to_an_opaque_500() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(
        &dir.path().join("document.pdf"),
        &["Enough text to build an index from one small page."],
    );

    // Embeddings fall back to the local model when Ollama is unreachable,
    // so startup succeeds; chat requests then fail at generation time.
    let (base, state) = spawn_app(test_config(dir.path(), "http://127.0.0.1:9".into())).await;
    let client = reqwest::Client::new();

    state.chatbot.ensure_started().await;
    assert_eq!(state.chatbot.settled().await, Phase::Ready);

    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "Anything in there?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let payload: Value = res.json().await.unwrap();
    assert_eq!(
        payload["error"],
        "An error occurred while processing your request. Please try again."
    );
}
