use std::{env, sync::Once};

use docqa::{config, embedding, processing::RagService};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("QDRANT_COLLECTION_NAME", "docqa-live");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        set_default_env("LLM_PROVIDER", "ollama");
        set_default_env("LLM_MODEL", "llama3.2");
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_health_snapshot() {
    init_config_once();
    let service = RagService::new().expect("service");
    let snapshot = service.qdrant_health().await;
    assert!(
        snapshot.reachable,
        "Qdrant should be reachable: {snapshot:?}"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let client = embedding::get_embedding_client().expect("embedding client");
    let vectors = client
        .generate_embeddings(vec!["docqa live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    let dimension = config::get_config().embedding_dimension;
    assert_eq!(vectors[0].len(), dimension, "embedding dimension mismatch");
}

#[tokio::test]
#[ignore = "Requires live Qdrant, Ollama embeddings and an Ollama chat model"]
async fn live_upload_then_question() {
    init_config_once();
    let service = RagService::new().expect("service");
    let document = "# Alice\n\nAlice followed the White Rabbit down a very deep rabbit hole. \
                    At the bottom she found a hall full of locked doors and a tiny golden key.";
    let outcome = service
        .ingest_document("alice.md", document.to_string())
        .await
        .expect("ingest");
    assert!(outcome.chunk_count >= 1);

    let answer = service
        .answer_query("What did Alice follow down the rabbit hole?")
        .await
        .expect("answer");
    assert!(!answer.answer.trim().is_empty());
}
