//! HTTP surface for the document QA server.
//!
//! - `GET /` – Single-page upload and query UI.
//! - `POST /upload` – Multipart form with a `file` field holding one markdown document. The
//!   document replaces whatever was indexed before.
//! - `POST /query` – `{ "query": "..." }`; returns the answer and its source snippets.
//! - `GET /health` – Liveness probe.
//! - `GET /metrics` – Pipeline counters, the loaded document, and Qdrant reachability.
//! - `GET /commands` – Machine-readable command catalog.

use crate::processing::{
    PipelineError, QueryAnswer, RagApi, SourceSnippet, UploadError,
    upload::{decode_markdown, validate_upload},
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Build the HTTP router.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/", get(index_page))
        .route(
            "/upload",
            // Size is enforced while streaming the file field.
            post(upload_document::<S>).layer(DefaultBodyLimit::disable()),
        )
        .route("/query", post(query_document::<S>))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: &'static str,
    filename: String,
}

/// Validate, decode and index an uploaded markdown file.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: RagApi,
{
    let (filename, bytes) = read_file_field(&mut multipart, service.max_upload_bytes()).await?;
    let text = decode_markdown(&bytes)?;
    let outcome = service.ingest_document(&filename, text).await?;
    tracing::info!(
        filename = %filename,
        bytes = bytes.len(),
        chunks = outcome.chunk_count,
        skipped_duplicates = outcome.skipped_duplicates,
        "Upload completed"
    );
    Ok(Json(UploadResponse {
        success: true,
        message: "File processed successfully",
        filename,
    }))
}

/// Pull the `file` field out of the form, stopping as soon as it exceeds `max_bytes`.
async fn read_file_field(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<(String, Vec<u8>), UploadError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|error| UploadError::Malformed(error.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        validate_upload(&filename, 0, max_bytes)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|error| UploadError::Malformed(error.body_text()))?
        {
            bytes.extend_from_slice(&chunk);
            validate_upload(&filename, bytes.len(), max_bytes)?;
        }
        return Ok((filename, bytes));
    }
    Err(UploadError::MissingFile)
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
}

/// Response body for `POST /query`.
#[derive(Serialize)]
struct QueryResponse {
    success: bool,
    answer: String,
    sources: Vec<SourceSnippet>,
    message: String,
}

impl From<QueryAnswer> for QueryResponse {
    fn from(answer: QueryAnswer) -> Self {
        Self {
            success: true,
            answer: answer.answer,
            sources: answer.sources,
            message: String::new(),
        }
    }
}

/// Answer a question against the loaded document.
///
/// Missing document and empty questions are client errors; provider failures come back as a
/// `success: false` body so the page can show the message inline.
async fn query_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: RagApi,
{
    match service.answer_query(&request.query).await {
        Ok(answer) => {
            tracing::info!(sources = answer.sources.len(), "Query answered");
            Ok(Json(answer.into()))
        }
        Err(error) if error.is_client_error() => Err(AppError::bad_request(&error)),
        Err(error) => {
            tracing::error!(error = %error, "Query failed");
            Ok(Json(QueryResponse {
                success: false,
                answer: String::new(),
                sources: Vec::new(),
                message: format!("Query failed: {error}"),
            }))
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Return pipeline counters alongside the loaded document and Qdrant status.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: RagApi,
{
    let snapshot = service.metrics_snapshot();
    let document = service.loaded_document().await;
    let qdrant = service.qdrant_health().await;
    Json(json!({
        "metrics": snapshot,
        "document": document,
        "qdrant": qdrant,
    }))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Multipart upload of one markdown (.md) file under 2MB in the `file` field. Chunks, embeds and indexes it, replacing the previous document.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Answer a question from the uploaded document. Returns { \"answer\", \"sources\": [{ \"content\", \"score\", \"metadata\" }] }.",
                request_example: Some(json!({ "query": "Who is the Mad Hatter?" })),
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Ingestion and query counters, the loaded document and Qdrant reachability.",
                request_example: None,
            },
        ],
    })
}

/// Error body shared by upload and query failures.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(error: &PipelineError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.message,
            "detail": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(error: PipelineError) -> Self {
        if error.is_client_error() {
            Self::bad_request(&error)
        } else {
            tracing::error!(error = %error, "Upload processing failed");
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("Error processing file: {error}"),
            }
        }
    }
}

impl From<UploadError> for AppError {
    fn from(error: UploadError) -> Self {
        PipelineError::from(error).into()
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::embedding::EmbeddingClientError;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        IngestOutcome, LoadedDocument, PipelineError, QdrantHealthSnapshot, QueryAnswer, RagApi,
        SourceSnippet,
    };
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{Map, Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docqa-boundary";

    #[derive(Clone, Copy)]
    enum QueryBehavior {
        Answer,
        NoDocument,
        ProviderDown,
    }

    struct StubRagService {
        uploads: Mutex<Vec<(String, String)>>,
        fail_ingest: bool,
        query: QueryBehavior,
        max_bytes: usize,
    }

    impl StubRagService {
        fn new(query: QueryBehavior) -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                fail_ingest: false,
                query,
                max_bytes: 2 * 1024 * 1024,
            }
        }

        async fn recorded_uploads(&self) -> Vec<(String, String)> {
            self.uploads.lock().await.clone()
        }
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn ingest_document(
            &self,
            filename: &str,
            text: String,
        ) -> Result<IngestOutcome, PipelineError> {
            if self.fail_ingest {
                return Err(EmbeddingClientError::ProviderUnavailable("offline".into()).into());
            }
            self.uploads.lock().await.push((filename.to_string(), text));
            Ok(IngestOutcome {
                filename: filename.to_string(),
                document_count: 1,
                chunk_count: 3,
                skipped_duplicates: 0,
                chunk_size: 1000,
                sample_chunk: None,
            })
        }

        async fn answer_query(&self, query: &str) -> Result<QueryAnswer, PipelineError> {
            match self.query {
                QueryBehavior::NoDocument => Err(PipelineError::NoDocument),
                QueryBehavior::ProviderDown => Err(EmbeddingClientError::ProviderUnavailable(
                    "connection refused".into(),
                )
                .into()),
                QueryBehavior::Answer if query.trim().is_empty() => Err(PipelineError::EmptyQuery),
                QueryBehavior::Answer => {
                    let mut metadata = Map::new();
                    metadata.insert("source".into(), json!("alice.md"));
                    metadata.insert("start_index".into(), json!(0));
                    Ok(QueryAnswer {
                        answer: format!("Answer to: {query}"),
                        sources: vec![SourceSnippet {
                            content: "Alice was beginning to get very tired...".into(),
                            score: 0.88,
                            metadata,
                        }],
                    })
                }
            }
        }

        async fn loaded_document(&self) -> Option<LoadedDocument> {
            None
        }

        async fn qdrant_health(&self) -> QdrantHealthSnapshot {
            QdrantHealthSnapshot {
                reachable: true,
                collection_present: false,
                error: None,
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_indexed: 1,
                chunks_indexed: 3,
                ..MetricsSnapshot::default()
            }
        }

        fn max_upload_bytes(&self) -> usize {
            self.max_bytes
        }
    }

    fn multipart_request(filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/markdown\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn query_request(query: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "query": query }).to_string()))
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[tokio::test]
    async fn commands_catalog_exposes_upload_and_query() {
        let commands = get_commands().await.0.commands;
        let upload = commands
            .iter()
            .find(|cmd| cmd.name == "upload")
            .expect("upload command present");
        assert_eq!(upload.method, "POST");
        assert!(commands.iter().any(|cmd| cmd.path == "/query"));
    }

    #[tokio::test]
    async fn upload_route_indexes_markdown() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Answer));
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request("alice.md", b"# Alice\n\nDown the rabbit hole."))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "File processed successfully");
        assert_eq!(json["filename"], "alice.md");

        let uploads = service.recorded_uploads().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "alice.md");
        assert!(uploads[0].1.starts_with("# Alice"));
    }

    #[tokio::test]
    async fn upload_route_rejects_non_markdown() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Answer));
        let response = create_router(service.clone())
            .oneshot(multipart_request("notes.txt", b"plain"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["detail"], "Only Markdown (.md) files are supported");
        assert!(service.recorded_uploads().await.is_empty());
    }

    #[tokio::test]
    async fn upload_route_rejects_oversized_files() {
        let service = Arc::new(StubRagService {
            max_bytes: 16,
            ..StubRagService::new(QueryBehavior::Answer)
        });
        let response = create_router(service)
            .oneshot(multipart_request("big.md", &[b'a'; 64]))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["message"], "File size must be under 16 bytes");
    }

    #[tokio::test]
    async fn upload_failure_maps_to_server_error() {
        let service = Arc::new(StubRagService {
            fail_ingest: true,
            ..StubRagService::new(QueryBehavior::Answer)
        });
        let response = create_router(service)
            .oneshot(multipart_request("alice.md", b"# Alice"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        let detail = json["detail"].as_str().expect("detail");
        assert!(detail.starts_with("Error processing file: "));
        assert!(detail.contains("offline"));
    }

    #[tokio::test]
    async fn query_route_returns_answer_and_sources() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Answer));
        let response = create_router(service)
            .oneshot(query_request("Who is Alice?"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["answer"], "Answer to: Who is Alice?");
        assert_eq!(json["message"], "");
        assert_eq!(json["sources"][0]["metadata"]["source"], "alice.md");
        assert!((json["sources"][0]["score"].as_f64().expect("score") - 0.88).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_route_requires_a_document() {
        let service = Arc::new(StubRagService::new(QueryBehavior::NoDocument));
        let response = create_router(service)
            .oneshot(query_request("Who is Alice?"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(
            json["detail"],
            "No document uploaded. Please upload a document first."
        );
    }

    #[tokio::test]
    async fn query_route_rejects_blank_questions() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Answer));
        let response = create_router(service)
            .oneshot(query_request("  "))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["detail"], "Query cannot be empty");
    }

    #[tokio::test]
    async fn query_route_reports_provider_failures_inline() {
        let service = Arc::new(StubRagService::new(QueryBehavior::ProviderDown));
        let response = create_router(service)
            .oneshot(query_request("Who is Alice?"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["answer"], "");
        assert_eq!(json["sources"], json!([]));
        let message = json["message"].as_str().expect("message");
        assert!(message.starts_with("Query failed: "));
        assert!(message.contains("connection refused"));
    }

    #[tokio::test]
    async fn health_and_index_page_are_served() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Answer));
        let app = create_router(service);

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(json_body(response).await, json!({ "status": "healthy" }));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let html = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(html.contains("/upload"));
        assert!(html.contains("/query"));
    }

    #[tokio::test]
    async fn metrics_route_reports_counters_and_qdrant() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Answer));
        let response = create_router(service)
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("router response");

        let json = json_body(response).await;
        assert_eq!(json["metrics"]["documents_indexed"], 1);
        assert_eq!(json["metrics"]["chunks_indexed"], 3);
        assert_eq!(json["document"], Value::Null);
        assert_eq!(json["qdrant"]["reachable"], true);
    }
}
