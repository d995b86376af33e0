//! HTTP client wrapper for interacting with Qdrant.

use crate::config::get_config;
use crate::qdrant::{
    payload::{build_payload, current_timestamp_rfc3339, generate_chunk_id},
    types::{
        CountResponse, IndexSummary, ListCollectionsResponse, PointInsert, QdrantError,
        QueryResponse, QueryResponseResult, ScoredPoint,
    },
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

const UPSERT_BATCH_SIZE: usize = 256;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docqa/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Construct a client using the global configuration.
    pub fn from_config() -> Result<Self, QdrantError> {
        let config = get_config();
        Self::new(&config.qdrant_url, config.qdrant_api_key.clone())
    }

    /// Report whether a collection exists.
    pub async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    /// Create a collection with the specified vector size and cosine distance.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, vector_size, "Collection created");
        })
        .await
    }

    /// Delete a collection; a missing collection is not an error.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<(), QdrantError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(collection = collection_name, "Collection already absent");
            return Ok(());
        }

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection deleted");
        })
        .await
    }

    /// Drop any existing collection of that name and create an empty one.
    pub async fn recreate_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            tracing::info!(collection = collection_name, "Clearing existing collection");
            self.delete_collection(collection_name).await?;
        }
        self.create_collection(collection_name, vector_size).await
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections").send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            Ok(payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    /// Count the points stored in a collection.
    pub async fn count_points(&self, collection_name: &str) -> Result<u64, QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/count"),
            )
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QdrantError::UnexpectedStatus { status, body });
        }

        let payload: CountResponse = response.json().await?;
        Ok(payload.result.count)
    }

    /// Upload vectors to the given collection, waiting for Qdrant to apply them.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<PointInsert>,
    ) -> Result<IndexSummary, QdrantError> {
        if points.is_empty() {
            return Ok(IndexSummary::default());
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<Value> = points
            .into_iter()
            .map(|point| {
                let chunk_id = generate_chunk_id();
                let payload = build_payload(
                    &chunk_id,
                    &point.text,
                    &point.source,
                    point.start_index,
                    &now,
                    &point.chunk_hash,
                );
                json!({
                    "id": chunk_id,
                    "vector": point.vector,
                    "payload": payload,
                })
            })
            .collect();

        let mut inserted = 0;
        for batch in serialized.chunks(UPSERT_BATCH_SIZE) {
            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{collection_name}/points"),
                )
                .query(&[("wait", true)])
                .json(&json!({ "points": batch }))
                .send()
                .await?;

            self.ensure_success(response, || {
                tracing::debug!(
                    collection = collection_name,
                    points = batch.len(),
                    "Points indexed"
                );
            })
            .await?;
            inserted += batch.len();
        }

        Ok(IndexSummary { inserted })
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        limit: usize,
        with_vector: bool,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
            "with_vector": with_vector,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
                vector: point.vector.and_then(parse_vector),
            })
            .collect())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Accept both the unnamed (`[..]`) and single-named (`{"name": [..]}`) vector layouts.
fn parse_vector(value: Value) -> Option<Vec<f32>> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|value| value.as_f64().map(|number| number as f32))
            .collect(),
        Value::Object(map) => map.into_iter().next().and_then(|(_, inner)| parse_vector(inner)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };

    fn service_for(server: &MockServer) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("docqa-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn search_points_emits_expected_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .json_body_partial(r#"{ "limit": 3, "with_payload": true }"#);
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "chunk-1",
                                "score": 0.82,
                                "payload": { "text": "Example", "source": "alice.md" },
                                "vector": [0.1, 0.2]
                            }
                        ]
                    }
                }));
            })
            .await;

        let results = service_for(&server)
            .search_points("demo", vec![0.1, 0.2], 3, true)
            .await
            .expect("search request");

        mock.assert_async().await;
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.id, "chunk-1");
        assert!((hit.score - 0.82).abs() < f32::EPSILON);
        assert_eq!(hit.vector.as_deref(), Some(&[0.1_f32, 0.2][..]));
        let payload = hit.payload.as_ref().expect("payload");
        assert_eq!(payload["source"], Value::String("alice.md".into()));
    }

    #[tokio::test]
    async fn recreate_collection_deletes_before_create() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/docs");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs")
                    .json_body(json!({ "vectors": { "size": 8, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        service_for(&server)
            .recreate_collection("docs", 8)
            .await
            .expect("recreate");

        exists.assert_async().await;
        delete.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn upsert_points_reports_inserted_count() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let points = vec![PointInsert {
            text: "chunk".into(),
            chunk_hash: crate::qdrant::compute_chunk_hash("chunk"),
            source: "doc.md".into(),
            start_index: 0,
            vector: vec![0.5, 0.5],
        }];
        let summary = service_for(&server)
            .upsert_points("docs", points)
            .await
            .expect("upsert");

        mock.assert_async().await;
        assert_eq!(summary.inserted, 1);
    }

    #[tokio::test]
    async fn count_points_reads_result() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/count");
                then.status(200).json_body(json!({ "result": { "count": 42 } }));
            })
            .await;

        let count = service_for(&server).count_points("docs").await.expect("count");
        assert_eq!(count, 42);
    }

    #[tokio::test]
    async fn unexpected_status_carries_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(503).body("unavailable");
            })
            .await;

        let error = service_for(&server).list_collections().await.unwrap_err();
        assert!(matches!(
            error,
            QdrantError::UnexpectedStatus { status, ref body }
                if status == StatusCode::SERVICE_UNAVAILABLE && body == "unavailable"
        ));
    }

    #[test]
    fn named_vectors_are_flattened() {
        let parsed = parse_vector(json!({ "default": [1.0, 2.0] }));
        assert_eq!(parsed, Some(vec![1.0, 2.0]));
        assert_eq!(parse_vector(json!("nope")), None);
    }
}
