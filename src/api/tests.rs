use super::*;
use crate::config::{QueryConfig, VectorConfig};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::NewChunk;
use crate::database::vector::DistanceMetric;
use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

const DIM: usize = 8;

struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> crate::Result<Vec<f32>> {
        Ok(self.0.clone())
    }

    async fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Ok(vec![self.0.clone(); texts.len()])
    }
}

struct Fixture {
    _temp_dir: TempDir,
    service: ChunkService,
    project_id: Uuid,
    url_id: Uuid,
}

fn embedding(hot: usize) -> Vec<f32> {
    let mut v = vec![0.0_f32; DIM];
    v[hot % DIM] = 1.0;
    v
}

async fn setup_with_embedder(embedder: Arc<dyn EmbeddingProvider>) -> Fixture {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("Failed to open database");

    let config = VectorConfig {
        dimension: DIM as u32,
        metric: DistanceMetric::Cosine,
        brute_force_threshold: 256,
        candidate_oversample: 4,
        maintenance_interval_secs: 30,
    };
    let store = Arc::new(VectorStore::new(&database, &config));
    let lifecycle = Arc::new(LifecycleCoordinator::new(&database, Arc::clone(&store)));
    let engine = Arc::new(QueryEngine::new(
        Arc::clone(&lifecycle),
        Arc::clone(&store),
        embedder,
        QueryConfig::default(),
    ));

    let project = lifecycle
        .create_project(Uuid::new_v4(), "research")
        .await
        .expect("Failed to create project");
    let url = lifecycle
        .submit(project.project_id, "https://example.com/docs")
        .await
        .expect("Failed to submit URL");

    store
        .put_batch(
            url.url_id,
            project.project_id,
            &[
                NewChunk::new("alpha", embedding(0)),
                NewChunk::new("beta", embedding(1)),
            ],
        )
        .await
        .expect("Failed to put batch");

    Fixture {
        _temp_dir: temp_dir,
        service: ChunkService::new(lifecycle, store, engine),
        project_id: project.project_id,
        url_id: url.url_id,
    }
}

async fn setup() -> Fixture {
    setup_with_embedder(Arc::new(FixedEmbedder(embedding(1)))).await
}

#[tokio::test]
async fn get_chunks_omits_vectors_by_default() {
    let fixture = setup().await;

    let chunks = fixture
        .service
        .get_chunks(fixture.url_id, fixture.project_id, false)
        .await
        .expect("Request failed");

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "alpha");
    assert_eq!(chunks[0].chunk_index, 0);
    assert!(chunks[0].embedding.is_none());

    let serialized = serde_json::to_value(&chunks[0]).expect("Failed to serialize");
    assert!(serialized.get("embedding").is_none());
    assert!(serialized.get("chunk_id").is_some());
}

#[tokio::test]
async fn get_chunks_includes_vectors_on_request() {
    let fixture = setup().await;

    let chunks = fixture
        .service
        .get_chunks(fixture.url_id, fixture.project_id, true)
        .await
        .expect("Request failed");

    assert_eq!(
        chunks[1].embedding.as_deref(),
        Some(embedding(1).as_slice())
    );
}

#[tokio::test]
async fn get_chunks_unknown_pair_is_404() {
    let fixture = setup().await;

    let error = fixture
        .service
        .get_chunks(fixture.url_id, Uuid::new_v4(), false)
        .await
        .expect_err("Expected error");

    assert_eq!(error.status, 404);
    assert_eq!(error.body.code, "URL_NOT_FOUND");
}

#[tokio::test]
async fn query_returns_ranked_results() {
    let fixture = setup().await;

    let response = fixture
        .service
        .query_chunks(
            fixture.url_id,
            fixture.project_id,
            ChunkQueryRequest {
                query: "find beta".to_string(),
                top_k: 2,
            },
        )
        .await
        .expect("Request failed");

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].content, "beta");
    assert!(
        response.results[0].similarity_score >= response.results[1].similarity_score
    );
}

#[tokio::test]
async fn query_validation_errors_are_400_with_constraint() {
    let fixture = setup().await;

    let error = fixture
        .service
        .query_chunks(
            fixture.url_id,
            fixture.project_id,
            ChunkQueryRequest {
                query: "   ".to_string(),
                top_k: 5,
            },
        )
        .await
        .expect_err("Expected error");
    assert_eq!(error.status, 400);
    assert_eq!(error.body.code, "INVALID_QUERY");
    assert!(error.body.message.contains("empty"));

    let error = fixture
        .service
        .query_chunks(
            fixture.url_id,
            fixture.project_id,
            ChunkQueryRequest {
                query: "ok".to_string(),
                top_k: 51,
            },
        )
        .await
        .expect_err("Expected error");
    assert_eq!(error.status, 400);
    assert!(error.body.message.contains("top_k"));
}

#[tokio::test]
async fn embedder_failure_is_500() {
    struct Failing;

    #[async_trait]
    impl EmbeddingProvider for Failing {
        async fn embed(&self, _text: &str) -> crate::Result<Vec<f32>> {
            Err(WebvecError::EmbeddingUnavailable("down".to_string()))
        }

        async fn embed_batch(&self, _texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
            Err(WebvecError::EmbeddingUnavailable("down".to_string()))
        }
    }

    let fixture = setup_with_embedder(Arc::new(Failing)).await;
    let error = fixture
        .service
        .query_chunks(
            fixture.url_id,
            fixture.project_id,
            ChunkQueryRequest {
                query: "ok".to_string(),
                top_k: 5,
            },
        )
        .await
        .expect_err("Expected error");

    assert_eq!(error.status, 500);
    assert_eq!(error.body.code, "CHUNK_PROCESSING_FAILED");
}

#[test]
fn query_request_defaults_top_k() {
    let request: ChunkQueryRequest =
        serde_json::from_value(json!({"query": "hello"})).expect("Failed to deserialize");
    assert_eq!(request.top_k, 5);

    let explicit: ChunkQueryRequest =
        serde_json::from_value(json!({"query": "hello", "top_k": 9}))
            .expect("Failed to deserialize");
    assert_eq!(explicit.top_k, 9);
}

#[test]
fn error_body_serializes_message_and_code() {
    let error = ApiError::from(WebvecError::NotFound("URL abc not found".to_string()));
    let body = serde_json::to_value(&error.body).expect("Failed to serialize");

    assert_eq!(body["code"], "URL_NOT_FOUND");
    assert!(body["message"].as_str().expect("message").contains("abc"));
}

#[test]
fn duplicate_maps_to_409() {
    let error = ApiError::from(WebvecError::Duplicate {
        url_id: Uuid::new_v4(),
        project_id: Uuid::new_v4(),
        last_updated_at: chrono::Utc::now().naive_utc(),
    });
    assert_eq!(error.status, 409);
    assert_eq!(error.body.code, "DUPLICATE_URL");

    let state = ApiError::from(WebvecError::InvalidState("busy".to_string()));
    assert_eq!(state.status, 409);
    assert_eq!(state.body.code, "INVALID_URL_STATUS");
}
