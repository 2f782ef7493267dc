//! HTTP surface tests: upload, result lookup and health, over in-memory backends.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use photo_pipeline::{
    app_state::AppState,
    models::job::{Job, JobStatus},
    models::photo::{ResponseError, ResultResponse, UploadResponse},
    routes::{self, health::HealthResponse},
    services::{
        analysis::{AnalysisError, Analyzer},
        job_store::{JobStore, MemoryJobStore},
        photo_service::PhotoService,
        producer::Producer,
        queue::{MemoryQueue, QueueChannel},
        storage::LocalPhotoStorage,
        worker::{ProcessOutcome, Worker, WorkerConfig},
    },
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "photo-pipeline-test-boundary";

/// PNG signature followed by padding; enough for format sniffing.
const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

struct TestApp {
    router: Router,
    store: Arc<MemoryJobStore>,
    queue: Arc<MemoryQueue>,
    photos_dir: TempDir,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let photos_dir = tempfile::tempdir().unwrap();

    let producer = Producer::new(queue.clone(), Duration::from_secs(1));
    let photos = PhotoService::new(store.clone(), producer, Duration::from_secs(1));
    let storage = LocalPhotoStorage::new(photos_dir.path());
    let state = AppState::new(photos, storage, queue.clone());

    TestApp {
        router: routes::api_router(state),
        store,
        queue,
        photos_dir,
    }
}

fn upload_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send<T: DeserializeOwned>(router: &Router, request: Request<Body>) -> (StatusCode, T) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn stored_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0)
}

struct FixedAnalyzer(u32);

#[async_trait]
impl Analyzer for FixedAnalyzer {
    async fn analyze(&self, _resource_path: &str) -> Result<u32, AnalysisError> {
        Ok(self.0)
    }
}

#[tokio::test]
async fn test_upload_creates_pending_job_and_enqueues_it() {
    let app = test_app();

    let (status, body): (_, UploadResponse) =
        send(&app.router, upload_request("photo", "face.png", PNG_BYTES)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.status, JobStatus::Pending);

    let job = app.store.get(&body.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.result_count, 0);
    assert!(job.resource_path.ends_with("-face.png"));
    assert_eq!(std::fs::read(&job.resource_path).unwrap(), PNG_BYTES);

    let delivery = app
        .queue
        .receive(Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.payload, body.id.as_str());
}

#[tokio::test]
async fn test_upload_rejects_non_image() {
    let app = test_app();

    let (status, body): (_, ResponseError) =
        send(&app.router, upload_request("photo", "notes.txt", b"just some text")).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(!body.message.is_empty());
    assert!(app.store.is_empty());
    assert_eq!(app.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_upload_without_photo_field_is_bad_request() {
    let app = test_app();

    let (status, body): (_, ResponseError) =
        send(&app.router, upload_request("avatar", "face.png", PNG_BYTES)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.message.contains("photo"));
}

#[tokio::test]
async fn test_upload_with_store_down_is_unavailable_and_cleans_up() {
    let app = test_app();
    app.store.set_unavailable(true);

    let (status, _): (_, ResponseError) =
        send(&app.router, upload_request("photo", "face.png", PNG_BYTES)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(stored_files(&app.photos_dir), 0);
    assert_eq!(app.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_result_for_unknown_job_is_not_found() {
    let app = test_app();

    let (status, body): (_, ResponseError) = send(&app.router, get_request("/result/123")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.message.contains("123"));
}

#[tokio::test]
async fn test_result_reflects_worker_outcome() {
    let app = test_app();
    let (_, uploaded): (_, UploadResponse) =
        send(&app.router, upload_request("photo", "group.png", PNG_BYTES)).await;

    let (_, pending): (_, ResultResponse) =
        send(&app.router, get_request(&format!("/result/{}", uploaded.id))).await;
    assert_eq!(pending.status, JobStatus::Pending);

    let worker = Worker::new(
        app.store.clone(),
        app.queue.clone(),
        Arc::new(FixedAnalyzer(2)),
        WorkerConfig::default(),
    );
    let delivery = app
        .queue
        .receive(Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(worker.handle(delivery).await, ProcessOutcome::Processed(2));

    let (status, result): (_, ResultResponse) =
        send(&app.router, get_request(&format!("/result/{}", uploaded.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result.status, JobStatus::Processed);
    assert_eq!(result.result_count, 2);

    let (status, job): (_, Job) =
        send(&app.router, get_request(&format!("/photo/{}", uploaded.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job.id, uploaded.id);
    assert_eq!(job.result_count, 2);
}

#[tokio::test]
async fn test_health_reports_degraded_store() {
    let app = test_app();

    let (status, health): (_, HealthResponse) = send(&app.router, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "ok");

    app.store.set_unavailable(true);
    let (status, health): (_, HealthResponse) = send(&app.router, get_request("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health.status, "degraded");
    assert_eq!(health.checks.database.status, "error");
    assert_eq!(health.checks.queue.status, "ok");
}
