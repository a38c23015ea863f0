//! Callback-mode delivery: one POST per finished job, in the requested
//! format, with the artifact kept safe when delivery fails.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::{
    bytes_contain, callback_job, drain_queue, test_broker, CaptureServer, ARTIFACT_BYTES,
};
use serde_json::json;
use sqlx::SqlitePool;

use airlock_db::models::{JobStatus, ResultFormat};
use airlock_db::repositories::JobRepo;

const LONG_IDLE: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Test: file-path format
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn file_path_callback_posts_one_json_reference(pool: SqlitePool) {
    let consumer = CaptureServer::start(StatusCode::OK).await;
    let broker = test_broker(pool.clone(), LONG_IDLE);

    let job = JobRepo::enqueue(
        &pool,
        &callback_job(&consumer.url("/hook"), ResultFormat::FilePath),
    )
    .await
    .unwrap();
    drain_queue(&broker, 5).await;

    let requests = consumer.requests().await;
    assert_eq!(requests.len(), 1, "exactly one delivery attempt");
    assert!(requests[0].content_type.starts_with("application/json"));

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let posted_path = body["filePath"].as_str().unwrap();
    assert!(posted_path.ends_with(&format!("{}.mp4", job.id)));

    let job = JobRepo::find_by_id(&pool, &job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_file_path().as_deref(), Some(posted_path));

    // Path references leave the artifact where it is; the consumer reads
    // it from the shared filesystem.
    assert!(std::path::Path::new(posted_path).exists());
}

// ---------------------------------------------------------------------------
// Test: binary format
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn binary_callback_posts_multipart_and_cleans_up(pool: SqlitePool) {
    let consumer = CaptureServer::start(StatusCode::OK).await;
    let broker = test_broker(pool.clone(), LONG_IDLE);

    let job = JobRepo::enqueue(
        &pool,
        &callback_job(&consumer.url("/hook"), ResultFormat::Binary),
    )
    .await
    .unwrap();
    drain_queue(&broker, 5).await;

    let requests = consumer.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].content_type.starts_with("multipart/form-data"));

    let expected_name = format!("filename=\"{}.mp4\"", job.id);
    assert!(bytes_contain(&requests[0].body, expected_name.as_bytes()));
    assert!(bytes_contain(&requests[0].body, b"video/mp4"));
    assert!(bytes_contain(&requests[0].body, ARTIFACT_BYTES));

    // The bytes reached the consumer, so the broker's parked copy is gone.
    let job = JobRepo::find_by_id(&pool, &job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let parked = job.result_file_path().unwrap();
    assert!(!std::path::Path::new(&parked).exists());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn binary_callback_with_destination_is_named_after_it(pool: SqlitePool) {
    let consumer = CaptureServer::start(StatusCode::OK).await;
    let broker = test_broker(pool.clone(), LONG_IDLE);

    let dest = common::artifact_dir().join("out.mp4");
    let mut input = callback_job(&consumer.url("/hook"), ResultFormat::Binary);
    input.destination = Some(dest.display().to_string());
    let job = JobRepo::enqueue(&pool, &input).await.unwrap();

    drain_queue(&broker, 5).await;

    let requests = consumer.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(bytes_contain(&requests[0].body, b"filename=\"out.mp4\""));
    assert!(bytes_contain(&requests[0].body, ARTIFACT_BYTES));

    // A caller-chosen destination is never cleaned up after delivery.
    assert!(dest.exists());
    let job = JobRepo::find_by_id(&pool, &job.id).await.unwrap().unwrap();
    assert_eq!(job.result_file_path().as_deref(), dest.to_str());
}

// ---------------------------------------------------------------------------
// Test: base64 format
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn base64_callback_inlines_the_bytes(pool: SqlitePool) {
    let consumer = CaptureServer::start(StatusCode::OK).await;
    let broker = test_broker(pool.clone(), LONG_IDLE);

    let job = JobRepo::enqueue(
        &pool,
        &callback_job(&consumer.url("/hook"), ResultFormat::Base64),
    )
    .await
    .unwrap();
    drain_queue(&broker, 5).await;

    let requests = consumer.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].content_type.starts_with("application/json"));

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["filename"], format!("{}.mp4", job.id));
    assert_eq!(body["mimeType"], "video/mp4");
    let decoded = STANDARD.decode(body["data"].as_str().unwrap()).unwrap();
    assert_eq!(decoded, ARTIFACT_BYTES);
}

// ---------------------------------------------------------------------------
// Test: failure delivery
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_job_posts_error_body(pool: SqlitePool) {
    let consumer = CaptureServer::start(StatusCode::OK).await;
    let broker = test_broker(pool.clone(), LONG_IDLE);
    broker.engine.fail_process.store(true, Ordering::SeqCst);

    let job = JobRepo::enqueue(
        &pool,
        &callback_job(&consumer.url("/hook"), ResultFormat::Binary),
    )
    .await
    .unwrap();
    drain_queue(&broker, 5).await;

    let requests = consumer.requests().await;
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("synthetic engine failure"));

    let job = JobRepo::find_by_id(&pool, &job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

// ---------------------------------------------------------------------------
// Test: delivery failures never destroy the artifact
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn rejected_post_keeps_artifact_and_is_not_retried(pool: SqlitePool) {
    let consumer = CaptureServer::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let broker = test_broker(pool.clone(), LONG_IDLE);

    let job = JobRepo::enqueue(
        &pool,
        &callback_job(&consumer.url("/hook"), ResultFormat::Binary),
    )
    .await
    .unwrap();
    drain_queue(&broker, 5).await;

    // One attempt, no retries.
    assert_eq!(consumer.requests().await.len(), 1);

    // The job itself still completed and the only copy survives on disk
    // for manual recovery.
    let job = JobRepo::find_by_id(&pool, &job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let parked = job.result_file_path().unwrap();
    assert!(
        std::path::Path::new(&parked).exists(),
        "failed delivery must not delete the artifact",
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unreachable_consumer_does_not_derail_the_job(pool: SqlitePool) {
    let broker = test_broker(pool.clone(), LONG_IDLE);

    // Nothing listens on port 9; the POST fails at the transport level.
    let mut input = callback_job("http://127.0.0.1:9/hook", ResultFormat::FilePath);
    input.payload = json!({ "prompt": "dawn chorus" });
    let job = JobRepo::enqueue(&pool, &input).await.unwrap();

    drain_queue(&broker, 5).await;

    let job = JobRepo::find_by_id(&pool, &job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.result_file_path().is_some());
}
