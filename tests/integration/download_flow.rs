use crate::common::{TestContext, payload};
use mockito::Server;
use reel_offline::downloads::{
    DownloadWorker, JobStore, MediaRecordStore,
};
use reel_offline::models::{DownloadId, DownloadOutcome, DownloadStatus, MediaItemId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_single_download_end_to_end() {
    let mut server = Server::new_async().await;
    let body = payload(1_048_576);
    let mock = server
        .mock("GET", "/api/media/c1/download")
        .match_header("authorization", "Bearer kid-token")
        .with_status(200)
        .with_body(body.clone())
        .create_async()
        .await;

    let context = TestContext::new().await;
    context.sign_in(&server.url(), "kid-token").await;

    let outcome = context
        .executor()
        .execute(&DownloadId::new("d1"), &CancellationToken::new())
        .await;
    let expected_path = context.download_root.join("m1.mp4");
    assert_eq!(
        outcome,
        DownloadOutcome::Success {
            file_path: expected_path.clone()
        }
    );
    mock.assert_async().await;

    let job = context
        .jobs
        .get_job(&DownloadId::new("d1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, DownloadStatus::Completed);
    assert_eq!(job.downloaded_bytes, 1_048_576);
    assert_eq!(job.progress, 1.0);
    assert_eq!(
        job.file_path.as_deref(),
        Some(expected_path.to_string_lossy().as_ref())
    );

    let media = context
        .media
        .get_by_id(&MediaItemId::new("m1"))
        .await
        .unwrap()
        .unwrap();
    assert!(media.is_downloaded);
    assert_eq!(media.download_progress, 1.0);
    assert!(media.has_local_file());

    assert_eq!(std::fs::read(&expected_path).unwrap(), body);
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/media/c1/download")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let context = TestContext::new().await;
    context.sign_in(&server.url(), "kid-token").await;

    let outcome = context
        .executor()
        .execute(&DownloadId::new("d1"), &CancellationToken::new())
        .await;
    assert!(matches!(outcome, DownloadOutcome::Failure { .. }));
    mock.assert_async().await;

    let job = context
        .jobs
        .get_job(&DownloadId::new("d1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, DownloadStatus::Failed);
    assert!(job.last_error.unwrap().contains("404"));
    assert_eq!(job.attempt_count, 0);
}

#[tokio::test]
async fn test_signed_out_user_cannot_download() {
    let context = TestContext::new().await;

    let outcome = context
        .executor()
        .execute(&DownloadId::new("d1"), &CancellationToken::new())
        .await;
    assert!(outcome.message().unwrap().contains("not authenticated"));

    let job = context
        .jobs
        .get_job(&DownloadId::new("d1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.attempt_count, 0);
}

#[tokio::test]
async fn test_worker_drains_pending_jobs() {
    let mut server = Server::new_async().await;
    let _first = server
        .mock("GET", "/api/media/c1/download")
        .with_status(200)
        .with_body(payload(64 * 1024))
        .create_async()
        .await;
    let _second = server
        .mock("GET", "/api/media/c2/download")
        .with_status(200)
        .with_body(payload(96 * 1024))
        .create_async()
        .await;

    let context = TestContext::new().await;
    context.seed_item("d2", "m2", "c2", "Bedtime Story").await;
    context.sign_in(&server.url(), "kid-token").await;

    let (worker, worker_task) = DownloadWorker::spawn(Arc::new(context.executor()), &context.config);
    for job in context.jobs.find_by_status(DownloadStatus::Pending).await.unwrap() {
        assert!(worker.enqueue(job.id).await.unwrap());
    }

    timeout(Duration::from_secs(10), worker.wait_until_idle())
        .await
        .expect("downloads did not finish")
        .unwrap();

    let completed = context
        .jobs
        .find_by_status(DownloadStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.len(), 2);
    assert!(context.media.find_downloaded().await.unwrap().len() == 2);

    worker.shutdown().unwrap();
    worker_task.await.unwrap();
}
