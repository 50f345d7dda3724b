#![allow(clippy::disallowed_methods)]

mod common;

use queue_core::{Job, JobResult, JobStatus};
use serde_json::{Value, json};
use std::error::Error;
use std::time::Duration;

use db::{
    DbError,
    repositories::{JobFilter, JobRepository},
};

fn payload_with_resource(resource: &str) -> Value {
    json!({ "resource_id": resource })
}

#[tokio::test]
async fn test_job_create_and_get() -> Result<(), Box<dyn Error>> {
    let repo = JobRepository::new(common::setup_db().await?);

    let mut job = Job::new("reserve_resource", payload_with_resource("hall")).with_timeout(30);
    job.enqueue()?;

    let created = repo.create(&job).await?;
    assert_eq!(created.id, job.id);
    assert_eq!(created.job_type, "reserve_resource");
    assert_eq!(created.timeout_secs, 30);
    assert_eq!(created.payload, payload_with_resource("hall"));
    assert_eq!(created.status.as_str(), "enqueued");

    let loaded = repo.get(job.id).await?;
    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.status, job.status);

    let missing = repo.get(queue_core::JobId::new()).await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_job_status_updates() -> Result<(), Box<dyn Error>> {
    let repo = JobRepository::new(common::setup_db().await?);

    let mut job = Job::new("reserve_resource", payload_with_resource("item-7"));
    job.enqueue()?;
    repo.create(&job).await?;

    job.activate("reserve_resource-worker-1")?;
    let active = repo.update_status(job.id, &job.status).await?;
    assert!(matches!(
        active.status,
        JobStatus::Active { ref worker_id, progress: 0, .. } if worker_id == "reserve_resource-worker-1"
    ));

    job.record_progress(50)?;
    job.complete(JobResult::with_output("reserved", json!({ "remaining": 0 })))?;
    let complete = repo.update_status(job.id, &job.status).await?;
    match complete.status {
        JobStatus::Complete { result, .. } => {
            assert_eq!(result.summary, "reserved");
            assert_eq!(result.output, Some(json!({ "remaining": 0 })));
        }
        other => panic!("expected complete, got {:?}", other),
    }

    let missing = repo
        .update_status(queue_core::JobId::new(), &JobStatus::Created)
        .await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_job_list_and_counts() -> Result<(), Box<dyn Error>> {
    let repo = JobRepository::new(common::setup_db().await?);

    let mut ids = Vec::new();
    for resource in ["a", "b", "c"] {
        let mut job = Job::new("reserve_resource", payload_with_resource(resource));
        job.enqueue()?;
        repo.create(&job).await?;
        ids.push(job.id);
        // Keep creation timestamps in distinct milliseconds
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let mut other = Job::new("email", json!({}));
    other.enqueue()?;
    repo.create(&other).await?;

    // Fail the second reservation
    let mut failed = repo.get(ids[1]).await?;
    failed.activate("w")?;
    failed.fail("not enough capacity available")?;
    repo.update_status(failed.id, &failed.status).await?;

    let all = repo
        .list(JobFilter {
            job_type: Some("reserve_resource".to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(all.iter().map(|j| j.id).collect::<Vec<_>>(), ids);

    let enqueued = repo
        .list(JobFilter {
            job_type: Some("reserve_resource".to_string()),
            state: Some("enqueued".to_string()),
            limit: Some(1),
        })
        .await?;
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].id, ids[0]);

    let counts = repo.count_by_state("reserve_resource").await?;
    assert_eq!(counts.get("enqueued"), Some(&2));
    assert_eq!(counts.get("failed"), Some(&1));
    assert_eq!(counts.get("complete"), None);

    Ok(())
}
