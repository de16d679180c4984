//! End-to-end tests against a live deployment
//!
//! These tests require:
//! 1. API server running (with a worker pool, embedded or standalone)
//! 2. yt-dlp and ffmpeg on the worker's PATH
//! 3. GROQ_API_KEY configured for the worker
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:8000)

mod fixtures;

use fixtures::*;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ProcessVideoResponse {
    task_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct TaskStatusResponse {
    status: String,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Get base URL from env or default to localhost
fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

async fn submit_video(
    client: &reqwest::Client,
    base_url: &str,
    url: &str,
) -> Result<Uuid, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/process-video", base_url))
        .json(&serde_json::json!({ "url": url }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<ProcessVideoResponse>().await?.task_id)
}

/// Poll task status until completed or failed (with timeout)
async fn poll_task_status(
    client: &reqwest::Client,
    base_url: &str,
    task_id: Uuid,
    timeout_secs: u64,
) -> Result<TaskStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs / 2; // Poll every 2s

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/api/task-status/{}", base_url, task_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let status_response = response.json::<TaskStatusResponse>().await?;

        match status_response.status.as_str() {
            "completed" | "failed" => return Ok(status_response),
            "processing" => {
                if attempt % 15 == 0 && attempt > 0 {
                    println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
                }
                sleep(Duration::from_secs(2)).await;
            }
            other => return Err(format!("Unknown task status: {}", other).into()),
        }
    }

    Err(format!("Task did not finish within {} seconds", timeout_secs).into())
}

#[tokio::test]
#[ignore] // Requires running API server and workers
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );
}

#[tokio::test]
#[ignore]
async fn test_e2e_rejects_invalid_url() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/process-video", base_url))
        .json(&serde_json::json!({ "url": "not a url" }))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
#[ignore]
async fn test_e2e_all_fixtures() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    for fixture in VIDEO_FIXTURES {
        println!("Testing: {} - {}", fixture.url, fixture.description);

        let task_id = submit_video(&client, &base_url, fixture.url)
            .await
            .expect("Failed to submit video");

        let status = poll_task_status(&client, &base_url, task_id, 900)
            .await
            .expect("Failed to wait for task");

        if fixture.should_pass {
            assert_eq!(status.status, "completed", "error: {:?}", status.error);
            let result = status.result.expect("completed task without result");
            assert!(result["caption"].as_str().is_some_and(|c| !c.is_empty()));

            let download = client
                .get(format!("{}/api/download-video?task_id={}", base_url, task_id))
                .send()
                .await
                .expect("Download failed");
            assert!(download.status().is_success());
            assert_eq!(
                download.headers()[reqwest::header::CONTENT_TYPE],
                "video/mp4"
            );
            let bytes = download.bytes().await.expect("Failed to read clip");
            assert!(!bytes.is_empty());
        } else {
            assert_eq!(status.status, "failed");
            assert!(status.error.is_some());
        }
    }
}
