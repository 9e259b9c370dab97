use anyhow::Result;
use axum::{
    body::{Body, Bytes},
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use comicrag::storage::VectorIndex;
use comicrag::web::create_router;

use crate::helpers::fixtures::{comic_zip, png_bytes};
use crate::helpers::test_harness::TestHarness;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, body)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(uri: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/zip")
        .body(Body::from(bytes))
        .unwrap()
}

#[tokio::test]
async fn test_upload_process_and_browse() -> Result<()> {
    let harness = TestHarness::new();
    let pool = harness.start_workers();
    let app = create_router(harness.app_state());

    let zip = comic_zip(&["Saga/ch1/1.png", "Saga/ch1/2.png", "Saga/ch2/1.png"]);
    let (status, _, body) = send(&app, upload("/api/comics?filename=saga.zip", zip)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = serde_json::from_slice::<Value>(&body)?["task_id"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(task_id.ends_with("-saga.zip"));
    harness.wait_finished(&task_id).await?;

    let (status, tasks) = get_json(&app, "/api/processing-status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tasks[0]["task_id"], json!(task_id));
    assert_eq!(tasks[0]["filename"], json!("saga.zip"));
    assert_eq!(tasks[0]["status"], json!("Completed"));
    assert_eq!(tasks[0]["progress"], json!(100.0));

    let (_, comics) = get_json(&app, "/api/comics").await;
    assert_eq!(comics[0]["name"], json!("Saga"));
    assert_eq!(comics[0]["chapters"], json!(2));
    let hash = comics[0]["hash"].as_str().unwrap().to_string();

    let (status, details) = get_json(&app, &format!("/api/comics/{}?chapter=ch1", hash)).await;
    assert_eq!(status, StatusCode::OK);
    let ch1 = &details["chapters"][0];
    assert_eq!(ch1["name"], json!("ch1"));
    assert_eq!(ch1["pages"][0]["image"], json!("1.png"));
    assert_eq!(ch1["pages"][0]["description"], json!("description of 1.png"));
    assert_eq!(details["chapters"][1]["pages"], json!([]));

    let request = Request::get(format!("/api/comics/{}/pages/ch1/1.png", hash))
        .body(Body::empty())
        .unwrap();
    let (status, content_type, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert_eq!(body.to_vec(), png_bytes(0));

    let (status, results) = get_json(&app, "/api/search?query=adventure&k=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results[0]["title"], json!("Saga"));
    assert_eq!(results[0]["matched_chapters"].as_array().unwrap().len(), 2);

    let rename = json_request(
        Method::POST,
        &format!("/api/comics/{}/chapters/ch1/rename", hash),
        json!({ "new_name": "ch01" }),
    );
    assert_eq!(send(&app, rename).await.0, StatusCode::OK);
    let clash = json_request(
        Method::POST,
        &format!("/api/comics/{}/chapters/ch01/rename", hash),
        json!({ "new_name": "ch2" }),
    );
    assert_eq!(send(&app, clash).await.0, StatusCode::CONFLICT);

    let delete = Request::delete(format!("/api/comics/{}/chapters/ch2", hash))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, delete).await.0, StatusCode::NO_CONTENT);
    assert_eq!(harness.index.count().await?, 1);

    let patch = json_request(
        Method::PATCH,
        &format!("/api/comics/{}", hash),
        json!({ "name": "Saga Deluxe" }),
    );
    assert_eq!(send(&app, patch).await.0, StatusCode::OK);
    let (_, comics) = get_json(&app, "/api/comics").await;
    assert_eq!(comics[0]["name"], json!("Saga Deluxe"));

    let delete = Request::delete(format!("/api/comics/{}", hash))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, delete).await.0, StatusCode::NO_CONTENT);
    assert_eq!(harness.index.count().await?, 0);

    let (status, error) = get_json(&app, &format!("/api/comics/{}", hash)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"]["code"], json!("NOT_FOUND"));

    pool.shutdown();
    pool.join().await;
    Ok(())
}

#[tokio::test]
async fn test_upload_rejections() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    let (status, _, _) = send(&app, upload("/api/comics?filename=notes.txt", vec![1, 2])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, upload("/api/comics?filename=a.zip", Vec::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) =
        send(&app, upload("/api/comics?filename=broken.zip", b"not a zip".to_vec())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"]["code"], json!("BAD_REQUEST"));

    // Nothing was queued and the rejected file was cleaned up
    assert!(harness.queue.is_empty());
    let leftovers = std::fs::read_dir(&harness.config.library.upload_dir)
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_upload_never_overwrites_a_staged_archive() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    // Claim every task id the upload could get in the next few seconds
    let upload_dir = &harness.config.library.upload_dir;
    std::fs::create_dir_all(upload_dir).unwrap();
    let now = chrono::Utc::now().timestamp();
    for secs in now..now + 5 {
        std::fs::write(upload_dir.join(format!("{}-twin.zip", secs)), b"first").unwrap();
    }

    let zip = comic_zip(&["Twin/1.png"]);
    let (status, _, body) = send(&app, upload("/api/comics?filename=twin.zip", zip)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"]["code"], json!("CONFLICT"));

    assert!(harness.queue.is_empty());
    for secs in now..now + 5 {
        let kept = std::fs::read(upload_dir.join(format!("{}-twin.zip", secs))).unwrap();
        assert_eq!(kept, b"first");
    }
}

#[tokio::test]
async fn test_stream_of_unknown_task_closes() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    let request = Request::get("/stream-ai/nope").body(Body::empty()).unwrap();
    let (status, content_type, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/event-stream"));

    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("task nope not found"));
    assert!(text.contains("event: close\ndata: Task finished"));
}

#[tokio::test]
async fn test_unknown_comic_resources() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    let (status, _) = get_json(&app, "/api/comics/deadbeef/cover").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/api/comics/deadbeef/pages/ch1/a%5Cb.png").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, results) = get_json(&app, "/api/search?query=%20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results, json!([]));
}

#[tokio::test]
async fn test_health_and_metrics() {
    let harness = TestHarness::new();
    let app = create_router(harness.app_state());

    let (status, health) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], json!("ok"));

    let request = Request::get("/metrics").body(Body::empty()).unwrap();
    let (status, content_type, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
}
