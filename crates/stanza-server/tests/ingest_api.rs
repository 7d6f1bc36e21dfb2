//! End-to-end ingestion tests
//!
//! Drive the real router against a mock content store and mail API: submit
//! a batch over HTTP, drain the queue, then assert on what reached the
//! store and what the report said.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stanza_server::api::build_app;
use stanza_server::config::{CmsConfig, Config, IngestConfig, ReportConfig, ServerConfig};

fn test_config(store_url: &str, mail_url: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_timeout_secs: 5,
        },
        cms: CmsConfig {
            base_url: store_url.to_string(),
            token: None,
            api_version: "2022-03-13".to_string(),
            dataset: "production".to_string(),
        },
        ingest: IngestConfig {
            job_attempts: 3,
            job_backoff_ms: 1,
            row_delay_ms: 0,
            image_fetch_timeout_secs: 5,
        },
        report: ReportConfig {
            api_base_url: mail_url.to_string(),
            api_key: Some("sg-test-key".to_string()),
            to: vec!["ops@example.com".to_string()],
            from_email: "noreply@example.com".to_string(),
            from_name: "Stanza".to_string(),
        },
    }
}

fn row(slug: &str, title: &str, image_url: &str) -> serde_json::Value {
    json!({
        "Body": "<p>Some <strong>content</strong></p>",
        "Meta": "Row description",
        "Title": title,
        "Author": "Jane Author",
        "Language": "English",
        "Category": "News",
        "URL Slug": slug,
        "Image - Assets": image_url,
    })
}

fn post_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/add-posts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn mount_store(server: &MockServer, expected_creates: u64) {
    Mock::given(method("GET"))
        .and(path("/v2022-03-13/data/query/staging"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "_id": "entity-1" }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cover.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 32]))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2022-03-13/assets/images/staging"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document": { "_id": "image-1" }
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2022-03-13/data/mutate/staging"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "post-1" }]
        })))
        .expect(expected_creates)
        .mount(server)
        .await;
}

/// Wait until the mail API has received the batch report.
async fn report_request(mail: &MockServer) -> serde_json::Value {
    for _ in 0..200 {
        let requests = mail.received_requests().await.unwrap_or_default();
        if let Some(request) = requests.first() {
            return serde_json::from_slice(&request.body).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("report was never delivered");
}

#[tokio::test]
async fn test_mixed_batch_creates_valid_rows_and_reports_the_rest() {
    let store = MockServer::start().await;
    let mail = MockServer::start().await;
    mount_store(&store, 2).await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mail)
        .await;

    let app = build_app(&test_config(&store.uri(), &mail.uri())).unwrap();

    let mut invalid = row("no-title", "", &format!("{}/cover.png", store.uri()));
    invalid["Title"] = json!("");
    let body = json!({
        "dataset": "staging",
        "data": [
            row("first-post", "First", &format!("{}/cover.png", store.uri())),
            invalid,
            row("second-post", "Second", &format!("{}/cover.png", store.uri())),
        ],
    });

    let response = app.router.clone().oneshot(post_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let ack: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(ack["message"], "Success");

    // Drain the worker so the create expectations are checkable.
    app.queue.shutdown().await;

    let report = report_request(&mail).await;
    assert_eq!(report["subject"], "Add Posts via CSV Report");

    let encoded = report["attachments"][0]["content"].as_str().unwrap();
    let csv_text = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();
    assert!(csv_text.contains("no-title"));
    assert!(csv_text.contains("Validation Error"));
    assert!(!csv_text.contains("first-post"));
}

#[tokio::test]
async fn test_raw_csv_body_is_parsed_and_ingested() {
    let store = MockServer::start().await;
    let mail = MockServer::start().await;
    mount_store(&store, 1).await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&mail)
        .await;

    let app = build_app(&test_config(&store.uri(), &mail.uri())).unwrap();

    let csv_text = format!(
        "Title,Body,Meta,Author,Language,Category,URL Slug,Image - Assets\n\
         Hello,<p>hi</p>,desc,Jane Author,English,News,hello-post,{}/cover.png\n",
        store.uri()
    );
    let body = json!({ "csv": csv_text, "dataset": "staging" });

    let response = app.router.clone().oneshot(post_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    app.queue.shutdown().await;

    // The created document carries the mapped fields.
    let creates = store
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/v2022-03-13/data/mutate/staging")
        .collect::<Vec<_>>();
    assert_eq!(creates.len(), 1);

    let mutation: serde_json::Value = serde_json::from_slice(&creates[0].body).unwrap();
    let document = &mutation["mutations"][0]["create"];
    assert_eq!(document["_type"], "post");
    assert_eq!(document["title"], "Hello");
    assert_eq!(document["slug"]["current"], "hello-post");
    assert_eq!(document["author"]["_ref"], "entity-1");
    assert_eq!(document["coverImage"]["asset"]["_ref"], "image-1");
}

#[tokio::test]
async fn test_malformed_csv_rejects_the_whole_batch() {
    let store = MockServer::start().await;
    let mail = MockServer::start().await;

    let app = build_app(&test_config(&store.uri(), &mail.uri())).unwrap();

    let body = json!({
        "csv": "Title,Body\n\"unterminated,\n",
        "dataset": "staging",
    });

    let response = app.router.clone().oneshot(post_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was dispatched.
    app.queue.shutdown().await;
    assert!(store.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_store_is_retried_per_policy() {
    let store = MockServer::start().await;
    let mail = MockServer::start().await;

    // The first store call of every attempt fails, so the query count is
    // exactly the attempt limit.
    Mock::given(method("GET"))
        .and(path("/v2022-03-13/data/query/staging"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&mail)
        .await;

    let app = build_app(&test_config(&store.uri(), &mail.uri())).unwrap();

    let body = json!({
        "dataset": "staging",
        "data": [row("retried-post", "Title", &format!("{}/cover.png", store.uri()))],
    });

    let response = app.router.clone().oneshot(post_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    app.queue.shutdown().await;
}
