//! HTTP-level tests for the push/scrape listener.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; no
//! socket is opened.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use pushgate_aggregate::{Aggregate, AggregateOptions, PathLabels};
use pushgate_api::{ApiConfig, api_router};
use pushgate_expfmt::Format;
use tower::ServiceExt;

// =============================================================================
// Helpers
// =============================================================================

fn gateway(options: AggregateOptions) -> (Router, Arc<Aggregate>) {
    let aggregate = Arc::new(Aggregate::new(options));
    let router = api_router(Arc::clone(&aggregate), &ApiConfig::default());
    (router, aggregate)
}

async fn send(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn push(router: &Router, uri: &str, body: &str) -> (StatusCode, String) {
    send(router, Method::POST, uri, body).await
}

async fn scrape(router: &Router, accept: Option<&str>) -> (StatusCode, String, String) {
    let mut request = Request::builder().method(Method::GET).uri("/metrics");
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }
    let response = router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

// =============================================================================
// Push
// =============================================================================

#[tokio::test]
async fn push_to_job_path_accumulates() {
    let (router, _) = gateway(AggregateOptions::default());
    let body = "# TYPE jobs_done counter\njobs_done 5\n";
    assert_eq!(push(&router, "/metrics/job/a", body).await.0, StatusCode::ACCEPTED);
    let body = "# TYPE jobs_done counter\njobs_done 3\n";
    assert_eq!(push(&router, "/metrics/job/a", body).await.0, StatusCode::ACCEPTED);

    let (status, _, text) = scrape(&router, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "# TYPE jobs_done counter\njobs_done{job=\"a\"} 8\n");
}

#[tokio::test]
async fn put_and_bare_metrics_path_are_accepted() {
    let (router, aggregate) = gateway(AggregateOptions::default());
    let (status, _) = send(&router, Method::PUT, "/metrics", "up 1\n").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = send(&router, Method::PUT, "/metrics/job/x", "up 1\n").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(aggregate.families().unwrap()[0].metrics.len(), 2);
}

#[tokio::test]
async fn odd_label_path_is_rejected_and_store_untouched() {
    let (router, aggregate) = gateway(AggregateOptions::default());
    let (status, message) = push(&router, "/metrics/job/a/extra", "up 1\n").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message, "labels must be defined in pairs");
    assert!(aggregate.is_empty().unwrap());
}

#[tokio::test]
async fn ignored_job_label_is_never_rendered() {
    let (router, _) = gateway(AggregateOptions::new(["job"], None));
    let body = "# TYPE counter counter\ncounter{job=\"a\",region=\"us\"} 1\n";
    assert_eq!(push(&router, "/metrics/job/b", body).await.0, StatusCode::ACCEPTED);

    let (_, _, text) = scrape(&router, None).await;
    assert_eq!(text, "# TYPE counter counter\ncounter{region=\"us\"} 1\n");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let (router, aggregate) = gateway(AggregateOptions::default());
    let (status, message) = push(&router, "/metrics/job/a", "up{job=\"a\" 1\n").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message.contains("line 1"), "{message}");
    assert!(aggregate.is_empty().unwrap());
}

#[tokio::test]
async fn type_conflict_is_a_bad_request() {
    let (router, _) = gateway(AggregateOptions::default());
    push(&router, "/metrics", "# TYPE x counter\nx 1\n").await;
    let (status, message) = push(&router, "/metrics", "# TYPE x gauge\nx 1\n").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message.contains("type mismatch"), "{message}");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let aggregate = Arc::new(Aggregate::new(AggregateOptions::default()));
    let config = ApiConfig {
        max_body_bytes: 16,
        ..ApiConfig::default()
    };
    let router = api_router(Arc::clone(&aggregate), &config);

    let (status, _) = push(&router, "/metrics", "some_long_metric_name 1\n").await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(aggregate.is_empty().unwrap());
}

// =============================================================================
// Scrape
// =============================================================================

#[tokio::test]
async fn scrape_sorts_families_and_is_stable() {
    let (router, _) = gateway(AggregateOptions::default());
    push(&router, "/metrics/job/b", "zeta 1\nalpha 2\n").await;
    push(&router, "/metrics/job/a", "zeta 4\n").await;

    let (_, content_type, first) = scrape(&router, None).await;
    let (_, _, second) = scrape(&router, None).await;
    assert_eq!(content_type, Format::Text.content_type());
    assert_eq!(first, second);
    assert_eq!(
        first,
        "# TYPE alpha untyped\nalpha{job=\"b\"} 2\n\
         # TYPE zeta untyped\nzeta{job=\"a\"} 4\nzeta{job=\"b\"} 1\n"
    );
}

#[tokio::test]
async fn scrape_negotiates_openmetrics() {
    let (router, _) = gateway(AggregateOptions::default());
    push(&router, "/metrics", "# TYPE requests_total counter\nrequests_total 2\n").await;

    let (status, content_type, text) = scrape(
        &router,
        Some("application/openmetrics-text;version=1.0.0,text/plain;q=0.5"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, Format::OpenMetrics.content_type());
    assert_eq!(text, "# TYPE requests counter\nrequests_total 2\n# EOF\n");
}

#[tokio::test]
async fn scrape_of_empty_gateway_is_empty() {
    let (router, _) = gateway(AggregateOptions::default());
    let (status, _, text) = scrape(&router, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.is_empty());
}

#[tokio::test]
async fn expired_series_disappear_from_scrape() {
    let (router, aggregate) = gateway(AggregateOptions::new(
        [""; 0],
        Some(Duration::from_secs(1)),
    ));
    push(&router, "/metrics/job/a", "up 1\n").await;
    aggregate
        .sweep_at(std::time::Instant::now() + Duration::from_secs(2))
        .unwrap();

    let (_, _, text) = scrape(&router, None).await;
    assert!(text.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn push_to_a_family_held_by_a_stalled_scrape_completes() {
    let (router, aggregate) = gateway(AggregateOptions::default());
    let mut body = String::new();
    for family in 0..10 {
        body.push_str(&format!("# TYPE fam{family} gauge\n"));
        for series in 0..4000 {
            body.push_str(&format!("fam{family}{{series=\"s{series:06}\"}} 1\n"));
        }
    }
    aggregate.ingest(body.as_bytes(), &PathLabels::new()).unwrap();

    // Nobody reads the body yet, so the render parks on a full channel
    // while holding one family's read lock.
    let request = Request::builder()
        .method(Method::GET)
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let pushes: Vec<_> = (0..10)
        .map(|family| {
            let router = router.clone();
            tokio::spawn(async move {
                let body = format!("# TYPE fam{family} gauge\nfam{family}{{series=\"s000000\"}} 1\n");
                push(&router, "/metrics", &body).await.0
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let reader = tokio::spawn(async move {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .map(|bytes| bytes.len())
    });
    let (scraped, statuses) = tokio::time::timeout(Duration::from_secs(10), async {
        let scraped = reader.await.unwrap().unwrap();
        let mut statuses = Vec::new();
        for push in pushes {
            statuses.push(push.await.unwrap());
        }
        (scraped, statuses)
    })
    .await
    .expect("scrape and pushes should both finish");

    assert!(scraped > 0);
    assert!(statuses.iter().all(|status| *status == StatusCode::ACCEPTED));
    assert_eq!(
        aggregate.families().unwrap()[0].metrics[0].value.as_scalar(),
        Some(2.0)
    );
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (router, _) = gateway(AggregateOptions::default());
    let (status, _) = send(&router, Method::GET, "/nope", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
