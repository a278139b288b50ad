//! End-to-end distribution cycles against mocked worker pools
//!
//! Every test starts one wiremock server per worker on a contiguous port
//! range, matching how the registry lays out the pool.

use std::net::TcpListener;
use std::time::{Duration, Instant};

use fanout_common::{FanoutConfig, FanoutError};
use fanout_coordinator::{Distributor, InferenceOptions};
use fanout_proto::{BatchInferenceRequest, BatchInferenceResponse};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

/// Bind `count` listeners on consecutive ports
fn bind_contiguous(count: usize) -> (u16, Vec<TcpListener>) {
    loop {
        let first = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = first.local_addr().unwrap().port();
        if base as usize + count > u16::MAX as usize {
            continue;
        }

        let mut listeners = vec![first];
        for offset in 1..count {
            match TcpListener::bind(("127.0.0.1", base + offset as u16)) {
                Ok(listener) => listeners.push(listener),
                Err(_) => break,
            }
        }

        if listeners.len() == count {
            return (base, listeners);
        }
    }
}

/// Start `count` mock workers; returns the base port and the servers in pool order
async fn start_pool(count: usize) -> (u16, Vec<MockServer>) {
    let (base, listeners) = bind_contiguous(count);
    let mut servers = Vec::with_capacity(count);
    for listener in listeners {
        servers.push(MockServer::builder().listener(listener).start().await);
    }
    (base, servers)
}

fn config(base_port: u16, count: usize) -> FanoutConfig {
    let mut config = FanoutConfig::default();
    config.pool.base_port = base_port;
    config.pool.num_instances = count;
    config.dispatch.request_timeout_secs = 1;
    config.health.timeout_secs = 1;
    config
}

async fn mount_ready(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"engine_ready": true})))
        .mount(server)
        .await;
}

async fn mount_not_ready(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"engine_ready": false})))
        .mount(server)
        .await;
}

/// Answers every item with `"{tag}:{item}"`
struct EchoResponder {
    tag: &'static str,
}

impl Respond for EchoResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: BatchInferenceRequest = serde_json::from_slice(&request.body).unwrap();
        let response = BatchInferenceResponse {
            responses: body
                .list_messages
                .iter()
                .map(|m| format!("{}:{}", self.tag, m))
                .collect(),
            lora_adapter_used: body.lora_adapter,
        };
        ResponseTemplate::new(200).set_body_json(response)
    }
}

async fn mount_echo(server: &MockServer, tag: &'static str) {
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(EchoResponder { tag })
        .mount(server)
        .await;
}

async fn mount_inference_error(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(ResponseTemplate::new(status).set_body_string("engine crashed"))
        .mount(server)
        .await;
}

fn batch(len: usize) -> Vec<String> {
    (0..len).map(|i| format!("m{}", i)).collect()
}

async fn items_received(server: &MockServer) -> Vec<usize> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/inference")
        .map(|r| {
            serde_json::from_slice::<BatchInferenceRequest>(&r.body)
                .unwrap()
                .list_messages
                .len()
        })
        .collect()
}

// ============================================================================
// Full success
// ============================================================================

#[tokio::test]
async fn test_five_items_two_workers() {
    let (base, servers) = start_pool(2).await;
    for (server, tag) in servers.iter().zip(["w0", "w1"]) {
        mount_ready(server).await;
        mount_echo(server, tag).await;
    }
    let distributor = Distributor::new(config(base, 2)).unwrap();

    let result = distributor
        .distribute(batch(5), InferenceOptions::default())
        .await
        .unwrap();

    assert_eq!(
        result.responses,
        vec!["w0:m0", "w0:m1", "w0:m2", "w1:m3", "w1:m4"]
    );
    assert_eq!(result.workers_used, 2);
    assert_eq!(result.total_items, 5);
    assert_eq!(result.failed_partitions, 0);
    assert_eq!(items_received(&servers[0]).await, vec![3]);
    assert_eq!(items_received(&servers[1]).await, vec![2]);
}

#[tokio::test]
async fn test_options_are_forwarded_and_adapter_echoed() {
    let (base, servers) = start_pool(1).await;
    mount_ready(&servers[0]).await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .and(body_partial_json(json!({
            "lora_adapter": "sql",
            "max_tokens": 64,
            "temperature": 0.5,
            "top_p": 0.25
        })))
        .respond_with(EchoResponder { tag: "w0" })
        .expect(1)
        .mount(&servers[0])
        .await;
    let distributor = Distributor::new(config(base, 1)).unwrap();

    let options = InferenceOptions::default()
        .with_adapter("sql")
        .with_max_tokens(64)
        .with_temperature(0.5)
        .with_top_p(0.25);
    let result = distributor.distribute(batch(2), options).await.unwrap();

    assert_eq!(result.responses.len(), 2);
    assert_eq!(result.adapter_used.as_deref(), Some("sql"));
}

#[tokio::test]
async fn test_partitions_run_concurrently() {
    let (base, servers) = start_pool(3).await;
    for server in &servers {
        mount_ready(server).await;
        Mock::given(method("POST"))
            .and(path("/inference"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"responses": ["r"]}))
                    .set_delay(Duration::from_millis(600)),
            )
            .mount(server)
            .await;
    }
    let mut config = config(base, 3);
    config.dispatch.request_timeout_secs = 5;
    let distributor = Distributor::new(config).unwrap();

    let start = Instant::now();
    let result = distributor
        .distribute(batch(3), InferenceOptions::default())
        .await
        .unwrap();

    assert_eq!(result.responses.len(), 3);
    // Sequential calls would need at least 1.8s
    assert!(start.elapsed() < Duration::from_millis(1500));
}

// ============================================================================
// Partial and total failure
// ============================================================================

#[tokio::test]
async fn test_one_failed_partition_is_partial_success() {
    let (base, servers) = start_pool(3).await;
    for server in &servers {
        mount_ready(server).await;
    }
    mount_echo(&servers[0], "w0").await;
    mount_inference_error(&servers[1], 500).await;
    mount_echo(&servers[2], "w2").await;
    let distributor = Distributor::new(config(base, 3)).unwrap();

    let result = distributor
        .distribute(batch(7), InferenceOptions::default())
        .await
        .unwrap();

    // Sizes 3, 2, 2; the middle partition is lost
    assert_eq!(result.failed_partitions, 1);
    assert_eq!(result.failed_indices, vec![1]);
    assert_eq!(result.responses.len(), 5);
    assert_eq!(
        result.responses,
        vec!["w0:m0", "w0:m1", "w0:m2", "w2:m5", "w2:m6"]
    );
    assert_eq!(result.workers_used, 3);

    // Failure is visible before any further probe
    let stats = distributor.stats();
    assert_eq!(stats.healthy, 2);
    assert!(!stats.workers[1].healthy);
    assert!(stats.workers[1]
        .last_error
        .as_deref()
        .unwrap()
        .contains("HTTP 500"));
}

#[tokio::test]
async fn test_lone_healthy_worker_failure_fails_cycle() {
    let (base, servers) = start_pool(3).await;
    mount_not_ready(&servers[0]).await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&servers[1])
        .await;
    mount_ready(&servers[2]).await;
    mount_inference_error(&servers[2], 500).await;
    let distributor = Distributor::new(config(base, 3)).unwrap();

    let result = distributor
        .distribute(batch(4), InferenceOptions::default())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, FanoutError::AllPartitionsFailed { failed: 1 }));
    assert!(err.is_unavailable());
    assert_eq!(items_received(&servers[2]).await, vec![4]);
    assert!(items_received(&servers[0]).await.is_empty());
    assert_eq!(distributor.stats().healthy, 0);
}

#[tokio::test]
async fn test_malformed_response_is_a_failure() {
    let (base, servers) = start_pool(2).await;
    for server in &servers {
        mount_ready(server).await;
    }
    mount_echo(&servers[0], "w0").await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&servers[1])
        .await;
    let distributor = Distributor::new(config(base, 2)).unwrap();

    let result = distributor
        .distribute(batch(4), InferenceOptions::default())
        .await
        .unwrap();

    assert_eq!(result.responses, vec!["w0:m0", "w0:m1"]);
    assert_eq!(result.failed_partitions, 1);
    assert!(!distributor.stats().workers[1].healthy);
}

#[tokio::test]
async fn test_result_length_mismatch_excluded_without_marking_unhealthy() {
    let (base, servers) = start_pool(2).await;
    for server in &servers {
        mount_ready(server).await;
    }
    mount_echo(&servers[0], "w0").await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"responses": ["only one"]})))
        .mount(&servers[1])
        .await;
    let distributor = Distributor::new(config(base, 2)).unwrap();

    let result = distributor
        .distribute(batch(4), InferenceOptions::default())
        .await
        .unwrap();

    assert_eq!(result.responses, vec!["w0:m0", "w0:m1"]);
    assert_eq!(result.failed_indices, vec![1]);
    assert!(distributor.stats().workers[1].healthy);
}

#[tokio::test]
async fn test_timeout_does_not_affect_sibling() {
    let (base, servers) = start_pool(2).await;
    for server in &servers {
        mount_ready(server).await;
    }
    mount_echo(&servers[0], "w0").await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"responses": ["late", "late"]}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&servers[1])
        .await;
    let distributor = Distributor::new(config(base, 2)).unwrap();

    let result = distributor
        .distribute(batch(4), InferenceOptions::default())
        .await
        .unwrap();

    assert_eq!(result.responses, vec!["w0:m0", "w0:m1"]);
    assert_eq!(result.failed_partitions, 1);
    let stats = distributor.stats();
    assert!(stats.workers[0].healthy);
    assert!(!stats.workers[1].healthy);
}

#[tokio::test]
async fn test_failed_worker_excluded_when_probing_disabled() {
    let (base, servers) = start_pool(2).await;
    mount_echo(&servers[0], "w0").await;
    mount_inference_error(&servers[1], 502).await;
    let mut config = config(base, 2);
    config.dispatch.probe_before_dispatch = false;
    let distributor = Distributor::new(config).unwrap();

    let first = distributor
        .distribute(batch(2), InferenceOptions::default())
        .await
        .unwrap();
    assert_eq!(first.failed_partitions, 1);

    let second = distributor
        .distribute(batch(3), InferenceOptions::default())
        .await
        .unwrap();
    assert_eq!(second.workers_used, 1);
    assert_eq!(second.failed_partitions, 0);
    assert_eq!(second.responses, vec!["w0:m0", "w0:m1", "w0:m2"]);
    assert_eq!(items_received(&servers[1]).await, vec![1]);
}

// ============================================================================
// Health probing
// ============================================================================

#[tokio::test]
async fn test_refresh_health_classifies_responses() {
    let (base, servers) = start_pool(4).await;
    mount_ready(&servers[0]).await;
    mount_not_ready(&servers[1]).await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{oops"))
        .mount(&servers[2])
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&servers[3])
        .await;
    let distributor = Distributor::new(config(base, 4)).unwrap();

    let report = distributor.refresh_health().await;

    assert_eq!(report.total, 4);
    assert_eq!(report.healthy, 1);
    let healthy: Vec<bool> = report.results.iter().map(|r| r.healthy).collect();
    assert_eq!(healthy, vec![true, false, false, false]);

    let stats = distributor.stats();
    assert_eq!(stats.healthy, 1);
    assert_eq!(stats.unhealthy, 3);
    assert_eq!(stats.workers[1].last_error.as_deref(), Some("engine not ready"));
}

#[tokio::test]
async fn test_probe_timeout_marks_unhealthy() {
    let (base, servers) = start_pool(1).await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"engine_ready": true}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&servers[0])
        .await;
    let distributor = Distributor::new(config(base, 1)).unwrap();

    let report = distributor.refresh_health().await;

    assert_eq!(report.healthy, 0);
    assert!(report.results[0].error.is_some());
}

#[tokio::test]
async fn test_latest_probe_wins() {
    let (base, servers) = start_pool(1).await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&servers[0])
        .await;
    mount_ready(&servers[0]).await;
    let distributor = Distributor::new(config(base, 1)).unwrap();

    assert_eq!(distributor.refresh_health().await.healthy, 0);
    assert_eq!(distributor.stats().healthy, 0);

    assert_eq!(distributor.refresh_health().await.healthy, 1);
    assert_eq!(distributor.stats().healthy, 1);
    assert_eq!(distributor.stats().workers[0].last_error, None);
}

#[tokio::test]
async fn test_no_healthy_workers_skips_dispatch() {
    let (base, servers) = start_pool(2).await;
    for server in &servers {
        mount_not_ready(server).await;
        mount_echo(server, "unused").await;
    }
    let distributor = Distributor::new(config(base, 2)).unwrap();

    let result = distributor
        .distribute(batch(3), InferenceOptions::default())
        .await;

    assert!(matches!(result, Err(FanoutError::NoHealthyWorkers(_))));
    for server in &servers {
        assert!(items_received(server).await.is_empty());
    }
}
