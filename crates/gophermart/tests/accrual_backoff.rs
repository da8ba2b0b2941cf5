//! 积分服务客户端集成测试
//!
//! 在本地端口上启动一个模拟的积分服务，验证 429 限流的等待与重试行为。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
    routing::get,
};
use gophermart::accrual::{AccrualClient, AccrualError, AccrualFetcher, FetchOutcome};
use gophermart::models::AccrualStatus;
use loyalty_shared::config::AccrualConfig;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

// ==================== 模拟积分服务 ====================

/// 每个订单的预设应答序列，用完后返回 PROCESSED
#[derive(Clone, Default)]
struct MockAccrualState {
    script: Arc<Mutex<HashMap<String, Vec<Response>>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockAccrualState {
    fn enqueue(&self, number: &str, responses: Vec<Response>) {
        self.script
            .lock()
            .unwrap()
            .insert(number.to_string(), responses.into_iter().rev().collect());
    }

    fn hits(&self, number: &str) -> usize {
        self.hits.lock().unwrap().get(number).copied().unwrap_or(0)
    }
}

fn rate_limited(retry_after: Option<&'static str>) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(value) = retry_after {
        headers.insert(RETRY_AFTER, HeaderValue::from_static(value));
    }
    (StatusCode::TOO_MANY_REQUESTS, headers, "No more than N requests per minute allowed")
        .into_response()
}

async fn get_order(
    State(state): State<MockAccrualState>,
    Path(number): Path<String>,
) -> Response {
    *state.hits.lock().unwrap().entry(number.clone()).or_default() += 1;

    let scripted = state
        .script
        .lock()
        .unwrap()
        .get_mut(&number)
        .and_then(|queue| queue.pop());

    scripted.unwrap_or_else(|| {
        Json(json!({ "order": number, "status": "PROCESSED", "accrual": 500 })).into_response()
    })
}

async fn start_mock_accrual() -> (String, MockAccrualState) {
    let state = MockAccrualState::default();
    let app = Router::new()
        .route("/api/orders/{number}", get(get_order))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn client_config(base_url: &str) -> AccrualConfig {
    AccrualConfig {
        base_url: base_url.to_string(),
        request_timeout_seconds: 5,
        default_retry_after_seconds: 1,
        shared_backoff: false,
    }
}

fn expect_processed(outcome: FetchOutcome) {
    match outcome {
        FetchOutcome::Resolved(resp) => {
            assert_eq!(resp.status, AccrualStatus::Processed);
            assert_eq!(resp.accrual_amount(), Decimal::from(500));
        }
        FetchOutcome::Unknown => panic!("expected a resolved order"),
    }
}

// ==================== 测试用例 ====================

#[tokio::test]
async fn test_rate_limited_call_waits_retry_after_without_blocking_others() {
    let (base_url, mock) = start_mock_accrual().await;
    mock.enqueue("12345678903", vec![rate_limited(Some("2"))]);

    let client = AccrualClient::new(&client_config(&base_url)).unwrap();

    let limited = {
        let client = client.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let outcome = client.fetch("12345678903").await.unwrap();
            (outcome, start.elapsed())
        })
    };

    // 限流只挂起收到 429 的调用方
    tokio::time::sleep(Duration::from_millis(200)).await;
    let start = Instant::now();
    expect_processed(client.fetch("79927398713").await.unwrap());
    assert!(start.elapsed() < Duration::from_secs(1));

    let (outcome, elapsed) = limited.await.unwrap();
    expect_processed(outcome);
    assert!(elapsed >= Duration::from_secs(2), "waited only {:?}", elapsed);
    assert_eq!(mock.hits("12345678903"), 2);
}

#[tokio::test]
async fn test_missing_retry_after_uses_default() {
    let (base_url, mock) = start_mock_accrual().await;
    mock.enqueue("12345678903", vec![rate_limited(None), rate_limited(Some("soon"))]);

    let client = AccrualClient::new(&client_config(&base_url)).unwrap();
    let start = Instant::now();
    expect_processed(client.fetch("12345678903").await.unwrap());

    // 两次都回退到 1 秒的默认值
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(mock.hits("12345678903"), 3);
}

#[tokio::test]
async fn test_shared_backoff_delays_other_callers() {
    let (base_url, mock) = start_mock_accrual().await;
    mock.enqueue("12345678903", vec![rate_limited(Some("2"))]);

    let config = AccrualConfig {
        shared_backoff: true,
        ..client_config(&base_url)
    };
    let client = AccrualClient::new(&config).unwrap();

    let limited = {
        let client = client.clone();
        tokio::spawn(async move { client.fetch("12345678903").await.unwrap() })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    let start = Instant::now();
    expect_processed(client.fetch("79927398713").await.unwrap());
    assert!(start.elapsed() >= Duration::from_millis(1500));

    expect_processed(limited.await.unwrap());
}

#[tokio::test]
async fn test_no_content_is_unknown() {
    let (base_url, mock) = start_mock_accrual().await;
    mock.enqueue("12345678903", vec![StatusCode::NO_CONTENT.into_response()]);

    let client = AccrualClient::new(&client_config(&base_url)).unwrap();
    let outcome = client.fetch("12345678903").await.unwrap();
    assert_eq!(outcome, FetchOutcome::Unknown);
}

#[tokio::test]
async fn test_unexpected_status_is_not_retried() {
    let (base_url, mock) = start_mock_accrual().await;
    mock.enqueue(
        "12345678903",
        vec![StatusCode::INTERNAL_SERVER_ERROR.into_response()],
    );

    let client = AccrualClient::new(&client_config(&base_url)).unwrap();
    let result = client.fetch("12345678903").await;

    assert!(matches!(result, Err(AccrualError::UnexpectedStatus(500))));
    assert_eq!(mock.hits("12345678903"), 1);
}

#[tokio::test]
async fn test_shutdown_interrupts_backoff() {
    let (base_url, mock) = start_mock_accrual().await;
    mock.enqueue("12345678903", vec![rate_limited(Some("30"))]);

    let (tx, rx) = watch::channel(false);
    let client = AccrualClient::new(&client_config(&base_url))
        .unwrap()
        .with_shutdown(rx);

    let handle = tokio::spawn(async move { client.fetch("12345678903").await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("backoff should be interrupted")
        .unwrap();
    assert!(matches!(result, Err(AccrualError::Cancelled)));
}

#[tokio::test]
async fn test_huge_retry_after_with_shared_gate_does_not_panic() {
    let (base_url, mock) = start_mock_accrual().await;
    mock.enqueue(
        "12345678903",
        vec![rate_limited(Some("18446744073709551615"))],
    );

    let (tx, rx) = watch::channel(false);
    let config = AccrualConfig {
        shared_backoff: true,
        ..client_config(&base_url)
    };
    let client = AccrualClient::new(&config).unwrap().with_shutdown(rx);

    let handle = tokio::spawn(async move { client.fetch("12345678903").await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();

    let joined = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("backoff should be interrupted");
    let result = joined.expect("fetch task must not panic");
    assert!(matches!(result, Err(AccrualError::Cancelled)));
    assert_eq!(mock.hits("12345678903"), 1);
}
