use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, Rgb, RgbImage};
use quote_image::{DitherAlgorithm, FitMode, MonoFrame, RenderError, TextLayoutRequest, dither};
use serde_json::{Value, json};
use tokio::task::JoinSet;

use super::*;
use crate::ErrorKind;
use crate::clock::ManualClock;

const DEVICE_ID: &str = "dev123";

/// In-process stand-in for the Dot cloud.
#[derive(Default)]
struct MockDot {
    token_calls: AtomicUsize,
    list_calls: AtomicUsize,
    api_calls: AtomicUsize,
    token_delay_ms: u64,
    token_ttl_secs: Option<i64>,
    /// Exchanges after this many answer 403.
    fail_exchange_after: Option<usize>,
    /// Exchanges after this many hang past any sane client timeout.
    stall_exchange_after: Option<usize>,
    devices_delay_ms: u64,
    reject_all: AtomicBool,
    revoked: Mutex<Vec<String>>,
    posts: Mutex<Vec<(String, &'static str, Value)>>,
}

impl MockDot {
    fn accepts(&self, headers: &HeaderMap) -> bool {
        self.api_calls.fetch_add(1, SeqCst);
        if self.reject_all.load(SeqCst) {
            return false;
        }
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match bearer {
            Some(token) => !self.revoked.lock().unwrap().iter().any(|r| r == token),
            None => false,
        }
    }

    fn revoke(&self, token: &str) {
        self.revoked.lock().unwrap().push(token.to_string());
    }

    fn posts(&self) -> Vec<(String, &'static str, Value)> {
        self.posts.lock().unwrap().clone()
    }
}

type Mock = State<Arc<MockDot>>;

async fn token(State(mock): Mock) -> Response {
    let n = mock.token_calls.fetch_add(1, SeqCst) + 1;
    if mock.token_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(mock.token_delay_ms)).await;
    }
    if mock.stall_exchange_after.is_some_and(|limit| n > limit) {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    if mock.fail_exchange_after.is_some_and(|limit| n > limit) {
        return (StatusCode::FORBIDDEN, "invalid api key").into_response();
    }
    Json(json!({ "accessToken": format!("token-{n}"), "expiresIn": mock.token_ttl_secs }))
        .into_response()
}

async fn devices(State(mock): Mock, headers: HeaderMap) -> Response {
    if !mock.accepts(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    mock.list_calls.fetch_add(1, SeqCst);
    if mock.devices_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(mock.devices_delay_ms)).await;
    }
    Json(json!([{ "id": DEVICE_ID, "series": "quote", "model": "quote_0", "edition": 1 }]))
        .into_response()
}

async fn status(State(mock): Mock, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !mock.accepts(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id != DEVICE_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "deviceId": id,
        "alias": "Desk",
        "status": { "version": "1.2.0", "current": "online", "battery": "80%", "wifi": "-50" }
    }))
    .into_response()
}

fn record(
    mock: &MockDot,
    id: String,
    headers: &HeaderMap,
    kind: &'static str,
    body: Value,
) -> Response {
    if !mock.accepts(headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id != DEVICE_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    mock.posts.lock().unwrap().push((id, kind, body));
    Json(json!({ "code": 200, "message": "ok" })).into_response()
}

async fn push_text(
    State(mock): Mock,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&mock, id, &headers, "text", body)
}

async fn push_image(
    State(mock): Mock,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&mock, id, &headers, "image", body)
}

async fn next(State(mock): Mock, Path(id): Path<String>, headers: HeaderMap) -> Response {
    record(&mock, id, &headers, "next", Value::Null)
}

async fn tasks(
    State(mock): Mock,
    Path((id, task_type)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !mock.accepts(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id != DEVICE_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!([{ "type": "TEXT_API", "key": task_type, "refreshNow": false }])).into_response()
}

async fn serve(mock: Arc<MockDot>) -> String {
    let app = Router::new()
        .route("/auth/token", post(token))
        .route("/api/authV2/open/devices", get(devices))
        .route("/api/authV2/open/device/{id}/status", get(status))
        .route("/api/authV2/open/device/{id}/text", post(push_text))
        .route("/api/authV2/open/device/{id}/image", post(push_image))
        .route("/api/authV2/open/device/{id}/next", post(next))
        .route("/api/authV2/open/device/{id}/{task_type}/list", get(tasks))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn exchange_config(base: &str) -> DotConfig {
    let credentials = Credentials::Exchange {
        url: Url::parse(&format!("{base}/auth/token")).unwrap(),
        api_key: "dot_app_test".into(),
    };
    DotConfig::new(credentials).with_base_url(base)
}

fn key_config(base: &str) -> DotConfig {
    DotConfig::new(Credentials::ApiKey("dot_app_test".into())).with_base_url(base)
}

fn sample_frame() -> MonoFrame {
    let photo = RgbImage::from_fn(600, 400, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let gray = quote_image::normalize(&DynamicImage::ImageRgb8(photo), FitMode::Cover).unwrap();
    dither(&gray, DitherAlgorithm::FloydSteinberg)
}

#[tokio::test]
async fn test_list_devices_returns_status_snapshots() {
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(key_config(&serve(mock.clone()).await)).unwrap();

    let devices = client.list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    let device = &devices[0];
    assert_eq!(device.id, DEVICE_ID);
    assert_eq!(device.alias.as_deref(), Some("Desk"));
    assert_eq!(device.online, Some(true));
    assert_eq!(device.battery.as_deref(), Some("80%"));

    let cached = client.cached_devices().unwrap();
    assert!(cached.contains(DEVICE_ID));
}

#[tokio::test]
async fn test_exchange_runs_once_for_sequential_calls() {
    let mock = Arc::new(MockDot {
        token_ttl_secs: Some(3600),
        ..MockDot::default()
    });
    let client = DotClient::new(exchange_config(&serve(mock.clone()).await)).unwrap();
    assert_eq!(client.auth_phase(), AuthPhase::Unauthenticated);

    client.list_devices().await.unwrap();
    client.list_devices().await.unwrap();

    assert_eq!(mock.token_calls.load(SeqCst), 1);
    assert_eq!(client.auth_phase(), AuthPhase::Authenticated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_calls_share_one_exchange() {
    let mock = Arc::new(MockDot {
        token_delay_ms: 150,
        token_ttl_secs: Some(3600),
        ..MockDot::default()
    });
    let client = Arc::new(DotClient::new(exchange_config(&serve(mock.clone()).await)).unwrap());

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let client = client.clone();
        set.spawn(async move { client.list_devices().await });
    }
    while let Some(result) = set.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(mock.token_calls.load(SeqCst), 1);
}

#[tokio::test]
async fn test_expired_session_reauthenticates_once() {
    let mock = Arc::new(MockDot {
        token_ttl_secs: Some(60),
        ..MockDot::default()
    });
    let clock = Arc::new(ManualClock::default());
    let base = serve(mock.clone()).await;
    let client = DotClient::with_clock(exchange_config(&base), clock.clone()).unwrap();

    client.list_devices().await.unwrap();
    assert_eq!(mock.token_calls.load(SeqCst), 1);

    clock.advance(TimeDelta::seconds(120));
    assert_eq!(client.auth_phase(), AuthPhase::Expired);

    client.list_devices().await.unwrap();
    assert_eq!(mock.token_calls.load(SeqCst), 2);
    assert_eq!(client.auth_phase(), AuthPhase::Authenticated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_refresh_after_expiry() {
    let mock = Arc::new(MockDot {
        token_delay_ms: 100,
        token_ttl_secs: Some(60),
        ..MockDot::default()
    });
    let clock = Arc::new(ManualClock::default());
    let base = serve(mock.clone()).await;
    let client = Arc::new(DotClient::with_clock(exchange_config(&base), clock.clone()).unwrap());

    client.list_devices().await.unwrap();
    clock.advance(TimeDelta::seconds(120));

    let mut set = JoinSet::new();
    for _ in 0..6 {
        let client = client.clone();
        set.spawn(async move { client.list_devices().await });
    }
    while let Some(result) = set.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(mock.token_calls.load(SeqCst), 2);
}

#[tokio::test]
async fn test_failed_refresh_of_expired_session_is_auth_error() {
    let mock = Arc::new(MockDot {
        token_ttl_secs: Some(60),
        stall_exchange_after: Some(1),
        ..MockDot::default()
    });
    let clock = Arc::new(ManualClock::default());
    let base = serve(mock.clone()).await;
    let config = exchange_config(&base).with_timeout(Duration::from_millis(300));
    let client = DotClient::with_clock(config, clock.clone()).unwrap();

    client.list_devices().await.unwrap();
    clock.advance(TimeDelta::seconds(120));

    let err = client.list_devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth, "{err}");
    assert_eq!(mock.token_calls.load(SeqCst), 2);
    assert_eq!(client.auth_phase(), AuthPhase::Expired);
}

#[tokio::test]
async fn test_rejected_token_after_expiry_refresh_is_not_refreshed_again() {
    let mock = Arc::new(MockDot {
        token_ttl_secs: Some(60),
        ..MockDot::default()
    });
    let clock = Arc::new(ManualClock::default());
    let base = serve(mock.clone()).await;
    let client = DotClient::with_clock(exchange_config(&base), clock.clone()).unwrap();

    client.list_devices().await.unwrap();
    assert_eq!(mock.token_calls.load(SeqCst), 1);

    clock.advance(TimeDelta::seconds(120));
    mock.revoke("token-2");

    let err = client.list_devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth, "{err}");
    assert_eq!(mock.token_calls.load(SeqCst), 2);
}

#[tokio::test]
async fn test_unrepresentable_token_lifetime_is_auth_error() {
    let mock = Arc::new(MockDot {
        token_ttl_secs: Some(9_000_000_000_000_000),
        ..MockDot::default()
    });
    let client = DotClient::new(exchange_config(&serve(mock.clone()).await)).unwrap();

    let err = client.list_devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth, "{err}");
    assert!(err.to_string().contains("expiresIn"), "{err}");
    assert_eq!(client.auth_phase(), AuthPhase::Unauthenticated);
    assert_eq!(mock.list_calls.load(SeqCst), 0);
}

#[tokio::test]
async fn test_phase_reads_authenticating_during_exchange() {
    let mock = Arc::new(MockDot {
        token_delay_ms: 300,
        token_ttl_secs: Some(3600),
        ..MockDot::default()
    });
    let client = Arc::new(DotClient::new(exchange_config(&serve(mock.clone()).await)).unwrap());

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.list_devices().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.auth_phase(), AuthPhase::Authenticating);

    pending.await.unwrap().unwrap();
    assert_eq!(client.auth_phase(), AuthPhase::Authenticated);
}

#[test]
fn test_out_of_range_cache_ttl_is_rejected() {
    let mut config = key_config("http://127.0.0.1:9");
    config.device_cache_ttl = Duration::MAX;
    let err = DotClient::new(config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config, "{err}");
}

#[tokio::test]
async fn test_rejected_session_retries_once_with_new_token() {
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(exchange_config(&serve(mock.clone()).await)).unwrap();

    client.list_devices().await.unwrap();
    mock.revoke("token-1");

    let devices = client.list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(mock.token_calls.load(SeqCst), 2);
}

#[tokio::test]
async fn test_failed_reauth_is_auth_error() {
    let mock = Arc::new(MockDot {
        fail_exchange_after: Some(1),
        ..MockDot::default()
    });
    let client = DotClient::new(exchange_config(&serve(mock.clone()).await)).unwrap();

    client.list_devices().await.unwrap();
    mock.revoke("token-1");

    let err = client.list_devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth, "{err}");
    assert_eq!(mock.token_calls.load(SeqCst), 2);
}

#[tokio::test]
async fn test_reauth_transport_failure_is_auth_error() {
    let mock = Arc::new(MockDot {
        stall_exchange_after: Some(1),
        ..MockDot::default()
    });
    let base = serve(mock.clone()).await;
    let config = exchange_config(&base).with_timeout(Duration::from_millis(300));
    let client = DotClient::new(config).unwrap();

    client.list_devices().await.unwrap();
    mock.revoke("token-1");

    let err = client.list_devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth, "{err}");
}

#[tokio::test]
async fn test_persistent_401_is_auth_error_after_one_retry() {
    let mock = Arc::new(MockDot::default());
    mock.reject_all.store(true, SeqCst);
    let client = DotClient::new(key_config(&serve(mock.clone()).await)).unwrap();

    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, DotError::Auth(_)), "{err}");
    assert!(!err.is_retryable());
    assert_eq!(mock.api_calls.load(SeqCst), 2);
}

#[tokio::test]
async fn test_timeout_is_network_error() {
    let mock = Arc::new(MockDot {
        devices_delay_ms: 2000,
        ..MockDot::default()
    });
    let base = serve(mock.clone()).await;
    let config = key_config(&base).with_timeout(Duration::from_millis(200));
    let client = DotClient::new(config).unwrap();

    let err = client.list_devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network, "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = DotClient::new(key_config(&format!("http://{addr}"))).unwrap();
    let err = client.list_devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network, "{err}");
}

#[tokio::test]
async fn test_photo_reaches_device_as_panel_png() {
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(key_config(&serve(mock.clone()).await)).unwrap();

    let ack = client.send_image(DEVICE_ID, &sample_frame()).await.unwrap();
    assert_eq!(ack.code, 200);

    let posts = mock.posts();
    assert_eq!(posts.len(), 1);
    let (device, kind, body) = &posts[0];
    assert_eq!(device, DEVICE_ID);
    assert_eq!(*kind, "image");
    assert_eq!(body["ditherType"], "NONE");
    assert_eq!(body["refreshNow"], true);
    assert_eq!(body["border"], 0);

    let png = STANDARD.decode(body["image"].as_str().unwrap()).unwrap();
    let decoded = image::load_from_memory(&png).unwrap().to_luma8();
    assert_eq!(decoded.dimensions(), (296, 152));
    assert!(decoded.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
}

#[tokio::test]
async fn test_unknown_device_is_rejected_after_refresh() {
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(key_config(&serve(mock.clone()).await)).unwrap();

    let err = client.send_image("ghost", &MonoFrame::white()).await.unwrap_err();
    assert!(matches!(err, DotError::DeviceNotFound(ref id) if id == "ghost"), "{err}");
    assert_eq!(mock.list_calls.load(SeqCst), 1);
    assert!(mock.posts().is_empty());
}

#[tokio::test]
async fn test_oversized_payload_fails_before_network() {
    let mock = Arc::new(MockDot::default());
    let config = DotConfig {
        max_payload_bytes: 64,
        ..exchange_config(&serve(mock.clone()).await)
    };
    let client = DotClient::new(config).unwrap();

    let err = client.send_image(DEVICE_ID, &sample_frame()).await.unwrap_err();
    assert!(matches!(err, DotError::PayloadTooLarge { limit: 64, .. }), "{err}");
    assert_eq!(mock.token_calls.load(SeqCst), 0);
    assert_eq!(mock.api_calls.load(SeqCst), 0);
}

#[tokio::test]
async fn test_native_text_sends_fields() {
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(key_config(&serve(mock.clone()).await)).unwrap();
    let request = TextLayoutRequest::new("Meeting moved to 3pm")
        .with_title("Reminder")
        .with_signature("ops");
    let options = SendOptions {
        task_key: Some("slot-1".into()),
        ..SendOptions::default()
    };

    client
        .send_text_with(DEVICE_ID, &request, RenderMode::Native, &options)
        .await
        .unwrap();

    let posts = mock.posts();
    let (_, kind, body) = &posts[0];
    assert_eq!(*kind, "text");
    assert_eq!(body["title"], "Reminder");
    assert_eq!(body["message"], "Meeting moved to 3pm");
    assert_eq!(body["signature"], "ops");
    assert_eq!(body["taskKey"], "slot-1");
    assert_eq!(body["refreshNow"], true);
    assert!(body.get("icon").is_none());
}

#[tokio::test]
async fn test_image_mode_without_rasterizer_is_font_unavailable() {
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(key_config(&serve(mock.clone()).await)).unwrap();

    let mode = RenderMode::Image(DitherAlgorithm::Atkinson);
    let err = client
        .send_text(DEVICE_ID, &TextLayoutRequest::new("hi"), mode)
        .await
        .unwrap_err();
    assert!(matches!(err, DotError::Render(RenderError::FontUnavailable(_))), "{err}");
    assert_eq!(mock.api_calls.load(SeqCst), 0);
}

#[tokio::test]
async fn test_image_mode_pushes_rendered_text() {
    let Ok(rasterizer) = quote_image::TextRasterizer::system() else {
        eprintln!("skipping: no system font installed");
        return;
    };
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(key_config(&serve(mock.clone()).await))
        .unwrap()
        .with_rasterizer(rasterizer);
    let request = TextLayoutRequest::new("A".repeat(10_000))
        .with_title("Hello")
        .with_signature("\u{2014}me");

    client
        .send_text(DEVICE_ID, &request, RenderMode::Image(DitherAlgorithm::FloydSteinberg))
        .await
        .unwrap();

    let posts = mock.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].1, "image");
}

#[tokio::test]
async fn test_stale_cache_is_refreshed_before_push() {
    let mock = Arc::new(MockDot::default());
    let clock = Arc::new(ManualClock::default());
    let base = serve(mock.clone()).await;
    let client = DotClient::with_clock(key_config(&base), clock.clone()).unwrap();
    let request = TextLayoutRequest::new("ping");

    client.list_devices().await.unwrap();
    client.send_text(DEVICE_ID, &request, RenderMode::Native).await.unwrap();
    assert_eq!(mock.list_calls.load(SeqCst), 1);

    clock.advance(TimeDelta::seconds(61));
    assert!(client.cached_devices().unwrap().is_stale_at(clock.now()));

    client.send_text(DEVICE_ID, &request, RenderMode::Native).await.unwrap();
    assert_eq!(mock.list_calls.load(SeqCst), 2);
    assert_eq!(mock.posts().len(), 2);
}

#[tokio::test]
async fn test_device_operations() {
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(key_config(&serve(mock.clone()).await)).unwrap();

    let status = client.device_status(DEVICE_ID).await.unwrap();
    assert_eq!(status.device_id, DEVICE_ID);

    let err = client.device_status("ghost").await.unwrap_err();
    assert!(matches!(err, DotError::DeviceNotFound(_)));

    client.switch_next(DEVICE_ID).await.unwrap();
    assert_eq!(mock.posts()[0].1, "next");

    let tasks = client.list_tasks(DEVICE_ID, "loop").await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].key.as_deref(), Some("loop"));
}

#[tokio::test]
async fn test_invalidate_forces_a_new_exchange() {
    let mock = Arc::new(MockDot::default());
    let client = DotClient::new(exchange_config(&serve(mock.clone()).await)).unwrap();

    client.list_devices().await.unwrap();
    client.invalidate().await;
    assert_eq!(client.auth_phase(), AuthPhase::Unauthenticated);
    assert!(client.cached_devices().is_none());

    client.list_devices().await.unwrap();
    assert_eq!(mock.token_calls.load(SeqCst), 2);
}

#[test]
fn test_endpoint_keeps_base_path_and_encodes_segments() {
    let config = key_config("https://proxy.example/dot/");
    let client = DotClient::new(config).unwrap();
    let url = client.endpoint(&["device", "a b", "status"]).unwrap();
    assert_eq!(url.as_str(), "https://proxy.example/dot/api/authV2/open/device/a%20b/status");
}
