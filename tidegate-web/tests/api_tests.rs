//! Router-level tests for the gateway API over the simulated engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::{
    ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, IF_MODIFIED_SINCE,
    LAST_MODIFIED, RANGE, WWW_AUTHENTICATE,
};
use axum::http::{Request, Response, StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tidegate_core::auth::StaticCredentials;
use tidegate_core::config::StreamingConfig;
use tidegate_core::{
    Authenticator, FileMetrics, Info, ProgressCallback, TorrentEngine, TorrentMetrics,
    TorrentResolver,
};
use tidegate_sim::{
    SeedCatalog, SeedFile, SeedTorrent, SimulatedEngine, SimulationConfig, settings_for,
};
use tidegate_web::{AppState, router};
use tower::ServiceExt;

const LAST_MODIFIED_DATE: &str = "Sun, 13 Sep 2020 12:26:40 GMT";

struct Harness {
    app: Router,
    engine: Arc<SimulatedEngine>,
    magnet: String,
    reports: Arc<Mutex<Vec<FileMetrics>>>,
    _storage: tempfile::TempDir,
}

fn scenario() -> SeedTorrent {
    SeedTorrent {
        name: "Scenario".to_string(),
        creation_date: 1_600_000_000,
        trackers: Vec::new(),
        files: vec![
            SeedFile::new("a.mkv", (0..1000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>()),
            SeedFile::new("readme.txt", b"hello".to_vec()),
        ],
    }
}

fn harness(config: SimulationConfig) -> Harness {
    let storage = tempfile::tempdir().unwrap();
    let catalog = SeedCatalog::new();
    let magnet = catalog.seed(scenario()).to_uri();
    let engine = Arc::new(SimulatedEngine::new(
        catalog,
        config,
        settings_for(storage.path().to_path_buf()),
    ));

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let on_progress: ProgressCallback = Arc::new(move |_: &TorrentMetrics, file: &FileMetrics| {
        sink.lock().unwrap().push(file.clone());
    });

    let state = AppState::new(
        TorrentResolver::new(engine.clone(), None),
        Authenticator::Static(StaticCredentials::new(
            "admin".to_string(),
            "secret".to_string(),
        )),
        on_progress,
        StreamingConfig {
            progress_interval: Duration::from_millis(10),
            chunk_size: 64,
        },
    );

    Harness {
        app: router(state),
        engine,
        magnet,
        reports,
        _storage: storage,
    }
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .uri(uri)
        .header(AUTHORIZATION, basic("admin", "secret"))
}

async fn send(app: &Router, request: axum::http::request::Builder) -> Response<Body> {
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn info_uri(magnet: &str) -> String {
    format!("/info?magnet={}", urlencoding::encode(magnet))
}

fn stream_uri(magnet: &str, path: &str) -> String {
    format!(
        "/stream?magnet={}&path={}",
        urlencoding::encode(magnet),
        urlencoding::encode(path)
    )
}

#[tokio::test]
async fn test_info_describes_scenario() {
    let h = harness(SimulationConfig::instant());

    let response = send(&h.app, get(&info_uri(&h.magnet))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let info: Info = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(info.name, "Scenario");
    assert_eq!(info.description, "hello");
    assert_eq!(info.creation_date, 1_600_000_000);
    let files: Vec<_> = info.files.iter().map(|f| (f.path.as_str(), f.length)).collect();
    assert_eq!(files, vec![("a.mkv", 1000), ("readme.txt", 5)]);
}

#[tokio::test]
async fn test_stream_full_file() {
    let h = harness(SimulationConfig::instant());

    let response = send(&h.app, get(&stream_uri(&h.magnet, "a.mkv"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
    assert_eq!(response.headers()[CONTENT_LENGTH], "1000");
    assert_eq!(response.headers()[CONTENT_TYPE], "video/x-matroska");
    assert_eq!(response.headers()[LAST_MODIFIED], LAST_MODIFIED_DATE);

    let body = body_bytes(response).await;
    assert_eq!(body.len(), 1000);
    assert_eq!(body, scenario().files[0].data.to_vec());
}

#[tokio::test]
async fn test_stream_open_ended_range() {
    let h = harness(SimulationConfig::instant());

    let response = send(
        &h.app,
        get(&stream_uri(&h.magnet, "a.mkv")).header(RANGE, "bytes=900-"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 900-999/1000");
    assert_eq!(response.headers()[CONTENT_LENGTH], "100");

    let body = body_bytes(response).await;
    assert_eq!(body, scenario().files[0].data[900..].to_vec());
}

#[tokio::test]
async fn test_stream_unsatisfiable_range() {
    let h = harness(SimulationConfig::instant());

    let response = send(
        &h.app,
        get(&stream_uri(&h.magnet, "a.mkv")).header(RANGE, "bytes=5000-"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes */1000");
}

#[tokio::test]
async fn test_stream_not_modified() {
    let h = harness(SimulationConfig::instant());

    let response = send(
        &h.app,
        get(&stream_uri(&h.magnet, "readme.txt")).header(IF_MODIFIED_SINCE, LAST_MODIFIED_DATE),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_stream_unknown_path_is_not_found() {
    let h = harness(SimulationConfig::instant());

    let response = send(&h.app, get(&stream_uri(&h.magnet, "missing.mkv"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_missing_parameters_are_rejected() {
    let h = harness(SimulationConfig::instant());

    for uri in [
        "/info".to_string(),
        "/info?magnet=".to_string(),
        "/stream?path=a.mkv".to_string(),
        format!("/stream?magnet={}", urlencoding::encode(&h.magnet)),
        info_uri("not a magnet"),
    ] {
        let response = send(&h.app, get(&uri)).await;
        assert_eq!(
            response.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "unexpected status for {uri}"
        );
    }
    assert!(h.engine.torrents().await.is_empty());
}

#[tokio::test]
async fn test_invalid_credentials_never_reach_engine() {
    let h = harness(SimulationConfig::instant());

    let anonymous = Request::builder().uri(info_uri(&h.magnet));
    let response = send(&h.app, anonymous).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(WWW_AUTHENTICATE));

    for uri in [
        info_uri(&h.magnet),
        stream_uri(&h.magnet, "a.mkv"),
        "/metrics".to_string(),
    ] {
        let wrong = Request::builder()
            .uri(&uri)
            .header(AUTHORIZATION, basic("admin", "wrong"));
        assert_eq!(send(&h.app, wrong).await.status(), StatusCode::UNAUTHORIZED);
    }

    assert!(h.engine.torrents().await.is_empty());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let h = harness(SimulationConfig::instant());
    let response = send(&h.app, Request::builder().uri("/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_after_streaming() {
    let h = harness(SimulationConfig::instant());

    let empty = send(&h.app, get("/metrics")).await;
    assert_eq!(empty.status(), StatusCode::OK);
    assert_eq!(body_bytes(empty).await, b"[]");

    let response = send(&h.app, get(&stream_uri(&h.magnet, "readme.txt"))).await;
    assert_eq!(body_bytes(response).await, b"hello");

    let response = send(&h.app, get("/metrics")).await;
    let metrics: Vec<TorrentMetrics> =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(metrics.len(), 1);
    assert!(metrics[0].magnet.starts_with("magnet:?xt=urn:btih:"));
    assert!(metrics[0].peers > 0);
    for file in &metrics[0].files {
        assert!(file.completed <= file.length);
    }
    assert_eq!(metrics[0].files[1].completed, 5);
}

#[tokio::test]
async fn test_metrics_completed_never_regresses_during_download() {
    let h = harness(SimulationConfig {
        piece_size: 100,
        download_rate: Some(5_000),
        ..SimulationConfig::instant()
    });

    let response = send(&h.app, get(&stream_uri(&h.magnet, "a.mkv"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = tokio::spawn(body_bytes(response));

    let mut last_seen: HashMap<String, u64> = HashMap::new();
    let mut polls = 0;
    loop {
        let response = send(&h.app, get("/metrics")).await;
        let metrics: Vec<TorrentMetrics> =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(metrics.len(), 1);

        for file in &metrics[0].files {
            assert!(file.completed <= file.length, "{} overshoots", file.path);
            let previous = last_seen.insert(file.path.clone(), file.completed);
            assert!(
                previous.is_none_or(|p| p <= file.completed),
                "{} went from {previous:?} to {}",
                file.path,
                file.completed
            );
        }

        polls += 1;
        if body.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    assert_eq!(body.await.unwrap().len(), 1000);
    assert!(polls > 2);
}

#[tokio::test]
async fn test_progress_reported_while_streaming() {
    let h = harness(SimulationConfig {
        piece_size: 100,
        download_rate: Some(5_000),
        ..SimulationConfig::instant()
    });

    let response = send(&h.app, get(&stream_uri(&h.magnet, "a.mkv"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.len(), 1000);

    let reports = h.reports.lock().unwrap().clone();
    assert!(!reports.is_empty());
    let completed: Vec<u64> = reports.iter().map(|r| r.completed).collect();
    assert!(completed.windows(2).all(|w| w[0] < w[1]));
    assert!(reports.iter().all(|r| r.path == "a.mkv" && r.completed < r.length));
}
