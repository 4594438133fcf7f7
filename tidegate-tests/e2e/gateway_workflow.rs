//! Info, stream and metrics over a live listener.

use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_RANGE, CONTENT_TYPE, RANGE, WWW_AUTHENTICATE};
use tidegate_core::{Info, TorrentEngine, TorrentMetrics};
use tidegate_sim::SimulationConfig;

use crate::harness::{PASSWORD, USERNAME, start, video};

#[tokio::test]
async fn test_info_then_stream_then_metrics() {
    let gw = start(SimulationConfig::instant()).await;

    let response = gw.info().send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let info: Info = response.json().await.unwrap();
    assert_eq!(info.name, "Scenario");
    assert_eq!(info.description, "hello");
    let paths: Vec<_> = info.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["media/video.mkv", "readme.txt"]);

    let response = gw.stream("media/video.mkv").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
    assert_eq!(response.headers()[CONTENT_TYPE], "video/x-matroska");
    assert_eq!(response.bytes().await.unwrap().to_vec(), video());

    let response = gw.get("/metrics").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let metrics: Vec<TorrentMetrics> = response.json().await.unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].info_hash, info.info_hash);
    assert_eq!(metrics[0].files[0].completed, video().len() as u64);

    gw.gateway
        .close(std::time::Duration::from_secs(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_range_request_resumes_mid_file() {
    let gw = start(SimulationConfig::instant()).await;

    let response = gw
        .stream("media/video.mkv")
        .header(RANGE, "bytes=1000-1999")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 1000-1999/4096");
    assert_eq!(
        response.bytes().await.unwrap().to_vec(),
        video()[1000..2000].to_vec()
    );

    let response = gw
        .stream("media/video.mkv")
        .header(RANGE, "bytes=-96")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 4000-4095/4096");
}

#[tokio::test]
async fn test_stream_waits_for_download() {
    let config = SimulationConfig {
        piece_size: 512,
        download_rate: Some(40_000),
        ..SimulationConfig::instant()
    };
    let gw = start(config).await;

    let response = gw.stream("media/video.mkv").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().to_vec(), video());

    let reports = gw.reports.lock().clone();
    let completed: Vec<u64> = reports.iter().map(|r| r.completed).collect();
    assert!(completed.windows(2).all(|w| w[0] < w[1]));
    assert!(completed.iter().all(|&c| c < video().len() as u64));
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let gw = start(SimulationConfig::instant()).await;

    let response = gw.stream("media/other.mkv").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "could not find path in torrent");
}

#[tokio::test]
async fn test_bad_credentials_are_challenged() {
    let gw = start(SimulationConfig::instant()).await;

    let anonymous = gw.http.get(gw.url("/metrics")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert!(anonymous.headers().contains_key(WWW_AUTHENTICATE));

    let wrong = gw
        .http
        .get(gw.url("/info"))
        .query(&[("magnet", gw.magnet.as_str())])
        .basic_auth(USERNAME, Some(format!("{PASSWORD}!")))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let engine = gw.builder.engine().unwrap();
    assert!(engine.torrents().await.is_empty());
}

#[tokio::test]
async fn test_empty_parameters_are_unprocessable() {
    let gw = start(SimulationConfig::instant()).await;

    let response = gw.get("/info").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = gw.stream("").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "could not work with empty path");
}
