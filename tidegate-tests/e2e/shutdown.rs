//! Gateway shutdown with requests in flight.

use std::time::Duration;

use reqwest::StatusCode;
use tidegate_sim::SimulationConfig;
use tidegate_web::GatewayError;

use crate::harness::start;

#[tokio::test]
async fn test_close_refuses_new_connections() {
    let gw = start(SimulationConfig::instant()).await;
    assert_eq!(
        gw.get("/metrics").send().await.unwrap().status(),
        StatusCode::OK
    );

    gw.gateway.close(Duration::from_secs(5)).await.unwrap();
    gw.gateway.wait().await.unwrap();

    let fresh = reqwest::Client::new();
    assert!(fresh.get(gw.url("/metrics")).send().await.is_err());
}

#[tokio::test]
async fn test_close_gives_up_on_stalled_stream() {
    let gw = start(SimulationConfig::paused()).await;

    // Headers go out before the first body chunk, which never downloads
    let response = gw.stream("media/video.mkv").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = gw.gateway.close(Duration::from_millis(200)).await;
    assert!(matches!(result, Err(GatewayError::ShutdownTimeout(_))));
    assert!(gw.gateway.local_addr().is_none());

    // The engine was closed anyway, which fails the pending read
    assert!(response.bytes().await.is_err());
}
