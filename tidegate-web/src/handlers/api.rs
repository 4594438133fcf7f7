//! JSON endpoints: torrent info and metrics.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use tidegate_core::{Info, TorrentMetrics, collect_metrics, torrent_info};
use tracing::debug;

use crate::errors::ApiError;
use crate::server::AppState;

/// Query parameters of `GET /info`.
#[derive(Debug, Deserialize)]
pub struct InfoQuery {
    #[serde(default)]
    pub magnet: String,
}

/// Describes the torrent behind a magnet link, waiting for its metadata.
///
/// # Errors
/// - 422 when the magnet link is empty or unparsable
/// - 5xx when the engine fails
pub async fn info(
    State(state): State<AppState>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<Info>, ApiError> {
    if query.magnet.is_empty() {
        return Err(ApiError::invalid_request(
            "could not work with empty magnet link",
        ));
    }

    debug!(magnet = %query.magnet, "Getting info");

    let torrent = state.resolver.resolve(&query.magnet).await?;
    let info = torrent_info(torrent.as_ref()).await?;
    Ok(Json(info))
}

/// Reports download progress of every torrent the engine tracks.
pub async fn metrics(State(state): State<AppState>) -> Json<Vec<TorrentMetrics>> {
    Json(collect_metrics(state.engine().as_ref()).await)
}
