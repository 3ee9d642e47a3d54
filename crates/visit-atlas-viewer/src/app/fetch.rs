//! Background download of remote GeoJSON sources
//!
//! Downloads run on the ambient tokio runtime (native) or the browser event loop
//! (web). The body is parsed and triangulated before it is handed back, so the UI
//! thread only swaps in a ready [`RegionSource`].

use crate::app::plugin::RegionSource;
use tokio::sync::mpsc::UnboundedSender;
use visit_atlas_lib::RegionCatalog;
use visit_atlas_lib::engine::{EngineError, EngineResult};

/// A finished download for the source `source_id`
pub struct Download {
    pub source_id: String,
    pub result: EngineResult<RegionSource>,
}

/// Starts fetching `url` for `source_id`; the outcome is sent on the channel
pub type Downloader = fn(source_id: String, url: String, generate_id: bool, tx: UnboundedSender<Download>);

async fn fetch_text(url: &str) -> EngineResult<String> {
    tracing::debug!("GET {url}");
    let response = reqwest::get(url)
        .await
        .map_err(|e| EngineError::SourceUnavailable(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::Http {
            status: status.as_u16(),
            message: format!("GET {url}"),
        });
    }

    response
        .text()
        .await
        .map_err(|e| EngineError::SourceUnavailable(format!("{url}: {e}")))
}

async fn load(url: String, generate_id: bool) -> EngineResult<RegionSource> {
    let text = fetch_text(&url).await?;
    let catalog = RegionCatalog::from_geojson(&text, generate_id)
        .map_err(|e| EngineError::SourceUnavailable(format!("{url}: {e}")))?;
    tracing::info!("Downloaded {} regions from {url}", catalog.len());
    Ok(RegionSource::new(catalog))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_download(
    source_id: String,
    url: String,
    generate_id: bool,
    tx: UnboundedSender<Download>,
) {
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(e) => {
            let result = Err(EngineError::SourceUnavailable(format!(
                "cannot download {url} without an async runtime: {e}"
            )));
            let _ = tx.send(Download { source_id, result });
            return;
        }
    };
    handle.spawn(async move {
        let result = load(url, generate_id).await;
        if tx.send(Download { source_id, result }).is_err() {
            tracing::debug!("Map engine dropped before the download finished");
        }
    });
}

#[cfg(target_arch = "wasm32")]
pub fn spawn_download(
    source_id: String,
    url: String,
    generate_id: bool,
    tx: UnboundedSender<Download>,
) {
    wasm_bindgen_futures::spawn_local(async move {
        let result = load(url, generate_id).await;
        if tx.send(Download { source_id, result }).is_err() {
            tracing::debug!("Map engine dropped before the download finished");
        }
    });
}
