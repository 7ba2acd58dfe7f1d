//! Manual reset of the page cache.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use super::PageCache;

/// Empty `store` once per message on `requests`. Returns when every sender
/// has been dropped.
pub async fn clear_on_request(store: Arc<PageCache>, mut requests: mpsc::Receiver<()>) {
    while requests.recv().await.is_some() {
        let dropped = store.clear();
        info!(
            target = "folio::cache",
            dropped, "Page cache cleared on request"
        );
    }
}
