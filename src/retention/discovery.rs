use std::sync::Arc;

use futures::{
    StreamExt, TryStreamExt, future,
    stream::{self, BoxStream},
};

use crate::{
    config::TelemetryLayout,
    db::{DbError, DbResult, DocumentStore},
    models::{CollectionPath, DocumentPath},
};

/// A device document and the events collection the sweep prunes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTarget {
    pub device: DocumentPath,
    pub events: CollectionPath,
}

impl SweepTarget {
    /// Resolve `<device>/<topic>/<sub_folder>/<events_collection>`.
    pub fn resolve(device: DocumentPath, layout: &TelemetryLayout) -> DbResult<Self> {
        let events = device
            .collection(&layout.topic)?
            .doc(&layout.sub_folder)?
            .collection(&layout.events_collection)?;
        Ok(Self { device, events })
    }
}

/// Lazily enumerate every device in the store.
///
/// Root collections are listed once when the stream is first polled; each
/// root's devices are listed only when the consumer reaches that root. The
/// first listing error ends the stream.
pub fn discover_targets(
    store: Arc<dyn DocumentStore>,
    layout: TelemetryLayout,
) -> BoxStream<'static, DbResult<SweepTarget>> {
    let roots = {
        let store = Arc::clone(&store);
        stream::once(async move { store.list_collections().await })
            .map_ok(|roots| stream::iter(roots.into_iter().map(Ok::<_, DbError>)))
            .try_flatten()
    };

    roots
        .and_then(move |root| {
            let store = Arc::clone(&store);
            async move {
                let devices = store.list_documents(&root).await?;
                tracing::debug!(collection = %root, devices = devices.len(), "Listed devices");
                Ok(devices)
            }
        })
        .map_ok(|devices| stream::iter(devices.into_iter().map(Ok::<_, DbError>)))
        .try_flatten()
        .and_then(move |device| future::ready(SweepTarget::resolve(device, &layout)))
        .boxed()
}
