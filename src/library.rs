//! Contracts for the collaborators the refresh core drives but does not own:
//! the item store and the image processing pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use curator_common::{
    BaseItem, ImageType, ItemId, ItemImage, ItemKind, ItemUpdateType, MetadataRefreshOptions,
};
use tokio_util::sync::CancellationToken;

use crate::config::LibraryOptions;

/// Filter passed to [`LibraryManager::get_item_list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    /// Only items of these kinds; empty means any kind.
    pub include_kinds: Vec<ItemKind>,
    /// Only items attributed to one of these artists; empty means no filter.
    pub artist_ids: Vec<ItemId>,
}

impl ItemQuery {
    /// Albums attributed to `artist_id`.
    pub fn albums_by_artist(artist_id: ItemId) -> Self {
        Self {
            include_kinds: vec![ItemKind::MusicAlbum],
            artist_ids: vec![artist_id],
        }
    }
}

/// Sink for progress reports (0.0 -- 100.0) from long-running child
/// validation.
pub struct ProgressReporter {
    callback: Box<dyn Fn(f64) + Send + Sync>,
}

impl ProgressReporter {
    /// Create a new reporter from the given callback.
    pub fn new(callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op reporter that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Report progress.
    pub fn report(&self, progress: f64) {
        (self.callback)(progress);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// The item store.
///
/// Lookups are synchronous (they hit an in-process cache in practice);
/// anything that may touch disk or re-scan is async and cancellable.
#[async_trait]
pub trait LibraryManager: Send + Sync {
    /// Resolve a live item, or `None` if it no longer exists.
    fn get_item_by_id(&self, id: ItemId) -> Option<BaseItem>;

    /// Options of the library the item belongs to.
    fn get_library_options(&self, item: &BaseItem) -> LibraryOptions;

    /// Items matching `query`.
    fn get_item_list(&self, query: &ItemQuery) -> Vec<BaseItem>;

    /// Physical folders grouped under a collection folder.
    fn get_physical_folders(&self, collection_folder: &BaseItem) -> Vec<BaseItem>;

    /// Reconcile the folder's child list against what is on disk, refreshing
    /// children with `options`.
    async fn validate_children(
        &self,
        folder: &BaseItem,
        options: &MetadataRefreshOptions,
        recursive: bool,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()>;

    /// Persist a refreshed item.
    async fn update_item(&self, item: &BaseItem, update: ItemUpdateType) -> anyhow::Result<()>;
}

/// The image processing pipeline: stores downloaded or generated image bytes
/// for an item and reports where they ended up.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save_image(
        &self,
        item: &BaseItem,
        image_type: ImageType,
        mime_type: &str,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ItemImage>;
}
