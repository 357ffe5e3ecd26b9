//! [`ProviderManager`]: the entry point hosts talk to.
//!
//! It owns the registry, queue and tracker, holds the library and image-store
//! collaborators, and exposes queueing, progress, introspection and
//! single-item refresh. The refresh fan-out lives in `executor`, search in
//! `search`, image helpers in `images`.

use std::collections::HashMap;
use std::sync::Arc;

use curator_common::{
    BaseItem, Error, ItemId, ItemKind, ItemUpdateFlag, ItemUpdateType, MetadataRefreshOptions,
    RefreshPriority, Result,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::provider::{
    ImageProvider, ImageProviderInfo, ImageProviderKind, MetadataPlugin, MetadataPluginSummary,
    MetadataPluginType, MetadataProvider, MetadataProviderKind,
};
use super::queue::RefreshQueue;
use super::registry::{ProviderRegistry, ProviderSet};
use super::selector;
use super::tracker::{ActiveRefreshEntry, ActiveRefreshTracker};
use crate::config::{Config, LibraryOptions, MetadataOptions};
use crate::events::{EventBus, RefreshEvent};
use crate::library::{ImageStore, LibraryManager};

/// File name of the placeholder item used for lookups without a live item.
pub(crate) const DUMMY_ITEM_NAME: &str = "dummy";

pub struct ProviderManager {
    registry: ProviderRegistry,
    library: Arc<dyn LibraryManager>,
    image_store: Arc<dyn ImageStore>,
    config: Arc<Config>,
    tracker: Arc<ActiveRefreshTracker>,
    queue: RefreshQueue,
    events: Arc<EventBus>,
    http: reqwest::Client,
}

impl ProviderManager {
    /// Create a manager with an empty registry.
    pub fn new(
        config: Arc<Config>,
        library: Arc<dyn LibraryManager>,
        image_store: Arc<dyn ImageStore>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: ProviderRegistry::new(),
            library,
            image_store,
            tracker: Arc::new(ActiveRefreshTracker::new(Arc::clone(&events))),
            queue: RefreshQueue::new(config.refresh.throttle()),
            config,
            events,
            http: reqwest::Client::new(),
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn library(&self) -> &Arc<dyn LibraryManager> {
        &self.library
    }

    pub fn image_store(&self) -> &Arc<dyn ImageStore> {
        &self.image_store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn tracker(&self) -> &Arc<ActiveRefreshTracker> {
        &self.tracker
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Global metadata options for `item`'s kind.
    pub fn metadata_options(&self, item: &BaseItem) -> MetadataOptions {
        self.config.metadata.metadata_options(item.kind)
    }

    /// Language used for lookups on `item`.
    pub fn preferred_language(&self, item: &BaseItem) -> String {
        item.preferred_metadata_language
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.config.metadata.preferred_language.clone())
    }

    /// Country used for lookups on `item`.
    pub fn preferred_country_code(&self, item: &BaseItem) -> String {
        item.preferred_metadata_country_code
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.config.metadata.country_code.clone())
    }

    /// A placeholder item of `kind` used where no live item exists.
    pub(crate) fn dummy_item(&self, kind: ItemKind) -> BaseItem {
        BaseItem::new(kind, DUMMY_ITEM_NAME)
            .with_path(self.config.metadata.internal_metadata_path.join(DUMMY_ITEM_NAME))
            .with_parent(ItemId::new())
    }

    /// Image providers for `item` under its library's settings.
    pub fn image_providers_for(
        &self,
        item: &BaseItem,
        refresh_options: &MetadataRefreshOptions,
        include_disabled: bool,
    ) -> Vec<Arc<dyn ImageProvider>> {
        let library_options = self.library.get_library_options(item);
        selector::image_providers(
            &self.registry.snapshot().image_providers,
            item,
            &library_options,
            &self.metadata_options(item),
            refresh_options,
            include_disabled,
        )
    }

    /// Metadata providers for `item` under the given library settings.
    pub fn metadata_providers_for(
        &self,
        item: &BaseItem,
        library_options: &LibraryOptions,
        include_disabled: bool,
        force_enable_internet: bool,
    ) -> Vec<Arc<dyn MetadataProvider>> {
        selector::metadata_providers(
            &self.registry.snapshot().metadata_providers,
            item,
            library_options,
            &self.metadata_options(item),
            include_disabled,
            force_enable_internet,
        )
    }

    // -----------------------------------------------------------------------
    // Queue and progress
    // -----------------------------------------------------------------------

    /// Queue a background refresh of `item_id`.
    pub fn queue_refresh(
        self: &Arc<Self>,
        item_id: ItemId,
        options: MetadataRefreshOptions,
        priority: RefreshPriority,
    ) {
        self.events
            .broadcast(RefreshEvent::RefreshQueued { item_id, priority });
        self.queue
            .enqueue(item_id, options, priority, Arc::clone(self));
    }

    /// Progress of a running refresh, or `None` if `item_id` is not refreshing.
    pub fn refresh_progress(&self, item_id: ItemId) -> Option<f64> {
        self.tracker.progress(item_id)
    }

    pub fn active_refreshes(&self) -> Vec<ActiveRefreshEntry> {
        self.tracker.active()
    }

    /// Copy of the pending queue, keyed by item id.
    pub fn refresh_queue_snapshot(&self) -> HashMap<ItemId, ItemId> {
        self.queue.snapshot()
    }

    pub fn on_refresh_start(&self, item: &BaseItem) {
        self.tracker.on_refresh_start(item);
    }

    pub fn on_refresh_progress(&self, item: &BaseItem, progress: f64) -> Result<()> {
        self.tracker.on_refresh_progress(item, progress)
    }

    pub fn on_refresh_complete(&self, item: &BaseItem) {
        self.tracker.on_refresh_complete(item);
    }

    /// Stop the queue; the drain task finishes its current item and exits.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.queue.cancellation_token().clone()
    }

    // -----------------------------------------------------------------------
    // Single item refresh and saving
    // -----------------------------------------------------------------------

    /// Refresh `item`'s own metadata through the service responsible for it.
    ///
    /// A service dedicated to the item kind wins over generic ones. Without
    /// any matching service the refresh is logged and reports no update.
    pub async fn refresh_single_item(
        &self,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<ItemUpdateType> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let providers = self.registry.snapshot();
        let service = providers
            .metadata_services
            .iter()
            .find(|s| s.can_refresh_primary(item.kind))
            .or_else(|| {
                providers
                    .metadata_services
                    .iter()
                    .find(|s| s.can_refresh(item))
            });

        let Some(service) = service else {
            error!(
                item_id = %item.id,
                kind = %item.kind,
                error = %Error::NoMetadataService(item.kind.to_string()),
                "Unable to refresh item"
            );
            return Ok(ItemUpdateType::empty());
        };

        let update = service.refresh_metadata(self, item, options, cancel).await?;
        if !update.is_empty() {
            debug!(item_id = %item.id, update = ?update, "Item updated");
            self.events.broadcast(RefreshEvent::ItemUpdated {
                item_id: item.id,
                changes: update.iter().collect(),
            });
        }
        Ok(update)
    }

    /// Run every saver enabled for `item` after an update of `update`.
    ///
    /// Saver failures are logged per saver; the remaining savers still run.
    pub async fn save_metadata(
        &self,
        item: &BaseItem,
        update: ItemUpdateType,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let providers = self.registry.snapshot();
        let library_options = self.library.get_library_options(item);
        let metadata_options = self.metadata_options(item);

        for saver in &providers.savers {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if !selector::is_saver_enabled_for_item(
                saver.as_ref(),
                item,
                &library_options,
                &metadata_options,
                update,
                false,
            ) {
                continue;
            }

            debug!(saver = saver.name(), item_id = %item.id, "Saving metadata");
            if let Err(e) = saver.save(item, cancel).await {
                warn!(
                    saver = saver.name(),
                    item_id = %item.id,
                    item = %item.name,
                    error = %e,
                    "Error saving metadata"
                );
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Remote image providers that could serve `item`, disabled ones included.
    pub fn image_provider_info(&self, item: &BaseItem) -> Vec<ImageProviderInfo> {
        self.image_providers_for(item, &MetadataRefreshOptions::full_refresh(), true)
            .into_iter()
            .filter(|p| p.kind() == ImageProviderKind::Remote)
            .map(|p| ImageProviderInfo {
                name: p.name().to_string(),
                supported_images: p.supported_images(item),
            })
            .collect()
    }

    /// One summary per item kind of every plugin that could take part.
    pub fn all_metadata_plugins(&self) -> Vec<MetadataPluginSummary> {
        let providers = self.registry.snapshot();
        ItemKind::SUMMARY_KINDS
            .iter()
            .map(|kind| self.plugin_summary(&providers, *kind))
            .collect()
    }

    fn plugin_summary(&self, providers: &ProviderSet, kind: ItemKind) -> MetadataPluginSummary {
        let dummy = self.dummy_item(kind);
        let library_options = LibraryOptions::default();
        let metadata_options = self.metadata_options(&dummy);

        let image_providers = selector::image_providers(
            &providers.image_providers,
            &dummy,
            &library_options,
            &metadata_options,
            &MetadataRefreshOptions::full_refresh(),
            true,
        );
        let metadata_providers = selector::metadata_providers(
            &providers.metadata_providers,
            &dummy,
            &library_options,
            &metadata_options,
            true,
            true,
        );

        let plugin = |name: &str, plugin_type| MetadataPlugin {
            name: name.to_string(),
            plugin_type,
        };
        let mut plugins = Vec::new();

        plugins.extend(
            metadata_providers
                .iter()
                .filter(|p| p.kind() == MetadataProviderKind::Local)
                .map(|p| plugin(p.name(), MetadataPluginType::LocalMetadataProvider)),
        );
        plugins.extend(
            metadata_providers
                .iter()
                .filter(|p| p.kind() == MetadataProviderKind::Remote)
                .map(|p| plugin(p.name(), MetadataPluginType::MetadataFetcher)),
        );

        let edit = ItemUpdateType::from(ItemUpdateFlag::MetadataEdit);
        let mut savers: Vec<_> = providers
            .savers
            .iter()
            .filter(|s| {
                selector::is_saver_enabled_for_item(
                    s.as_ref(),
                    &dummy,
                    &library_options,
                    &metadata_options,
                    edit,
                    true,
                )
            })
            .map(|s| s.name().to_string())
            .collect();
        savers.sort();
        plugins.extend(
            savers
                .iter()
                .map(|name| plugin(name, MetadataPluginType::MetadataSaver)),
        );

        plugins.extend(
            image_providers
                .iter()
                .filter(|p| p.kind() == ImageProviderKind::Local)
                .map(|p| plugin(p.name(), MetadataPluginType::LocalImageProvider)),
        );
        plugins.extend(
            image_providers
                .iter()
                .filter(|p| p.kind() != ImageProviderKind::Local)
                .map(|p| plugin(p.name(), MetadataPluginType::ImageFetcher)),
        );

        let mut supported_image_types = Vec::new();
        for provider in image_providers
            .iter()
            .filter(|p| p.kind() != ImageProviderKind::Local)
        {
            for image_type in provider.supported_images(&dummy) {
                if !supported_image_types.contains(&image_type) {
                    supported_image_types.push(image_type);
                }
            }
        }

        MetadataPluginSummary {
            item_kind: kind,
            plugins,
            supported_image_types,
        }
    }
}

impl std::fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderManager")
            .field("providers", &self.registry.snapshot())
            .field("queue_state", &self.queue.state())
            .finish_non_exhaustive()
    }
}
