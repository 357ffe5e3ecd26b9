//! Registry of every provider category known to the refresh core.
//!
//! Registration happens once at startup; everything afterwards reads. The
//! [`ProviderRegistry`] therefore stores an immutable [`ProviderSet`] behind an
//! `Arc` and swaps it wholesale on (re-)registration, so readers only clone a
//! pointer and never observe a half-registered state.

use std::sync::Arc;

use parking_lot::RwLock;

use super::provider::{
    ExternalIdProvider, ImageProvider, MetadataProvider, MetadataSaver, MetadataService,
};

/// One consistent snapshot of registered providers.
#[derive(Clone, Default)]
pub struct ProviderSet {
    pub image_providers: Vec<Arc<dyn ImageProvider>>,
    /// Sorted ascending by [`MetadataService::order`].
    pub metadata_services: Vec<Arc<dyn MetadataService>>,
    pub metadata_providers: Vec<Arc<dyn MetadataProvider>>,
    /// Enabled savers only, in declaration order.
    pub savers: Vec<Arc<dyn MetadataSaver>>,
    /// Sorted by [`ExternalIdProvider::provider_name`].
    pub external_ids: Vec<Arc<dyn ExternalIdProvider>>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("image_providers", &self.image_providers.len())
            .field("metadata_services", &self.metadata_services.len())
            .field("metadata_providers", &self.metadata_providers.len())
            .field("savers", &self.savers.len())
            .field("external_ids", &self.external_ids.len())
            .finish()
    }
}

/// Holds the current [`ProviderSet`].
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Arc<ProviderSet>>,
}

impl ProviderRegistry {
    /// Create an empty registry with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every provider category at once. The last registration wins.
    pub fn register_providers(
        &self,
        image_providers: Vec<Arc<dyn ImageProvider>>,
        mut metadata_services: Vec<Arc<dyn MetadataService>>,
        metadata_providers: Vec<Arc<dyn MetadataProvider>>,
        savers: Vec<Arc<dyn MetadataSaver>>,
        mut external_ids: Vec<Arc<dyn ExternalIdProvider>>,
    ) {
        metadata_services.sort_by_key(|s| s.order());
        external_ids.sort_by(|a, b| a.provider_name().cmp(b.provider_name()));
        let savers: Vec<_> = savers.into_iter().filter(|s| s.is_enabled()).collect();

        let set = ProviderSet {
            image_providers,
            metadata_services,
            metadata_providers,
            savers,
            external_ids,
        };

        tracing::info!(
            image_providers = set.image_providers.len(),
            metadata_services = set.metadata_services.len(),
            metadata_providers = set.metadata_providers.len(),
            savers = set.savers.len(),
            external_ids = set.external_ids.len(),
            "Registered metadata providers"
        );

        *self.providers.write() = Arc::new(set);
    }

    /// The current provider set.
    pub fn snapshot(&self) -> Arc<ProviderSet> {
        Arc::clone(&self.providers.read())
    }

    /// Look up an image provider by name (case-insensitive).
    pub fn image_provider(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.snapshot()
            .image_providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }
}
