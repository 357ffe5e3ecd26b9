//! Provider contracts and the data types they exchange with the refresh core.
//!
//! Every provider category is a trait with a small capability tag
//! ([`ImageProviderKind`], [`MetadataProviderKind`]) so selection can filter
//! on what a provider is without inspecting its concrete type.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use curator_common::{
    BaseItem, ImageType, ItemId, ItemKind, ItemUpdateType, MetadataRefreshOptions, ProviderIds,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::manager::ProviderManager;

// ---------------------------------------------------------------------------
// Capability tags
// ---------------------------------------------------------------------------

/// Where an image provider gets its images from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageProviderKind {
    /// Images found next to the media on disk.
    Local,
    /// Images downloaded from a remote service.
    Remote,
    /// Images generated on demand (collages, video frames ...).
    Dynamic,
}

/// Where a metadata provider gets its metadata from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataProviderKind {
    /// Reads metadata files next to the media.
    Local,
    /// Queries a remote service.
    Remote,
    /// Always runs, even for locked items.
    Forced,
    /// Anything else (computed fields, plugins).
    Custom,
}

// ---------------------------------------------------------------------------
// Lookup and results
// ---------------------------------------------------------------------------

/// What a provider needs to know to look an item up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemLookupInfo {
    pub name: String,
    pub year: Option<i32>,
    pub path: Option<PathBuf>,
    pub provider_ids: ProviderIds,
    pub metadata_language: Option<String>,
    pub metadata_country_code: Option<String>,
    pub is_automated: bool,
}

impl ItemLookupInfo {
    /// Build lookup info from a live item.
    pub fn from_item(item: &BaseItem) -> Self {
        Self {
            name: item.name.clone(),
            year: item.production_year,
            path: item.path.clone(),
            provider_ids: item.provider_ids.clone(),
            metadata_language: item.preferred_metadata_language.clone(),
            metadata_country_code: item.preferred_metadata_country_code.clone(),
            is_automated: false,
        }
    }
}

/// Metadata returned by a single provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataResult {
    pub name: Option<String>,
    pub overview: Option<String>,
    pub production_year: Option<i32>,
    pub premiere_date: Option<NaiveDate>,
    pub genres: Vec<String>,
    pub community_rating: Option<f32>,
    pub provider_ids: ProviderIds,
}

impl MetadataResult {
    /// Whether the provider found anything at all.
    pub fn has_metadata(&self) -> bool {
        self.name.is_some()
            || self.overview.is_some()
            || self.production_year.is_some()
            || self.premiere_date.is_some()
            || !self.genres.is_empty()
            || self.community_rating.is_some()
            || !self.provider_ids.is_empty()
    }
}

/// A single result returned from a remote search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSearchResult {
    pub name: String,
    pub production_year: Option<i32>,
    pub premiere_date: Option<NaiveDate>,
    pub overview: Option<String>,
    /// URL of a representative image, if the provider has one.
    pub image_url: Option<String>,
    /// External ids identifying the result (`{"imdb": "tt0133093"}`).
    pub provider_ids: ProviderIds,
    /// Name of the provider that produced the result.
    pub search_provider_name: Option<String>,
}

/// A remote search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSearchQuery {
    /// Existing item the search is for; `None` when creating a new item.
    pub item_id: Option<ItemId>,
    /// Kind of item being searched for.
    pub kind: ItemKind,
    pub search_info: ItemLookupInfo,
    /// Restrict the search to a single provider.
    pub search_provider_name: Option<String>,
    pub include_disabled_providers: bool,
}

/// An image a provider can supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteImageInfo {
    pub provider_name: String,
    /// Remote URL, or a local path for local providers.
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub image_type: ImageType,
    /// ISO-639-1 language of any text in the image.
    pub language: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub community_rating: Option<f64>,
    pub vote_count: Option<u32>,
}

/// Raw image bytes as returned by a transport, before validation.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    /// `Content-Type` reported by the transport, if any.
    pub content_type: Option<String>,
    pub data: Bytes,
}

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// Supplies images for items.
///
/// Local providers return candidates whose `url` is a file path; remote
/// providers return URLs fetched later through
/// [`get_image_response`](Self::get_image_response); dynamic providers
/// generate bytes through [`generate_image`](Self::generate_image).
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Display name, matched against configured fetcher lists.
    fn name(&self) -> &str;

    fn kind(&self) -> ImageProviderKind;

    /// Intrinsic order used to break ties between equally configured providers.
    fn order(&self) -> i32 {
        0
    }

    /// Whether the provider can supply images for `item`.
    fn supports(&self, item: &BaseItem) -> anyhow::Result<bool>;

    /// Image types the provider can supply for `item`.
    fn supported_images(&self, item: &BaseItem) -> Vec<ImageType>;

    /// Available image candidates for `item`.
    async fn get_images(
        &self,
        _item: &BaseItem,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<RemoteImageInfo>> {
        Ok(Vec::new())
    }

    /// Generate an image of `image_type` for `item`.
    async fn generate_image(
        &self,
        _item: &BaseItem,
        _image_type: ImageType,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Option<ImageResponse>> {
        Ok(None)
    }

    /// Fetch one image by URL.
    async fn get_image_response(
        &self,
        url: &str,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ImageResponse> {
        anyhow::bail!("{} cannot fetch images by url ({url})", self.name())
    }
}

/// Supplies metadata for items of the kinds it handles.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Display name, matched against configured fetcher/reader lists.
    fn name(&self) -> &str;

    fn kind(&self) -> MetadataProviderKind;

    /// Intrinsic order used to break ties between equally configured providers.
    fn order(&self) -> i32 {
        0
    }

    /// Whether the provider produces metadata for items of `kind`.
    fn handles(&self, kind: ItemKind) -> bool;

    /// Look up metadata for an item.
    async fn fetch(
        &self,
        info: &ItemLookupInfo,
        cancel: &CancellationToken,
    ) -> anyhow::Result<MetadataResult>;

    /// The provider's search capability, if it has one.
    fn as_search(&self) -> Option<&dyn RemoteSearchProvider> {
        None
    }
}

/// Remote metadata providers that can search by name/year/ids.
#[async_trait]
pub trait RemoteSearchProvider: Send + Sync {
    async fn search(
        &self,
        info: &ItemLookupInfo,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<RemoteSearchResult>>;
}

/// Persists item metadata (nfo files, sidecar json ...).
#[async_trait]
pub trait MetadataSaver: Send + Sync {
    fn name(&self) -> &str;

    /// Globally switched on; disabled savers are dropped at registration.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether this saver wants to persist `item` after `update`.
    fn is_enabled_for(&self, item: &BaseItem, update: ItemUpdateType) -> anyhow::Result<bool>;

    async fn save(&self, item: &BaseItem, cancel: &CancellationToken) -> anyhow::Result<()>;
}

/// Describes one kind of external id (IMDb, TMDb ...) and how to link to it.
pub trait ExternalIdProvider: Send + Sync {
    /// Human-readable provider name ("IMDb").
    fn provider_name(&self) -> &str;

    /// Key under which the id is stored in [`ProviderIds`] ("Imdb").
    fn key(&self) -> &str;

    /// URL template with a `{0}` placeholder for the id.
    fn url_format(&self) -> Option<&str>;

    fn supports(&self, item: &BaseItem) -> anyhow::Result<bool>;
}

/// Refreshes items of one or more kinds by orchestrating providers.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Services are consulted in ascending order.
    fn order(&self) -> i32 {
        0
    }

    /// Whether this is the dedicated service for `kind`.
    fn can_refresh_primary(&self, kind: ItemKind) -> bool;

    /// Whether this service can refresh `item` at all.
    fn can_refresh(&self, item: &BaseItem) -> bool;

    async fn refresh_metadata(
        &self,
        manager: &ProviderManager,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> curator_common::Result<ItemUpdateType>;
}

// ---------------------------------------------------------------------------
// Introspection records
// ---------------------------------------------------------------------------

/// An image provider and what it can supply for a given item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProviderInfo {
    pub name: String,
    pub supported_images: Vec<ImageType>,
}

/// Role a plugin plays in a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataPluginType {
    LocalImageProvider,
    ImageFetcher,
    LocalMetadataProvider,
    MetadataFetcher,
    MetadataSaver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPlugin {
    pub name: String,
    pub plugin_type: MetadataPluginType,
}

/// Every plugin that can take part in refreshing items of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPluginSummary {
    pub item_kind: ItemKind,
    pub plugins: Vec<MetadataPlugin>,
    pub supported_image_types: Vec<ImageType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdInfo {
    pub name: String,
    pub key: String,
    pub url_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUrl {
    pub name: String,
    pub url: String,
}
