//! Metadata and image refresh orchestration.
//!
//! # Module layout
//!
//! - [`provider`] -- Provider traits and the data they exchange.
//! - [`registry`] -- Registered providers, swapped atomically on registration.
//! - [`selector`] -- Which providers apply to an item, and in which order.
//! - [`queue`] -- Priority refresh queue with a single drain task.
//! - [`tracker`] -- Per-item refresh progress.
//! - `executor` -- Item, collection folder and artist refresh fan-out.
//! - [`service`] -- Default metadata service driving the providers.
//! - `search` -- Remote search aggregation and external-id links.
//! - [`images`] -- Image response validation, HTTP fetch and ordering.
//! - [`manager`] -- [`ProviderManager`], the entry point tying it together.

pub mod images;
pub mod manager;
pub mod provider;
pub mod queue;
pub mod registry;
pub mod selector;
pub mod service;
pub mod tracker;

mod executor;
mod search;

pub use images::{fetch_image, validate_image_response, RemoteImageQuery};
pub use manager::ProviderManager;
pub use provider::{
    ExternalIdInfo, ExternalIdProvider, ExternalUrl, ImageProvider, ImageProviderInfo,
    ImageProviderKind, ImageResponse, ItemLookupInfo, MetadataPlugin, MetadataPluginSummary,
    MetadataPluginType, MetadataProvider, MetadataProviderKind, MetadataResult, MetadataSaver,
    MetadataService, RemoteImageInfo, RemoteSearchProvider, RemoteSearchQuery,
    RemoteSearchResult,
};
pub use queue::{QueueState, RefreshQueue, RefreshRequest, RefreshWorker};
pub use registry::{ProviderRegistry, ProviderSet};
pub use search::merge_search_results;
pub use service::ItemMetadataService;
pub use tracker::{ActiveRefreshEntry, ActiveRefreshTracker};
