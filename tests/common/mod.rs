//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`ProviderManager`] to an in-memory
//! [`MemoryLibrary`] and [`MemoryImageStore`], plus stub providers and
//! services that record what they were asked to do.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use curator::config::{Config, LibraryOptions};
use curator::events::{Event, EventBus};
use curator::library::{ImageStore, ItemQuery, LibraryManager, ProgressReporter};
use curator::metadata::{
    fetch_image, ExternalIdProvider, ImageProvider, ImageProviderKind, ImageResponse,
    ItemLookupInfo, MetadataProvider, MetadataProviderKind, MetadataResult, MetadataSaver,
    MetadataService, ProviderManager, RemoteImageInfo, RemoteSearchProvider, RemoteSearchResult,
};
use curator_common::{
    BaseItem, Error, ImageType, ItemId, ItemImage, ItemKind, ItemUpdateType,
    MetadataRefreshOptions,
};

// ---------------------------------------------------------------------------
// Library double
// ---------------------------------------------------------------------------

/// In-memory item store.
#[derive(Default)]
pub struct MemoryLibrary {
    items: RwLock<HashMap<ItemId, BaseItem>>,
    physical_folders: RwLock<HashMap<ItemId, Vec<ItemId>>>,
    album_artists: RwLock<HashMap<ItemId, ItemId>>,
    library_options: RwLock<LibraryOptions>,
    failing_validation: RwLock<HashSet<ItemId>>,
    validated: Mutex<Vec<(ItemId, bool)>>,
    updates: Mutex<Vec<(ItemId, ItemUpdateType)>>,
}

impl MemoryLibrary {
    pub fn insert(&self, item: BaseItem) -> ItemId {
        let id = item.id;
        self.items.write().insert(id, item);
        id
    }

    pub fn item(&self, id: ItemId) -> BaseItem {
        self.items.read().get(&id).cloned().expect("item not in library")
    }

    pub fn remove(&self, id: ItemId) {
        self.items.write().remove(&id);
    }

    pub fn set_physical_folders(&self, collection_folder: ItemId, folders: Vec<ItemId>) {
        self.physical_folders
            .write()
            .insert(collection_folder, folders);
    }

    /// Credit `album` to `artist` for artist album queries.
    pub fn attribute_album(&self, album: ItemId, artist: ItemId) {
        self.album_artists.write().insert(album, artist);
    }

    pub fn set_library_options(&self, options: LibraryOptions) {
        *self.library_options.write() = options;
    }

    pub fn fail_validation_for(&self, id: ItemId) {
        self.failing_validation.write().insert(id);
    }

    /// `(folder, recursive)` for every validation pass, in call order.
    pub fn validated(&self) -> Vec<(ItemId, bool)> {
        self.validated.lock().clone()
    }

    /// `(item, update)` for every persisted item, in call order.
    pub fn updates(&self) -> Vec<(ItemId, ItemUpdateType)> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl LibraryManager for MemoryLibrary {
    fn get_item_by_id(&self, id: ItemId) -> Option<BaseItem> {
        self.items.read().get(&id).cloned()
    }

    fn get_library_options(&self, _item: &BaseItem) -> LibraryOptions {
        self.library_options.read().clone()
    }

    fn get_item_list(&self, query: &ItemQuery) -> Vec<BaseItem> {
        let album_artists = self.album_artists.read();
        let mut items: Vec<BaseItem> = self
            .items
            .read()
            .values()
            .filter(|i| query.include_kinds.is_empty() || query.include_kinds.contains(&i.kind))
            .filter(|i| {
                query.artist_ids.is_empty()
                    || album_artists
                        .get(&i.id)
                        .is_some_and(|artist| query.artist_ids.contains(artist))
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    fn get_physical_folders(&self, collection_folder: &BaseItem) -> Vec<BaseItem> {
        let ids = self
            .physical_folders
            .read()
            .get(&collection_folder.id)
            .cloned()
            .unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| self.get_item_by_id(id))
            .collect()
    }

    async fn validate_children(
        &self,
        folder: &BaseItem,
        _options: &MetadataRefreshOptions,
        recursive: bool,
        progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.validated.lock().push((folder.id, recursive));
        progress.report(50.0);
        if self.failing_validation.read().contains(&folder.id) {
            anyhow::bail!("folder {} is unreadable", folder.name);
        }
        progress.report(100.0);
        Ok(())
    }

    async fn update_item(&self, item: &BaseItem, update: ItemUpdateType) -> anyhow::Result<()> {
        self.items.write().insert(item.id, item.clone());
        self.updates.lock().push((item.id, update));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Image store double
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SavedImage {
    pub item_id: ItemId,
    pub image_type: ImageType,
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Default)]
pub struct MemoryImageStore {
    saved: Mutex<Vec<SavedImage>>,
}

impl MemoryImageStore {
    pub fn saved(&self) -> Vec<SavedImage> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn save_image(
        &self,
        item: &BaseItem,
        image_type: ImageType,
        mime_type: &str,
        data: Bytes,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ItemImage> {
        let extension = mime_type.rsplit('/').next().unwrap_or("bin");
        self.saved.lock().push(SavedImage {
            item_id: item.id,
            image_type,
            mime_type: mime_type.to_string(),
            data,
        });
        Ok(ItemImage {
            path: format!("/images/{}/{}.{}", item.id, image_type, extension),
            image_type,
            width: None,
            height: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Stub providers
// ---------------------------------------------------------------------------

/// Metadata provider returning a canned result; remote ones can also search.
pub struct StubMetadataProvider {
    pub name: &'static str,
    pub kind: MetadataProviderKind,
    pub handles: Vec<ItemKind>,
    pub result: MetadataResult,
    pub search_results: Option<Vec<RemoteSearchResult>>,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub last_lookup: Mutex<Option<ItemLookupInfo>>,
}

impl StubMetadataProvider {
    pub fn new(name: &'static str, kind: MetadataProviderKind) -> Self {
        Self {
            name,
            kind,
            handles: vec![ItemKind::Movie],
            result: MetadataResult::default(),
            search_results: None,
            fail: false,
            calls: AtomicUsize::new(0),
            last_lookup: Mutex::new(None),
        }
    }

    pub fn returning(mut self, result: MetadataResult) -> Self {
        self.result = result;
        self
    }

    pub fn searching(mut self, results: Vec<RemoteSearchResult>) -> Self {
        self.search_results = Some(results);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for StubMetadataProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> MetadataProviderKind {
        self.kind
    }

    fn handles(&self, kind: ItemKind) -> bool {
        self.handles.contains(&kind)
    }

    async fn fetch(
        &self,
        info: &ItemLookupInfo,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<MetadataResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_lookup.lock() = Some(info.clone());
        if self.fail {
            anyhow::bail!("{} is unavailable", self.name);
        }
        Ok(self.result.clone())
    }

    fn as_search(&self) -> Option<&dyn RemoteSearchProvider> {
        self.search_results.as_ref().map(|_| self as &dyn RemoteSearchProvider)
    }
}

#[async_trait]
impl RemoteSearchProvider for StubMetadataProvider {
    async fn search(
        &self,
        info: &ItemLookupInfo,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<RemoteSearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_lookup.lock() = Some(info.clone());
        if self.fail {
            anyhow::bail!("{} search is unavailable", self.name);
        }
        Ok(self.search_results.clone().unwrap_or_default())
    }
}

/// Image provider with canned candidates. Remote candidates whose URL is
/// `http(s)` are fetched for real; anything else is served as a tiny JPEG.
pub struct StubImageProvider {
    pub name: &'static str,
    pub kind: ImageProviderKind,
    pub supported: Vec<ImageType>,
    pub images: Vec<RemoteImageInfo>,
    pub fetched: Mutex<Vec<String>>,
}

impl StubImageProvider {
    pub fn new(name: &'static str, kind: ImageProviderKind) -> Self {
        Self {
            name,
            kind,
            supported: vec![ImageType::Primary, ImageType::Backdrop],
            images: Vec::new(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_image(mut self, image_type: ImageType, url: &str, language: Option<&str>) -> Self {
        self.images.push(RemoteImageInfo {
            provider_name: self.name.to_string(),
            url: url.to_string(),
            thumbnail_url: None,
            image_type,
            language: language.map(str::to_string),
            width: Some(1000),
            height: Some(1500),
            community_rating: None,
            vote_count: None,
        });
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl ImageProvider for StubImageProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> ImageProviderKind {
        self.kind
    }

    fn supports(&self, _item: &BaseItem) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn supported_images(&self, _item: &BaseItem) -> Vec<ImageType> {
        self.supported.clone()
    }

    async fn get_images(
        &self,
        _item: &BaseItem,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<RemoteImageInfo>> {
        Ok(self.images.clone())
    }

    async fn generate_image(
        &self,
        _item: &BaseItem,
        _image_type: ImageType,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Option<ImageResponse>> {
        Ok(Some(ImageResponse {
            content_type: Some("image/png".to_string()),
            data: Bytes::from_static(b"\x89PNG"),
        }))
    }

    async fn get_image_response(
        &self,
        url: &str,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ImageResponse> {
        self.fetched.lock().push(url.to_string());
        if url.starts_with("http") {
            return fetch_image(&reqwest::Client::new(), url).await;
        }
        Ok(ImageResponse {
            content_type: Some("image/jpeg".to_string()),
            data: Bytes::from_static(&[0xFF, 0xD8, 0xFF]),
        })
    }
}

/// Saver recording every item it was asked to save.
pub struct RecordingSaver {
    pub name: &'static str,
    pub fail: bool,
    pub saved: Mutex<Vec<ItemId>>,
}

impl RecordingSaver {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fail: false,
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn saved(&self) -> Vec<ItemId> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl MetadataSaver for RecordingSaver {
    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled_for(&self, _item: &BaseItem, _update: ItemUpdateType) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn save(&self, item: &BaseItem, _cancel: &CancellationToken) -> anyhow::Result<()> {
        self.saved.lock().push(item.id);
        if self.fail {
            anyhow::bail!("disk full");
        }
        Ok(())
    }
}

pub struct StubExternalId {
    pub name: &'static str,
    pub key: &'static str,
    pub url_format: Option<&'static str>,
    pub fail: bool,
}

impl ExternalIdProvider for StubExternalId {
    fn provider_name(&self) -> &str {
        self.name
    }

    fn key(&self) -> &str {
        self.key
    }

    fn url_format(&self) -> Option<&str> {
        self.url_format
    }

    fn supports(&self, _item: &BaseItem) -> anyhow::Result<bool> {
        if self.fail {
            anyhow::bail!("cannot tell");
        }
        Ok(true)
    }
}

/// Service that records which items it refreshed and can be told to fail.
#[derive(Default)]
pub struct RecordingService {
    refreshed: Mutex<Vec<ItemId>>,
    failing: RwLock<HashSet<ItemId>>,
}

impl RecordingService {
    pub fn fail_for(&self, id: ItemId) {
        self.failing.write().insert(id);
    }

    pub fn refreshed(&self) -> Vec<ItemId> {
        self.refreshed.lock().clone()
    }
}

#[async_trait]
impl MetadataService for RecordingService {
    fn can_refresh_primary(&self, _kind: ItemKind) -> bool {
        false
    }

    fn can_refresh(&self, _item: &BaseItem) -> bool {
        true
    }

    async fn refresh_metadata(
        &self,
        _manager: &ProviderManager,
        item: &BaseItem,
        _options: &MetadataRefreshOptions,
        _cancel: &CancellationToken,
    ) -> curator_common::Result<ItemUpdateType> {
        self.refreshed.lock().push(item.id);
        if self.failing.read().contains(&item.id) {
            return Err(Error::provider("recording", format!("cannot refresh {}", item.name)));
        }
        Ok(ItemUpdateType::empty())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub manager: Arc<ProviderManager>,
    pub library: Arc<MemoryLibrary>,
    pub images: Arc<MemoryImageStore>,
    pub events: Arc<EventBus>,
}

impl TestHarness {
    /// Harness with a 1 ms throttle and no providers registered.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.refresh.throttle_ms = 1;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        curator::logging::init_for_tests();
        let library = Arc::new(MemoryLibrary::default());
        let images = Arc::new(MemoryImageStore::default());
        let events = Arc::new(EventBus::default());
        let manager = ProviderManager::new(
            Arc::new(config),
            Arc::clone(&library) as Arc<dyn LibraryManager>,
            Arc::clone(&images) as Arc<dyn ImageStore>,
            Arc::clone(&events),
        );
        Self {
            manager,
            library,
            images,
            events,
        }
    }

    /// Register only `service`.
    pub fn with_service(service: Arc<dyn MetadataService>) -> Self {
        let harness = Self::new();
        harness.manager.registry().register_providers(
            Vec::new(),
            vec![service],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        harness
    }

    /// Every event broadcast so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        let mut events = self.events.recent_events(usize::MAX);
        events.reverse();
        events
    }

    /// Poll until `condition` holds or five seconds pass.
    pub async fn wait_for(&self, mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for condition"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn movie(name: &str) -> BaseItem {
    BaseItem::new(ItemKind::Movie, name).with_path(format!("/media/movies/{name}/{name}.mkv"))
}

pub fn folder(kind: ItemKind, name: &str) -> BaseItem {
    BaseItem::new(kind, name).with_path(format!("/media/{name}"))
}
