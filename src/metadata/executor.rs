//! Refresh execution: an item's own metadata, then its children.
//!
//! Containers fan out over an explicit list of children rather than recursing
//! through the executor, and every child is isolated: a failing child is
//! logged and the rest still run. Only cancellation stops a fan-out early.

use std::sync::Arc;

use async_trait::async_trait;
use curator_common::{BaseItem, Error, ItemId, ItemKind, MetadataRefreshOptions, Result};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::manager::ProviderManager;
use super::queue::RefreshWorker;
use crate::library::{ItemQuery, ProgressReporter};

fn collaborator_error(context: &str, e: anyhow::Error) -> Error {
    Error::Internal(format!("{context}: {e:#}"))
}

impl ProviderManager {
    /// Refresh `item`, then its children if it is a container.
    ///
    /// Collection folders refresh and validate each physical folder; other
    /// folders validate their direct children. The item is reported as
    /// refreshing for the whole duration.
    pub async fn refresh_item(
        &self,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.on_refresh_start(item);
        let result = self.refresh_item_and_children(item, options, cancel).await;
        self.on_refresh_complete(item);
        result
    }

    async fn refresh_item_and_children(
        &self,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.refresh_single_item(item, options, cancel).await?;

        match item.kind {
            ItemKind::CollectionFolder => {
                self.refresh_collection_folder(item, options, cancel).await
            }
            kind if kind.is_folder() => {
                let progress = self.progress_reporter(item);
                self.library()
                    .validate_children(item, options, false, &progress, cancel)
                    .await
                    .map_err(|e| {
                        if cancel.is_cancelled() {
                            Error::Cancelled
                        } else {
                            collaborator_error("validating children", e)
                        }
                    })
            }
            _ => Ok(()),
        }
    }

    /// Refresh every physical folder grouped under a collection folder.
    ///
    /// Each folder gets its own metadata refresh followed by a recursive
    /// child validation. A failure in one folder does not stop the others.
    pub async fn refresh_collection_folder(
        &self,
        collection_folder: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pending = self.library().get_physical_folders(collection_folder);
        debug!(
            item_id = %collection_folder.id,
            folders = pending.len(),
            "Refreshing collection folder children"
        );

        for child in &pending {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.refresh_physical_folder(child, options, cancel).await {
                Ok(()) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(
                        item_id = %child.id,
                        item = %child.name,
                        parent_id = %collection_folder.id,
                        error = %e,
                        "Failed to refresh collection folder child; continuing"
                    );
                }
            }
        }
        Ok(())
    }

    async fn refresh_physical_folder(
        &self,
        folder: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.on_refresh_start(folder);
        let result = async {
            self.refresh_single_item(folder, options, cancel).await?;
            let progress = self.progress_reporter(folder);
            self.library()
                .validate_children(folder, options, true, &progress, cancel)
                .await
                .map_err(|e| {
                    if cancel.is_cancelled() {
                        Error::Cancelled
                    } else {
                        collaborator_error("validating children", e)
                    }
                })
        }
        .await;
        self.on_refresh_complete(folder);
        result
    }

    /// Refresh an artist after bringing its album groupings up to date.
    ///
    /// Album groupings are validated concurrently first; the artist's own
    /// metadata is refreshed last and a failure there is only logged.
    pub async fn refresh_artist(
        &self,
        artist: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let albums = self
            .library()
            .get_item_list(&ItemQuery::albums_by_artist(artist.id));

        let mut grouping_ids: Vec<ItemId> = Vec::new();
        for id in albums.iter().filter_map(|album| album.music_artist_id) {
            if !grouping_ids.contains(&id) {
                grouping_ids.push(id);
            }
        }
        let groupings: Vec<BaseItem> = grouping_ids
            .into_iter()
            .filter_map(|id| self.library().get_item_by_id(id))
            .collect();

        debug!(
            item_id = %artist.id,
            albums = albums.len(),
            groupings = groupings.len(),
            "Validating artist album groupings"
        );

        let validations = groupings.iter().map(|grouping| async move {
            let progress = ProgressReporter::noop();
            let result = self
                .library()
                .validate_children(grouping, options, true, &progress, cancel)
                .await;
            (grouping, result)
        });
        for (grouping, result) in join_all(validations).await {
            if let Err(e) = result {
                warn!(
                    item_id = %grouping.id,
                    artist_id = %artist.id,
                    error = %format!("{e:#}"),
                    "Failed to validate artist grouping"
                );
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.on_refresh_start(artist);
        let result = self.refresh_single_item(artist, options, cancel).await;
        self.on_refresh_complete(artist);

        match result {
            Ok(_) => Ok(()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                error!(
                    item_id = %artist.id,
                    item = %artist.name,
                    error = %e,
                    "Error refreshing artist metadata"
                );
                Ok(())
            }
        }
    }

    /// Refresh `item_id` now, bypassing the queue, with a full refresh.
    pub async fn refresh_full_item(&self, item_id: ItemId, cancel: &CancellationToken) -> Result<()> {
        let item = self
            .library()
            .get_item_by_id(item_id)
            .ok_or_else(|| Error::not_found("item", item_id))?;
        info!(item_id = %item.id, item = %item.name, "Running full refresh");
        self.refresh_item(&item, &MetadataRefreshOptions::full_refresh(), cancel)
            .await
    }

    /// Progress sink that forwards validation progress to the tracker.
    fn progress_reporter(&self, item: &BaseItem) -> ProgressReporter {
        let tracker = Arc::clone(self.tracker());
        let item = item.clone();
        ProgressReporter::new(move |progress| {
            if let Err(e) = tracker.on_refresh_progress(&item, progress) {
                debug!(item_id = %item.id, error = %e, "Dropped refresh progress");
            }
        })
    }
}

#[async_trait]
impl RefreshWorker for ProviderManager {
    fn resolve(&self, item_id: ItemId) -> Option<BaseItem> {
        self.library().get_item_by_id(item_id)
    }

    async fn refresh_item(
        &self,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ProviderManager::refresh_item(self, item, options, cancel).await
    }

    async fn refresh_artist(
        &self,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ProviderManager::refresh_artist(self, item, options, cancel).await
    }
}
