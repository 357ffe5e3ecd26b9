//! Default [`MetadataService`]: runs the selected providers for an item,
//! merges what they return, fetches missing images and persists the result.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use curator_common::{
    BaseItem, Error, ImageType, ItemImage, ItemKind, ItemUpdateFlag, ItemUpdateType,
    MetadataRefreshMode, MetadataRefreshOptions, Result,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::images::{order_by_language, validate_image_response};
use super::manager::ProviderManager;
use super::provider::{
    ImageProvider, ImageProviderKind, ItemLookupInfo, MetadataProviderKind, MetadataResult,
    MetadataService, RemoteImageInfo,
};

/// Refreshes items by orchestrating the registered providers.
///
/// Built for a set of kinds it is the dedicated service for them; built with
/// [`generic`](Self::generic) it refreshes any item no dedicated service
/// claims.
pub struct ItemMetadataService {
    kinds: Vec<ItemKind>,
    order: i32,
}

impl ItemMetadataService {
    /// Dedicated service for `kinds`.
    pub fn new(kinds: impl IntoIterator<Item = ItemKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            order: 0,
        }
    }

    /// Fallback service for every kind.
    pub fn generic() -> Self {
        Self {
            kinds: Vec::new(),
            order: i32::MAX,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn merge_option<T: Clone + PartialEq>(target: &mut Option<T>, source: &Option<T>, overwrite: bool) -> bool {
    match source {
        Some(value) if (overwrite || target.is_none()) && target.as_ref() != Some(value) => {
            *target = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// Fold `result` into `item`. Empty fields are filled; populated fields are
/// only replaced when `overwrite` is set. Returns whether anything changed.
fn apply_metadata(item: &mut BaseItem, result: &MetadataResult, overwrite: bool) -> bool {
    let mut changed = false;

    if let Some(name) = result.name.as_deref().filter(|n| !n.trim().is_empty()) {
        if (overwrite || item.name.trim().is_empty()) && item.name != name {
            item.name = name.to_string();
            changed = true;
        }
    }

    changed |= merge_option(&mut item.overview, &result.overview, overwrite);
    changed |= merge_option(&mut item.production_year, &result.production_year, overwrite);
    changed |= merge_option(&mut item.premiere_date, &result.premiere_date, overwrite);
    changed |= merge_option(&mut item.community_rating, &result.community_rating, overwrite);

    if !result.genres.is_empty()
        && (overwrite || item.genres.is_empty())
        && item.genres != result.genres
    {
        item.genres = result.genres.clone();
        changed = true;
    }

    for (key, value) in result.provider_ids.iter() {
        if value.is_empty() {
            continue;
        }
        let current = item.provider_ids.get(key);
        if current.is_none() || (overwrite && current != Some(value)) {
            item.provider_ids.set(key, value);
            changed = true;
        }
    }

    changed
}

fn pick_best(
    candidates: &[RemoteImageInfo],
    image_type: ImageType,
    preferred_language: &str,
) -> Option<RemoteImageInfo> {
    let mut matching: Vec<RemoteImageInfo> = candidates
        .iter()
        .filter(|c| c.image_type == image_type)
        .cloned()
        .collect();
    order_by_language(&mut matching, preferred_language);
    matching.into_iter().next()
}

impl ItemMetadataService {
    async fn refresh_from_providers(
        &self,
        manager: &ProviderManager,
        item: &mut BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<ItemUpdateType> {
        let library_options = manager.library().get_library_options(item);
        let providers = manager.metadata_providers_for(item, &library_options, false, false);

        let mut info = ItemLookupInfo::from_item(item);
        info.metadata_language = Some(manager.preferred_language(item));
        info.metadata_country_code = Some(manager.preferred_country_code(item));
        info.is_automated = options.is_automated;

        let mut update = ItemUpdateType::empty();
        let mut overwrite = options.replace_all_metadata && !item.is_locked;
        let mut found_local = false;

        let run_remote = |found_local: bool| {
            !found_local
                || options.metadata_refresh_mode == MetadataRefreshMode::FullRefresh
                || options.replace_all_metadata
        };

        for phase in [
            MetadataProviderKind::Local,
            MetadataProviderKind::Remote,
            MetadataProviderKind::Forced,
            MetadataProviderKind::Custom,
        ] {
            if phase == MetadataProviderKind::Remote && !run_remote(found_local) {
                debug!(item_id = %item.id, "Local metadata found; skipping remote providers");
                continue;
            }

            for provider in providers.iter().filter(|p| p.kind() == phase) {
                check_cancelled(cancel)?;

                let result = match provider.fetch(&info, cancel).await {
                    Ok(result) => result,
                    Err(e) => {
                        check_cancelled(cancel)?;
                        warn!(
                            provider = provider.name(),
                            item_id = %item.id,
                            item = %item.name,
                            error = %format!("{e:#}"),
                            "Metadata provider failed"
                        );
                        continue;
                    }
                };
                if !result.has_metadata() {
                    continue;
                }

                let changed = apply_metadata(item, &result, overwrite);
                info.provider_ids.merge_missing(&result.provider_ids);
                // Only the first provider with data may overwrite.
                overwrite = false;

                match phase {
                    MetadataProviderKind::Local => {
                        found_local = true;
                        update |= ItemUpdateFlag::MetadataImport;
                    }
                    MetadataProviderKind::Remote if changed => {
                        update |= ItemUpdateFlag::MetadataDownload;
                    }
                    _ if changed => update |= ItemUpdateFlag::MetadataImport,
                    _ => {}
                }
            }
        }

        Ok(update)
    }

    async fn refresh_images(
        &self,
        manager: &ProviderManager,
        item: &mut BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<ItemUpdateType> {
        let providers = manager.image_providers_for(item, options, false);
        let preferred_language = manager.preferred_language(item);
        let mut filled: HashSet<ImageType> = HashSet::new();
        let mut changed = false;

        for provider in &providers {
            check_cancelled(cancel)?;

            let wanted: Vec<ImageType> = provider
                .supported_images(item)
                .into_iter()
                .filter(|t| !filled.contains(t) && (!item.has_image(*t) || options.is_replacing_image(*t)))
                .collect();
            if wanted.is_empty() {
                continue;
            }

            let outcome = match provider.kind() {
                ImageProviderKind::Local => {
                    self.record_local_images(provider.as_ref(), item, &wanted, cancel)
                        .await
                }
                ImageProviderKind::Dynamic => {
                    self.generate_images(manager, provider.as_ref(), item, &wanted, cancel)
                        .await
                }
                ImageProviderKind::Remote => {
                    self.download_images(
                        manager,
                        provider.as_ref(),
                        item,
                        &wanted,
                        &preferred_language,
                        cancel,
                    )
                    .await
                }
            };

            match outcome {
                Ok(saved) => {
                    changed |= !saved.is_empty();
                    filled.extend(saved);
                }
                Err(e) => {
                    check_cancelled(cancel)?;
                    warn!(
                        provider = provider.name(),
                        item_id = %item.id,
                        item = %item.name,
                        error = %format!("{e:#}"),
                        "Image provider failed"
                    );
                }
            }
        }

        Ok(if changed {
            ItemUpdateFlag::ImageUpdate.into()
        } else {
            ItemUpdateType::empty()
        })
    }

    async fn record_local_images(
        &self,
        provider: &dyn ImageProvider,
        item: &mut BaseItem,
        wanted: &[ImageType],
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<ImageType>> {
        let mut saved = Vec::new();
        for image in provider.get_images(item, cancel).await? {
            if !wanted.contains(&image.image_type) || saved.contains(&image.image_type) {
                continue;
            }
            item.set_image(ItemImage {
                path: image.url,
                image_type: image.image_type,
                width: image.width,
                height: image.height,
            });
            saved.push(image.image_type);
        }
        Ok(saved)
    }

    async fn generate_images(
        &self,
        manager: &ProviderManager,
        provider: &dyn ImageProvider,
        item: &mut BaseItem,
        wanted: &[ImageType],
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<ImageType>> {
        let mut saved = Vec::new();
        for image_type in wanted {
            let Some(response) = provider.generate_image(item, *image_type, cancel).await? else {
                continue;
            };
            let mime = response
                .content_type
                .clone()
                .unwrap_or_else(|| "image/png".to_string());
            let image = manager
                .image_store()
                .save_image(item, *image_type, &mime, response.data, cancel)
                .await?;
            item.set_image(image);
            saved.push(*image_type);
        }
        Ok(saved)
    }

    async fn download_images(
        &self,
        manager: &ProviderManager,
        provider: &dyn ImageProvider,
        item: &mut BaseItem,
        wanted: &[ImageType],
        preferred_language: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<ImageType>> {
        let candidates = provider.get_images(item, cancel).await?;
        let mut saved = Vec::new();

        for image_type in wanted {
            let Some(best) = pick_best(&candidates, *image_type, preferred_language) else {
                continue;
            };

            let response = match provider.get_image_response(&best.url, cancel).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        url = %best.url,
                        error = %format!("{e:#}"),
                        "Failed to download image"
                    );
                    continue;
                }
            };
            let mime = match validate_image_response(&best.url, response.content_type.as_deref()) {
                Ok(mime) => mime,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Discarding invalid image");
                    continue;
                }
            };

            let mut image = manager
                .image_store()
                .save_image(item, *image_type, &mime, response.data, cancel)
                .await?;
            image.width = image.width.or(best.width);
            image.height = image.height.or(best.height);
            item.set_image(image);
            saved.push(*image_type);
        }
        Ok(saved)
    }
}

#[async_trait]
impl MetadataService for ItemMetadataService {
    fn order(&self) -> i32 {
        self.order
    }

    fn can_refresh_primary(&self, kind: ItemKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn can_refresh(&self, item: &BaseItem) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&item.kind)
    }

    async fn refresh_metadata(
        &self,
        manager: &ProviderManager,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<ItemUpdateType> {
        let mut updated = item.clone();
        let mut update = ItemUpdateType::empty();

        if options.fetches_metadata() {
            update |= self
                .refresh_from_providers(manager, &mut updated, options, cancel)
                .await?;
        }
        if options.fetches_images() {
            update |= self
                .refresh_images(manager, &mut updated, options, cancel)
                .await?;
        }

        if update.is_empty() && !options.force_save {
            return Ok(update);
        }

        updated.date_last_refreshed = Some(Utc::now());
        manager
            .library()
            .update_item(&updated, update)
            .await
            .map_err(|e| Error::Internal(format!("updating item {}: {e:#}", updated.id)))?;
        manager.save_metadata(&updated, update, cancel).await?;

        Ok(update)
    }
}
