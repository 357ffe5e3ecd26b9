//! Decides which providers apply to an item, and in which order.
//!
//! Everything here is pure: the inputs are a provider snapshot plus the
//! library/global settings for the item's kind, the output is an ordered list.
//! Provider `supports` failures are logged and treated as "not supported".

use std::sync::Arc;

use curator_common::{
    update_at_least, BaseItem, ItemUpdateFlag, ItemUpdateType, MetadataRefreshMode,
    MetadataRefreshOptions,
};
use tracing::warn;

use super::provider::{
    ImageProvider, ImageProviderKind, MetadataProvider, MetadataProviderKind, MetadataSaver,
};
use crate::config::{LibraryOptions, MetadataOptions};

/// Position given to image providers that are local or not configured.
pub const UNCONFIGURED_IMAGE_ORDER: i32 = 100;

/// Position given to metadata providers missing from the configured order.
pub const UNCONFIGURED_METADATA_ORDER: i32 = i32::MAX;

fn contains_ignore_case(list: &[String], name: &str) -> bool {
    list.iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// Index of `name` in `order`, or `fallback` when absent.
pub fn configured_order(order: &[String], name: &str, fallback: i32) -> i32 {
    order
        .iter()
        .position(|n| n.eq_ignore_ascii_case(name))
        .and_then(|i| i32::try_from(i).ok())
        .unwrap_or(fallback)
}

/// Whether the image fetcher `name` is enabled for `item`.
///
/// A library type block for the item kind is authoritative; without one,
/// libraries that turn internet providers off disable every fetcher, and
/// otherwise the global per-kind disabled list applies.
pub fn is_image_fetcher_enabled(
    item: &BaseItem,
    library_options: &LibraryOptions,
    metadata_options: &MetadataOptions,
    name: &str,
) -> bool {
    if let Some(type_options) = library_options.type_options(item.kind) {
        return contains_ignore_case(&type_options.image_fetchers, name);
    }
    if !library_options.enable_internet_providers {
        return false;
    }
    !contains_ignore_case(&metadata_options.disabled_image_fetchers, name)
}

/// Whether the metadata fetcher `name` is enabled for `item`.
///
/// Same precedence as [`is_image_fetcher_enabled`].
pub fn is_metadata_fetcher_enabled(
    item: &BaseItem,
    library_options: &LibraryOptions,
    metadata_options: &MetadataOptions,
    name: &str,
) -> bool {
    if let Some(type_options) = library_options.type_options(item.kind) {
        return contains_ignore_case(&type_options.metadata_fetchers, name);
    }
    if !library_options.enable_internet_providers {
        return false;
    }
    !contains_ignore_case(&metadata_options.disabled_metadata_fetchers, name)
}

fn can_refresh_images(
    provider: &dyn ImageProvider,
    item: &BaseItem,
    library_options: &LibraryOptions,
    metadata_options: &MetadataOptions,
    refresh_options: &MetadataRefreshOptions,
    include_disabled: bool,
) -> bool {
    let kind = provider.kind();

    if !include_disabled {
        if item.is_locked
            && kind != ImageProviderKind::Local
            && refresh_options.image_refresh_mode != MetadataRefreshMode::FullRefresh
        {
            return false;
        }

        if matches!(kind, ImageProviderKind::Remote | ImageProviderKind::Dynamic)
            && !is_image_fetcher_enabled(item, library_options, metadata_options, provider.name())
        {
            return false;
        }
    }

    match provider.supports(item) {
        Ok(supported) => supported,
        Err(e) => {
            warn!(
                provider = provider.name(),
                item_id = %item.id,
                item = %item.name,
                error = %e,
                "Image provider failed supports check"
            );
            false
        }
    }
}

/// Image providers that apply to `item`, in fetch order.
pub fn image_providers(
    providers: &[Arc<dyn ImageProvider>],
    item: &BaseItem,
    library_options: &LibraryOptions,
    metadata_options: &MetadataOptions,
    refresh_options: &MetadataRefreshOptions,
    include_disabled: bool,
) -> Vec<Arc<dyn ImageProvider>> {
    let fetcher_order = library_options
        .type_options(item.kind)
        .map(|o| o.image_fetcher_order.as_slice())
        .unwrap_or(metadata_options.image_fetcher_order.as_slice());

    let mut selected: Vec<_> = providers
        .iter()
        .filter(|p| {
            can_refresh_images(
                p.as_ref(),
                item,
                library_options,
                metadata_options,
                refresh_options,
                include_disabled,
            )
        })
        .cloned()
        .collect();

    // Stable: registration order survives ties.
    selected.sort_by_key(|p| {
        let configured = match p.kind() {
            ImageProviderKind::Local => UNCONFIGURED_IMAGE_ORDER,
            _ => configured_order(fetcher_order, p.name(), UNCONFIGURED_IMAGE_ORDER),
        };
        (configured, p.order())
    });
    selected
}

fn can_refresh_metadata(
    provider: &dyn MetadataProvider,
    item: &BaseItem,
    library_options: &LibraryOptions,
    metadata_options: &MetadataOptions,
    include_disabled: bool,
    force_enable_internet: bool,
) -> bool {
    let kind = provider.kind();

    if !include_disabled {
        if item.is_locked
            && !matches!(kind, MetadataProviderKind::Local | MetadataProviderKind::Forced)
        {
            return false;
        }

        if kind == MetadataProviderKind::Remote
            && !force_enable_internet
            && !is_metadata_fetcher_enabled(item, library_options, metadata_options, provider.name())
        {
            return false;
        }
    }

    if kind == MetadataProviderKind::Local && !item.supports_local_metadata() {
        return false;
    }

    // Owned items (embedded trailers ...) follow their owner's metadata.
    if item.is_owned()
        && matches!(kind, MetadataProviderKind::Local | MetadataProviderKind::Remote)
    {
        return false;
    }

    true
}

/// Metadata providers that apply to `item`, in lookup order.
pub fn metadata_providers(
    providers: &[Arc<dyn MetadataProvider>],
    item: &BaseItem,
    library_options: &LibraryOptions,
    metadata_options: &MetadataOptions,
    include_disabled: bool,
    force_enable_internet: bool,
) -> Vec<Arc<dyn MetadataProvider>> {
    let reader_order = library_options
        .local_metadata_reader_order
        .as_deref()
        .unwrap_or(metadata_options.local_metadata_reader_order.as_slice());
    let fetcher_order = library_options
        .type_options(item.kind)
        .map(|o| o.metadata_fetcher_order.as_slice())
        .unwrap_or(metadata_options.metadata_fetcher_order.as_slice());

    let mut selected: Vec<_> = providers
        .iter()
        .filter(|p| p.handles(item.kind))
        .filter(|p| {
            can_refresh_metadata(
                p.as_ref(),
                item,
                library_options,
                metadata_options,
                include_disabled,
                force_enable_internet,
            )
        })
        .cloned()
        .collect();

    selected.sort_by_key(|p| {
        let configured = match p.kind() {
            MetadataProviderKind::Local => {
                configured_order(reader_order, p.name(), UNCONFIGURED_METADATA_ORDER)
            }
            MetadataProviderKind::Remote => {
                configured_order(fetcher_order, p.name(), UNCONFIGURED_METADATA_ORDER)
            }
            _ => UNCONFIGURED_METADATA_ORDER,
        };
        (configured, p.order())
    });
    selected
}

/// Whether `saver` should persist `item` after an update of `update`.
///
/// Without an explicit library saver list, savers listed as disabled for the
/// kind are skipped, and libraries that do not save local metadata only
/// persist downloaded or edited metadata.
pub fn is_saver_enabled_for_item(
    saver: &dyn MetadataSaver,
    item: &BaseItem,
    library_options: &LibraryOptions,
    metadata_options: &MetadataOptions,
    update: ItemUpdateType,
    include_disabled: bool,
) -> bool {
    if !item.supports_local_metadata() {
        return false;
    }

    match saver.is_enabled_for(item, update) {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) => {
            warn!(
                saver = saver.name(),
                item_id = %item.id,
                error = %e,
                "Metadata saver failed enablement check"
            );
            return false;
        }
    }

    if include_disabled {
        return true;
    }

    match &library_options.metadata_savers {
        Some(savers) => contains_ignore_case(savers, saver.name()),
        None => {
            !contains_ignore_case(&metadata_options.disabled_metadata_savers, saver.name())
                && (library_options.save_local_metadata
                    || update_at_least(update, ItemUpdateFlag::MetadataDownload))
        }
    }
}
