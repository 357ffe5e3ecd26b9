//! Remote search across metadata providers and external-id links.

use std::sync::Arc;

use curator_common::{BaseItem, Error, Result};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::manager::ProviderManager;
use super::provider::{
    ExternalIdInfo, ExternalIdProvider, ExternalUrl, RemoteSearchQuery, RemoteSearchResult,
};
use crate::config::LibraryOptions;

/// Merge per-provider result lists, in provider order.
///
/// A result sharing any external id (same key, same value, ignoring case)
/// with an already accepted result is folded into it: ids it lacks are
/// copied over and an empty image URL is filled in. Every result is stamped
/// with the provider that produced it.
///
/// One shared id is enough to merge, so two distinct titles that happen to
/// share a single id are merged too.
pub fn merge_search_results(
    batches: Vec<(String, Vec<RemoteSearchResult>)>,
) -> Vec<RemoteSearchResult> {
    let mut merged: Vec<RemoteSearchResult> = Vec::new();

    for (provider_name, results) in batches {
        for mut result in results {
            result.search_provider_name = Some(provider_name.clone());

            match merged
                .iter_mut()
                .find(|kept| kept.provider_ids.shares_any(&result.provider_ids))
            {
                Some(kept) => {
                    kept.provider_ids.merge_missing(&result.provider_ids);
                    if kept.image_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                        kept.image_url = result.image_url;
                    }
                }
                None => merged.push(result),
            }
        }
    }

    merged
}

impl ProviderManager {
    /// Search every remote-search-capable provider for `query`.
    ///
    /// Providers run concurrently. A failing provider is logged and
    /// contributes nothing.
    pub async fn remote_search_results(
        &self,
        query: &RemoteSearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteSearchResult>> {
        let live = query
            .item_id
            .and_then(|id| self.library().get_item_by_id(id));
        let (reference, library_options) = match live {
            Some(item) => {
                let options = self.library().get_library_options(&item);
                (item, options)
            }
            None => (self.dummy_item(query.kind), LibraryOptions::default()),
        };

        let providers: Vec<_> = self
            .metadata_providers_for(
                &reference,
                &library_options,
                query.include_disabled_providers,
                false,
            )
            .into_iter()
            .filter(|p| p.as_search().is_some())
            .filter(|p| {
                query
                    .search_provider_name
                    .as_deref()
                    .map_or(true, |name| p.name().eq_ignore_ascii_case(name))
            })
            .collect();

        let mut info = query.search_info.clone();
        if info
            .metadata_language
            .as_deref()
            .map_or(true, |l| l.trim().is_empty())
        {
            info.metadata_language = Some(self.config().metadata.preferred_language.clone());
        }
        if info
            .metadata_country_code
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
        {
            info.metadata_country_code = Some(self.config().metadata.country_code.clone());
        }

        debug!(
            kind = %query.kind,
            name = %info.name,
            providers = providers.len(),
            "Running remote search"
        );

        let info = &info;
        let searches = providers.iter().map(|provider| async move {
            let result = match provider.as_search() {
                Some(search) => search.search(info, cancel).await,
                None => Ok(Vec::new()),
            };
            (provider.name().to_string(), result)
        });

        let mut batches = Vec::new();
        for (name, result) in join_all(searches).await {
            match result {
                Ok(results) => batches.push((name, results)),
                Err(e) => warn!(
                    provider = %name,
                    kind = %query.kind,
                    error = %format!("{e:#}"),
                    "Remote search failed"
                ),
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        Ok(merge_search_results(batches))
    }

    /// External-id kinds that apply to `item`.
    pub fn external_id_infos(&self, item: &BaseItem) -> Vec<ExternalIdInfo> {
        self.supported_external_ids(item)
            .into_iter()
            .map(|p| ExternalIdInfo {
                name: p.provider_name().to_string(),
                key: p.key().to_string(),
                url_format: p.url_format().map(str::to_string),
            })
            .collect()
    }

    /// Links to `item` on every external site it has an id for.
    pub fn external_urls(&self, item: &BaseItem) -> Vec<ExternalUrl> {
        self.supported_external_ids(item)
            .into_iter()
            .filter_map(|p| {
                let format = p.url_format()?;
                let id = item.provider_ids.get(p.key())?;
                Some(ExternalUrl {
                    name: p.provider_name().to_string(),
                    url: format.replace("{0}", id),
                })
            })
            .collect()
    }

    fn supported_external_ids(&self, item: &BaseItem) -> Vec<Arc<dyn ExternalIdProvider>> {
        self.registry()
            .snapshot()
            .external_ids
            .iter()
            .filter(|p| match p.supports(item) {
                Ok(supported) => supported,
                Err(e) => {
                    warn!(
                        provider = p.provider_name(),
                        item_id = %item.id,
                        error = %format!("{e:#}"),
                        "External id provider failed supports check"
                    );
                    false
                }
            })
            .cloned()
            .collect()
    }
}
