//! Remote image handling: response validation, HTTP fetch, candidate ordering
//! and the manager operations built on them.

use anyhow::Context;
use bytes::Bytes;
use curator_common::paths::image_mime_type;
use curator_common::{
    BaseItem, Error, ImageType, ItemImage, ItemUpdateFlag, MetadataRefreshOptions, Result,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::manager::ProviderManager;
use super::provider::{ImageProviderKind, ImageResponse, RemoteImageInfo};

/// Marker in image-cache URLs served without a content type.
const IMAGE_CACHE_SEGMENT: &str = "/imagecache/";

/// Filter for [`ProviderManager::available_remote_images`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteImageQuery {
    /// Only ask this provider.
    pub provider_name: Option<String>,
    /// Only images of this type.
    pub image_type: Option<ImageType>,
    /// Keep images in every language, not only the preferred one.
    pub include_all_languages: bool,
}

/// Check that a response for `url` really carries an image and return its
/// MIME type.
///
/// HTML bodies and unusable types are rejected with [`Error::InvalidImage`].
/// A missing type is accepted as PNG for image-cache URLs only; a generic or
/// non-image type falls back to the type implied by the URL's extension.
pub fn validate_image_response(url: &str, content_type: Option<&str>) -> Result<String> {
    let content_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());

    let Some(content_type) = content_type else {
        if url.to_ascii_lowercase().contains(IMAGE_CACHE_SEGMENT) {
            return Ok("image/png".to_string());
        }
        return Err(Error::invalid_image(url, "content type not set"));
    };

    if content_type == "text/html" {
        return Err(Error::invalid_image(url, content_type));
    }

    if content_type.starts_with("image/") {
        return Ok(content_type);
    }

    image_mime_type(url)
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_image(url, content_type))
}

/// GET `url` and return its body and reported content type.
pub async fn fetch_image(client: &reqwest::Client, url: &str) -> anyhow::Result<ImageResponse> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to request image {url}"))?
        .error_for_status()
        .with_context(|| format!("Image request failed for {url}"))?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let data: Bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read image body from {url}"))?;

    Ok(ImageResponse { content_type, data })
}

fn language_rank(image: &RemoteImageInfo, preferred: &str) -> u8 {
    match image.language.as_deref() {
        Some(lang) if lang.eq_ignore_ascii_case(preferred) => 0,
        None => 1,
        Some(_) => 2,
    }
}

/// Community rating, with missing and non-finite ratings counted as 0.
fn rating(image: &RemoteImageInfo) -> f64 {
    image.community_rating.filter(|r| r.is_finite()).unwrap_or(0.0)
}

/// Sort candidates: preferred language, then unlabelled, then the rest;
/// highest rated (then most voted) first within each group.
pub fn order_by_language(images: &mut [RemoteImageInfo], preferred_language: &str) {
    images.sort_by(|a, b| {
        language_rank(a, preferred_language)
            .cmp(&language_rank(b, preferred_language))
            .then_with(|| rating(b).total_cmp(&rating(a)))
            .then_with(|| b.vote_count.unwrap_or(0).cmp(&a.vote_count.unwrap_or(0)))
    });
}

impl ProviderManager {
    /// Fetch an image through the named provider, for search result previews.
    pub async fn remote_search_image(
        &self,
        provider_name: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageResponse> {
        let provider = self
            .registry()
            .image_provider(provider_name)
            .ok_or_else(|| Error::not_found("image provider", provider_name))?;

        let response = provider
            .get_image_response(url, cancel)
            .await
            .map_err(|e| Error::provider(provider.name(), format!("{e:#}")))?;
        let mime = validate_image_response(url, response.content_type.as_deref())?;

        Ok(ImageResponse {
            content_type: Some(mime),
            data: response.data,
        })
    }

    /// Images remote providers offer for `item`, best candidates first.
    ///
    /// Providers are asked concurrently; a failing provider contributes
    /// nothing.
    pub async fn available_remote_images(
        &self,
        item: &BaseItem,
        query: &RemoteImageQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteImageInfo>> {
        let providers: Vec<_> = self
            .image_providers_for(item, &MetadataRefreshOptions::full_refresh(), true)
            .into_iter()
            .filter(|p| p.kind() == ImageProviderKind::Remote)
            .filter(|p| {
                query
                    .provider_name
                    .as_deref()
                    .map_or(true, |name| p.name().eq_ignore_ascii_case(name))
            })
            .filter(|p| {
                query
                    .image_type
                    .map_or(true, |t| p.supported_images(item).contains(&t))
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let lookups = providers.iter().map(|provider| async move {
            (provider.name(), provider.get_images(item, cancel).await)
        });

        let mut images = Vec::new();
        for (name, result) in join_all(lookups).await {
            match result {
                Ok(found) => images.extend(found),
                Err(e) => warn!(
                    provider = name,
                    item_id = %item.id,
                    error = %format!("{e:#}"),
                    "Image provider failed to list images"
                ),
            }
        }

        let preferred = self.preferred_language(item);
        images.retain(|image| {
            query.image_type.map_or(true, |t| image.image_type == t)
                && (query.include_all_languages
                    || image
                        .language
                        .as_deref()
                        .map_or(true, |l| l.eq_ignore_ascii_case(&preferred)))
        });
        order_by_language(&mut images, &preferred);
        Ok(images)
    }

    /// Download `url` over HTTP and store it as `item`'s `image_type` image.
    pub async fn save_image_from_url(
        &self,
        item: &BaseItem,
        url: &str,
        image_type: ImageType,
        cancel: &CancellationToken,
    ) -> Result<ItemImage> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = fetch_image(self.http(), url) => response,
        }
        .map_err(|e| Error::provider("http", format!("{e:#}")))?;

        let mime = validate_image_response(url, response.content_type.as_deref())?;
        let image = self
            .image_store()
            .save_image(item, image_type, &mime, response.data, cancel)
            .await
            .map_err(|e| Error::Internal(format!("saving image: {e:#}")))?;

        let mut updated = item.clone();
        updated.set_image(image.clone());
        self.library()
            .update_item(&updated, ItemUpdateFlag::ImageUpdate.into())
            .await
            .map_err(|e| Error::Internal(format!("updating item: {e:#}")))?;

        debug!(item_id = %item.id, image_type = ?image_type, url, "Saved image from url");
        Ok(image)
    }
}
