//! Options controlling how deep a single refresh goes.

use serde::{Deserialize, Serialize};

use crate::types::{ImageType, MetadataRefreshMode};

/// Configuration bag passed by value through the refresh call chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataRefreshOptions {
    pub metadata_refresh_mode: MetadataRefreshMode,
    pub image_refresh_mode: MetadataRefreshMode,
    /// Overwrite fields that already have values.
    pub replace_all_metadata: bool,
    /// Replace every image, not only missing ones.
    pub replace_all_images: bool,
    /// Replace only these image types (ignored when `replace_all_images`).
    pub replace_image_types: Vec<ImageType>,
    /// Persist the item even if nothing changed.
    pub force_save: bool,
    /// Set for refreshes started by scheduled tasks rather than a user.
    pub is_automated: bool,
}

impl Default for MetadataRefreshOptions {
    fn default() -> Self {
        Self {
            metadata_refresh_mode: MetadataRefreshMode::Default,
            image_refresh_mode: MetadataRefreshMode::Default,
            replace_all_metadata: false,
            replace_all_images: false,
            replace_image_types: Vec::new(),
            force_save: false,
            is_automated: false,
        }
    }
}

impl MetadataRefreshOptions {
    /// Re-fetch everything and replace existing values.
    pub fn full_refresh() -> Self {
        Self {
            metadata_refresh_mode: MetadataRefreshMode::FullRefresh,
            image_refresh_mode: MetadataRefreshMode::FullRefresh,
            replace_all_metadata: true,
            replace_all_images: true,
            ..Self::default()
        }
    }

    /// Only validate what is already recorded.
    pub fn validation_only() -> Self {
        Self {
            metadata_refresh_mode: MetadataRefreshMode::ValidationOnly,
            image_refresh_mode: MetadataRefreshMode::ValidationOnly,
            ..Self::default()
        }
    }

    /// Whether an existing image of `image_type` should be replaced.
    pub fn is_replacing_image(&self, image_type: ImageType) -> bool {
        self.image_refresh_mode == MetadataRefreshMode::FullRefresh
            && (self.replace_all_images || self.replace_image_types.contains(&image_type))
    }

    /// Whether metadata providers should be invoked at all.
    pub fn fetches_metadata(&self) -> bool {
        self.metadata_refresh_mode >= MetadataRefreshMode::Default
    }

    /// Whether image providers should be invoked at all.
    pub fn fetches_images(&self) -> bool {
        self.image_refresh_mode >= MetadataRefreshMode::Default
    }
}
