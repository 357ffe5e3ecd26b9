//! Library item model shared by the refresh core and its collaborators.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ItemId;
use crate::types::{ImageType, ItemKind};

/// Bag of external provider identifiers keyed by provider key
/// (e.g. `{"Tmdb": "12345", "Imdb": "tt1234567"}`).
///
/// Key lookups are case-insensitive; the first spelling inserted is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderIds(BTreeMap<String, String>);

impl ProviderIds {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the id stored under `key`, ignoring key case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Whether an id is stored under `key`, ignoring key case.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.keys().any(|k| k.eq_ignore_ascii_case(key))
    }

    /// Store `value` under `key`, replacing any id stored under the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let existing = self
            .0
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&key))
            .cloned();
        self.0.insert(existing.unwrap_or(key), value.into());
    }

    /// Iterate over `(key, id)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of stored ids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no ids are stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `other` holds any key with an equal value (case-insensitive).
    pub fn shares_any(&self, other: &ProviderIds) -> bool {
        other
            .iter()
            .any(|(key, value)| matches!(self.get(key), Some(v) if v.eq_ignore_ascii_case(value)))
    }

    /// Copy ids from `other` whose keys are missing here.
    pub fn merge_missing(&mut self, other: &ProviderIds) {
        for (key, value) in other.iter() {
            if !self.contains_key(key) {
                self.set(key, value);
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProviderIds {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut ids = ProviderIds::new();
        for (k, v) in iter {
            ids.set(k, v);
        }
        ids
    }
}

/// An image recorded on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemImage {
    /// Local path or remote URL of the image.
    pub path: String,
    /// What the image depicts.
    pub image_type: ImageType,
    /// Image width in pixels, if known.
    pub width: Option<u32>,
    /// Image height in pixels, if known.
    pub height: Option<u32>,
}

/// A node in the media library hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseItem {
    pub id: ItemId,
    pub kind: ItemKind,
    pub name: String,
    /// Location on disk; `None` for virtual items (people, studios ...).
    pub path: Option<PathBuf>,
    pub parent_id: Option<ItemId>,
    /// Set for sub-items (e.g. embedded trailers) whose metadata lifecycle is
    /// controlled by another item.
    pub owner_id: Option<ItemId>,
    /// Locked items are only refreshed from local sources unless a full
    /// refresh is requested.
    pub is_locked: bool,
    pub provider_ids: ProviderIds,
    pub production_year: Option<i32>,
    pub premiere_date: Option<NaiveDate>,
    pub overview: Option<String>,
    pub genres: Vec<String>,
    pub community_rating: Option<f32>,
    pub images: Vec<ItemImage>,
    pub preferred_metadata_language: Option<String>,
    pub preferred_metadata_country_code: Option<String>,
    /// For albums: the artist grouping the album is filed under.
    pub music_artist_id: Option<ItemId>,
    pub date_last_refreshed: Option<DateTime<Utc>>,
}

impl BaseItem {
    /// Create a bare item of `kind` with a fresh id.
    pub fn new(kind: ItemKind, name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            kind,
            name: name.into(),
            path: None,
            parent_id: None,
            owner_id: None,
            is_locked: false,
            provider_ids: ProviderIds::new(),
            production_year: None,
            premiere_date: None,
            overview: None,
            genres: Vec::new(),
            community_rating: None,
            images: Vec::new(),
            preferred_metadata_language: None,
            preferred_metadata_country_code: None,
            music_artist_id: None,
            date_last_refreshed: None,
        }
    }

    /// Set the on-disk path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the parent item.
    #[must_use]
    pub fn with_parent(mut self, parent_id: ItemId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Whether the item is a container whose children can be validated.
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Whether the item is a sub-item owned by another item.
    pub fn is_owned(&self) -> bool {
        self.owner_id.is_some()
    }

    /// Whether local metadata files (nfo, xml ...) can exist for the item.
    pub fn supports_local_metadata(&self) -> bool {
        self.path.is_some()
    }

    /// Whether an image of `image_type` is already recorded.
    pub fn has_image(&self, image_type: ImageType) -> bool {
        self.images.iter().any(|i| i.image_type == image_type)
    }

    /// Record `image`, replacing an existing image of the same type.
    pub fn set_image(&mut self, image: ItemImage) {
        self.images.retain(|i| i.image_type != image.image_type);
        self.images.push(image);
    }
}
