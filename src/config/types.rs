use curator_common::ItemKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Server-wide metadata settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    /// Language used for remote lookups when the item does not set one
    #[serde(default = "default_language")]
    pub preferred_language: String,

    /// Country used for remote lookups when the item does not set one
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Directory that synthetic lookup items pretend to live in
    #[serde(default = "default_internal_metadata_path")]
    pub internal_metadata_path: PathBuf,

    /// Per item-kind fetcher settings
    #[serde(default)]
    pub type_options: Vec<MetadataOptions>,
}

fn default_language() -> String {
    "en".to_string()
}
fn default_country_code() -> String {
    "US".to_string()
}
fn default_internal_metadata_path() -> PathBuf {
    PathBuf::from("./metadata")
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            preferred_language: default_language(),
            country_code: default_country_code(),
            internal_metadata_path: default_internal_metadata_path(),
            type_options: Vec::new(),
        }
    }
}

impl MetadataConfig {
    /// Options configured for `kind`, or an empty block if none are.
    pub fn metadata_options(&self, kind: ItemKind) -> MetadataOptions {
        self.type_options
            .iter()
            .find(|o| o.item_kind == kind)
            .cloned()
            .unwrap_or_else(|| MetadataOptions::for_kind(kind))
    }
}

/// Global fetcher settings for one item kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataOptions {
    pub item_kind: ItemKind,

    #[serde(default)]
    pub disabled_metadata_fetchers: Vec<String>,

    #[serde(default)]
    pub metadata_fetcher_order: Vec<String>,

    #[serde(default)]
    pub disabled_image_fetchers: Vec<String>,

    #[serde(default)]
    pub image_fetcher_order: Vec<String>,

    #[serde(default)]
    pub local_metadata_reader_order: Vec<String>,

    #[serde(default)]
    pub disabled_metadata_savers: Vec<String>,
}

impl MetadataOptions {
    /// An empty block for `kind`: nothing disabled, no explicit order.
    pub fn for_kind(item_kind: ItemKind) -> Self {
        Self {
            item_kind,
            disabled_metadata_fetchers: Vec::new(),
            metadata_fetcher_order: Vec::new(),
            disabled_image_fetchers: Vec::new(),
            image_fetcher_order: Vec::new(),
            local_metadata_reader_order: Vec::new(),
            disabled_metadata_savers: Vec::new(),
        }
    }
}

/// Per-library settings, supplied by the library collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryOptions {
    /// When `false`, remote fetchers are off unless a type block enables them
    #[serde(default = "default_true")]
    pub enable_internet_providers: bool,

    /// Write metadata next to media files
    #[serde(default)]
    pub save_local_metadata: bool,

    /// Overrides the global local reader order when set
    #[serde(default)]
    pub local_metadata_reader_order: Option<Vec<String>>,

    /// Explicit saver allow-list; `None` falls back to the global settings
    #[serde(default)]
    pub metadata_savers: Option<Vec<String>>,

    #[serde(default)]
    pub type_options: Vec<TypeOptions>,
}

fn default_true() -> bool {
    true
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            enable_internet_providers: true,
            save_local_metadata: false,
            local_metadata_reader_order: None,
            metadata_savers: None,
            type_options: Vec::new(),
        }
    }
}

impl LibraryOptions {
    /// The type block for `kind`, if the library defines one.
    pub fn type_options(&self, kind: ItemKind) -> Option<&TypeOptions> {
        self.type_options.iter().find(|o| o.item_kind == kind)
    }
}

/// Library-level fetcher allow-lists and ordering for one item kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TypeOptions {
    pub item_kind: ItemKind,

    #[serde(default)]
    pub metadata_fetchers: Vec<String>,

    #[serde(default)]
    pub metadata_fetcher_order: Vec<String>,

    #[serde(default)]
    pub image_fetchers: Vec<String>,

    #[serde(default)]
    pub image_fetcher_order: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Pause between two queued refreshes, in milliseconds
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

fn default_throttle_ms() -> u64 {
    100
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
        }
    }
}

impl RefreshConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}
