//! Curator-Common: Shared types, identifiers, and the library item model.
//!
//! This crate provides common functionality used across curator:
//!
//! - **Typed IDs**: Type-safe UUID wrapper for items
//! - **Core Types**: Item kinds, image types, refresh modes and priorities
//! - **Item Model**: [`BaseItem`] and the provider-id bag it carries
//! - **Refresh Options**: [`MetadataRefreshOptions`] passed through a refresh
//! - **Path Utilities**: Image MIME detection by extension
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use curator_common::{BaseItem, Error, ItemKind, MetadataRefreshOptions, Result};
//!
//! let item = BaseItem::new(ItemKind::Movie, "Interstellar");
//! assert!(!item.is_locked);
//!
//! let options = MetadataRefreshOptions::full_refresh();
//! assert!(options.replace_all_metadata);
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("item", "abc"))
//! }
//! assert!(example().is_err());
//! ```

pub mod error;
pub mod ids;
pub mod item;
pub mod options;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use item::*;
pub use options::*;
pub use types::*;
