//! Curator - metadata and image refresh orchestration for media libraries
//!
//! Hosts supply a [`library::LibraryManager`] and an [`library::ImageStore`],
//! register providers on a [`metadata::ProviderManager`] and queue refreshes.

pub mod config;
pub mod events;
pub mod library;
pub mod logging;
pub mod metadata;

pub use curator_common::{Error, Result};
pub use metadata::ProviderManager;
