//! Core type definitions for items, images and refresh scheduling.
//!
//! This module defines enums used throughout curator for categorizing
//! library items and images and for describing how deep a refresh goes.
//! All enums are serialized in lowercase so they read naturally in TOML
//! configuration files.

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of library item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A single movie.
    Movie,
    /// A trailer, usually owned by a movie or series.
    Trailer,
    /// A set of movies.
    BoxSet,
    /// A TV series (show).
    Series,
    /// A season within a series.
    Season,
    /// A single episode within a season.
    Episode,
    /// A music album.
    MusicAlbum,
    /// A music artist.
    MusicArtist,
    /// An audio track.
    Audio,
    /// An audio book.
    AudioBook,
    /// A book.
    Book,
    /// A music video.
    MusicVideo,
    /// A generic video.
    Video,
    /// A person (actor, director, ...).
    Person,
    /// A studio or network.
    Studio,
    /// A plain folder on disk.
    Folder,
    /// A library root grouping one or more physical folders.
    CollectionFolder,
}

impl ItemKind {
    /// Kinds listed by the metadata plugin summary, in display order.
    pub const SUMMARY_KINDS: [ItemKind; 13] = [
        ItemKind::Movie,
        ItemKind::BoxSet,
        ItemKind::Book,
        ItemKind::Series,
        ItemKind::Season,
        ItemKind::Episode,
        ItemKind::MusicAlbum,
        ItemKind::MusicArtist,
        ItemKind::Audio,
        ItemKind::AudioBook,
        ItemKind::Studio,
        ItemKind::MusicVideo,
        ItemKind::Video,
    ];

    /// Whether items of this kind hold children that can be validated.
    pub fn is_folder(self) -> bool {
        matches!(
            self,
            Self::Folder
                | Self::CollectionFolder
                | Self::BoxSet
                | Self::Series
                | Self::Season
                | Self::MusicAlbum
                | Self::MusicArtist
        )
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Movie => "movie",
            Self::Trailer => "trailer",
            Self::BoxSet => "boxset",
            Self::Series => "series",
            Self::Season => "season",
            Self::Episode => "episode",
            Self::MusicAlbum => "musicalbum",
            Self::MusicArtist => "musicartist",
            Self::Audio => "audio",
            Self::AudioBook => "audiobook",
            Self::Book => "book",
            Self::MusicVideo => "musicvideo",
            Self::Video => "video",
            Self::Person => "person",
            Self::Studio => "studio",
            Self::Folder => "folder",
            Self::CollectionFolder => "collectionfolder",
        };
        f.write_str(name)
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "trailer" => Ok(Self::Trailer),
            "boxset" => Ok(Self::BoxSet),
            "series" => Ok(Self::Series),
            "season" => Ok(Self::Season),
            "episode" => Ok(Self::Episode),
            "musicalbum" => Ok(Self::MusicAlbum),
            "musicartist" => Ok(Self::MusicArtist),
            "audio" => Ok(Self::Audio),
            "audiobook" => Ok(Self::AudioBook),
            "book" => Ok(Self::Book),
            "musicvideo" => Ok(Self::MusicVideo),
            "video" => Ok(Self::Video),
            "person" => Ok(Self::Person),
            "studio" => Ok(Self::Studio),
            "folder" => Ok(Self::Folder),
            "collectionfolder" => Ok(Self::CollectionFolder),
            _ => Err(Error::Validation(format!("unknown item kind: {s}"))),
        }
    }
}

/// Type of item image/artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// Primary poster/thumbnail image.
    Primary,
    /// Box art image.
    Art,
    /// Background/backdrop image.
    Backdrop,
    /// Banner image.
    Banner,
    /// Logo image.
    Logo,
    /// Thumbnail image.
    Thumb,
    /// Disc art image.
    Disc,
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Art => write!(f, "art"),
            Self::Backdrop => write!(f, "backdrop"),
            Self::Banner => write!(f, "banner"),
            Self::Logo => write!(f, "logo"),
            Self::Thumb => write!(f, "thumb"),
            Self::Disc => write!(f, "disc"),
        }
    }
}

/// How deep a metadata or image refresh goes.
///
/// Variants are ordered: `None < ValidationOnly < Default < FullRefresh`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetadataRefreshMode {
    /// Do not touch metadata/images at all.
    None,
    /// Only check that what is recorded still exists.
    ValidationOnly,
    /// Fill in what is missing.
    #[default]
    Default,
    /// Re-fetch everything from every applicable provider.
    FullRefresh,
}

/// Scheduling priority of a queued refresh.
///
/// Lower discriminant is served first, so the derived ordering puts `High`
/// before `Normal` before `Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPriority {
    High = 0,
    #[default]
    Normal = 1,
    Low = 2,
}

impl fmt::Display for RefreshPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// A single kind of change produced by a refresh.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemUpdateFlag {
    /// Metadata was read from local files.
    MetadataImport = 1,
    /// One or more images were added or replaced.
    ImageUpdate = 2,
    /// Metadata was downloaded from a remote provider.
    MetadataDownload = 4,
    /// Metadata was edited by a user.
    MetadataEdit = 8,
}

/// Set of changes produced by a refresh; empty means nothing changed.
pub type ItemUpdateType = BitFlags<ItemUpdateFlag>;

/// Whether `update` reaches at least the strength of `flag`.
///
/// Flags are ordered by their bit value, with `MetadataEdit` the strongest.
pub fn update_at_least(update: ItemUpdateType, flag: ItemUpdateFlag) -> bool {
    update.bits() >= flag as u8
}
