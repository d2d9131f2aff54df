//! Data models for the resolver
//!
//! Catalog records produced by the catalog resolver, the episode descriptor
//! handed to stream resolution, the stream/subtitle outputs, and the JSON
//! wrappers used by the REST surface.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Sub (original audio + subtitles) or Dub (dubbed audio)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LanguageVariant {
    Sub,
    Dub,
}

impl LanguageVariant {
    /// Value the player bootstrap expects (`sub` / `dub`)
    pub fn as_lang(&self) -> &'static str {
        match self {
            LanguageVariant::Sub => "sub",
            LanguageVariant::Dub => "dub",
        }
    }

    /// Suffix used in stream labels
    pub fn label(&self) -> &'static str {
        match self {
            LanguageVariant::Sub => "Subbed",
            LanguageVariant::Dub => "Dubbed",
        }
    }
}

impl fmt::Display for LanguageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_lang())
    }
}

/// Which language variants a catalog entry advertises
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LanguageAvailability {
    pub has_sub: bool,
    pub has_dub: bool,
    /// `None` when the badge is absent, which is not the same as zero
    pub sub_episode_count: Option<u32>,
    pub dub_episode_count: Option<u32>,
}

impl LanguageAvailability {
    /// Availability derived from the sub/dub badge counters of a listing row
    pub fn from_counts(sub: Option<u32>, dub: Option<u32>) -> Self {
        Self {
            has_sub: sub.is_some(),
            has_dub: dub.is_some(),
            sub_episode_count: sub,
            dub_episode_count: dub,
        }
    }

    /// Availability guessed from a `(Dub)` marker in the title
    pub fn from_title(title: &str) -> Self {
        let dubbed = title.to_lowercase().contains("(dub)");
        Self {
            has_sub: !dubbed,
            has_dub: dubbed,
            sub_episode_count: None,
            dub_episode_count: None,
        }
    }
}

/// A title as it appears in a listing or search page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub title: String,
    /// Site-relative or absolute link to the detail page
    pub detail_url: String,
    pub poster_url: Option<String>,
    pub availability: LanguageAvailability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SeriesStatus {
    Ongoing,
    Completed,
    Unknown,
}

impl SeriesStatus {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("Releasing") => SeriesStatus::Ongoing,
            Some("Completed") => SeriesStatus::Completed,
            _ => SeriesStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SeriesKind {
    Series,
    Movie,
}

impl SeriesKind {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(l) if l.eq_ignore_ascii_case("movie") => SeriesKind::Movie,
            _ => SeriesKind::Series,
        }
    }
}

/// Everything the detail page says about a title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDetail {
    /// Site-internal numeric id, input of the episode-list token
    pub id: String,
    pub title: String,
    pub synopsis: Option<String>,
    pub poster_url: Option<String>,
    pub background_url: Option<String>,
    pub genres: Vec<String>,
    /// Source score multiplied by 1000
    pub rating: Option<i32>,
    pub status: SeriesStatus,
    pub kind: SeriesKind,
    pub duration_minutes: Option<u32>,
    pub recommendations: Vec<CatalogEntry>,
}

/// One (episode, language variant) pair
///
/// Passed opaquely between the catalog and stream resolution, so it round
/// trips through JSON untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeDescriptor {
    /// `None` for episodes addressed by a non-integer slug
    pub number: Option<u32>,
    pub title: Option<String>,
    pub episode_url: String,
    pub language_variant: LanguageVariant,
}

/// Result of loading a detail page and its episode list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadedSeries {
    pub detail: SeriesDetail,
    pub episodes: Vec<EpisodeDescriptor>,
}

impl LoadedSeries {
    pub fn sub_episodes(&self) -> impl Iterator<Item = &EpisodeDescriptor> {
        self.variant(LanguageVariant::Sub)
    }

    pub fn dub_episodes(&self) -> impl Iterator<Item = &EpisodeDescriptor> {
        self.variant(LanguageVariant::Dub)
    }

    fn variant(&self, variant: LanguageVariant) -> impl Iterator<Item = &EpisodeDescriptor> {
        self.episodes
            .iter()
            .filter(move |e| e.language_variant == variant)
    }
}

/// Video host behind a resolved player URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MirrorKind {
    Vidstream,
    Mcloud,
}

impl MirrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            MirrorKind::Vidstream => "Vidstream",
            MirrorKind::Mcloud => "Mcloud",
        }
    }
}

/// Manifest location produced by the host interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    pub mirror_kind: MirrorKind,
    pub manifest_url: String,
    /// Empty when the mirror does not need one
    pub referer: String,
    pub language_variant: LanguageVariant,
    /// Playlist body already downloaded while following the player URL
    pub manifest_body: Option<String>,
}

impl ResolvedHost {
    /// `"{Mirror} {Dubbed|Subbed}"`
    pub fn label(&self) -> String {
        format!("{} {}", self.mirror_kind.name(), self.language_variant.label())
    }
}

/// Ranking key for a stream
///
/// Ordered by height, then by advertised bandwidth. A missing component
/// sorts below every known value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub struct Quality {
    pub height: Option<u32>,
    pub bandwidth: Option<u64>,
}

impl Quality {
    pub const UNKNOWN: Quality = Quality {
        height: None,
        bandwidth: None,
    };

    pub fn from_height(height: u32) -> Self {
        Self {
            height: Some(height),
            bandwidth: None,
        }
    }

    pub fn with_bandwidth(self, bandwidth: Option<u64>) -> Self {
        Self { bandwidth, ..self }
    }

    pub fn label(&self) -> String {
        match (self.height, self.bandwidth) {
            (Some(h), _) => format!("{}p", h),
            (None, Some(bps)) => format!("{} kbps", bps / 1000),
            (None, None) => "Unknown".to_string(),
        }
    }
}

/// A playable quality variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamVariant {
    pub label: String,
    pub url: String,
    pub referer: String,
    pub quality: Quality,
    pub is_manifest: bool,
}

/// A subtitle track keyed by language code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleDescriptor {
    pub language: String,
    pub name: Option<String>,
    pub url: String,
}

/// Home page section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Trending,
    UpdatedAll,
    UpdatedSub,
    UpdatedDub,
    UpdatedChina,
    Random,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Trending,
        Section::UpdatedAll,
        Section::UpdatedSub,
        Section::UpdatedDub,
        Section::UpdatedChina,
        Section::Random,
    ];

    /// Widget slug in `/ajax/home/widget/<slug>`
    pub fn slug(&self) -> &'static str {
        match self {
            Section::Trending => "trending",
            Section::UpdatedAll => "updated-all",
            Section::UpdatedSub => "updated-sub",
            Section::UpdatedDub => "updated-dub",
            Section::UpdatedChina => "updated-china",
            Section::Random => "random",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Section::Trending => "Trending",
            Section::UpdatedAll => "All",
            Section::UpdatedSub => "Recently Updated (SUB)",
            Section::UpdatedDub => "Recently Updated (DUB)",
            Section::UpdatedChina => "Recently Updated (Chinese)",
            Section::Random => "Random",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Section> {
        Section::ALL.into_iter().find(|s| s.slug() == slug)
    }
}

/// A home page section and the URL its pages are appended to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectionLink {
    pub section: Section,
    pub name: String,
    pub url: String,
}

/// Streams and subtitles resolved for one episode descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeLinks {
    pub streams: Vec<StreamVariant>,
    pub subtitles: Vec<SubtitleDescriptor>,
}

/// Generic API response wrapper for successful responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the operation was successful (always true for this type)
    pub success: bool,
    /// The response payload
    pub data: T,
    /// ISO timestamp of when data was fetched
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    /// Create a new successful API response with the current timestamp
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Whether the operation was successful (always false for errors)
    pub success: bool,
    /// Error message describing what went wrong
    pub error: String,
    /// ISO timestamp of when the error occurred
    pub timestamp: String,
}

impl ApiError {
    /// Create a new API error response with the current timestamp
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
