//! Stream normalizer
//!
//! Fetches a resolved host's manifest and turns it into playable quality
//! variants plus subtitle tracks. A master playlist yields one variant per
//! `#EXT-X-STREAM-INF`; a plain media playlist is itself the only variant.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::ProviderError;
use crate::models::{Quality, ResolvedHost, StreamVariant, SubtitleDescriptor};
use crate::scraper::{FetchRequest, HttpFetch};

lazy_static! {
    /// `KEY=value` or `KEY="quoted, value"` pairs of an HLS attribute list
    static ref ATTR_REGEX: Regex = Regex::new(r#"([A-Z0-9-]+)=("[^"]*"|[^,]*)"#).unwrap();
    /// `1280x720`
    static ref RESOLUTION_REGEX: Regex = Regex::new(r"^(\d+)x(\d+)$").unwrap();
    /// `720p` inside a variant name
    static ref NAME_HEIGHT_REGEX: Regex = Regex::new(r"(\d{3,4})[pP]").unwrap();
}

const STREAM_INF: &str = "#EXT-X-STREAM-INF:";
const MEDIA: &str = "#EXT-X-MEDIA:";

/// One `#EXT-X-STREAM-INF` entry of a master playlist
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestVariant {
    /// Absolute URI of the sub-playlist
    pub uri: String,
    pub bandwidth: Option<u64>,
    pub resolution: Option<(u32, u32)>,
    pub name: Option<String>,
}

impl ManifestVariant {
    /// Height from `RESOLUTION`, else from a `NNNp` name, with `BANDWIDTH`
    /// as the tie-breaker
    pub fn quality(&self) -> Quality {
        let height = self.resolution.map(|(_, height)| height).or_else(|| {
            self.name
                .as_deref()
                .and_then(|name| NAME_HEIGHT_REGEX.captures(name))
                .and_then(|caps| caps[1].parse().ok())
        });
        Quality {
            height,
            bandwidth: self.bandwidth,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedManifest {
    pub variants: Vec<ManifestVariant>,
    pub subtitles: Vec<SubtitleDescriptor>,
}

/// Streams and subtitles for one resolved host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedStreams {
    pub streams: Vec<StreamVariant>,
    pub subtitles: Vec<SubtitleDescriptor>,
}

fn parse_attributes(list: &str) -> HashMap<String, String> {
    ATTR_REGEX
        .captures_iter(list)
        .map(|caps| {
            let value = caps[2].trim_matches('"').to_string();
            (caps[1].to_string(), value)
        })
        .collect()
}

fn resolve_uri(base: Option<&Url>, uri: &str) -> String {
    base.and_then(|b| b.join(uri).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| uri.to_string())
}

fn playlist_text(body: &str) -> &str {
    body.trim_start_matches('\u{feff}').trim_start()
}

/// Whether `body` starts like an HLS playlist
pub fn looks_like_manifest(body: &str) -> bool {
    playlist_text(body).starts_with("#EXTM3U")
}

/// Parse an HLS playlist fetched from `url`
pub fn parse_manifest(url: &str, body: &str) -> Result<ParsedManifest, ProviderError> {
    let body = playlist_text(body);
    if !body.starts_with("#EXTM3U") {
        return Err(ProviderError::manifest_unparseable(url, "missing #EXTM3U header"));
    }

    let base = Url::parse(url).ok();
    let mut variants = Vec::new();
    let mut subtitles = Vec::new();
    let mut pending: Option<HashMap<String, String>> = None;
    let mut is_media_playlist = false;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(list) = line.strip_prefix(STREAM_INF) {
            pending = Some(parse_attributes(list));
        } else if let Some(list) = line.strip_prefix(MEDIA) {
            let attrs = parse_attributes(list);
            if attrs.get("TYPE").map(String::as_str) != Some("SUBTITLES") {
                continue;
            }
            let Some(uri) = attrs.get("URI") else {
                continue;
            };
            let name = attrs.get("NAME").cloned();
            let Some(language) = attrs.get("LANGUAGE").cloned().or_else(|| name.clone()) else {
                continue;
            };
            subtitles.push(SubtitleDescriptor {
                language,
                name,
                url: resolve_uri(base.as_ref(), uri),
            });
        } else if line.starts_with("#EXTINF") {
            is_media_playlist = true;
        } else if line.starts_with('#') {
            continue;
        } else if let Some(attrs) = pending.take() {
            variants.push(ManifestVariant {
                uri: resolve_uri(base.as_ref(), line),
                bandwidth: attrs.get("BANDWIDTH").and_then(|b| b.parse().ok()),
                resolution: attrs
                    .get("RESOLUTION")
                    .and_then(|r| RESOLUTION_REGEX.captures(r))
                    .and_then(|c| Some((c[1].parse().ok()?, c[2].parse().ok()?))),
                name: attrs.get("NAME").cloned(),
            });
        }
    }

    if variants.is_empty() {
        if !is_media_playlist {
            return Err(ProviderError::manifest_unparseable(
                url,
                "no variant streams or media segments",
            ));
        }
        variants.push(ManifestVariant {
            uri: url.to_string(),
            bandwidth: None,
            resolution: None,
            name: None,
        });
    }

    Ok(ParsedManifest {
        variants,
        subtitles,
    })
}

pub struct StreamNormalizer {
    fetcher: Arc<dyn HttpFetch>,
    timeout: Duration,
}

impl StreamNormalizer {
    pub fn new(fetcher: Arc<dyn HttpFetch>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Streams for `host`, reusing its downloaded playlist when it has one
    pub async fn normalize(&self, host: &ResolvedHost) -> Result<NormalizedStreams, ProviderError> {
        let manifest = match &host.manifest_body {
            Some(body) => parse_manifest(&host.manifest_url, body)?,
            None => {
                let mut request = FetchRequest::new(&host.manifest_url).timeout(self.timeout);
                if !host.referer.is_empty() {
                    request = request.referer(&host.referer);
                }

                debug!("Fetching manifest {}", host.manifest_url);
                let response = self.fetcher.get(request).await?;
                parse_manifest(&host.manifest_url, &response.body)?
            }
        };

        let label = host.label();
        let streams: Vec<StreamVariant> = manifest
            .variants
            .iter()
            .map(|variant| StreamVariant {
                label: label.clone(),
                url: variant.uri.clone(),
                referer: host.referer.clone(),
                quality: variant.quality(),
                is_manifest: true,
            })
            .collect();

        info!(
            "{}: {} stream(s), {} subtitle(s) from {}",
            label,
            streams.len(),
            manifest.subtitles.len(),
            host.manifest_url
        );
        Ok(NormalizedStreams {
            streams,
            subtitles: manifest.subtitles,
        })
    }
}
