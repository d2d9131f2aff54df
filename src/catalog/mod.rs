//! Catalog resolver
//!
//! Home sections, search, quick search and detail pages. Protected
//! endpoints are signed with a VRF token before anything is requested; the
//! HTML work happens in `parser::site` so parsed documents never live
//! across an await.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::endpoints;
use crate::error::ProviderError;
use crate::fanout::fan_out;
use crate::models::{
    CatalogEntry, EpisodeDescriptor, LanguageVariant, LoadedSeries, Section, SectionLink,
};
use crate::parser::site::{self, EpisodeRow};
use crate::scraper::{FetchRequest, HttpFetch};
use crate::token::TokenGenerator;

/// `{"result": "<html>"}`
#[derive(Debug, Deserialize)]
struct HtmlEnvelope {
    result: Option<String>,
}

/// `{"result": {"html": "<html>"}}`
#[derive(Debug, Deserialize)]
struct QuickSearchEnvelope {
    result: Option<QuickSearchResult>,
}

#[derive(Debug, Deserialize)]
struct QuickSearchResult {
    html: Option<String>,
}

pub struct CatalogResolver {
    fetcher: Arc<dyn HttpFetch>,
    tokens: Arc<TokenGenerator>,
    config: Arc<Config>,
}

impl CatalogResolver {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        tokens: Arc<TokenGenerator>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            fetcher,
            tokens,
            config,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        debug!("Fetching {}", url);
        let request = FetchRequest::new(url).timeout(self.config.fetch_timeout);
        let response = self.fetcher.get(request).await.map_err(|e| {
            warn!("Fetch failed for {}: {}", url, e);
            e
        })?;
        Ok(response.body)
    }

    /// The fixed home sections with the URL their page number is appended to
    pub fn main_page(&self) -> Vec<SectionLink> {
        Section::ALL
            .into_iter()
            .map(|section| SectionLink {
                section,
                name: section.title().to_string(),
                url: endpoints::home_widget(&self.config.base_url, section),
            })
            .collect()
    }

    /// One page of a home section
    pub async fn list_page(
        &self,
        section_url: &str,
        page: u32,
    ) -> Result<Vec<CatalogEntry>, ProviderError> {
        // Listings are not signed, but the next request usually is
        if let Err(e) = self.tokens.prewarm().await {
            warn!("Sandbox prewarm failed: {}", e);
        }

        let url = format!("{}{}", section_url, page);
        let body = self.fetch(&url).await?;

        let html = match serde_json::from_str::<HtmlEnvelope>(&body) {
            Ok(envelope) => envelope.result.unwrap_or_default(),
            Err(_) => body,
        };

        let entries = site::parse_listing(&html, &self.config.base_url);
        info!("Parsed {} entries from {}", entries.len(), url);
        Ok(entries)
    }

    /// Suggestions from the search dropdown
    ///
    /// A payload that cannot be read yields no suggestions rather than an
    /// error.
    pub async fn quick_search(&self, query: &str) -> Result<Vec<CatalogEntry>, ProviderError> {
        let vrf = self.tokens.generate_encoded(query).await?;
        let url = endpoints::quick_search(&self.config.base_url, query, &vrf);
        let body = self.fetch(&url).await?;

        let html = match serde_json::from_str::<QuickSearchEnvelope>(&body) {
            Ok(QuickSearchEnvelope {
                result: Some(QuickSearchResult { html: Some(html) }),
            }) => html,
            Ok(_) => {
                debug!("Quick search for {:?} returned no html", query);
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!("Unreadable quick search payload for {:?}: {}", query, e);
                return Ok(Vec::new());
            }
        };

        Ok(site::parse_quick_search(&html, &self.config.base_url))
    }

    /// Results of the filter page
    pub async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>, ProviderError> {
        let vrf = self.tokens.generate_encoded(query).await?;
        let url = endpoints::search(&self.config.base_url, query, &vrf);
        let body = self.fetch(&url).await?;

        let entries = site::parse_search(&body, &self.config.base_url);
        info!("Search {:?} returned {} entries", query, entries.len());
        Ok(entries)
    }

    /// Series detail plus its episodes, one descriptor per language
    pub async fn load_detail(&self, detail_url: &str) -> Result<LoadedSeries, ProviderError> {
        let url = self.config.canonical_url(detail_url.trim_end_matches('/'));
        let body = self.fetch(&url).await?;
        let detail = site::parse_detail(&body, &url, &self.config.base_url)?;

        let vrf = self.tokens.generate_encoded(&detail.id).await?;
        let list_url = endpoints::episode_list(&self.config.base_url, &detail.id, &vrf);
        let list_body = self.fetch(&list_url).await?;

        let fragment = serde_json::from_str::<HtmlEnvelope>(&list_body)
            .ok()
            .and_then(|envelope| envelope.result)
            .ok_or_else(|| ProviderError::extraction_failed("episode list", list_url.as_str()))?;

        let rows = site::parse_episode_rows(&fragment);
        let series_url = url.as_str();
        let episodes: Vec<EpisodeDescriptor> =
            fan_out(rows, |row| async move { descriptors_for(series_url, row) })
                .await
                .into_iter()
                .flatten()
                .collect();

        info!(
            "Loaded {} ({} episodes) from {}",
            detail.title,
            episodes.len(),
            url
        );
        Ok(LoadedSeries { detail, episodes })
    }
}

/// One descriptor per advertised language; rows with no number or slug
/// have no addressable page and are skipped.
fn descriptors_for(series_url: &str, row: EpisodeRow) -> Vec<EpisodeDescriptor> {
    let Some(segment) = row.path_segment() else {
        debug!("Skipping episode row without number: {:?}", row);
        return Vec::new();
    };
    let episode_url = format!("{}/{}", series_url, segment);

    [
        (row.has_sub, LanguageVariant::Sub),
        (row.has_dub, LanguageVariant::Dub),
    ]
    .into_iter()
    .filter(|(available, _)| *available)
    .map(|(_, language_variant)| EpisodeDescriptor {
        number: row.number,
        title: row.title.clone(),
        episode_url: episode_url.clone(),
        language_variant,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubFetcher, StubSandbox};
    use serde_json::json;

    const DETAIL_URL: &str = "https://9anime.id/watch/frieren.3q5";

    fn build(
        fetcher: StubFetcher,
        sandbox: StubSandbox,
    ) -> (CatalogResolver, Arc<StubFetcher>, Arc<StubSandbox>) {
        let fetcher = Arc::new(fetcher);
        let sandbox = Arc::new(sandbox);
        let tokens = Arc::new(TokenGenerator::new(
            Arc::new(StubSandbox::session(&sandbox)),
            "vrf",
        ));
        let resolver = CatalogResolver::new(fetcher.clone(), tokens, Arc::new(Config::default()));
        (resolver, fetcher, sandbox)
    }

    fn detail_page(with_id: bool) -> String {
        let rating = if with_id {
            r#"<div id="w-rating" data-id="123" data-score="8.7"></div>"#
        } else {
            r#"<div id="w-rating" data-score="8.7"></div>"#
        };
        format!(
            r#"<html><body><div id="w-info">
                <div class="binfo"><div class="info"><h1 class="title">Frieren</h1></div></div>
                <div class="brating">{}</div>
            </div></body></html>"#,
            rating
        )
    }

    fn episode_list(rows: &str) -> String {
        json!({ "result": format!(r#"<div class="episodes"><ul>{}</ul></div>"#, rows) }).to_string()
    }

    const LISTING_ROW: &str = r#"<div class="item">
        <div class="poster"><a><img src="https://static.example/p.jpg"></a></div>
        <div class="info"><a class="name" href="/watch/bleach.2/ep-3">Bleach</a></div>
    </div>"#;

    #[test]
    fn test_main_page_sections() {
        let (resolver, _, _) = build(StubFetcher::new(), StubSandbox::new());
        let sections = resolver.main_page();

        assert_eq!(sections.len(), 6);
        assert_eq!(sections[0].name, "Trending");
        assert_eq!(
            sections[3].url,
            "https://9anime.id/ajax/home/widget/updated-dub?page="
        );
    }

    #[tokio::test]
    async fn test_list_page_reads_json_envelope() {
        let url = "https://9anime.id/ajax/home/widget/trending?page=";
        let body = json!({ "result": LISTING_ROW }).to_string();
        let (resolver, _, sandbox) = build(
            StubFetcher::new().page(&format!("{}2", url), &body),
            StubSandbox::new(),
        );

        let entries = resolver.list_page(url, 2).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Bleach");
        assert_eq!(entries[0].detail_url, "https://9anime.id/watch/bleach.2");
        assert_eq!(sandbox.wake_count(), 1);
    }

    #[tokio::test]
    async fn test_list_page_falls_back_to_raw_html() {
        let url = "https://9anime.id/ajax/home/widget/random?page=";
        let (resolver, _, _) = build(
            StubFetcher::new().page(&format!("{}1", url), LISTING_ROW),
            StubSandbox::new().failing_wake(),
        );

        let entries = resolver.list_page(url, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_list_page_omits_titleless_rows() {
        let url = "https://9anime.id/ajax/home/widget/trending?page=";
        let untitled = r#"<div class="item"><div class="info"><a class="name" href="/watch/x.1"></a></div></div>"#;
        let body = json!({ "result": format!("{}{}", untitled, LISTING_ROW) }).to_string();
        let (resolver, _, _) = build(
            StubFetcher::new().page(&format!("{}1", url), &body),
            StubSandbox::new(),
        );

        let entries = resolver.list_page(url, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Bleach");
    }

    #[tokio::test]
    async fn test_search_token_failure_sends_nothing() {
        let (resolver, fetcher, _) =
            build(StubFetcher::new(), StubSandbox::new().failing_execute());

        let error = resolver.search("naruto").await.unwrap_err();
        assert!(matches!(error, ProviderError::TokenUnavailable { .. }));
        assert!(fetcher.requested_urls().is_empty());
    }

    #[tokio::test]
    async fn test_search_signs_request() {
        let body = r#"<div id="list-items"><div class="ani poster tip"><a href="/watch/naruto.1"><img alt="Naruto" src="https://static.example/n.jpg"></a></div></div>"#;
        let (resolver, fetcher, _) = build(
            StubFetcher::new().page("https://9anime.id/filter?keyword=naruto&vrf=vrf-naruto&page=1", body),
            StubSandbox::new(),
        );

        let entries = resolver.search("naruto").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].detail_url, "https://9anime.id/watch/naruto.1");
        assert!(fetcher.was_requested("https://9anime.id/filter?keyword=naruto&vrf=vrf-naruto"));
    }

    #[tokio::test]
    async fn test_quick_search_unreadable_payload_is_empty() {
        let url = "https://9anime.id/ajax/anime/search?keyword=naruto&vrf=vrf-naruto";
        let (resolver, _, _) = build(
            StubFetcher::new().page(url, "<html>oops</html>"),
            StubSandbox::new(),
        );
        assert!(resolver.quick_search("naruto").await.unwrap().is_empty());

        let (resolver, _, _) = build(
            StubFetcher::new().page(url, r#"{"result": null}"#),
            StubSandbox::new(),
        );
        assert!(resolver.quick_search("naruto").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quick_search_reads_nested_html() {
        let url = "https://9anime.id/ajax/anime/search?keyword=naruto&vrf=vrf-naruto";
        let html = r#"<div class="items"><a href="/watch/naruto.1"><div class="info"><div class="name">Naruto</div></div></a></div>"#;
        let body = json!({ "result": { "html": html } }).to_string();
        let (resolver, _, _) = build(StubFetcher::new().page(url, &body), StubSandbox::new());

        let entries = resolver.quick_search("naruto").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Naruto");
    }

    #[tokio::test]
    async fn test_quick_search_token_failure_propagates() {
        let (resolver, _, _) = build(StubFetcher::new(), StubSandbox::new().failing_wake());
        let error = resolver.quick_search("naruto").await.unwrap_err();
        assert!(matches!(error, ProviderError::TokenUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_load_detail_end_to_end() {
        let (resolver, _, _) = build(
            StubFetcher::new()
                .page(DETAIL_URL, &detail_page(true))
                .page(
                    "https://9anime.id/ajax/episode/list/123?vrf=vrf-123",
                    &episode_list(r#"<li><a data-num="5" data-sub="1" data-dub="0"><span class="d-title">Five</span></a></li>"#),
                ),
            StubSandbox::new(),
        );

        let loaded = resolver.load_detail(DETAIL_URL).await.unwrap();
        assert_eq!(loaded.detail.id, "123");
        assert_eq!(loaded.detail.rating, Some(8700));
        assert_eq!(loaded.episodes.len(), 1);

        let episode = &loaded.episodes[0];
        assert_eq!(episode.number, Some(5));
        assert_eq!(episode.title.as_deref(), Some("Five"));
        assert_eq!(episode.episode_url, "https://9anime.id/watch/frieren.3q5/ep-5");
        assert_eq!(episode.language_variant, LanguageVariant::Sub);
    }

    #[tokio::test]
    async fn test_load_detail_sub_and_dub_rows() {
        let (resolver, _, _) = build(
            StubFetcher::new()
                .page(DETAIL_URL, &detail_page(true))
                .page(
                    "https://9anime.id/ajax/episode/list/123?vrf=vrf-123",
                    &episode_list(r#"<li><a data-num="1" data-sub="1" data-dub="1"></a></li><li><a data-sub="1"></a></li>"#),
                ),
            StubSandbox::new(),
        );

        let loaded = resolver.load_detail(DETAIL_URL).await.unwrap();
        assert_eq!(loaded.episodes.len(), 2);
        assert_eq!(loaded.episodes[0].episode_url, loaded.episodes[1].episode_url);
        assert_eq!(loaded.sub_episodes().count(), 1);
        assert_eq!(loaded.dub_episodes().count(), 1);
    }

    #[tokio::test]
    async fn test_load_detail_without_id_never_lists_episodes() {
        let (resolver, fetcher, sandbox) = build(
            StubFetcher::new().page(DETAIL_URL, &detail_page(false)),
            StubSandbox::new(),
        );

        let error = resolver.load_detail(DETAIL_URL).await.unwrap_err();
        assert_eq!(error, ProviderError::extraction_failed("id", DETAIL_URL));
        assert!(!fetcher.was_requested("https://9anime.id/ajax/episode/list"));
        assert!(sandbox.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_load_detail_rewrites_legacy_origin() {
        let (resolver, fetcher, _) = build(
            StubFetcher::new()
                .page(DETAIL_URL, &detail_page(true))
                .page(
                    "https://9anime.id/ajax/episode/list/123?vrf=vrf-123",
                    &episode_list(""),
                ),
            StubSandbox::new(),
        );

        let loaded = resolver
            .load_detail("https://9anime.to/watch/frieren.3q5")
            .await
            .unwrap();
        assert!(loaded.episodes.is_empty());
        assert_eq!(fetcher.requested_urls()[0], DETAIL_URL);
    }

    #[tokio::test]
    async fn test_load_detail_missing_episode_payload() {
        let list_url = "https://9anime.id/ajax/episode/list/123?vrf=vrf-123";
        let (resolver, _, _) = build(
            StubFetcher::new()
                .page(DETAIL_URL, &detail_page(true))
                .page(list_url, r#"{"status": 200}"#),
            StubSandbox::new(),
        );

        let error = resolver.load_detail(DETAIL_URL).await.unwrap_err();
        assert_eq!(error, ProviderError::extraction_failed("episode list", list_url));
    }

    #[test]
    fn test_descriptors_for_skips_unaddressable_rows() {
        let row = EpisodeRow {
            number: None,
            slug: None,
            title: None,
            has_sub: true,
            has_dub: true,
        };
        assert!(descriptors_for(DETAIL_URL, row).is_empty());
    }
}
