//! 9Anime provider facade
//!
//! Wires the fetcher, the sandbox session and the resolvers from `Config`
//! and exposes the catalog operations plus `resolve_episode_links`.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::catalog::CatalogResolver;
use crate::config::Config;
use crate::error::ProviderError;
use crate::fanout::fan_out;
use crate::interceptor::HostInterceptor;
use crate::models::{
    CatalogEntry, EpisodeDescriptor, EpisodeLinks, LoadedSeries, SectionLink, StreamVariant,
    SubtitleDescriptor,
};
use crate::sandbox::{QuickJsSandbox, SandboxSession, ScriptSandbox};
use crate::scraper::{HttpFetch, Scraper};
use crate::stream::StreamNormalizer;
use crate::token::TokenGenerator;

/// Receives resolved links as each host completes
pub trait LinkSink: Send + Sync {
    fn on_stream(&self, stream: StreamVariant);
    fn on_subtitle(&self, subtitle: SubtitleDescriptor);
}

/// Sink that keeps everything it is given
#[derive(Debug, Default)]
pub struct CollectingSink {
    links: Mutex<EpisodeLinks>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_links(self) -> EpisodeLinks {
        self.links
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LinkSink for CollectingSink {
    fn on_stream(&self, stream: StreamVariant) {
        if let Ok(mut links) = self.links.lock() {
            links.streams.push(stream);
        }
    }

    fn on_subtitle(&self, subtitle: SubtitleDescriptor) {
        if let Ok(mut links) = self.links.lock() {
            links.subtitles.push(subtitle);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Start,
    TokenReady,
    HostResolved,
    Normalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::TokenReady => "token ready",
            Stage::HostResolved => "host resolved",
            Stage::Normalized => "normalized",
        };
        f.write_str(name)
    }
}

pub struct NineAnime {
    config: Arc<Config>,
    tokens: Arc<TokenGenerator>,
    catalog: CatalogResolver,
    interceptor: HostInterceptor,
    normalizer: StreamNormalizer,
}

impl NineAnime {
    /// Production wiring: reqwest fetcher and a QuickJS sandbox
    pub fn from_config(config: Config) -> Result<Self, ProviderError> {
        let fetcher: Arc<dyn HttpFetch> = Arc::new(Scraper::with_config(config.scraper_config())?);

        let sandbox_fetcher = fetcher.clone();
        let origin = config.base_url.clone();
        let script_url = config.sandbox_script_url.clone();
        let timeout = config.sandbox_timeout;
        let session = SandboxSession::new(
            config.base_url.clone(),
            Box::new(move || {
                Arc::new(QuickJsSandbox::new(
                    sandbox_fetcher.clone(),
                    origin.clone(),
                    script_url.clone(),
                    timeout,
                )) as Arc<dyn ScriptSandbox>
            }),
        );

        Ok(Self::with_parts(config, fetcher, Arc::new(session)))
    }

    /// Wiring over caller-provided capabilities
    pub fn with_parts(
        config: Config,
        fetcher: Arc<dyn HttpFetch>,
        session: Arc<SandboxSession>,
    ) -> Self {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenGenerator::new(session.clone(), config.vrf_entry.clone()));

        Self {
            catalog: CatalogResolver::new(fetcher.clone(), tokens.clone(), config.clone()),
            interceptor: HostInterceptor::new(
                fetcher.clone(),
                session,
                config.player_entry.clone(),
                config.mirrors.clone(),
                config.interceptor_timeout,
            ),
            normalizer: StreamNormalizer::new(fetcher, config.fetch_timeout),
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn main_page(&self) -> Vec<SectionLink> {
        self.catalog.main_page()
    }

    pub async fn list_page(
        &self,
        section_url: &str,
        page: u32,
    ) -> Result<Vec<CatalogEntry>, ProviderError> {
        self.catalog.list_page(section_url, page).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>, ProviderError> {
        self.catalog.search(query).await
    }

    pub async fn quick_search(&self, query: &str) -> Result<Vec<CatalogEntry>, ProviderError> {
        self.catalog.quick_search(query).await
    }

    pub async fn load_detail(&self, detail_url: &str) -> Result<LoadedSeries, ProviderError> {
        self.catalog.load_detail(detail_url).await
    }

    /// Resolve one episode descriptor into streams and subtitles
    ///
    /// Only the descriptor's language is resolved. Links reach `sink` as
    /// each host finishes; the return value is the number of streams
    /// emitted. If every host fails, the first failure is returned.
    pub async fn resolve_episode_links(
        &self,
        descriptor: &EpisodeDescriptor,
        sink: &dyn LinkSink,
    ) -> Result<usize, ProviderError> {
        let episode_url = self.config.canonical_url(&descriptor.episode_url);
        let variant = descriptor.language_variant;
        debug!("{} ({}): {}", episode_url, variant, Stage::Start);

        self.tokens.prewarm().await?;
        debug!("{} ({}): {}", episode_url, variant, Stage::TokenReady);

        let hosts = self.interceptor.resolve(&episode_url, variant).await?;
        debug!(
            "{} ({}): {}, {} host(s)",
            episode_url,
            variant,
            Stage::HostResolved,
            hosts.len()
        );

        let results = fan_out(hosts, |host| async move {
            let normalized = self.normalizer.normalize(&host).await?;
            let count = normalized.streams.len();
            for subtitle in normalized.subtitles {
                sink.on_subtitle(subtitle);
            }
            for stream in normalized.streams {
                sink.on_stream(stream);
            }
            Ok::<usize, ProviderError>(count)
        })
        .await;

        let mut emitted = 0;
        let mut first_error = None;
        let mut succeeded = false;
        for result in results {
            match result {
                Ok(count) => {
                    succeeded = true;
                    emitted += count;
                }
                Err(e) => {
                    warn!("Normalizing a host for {} failed: {}", episode_url, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match (succeeded, first_error) {
            (false, Some(e)) => Err(e),
            _ => {
                info!(
                    "{} ({}): {}, {} stream(s)",
                    episode_url,
                    variant,
                    Stage::Normalized,
                    emitted
                );
                Ok(emitted)
            }
        }
    }

    /// Convenience over `resolve_episode_links` with a collecting sink
    pub async fn episode_links(
        &self,
        descriptor: &EpisodeDescriptor,
    ) -> Result<EpisodeLinks, ProviderError> {
        let sink = CollectingSink::new();
        self.resolve_episode_links(descriptor, &sink).await?;
        Ok(sink.into_links())
    }
}
