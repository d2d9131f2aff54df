//! Host interceptor
//!
//! Turns an episode page and a language variant into manifest locations.
//! For every mirror candidate the site's player bootstrap runs in the
//! sandbox against the episode page; the URL it produces is requested with
//! the episode page as referer and the request's final URL (after
//! redirects) is the manifest. The episode page is fetched once per call
//! and shared by every candidate.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::mirrors;
use crate::error::ProviderError;
use crate::fanout::{fan_out, partition_results};
use crate::models::{LanguageVariant, MirrorKind, ResolvedHost};
use crate::sandbox::{SandboxError, SandboxSession};
use crate::scraper::{FetchRequest, HttpFetch, ScraperError};
use crate::stream::looks_like_manifest;

/// Why a single mirror candidate produced nothing
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] ScraperError),

    #[error("player script failed: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("player script returned no URL")]
    NoPlayerUrl,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Mirror kind and the referer its manifest requests need
pub fn classify(manifest_url: &str) -> (MirrorKind, &'static str) {
    if manifest_url.contains("mcloud") {
        (MirrorKind::Mcloud, mirrors::MCLOUD_REFERER)
    } else {
        (MirrorKind::Vidstream, "")
    }
}

pub struct HostInterceptor {
    fetcher: Arc<dyn HttpFetch>,
    session: Arc<SandboxSession>,
    player_entry: String,
    candidates: Vec<String>,
    timeout: Duration,
}

impl HostInterceptor {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        session: Arc<SandboxSession>,
        player_entry: impl Into<String>,
        candidates: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            session,
            player_entry: player_entry.into(),
            candidates,
            timeout,
        }
    }

    /// Resolve over the configured mirror candidates
    pub async fn resolve(
        &self,
        episode_url: &str,
        variant: LanguageVariant,
    ) -> Result<Vec<ResolvedHost>, ProviderError> {
        self.resolve_candidates(episode_url, variant, &self.candidates)
            .await
    }

    /// Resolve over the given server ids; fails only when none succeed
    pub async fn resolve_candidates(
        &self,
        episode_url: &str,
        variant: LanguageVariant,
        candidates: &[String],
    ) -> Result<Vec<ResolvedHost>, ProviderError> {
        let no_host = || ProviderError::NoPlayableHost {
            episode_url: episode_url.to_string(),
            variant,
        };

        let page = match self
            .fetcher
            .get(FetchRequest::new(episode_url).timeout(self.timeout))
            .await
        {
            Ok(page) => page.body,
            Err(e) => {
                warn!("Episode page {} unavailable: {}", episode_url, e);
                return Err(no_host());
            }
        };
        let page = page.as_str();

        let results = fan_out(candidates, |server_id| async move {
            let outcome = tokio::time::timeout(
                self.timeout,
                self.resolve_candidate(episode_url, page, variant, server_id),
            )
            .await
            .unwrap_or(Err(CandidateError::Timeout(self.timeout)));

            if let Err(e) = &outcome {
                warn!(
                    "Mirror {} failed for {} ({}): {}",
                    server_id, episode_url, variant, e
                );
            }
            outcome
        })
        .await;

        let (hosts, failures) = partition_results(results);
        if hosts.is_empty() {
            return Err(no_host());
        }

        info!(
            "Resolved {} host(s) for {} ({}), {} candidate(s) failed",
            hosts.len(),
            episode_url,
            variant,
            failures.len()
        );
        Ok(hosts)
    }

    async fn resolve_candidate(
        &self,
        episode_url: &str,
        page: &str,
        variant: LanguageVariant,
        server_id: &str,
    ) -> Result<ResolvedHost, CandidateError> {
        let context = json!({
            "episodeUrl": episode_url,
            "serverId": server_id,
            "lang": variant.as_lang(),
            "html": page,
        });
        let script = format!("return {}(context);", self.player_entry);
        let output = self.session.execute(&script, context).await?;

        let player_url = match output {
            Value::String(url) if !url.trim().is_empty() => absolute(episode_url, url.trim()),
            _ => return Err(CandidateError::NoPlayerUrl),
        };
        debug!("Mirror {} player request: {}", server_id, player_url);

        let response = self
            .fetcher
            .get(
                FetchRequest::new(player_url)
                    .referer(episode_url)
                    .timeout(self.timeout),
            )
            .await?;

        let (mirror_kind, referer) = classify(&response.final_url);
        let manifest_body = looks_like_manifest(&response.body).then_some(response.body);
        Ok(ResolvedHost {
            mirror_kind,
            manifest_url: response.final_url,
            referer: referer.to_string(),
            language_variant: variant,
            manifest_body,
        })
    }
}

fn absolute(base: &str, url: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(url))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}
