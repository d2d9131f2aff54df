//! In-crate test doubles for the fetch and sandbox capabilities

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::sandbox::{SandboxError, SandboxSession, ScriptSandbox};
use crate::scraper::{FetchRequest, FetchResponse, HttpFetch, ScraperError};

/// Serves canned responses by exact URL and records every request
#[derive(Default)]
pub struct StubFetcher {
    routes: HashMap<String, Result<FetchResponse, ScraperError>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: &str) -> Self {
        self.redirect(url, url, body)
    }

    /// Respond to `url` as if the request ended up at `final_url`
    pub fn redirect(mut self, url: &str, final_url: &str, body: &str) -> Self {
        self.routes.insert(
            url.to_string(),
            Ok(FetchResponse {
                status: 200,
                body: body.to_string(),
                final_url: final_url.to_string(),
            }),
        );
        self
    }

    pub fn error(mut self, url: &str, error: ScraperError) -> Self {
        self.routes.insert(url.to_string(), Err(error));
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn was_requested(&self, prefix: &str) -> bool {
        self.requested_urls().iter().any(|u| u.starts_with(prefix))
    }
}

#[async_trait]
impl HttpFetch for StubFetcher {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, ScraperError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.routes
            .get(&url)
            .cloned()
            .unwrap_or(Err(ScraperError::HttpError(404)))
    }
}

/// Scripted sandbox
///
/// Token calls (`context.input`) answer `vrf-<input>` unless a fixed token
/// is configured. Player calls (`context.serverId`) answer the URL
/// registered for that server and language, or fail.
#[derive(Default)]
pub struct StubSandbox {
    wakes: AtomicUsize,
    fail_wake: bool,
    fail_execute: bool,
    fixed_token: Option<String>,
    player_urls: HashMap<(String, String), String>,
    player_delay: Option<Duration>,
    contexts: Mutex<Vec<Value>>,
}

impl StubSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_wake(mut self) -> Self {
        self.fail_wake = true;
        self
    }

    pub fn failing_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.fixed_token = Some(token.to_string());
        self
    }

    pub fn player(mut self, server_id: &str, lang: &str, url: &str) -> Self {
        self.player_urls
            .insert((server_id.to_string(), lang.to_string()), url.to_string());
        self
    }

    pub fn slow_player(mut self, delay: Duration) -> Self {
        self.player_delay = Some(delay);
        self
    }

    pub fn wake_count(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<Value> {
        self.contexts.lock().unwrap().clone()
    }

    /// Languages the player bootstrap was asked for
    pub fn player_langs(&self) -> Vec<String> {
        self.contexts()
            .iter()
            .filter_map(|c| c.get("lang").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn session(stub: &Arc<StubSandbox>) -> SandboxSession {
        let stub = stub.clone();
        SandboxSession::new(
            "https://9anime.id",
            Box::new(move || stub.clone() as Arc<dyn ScriptSandbox>),
        )
    }
}

#[async_trait]
impl ScriptSandbox for StubSandbox {
    async fn wake(&self) -> Result<(), SandboxError> {
        self.wakes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.fail_wake {
            return Err(SandboxError::ScriptFetch("stub script missing".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, _script: &str, context: Value) -> Result<Value, SandboxError> {
        self.contexts.lock().unwrap().push(context.clone());
        if self.fail_execute {
            return Err(SandboxError::Execution("stub failure".to_string()));
        }

        if let Some(input) = context.get("input").and_then(Value::as_str) {
            let token = self
                .fixed_token
                .clone()
                .unwrap_or_else(|| format!("vrf-{}", input));
            return Ok(Value::String(token));
        }

        if let Some(server_id) = context.get("serverId").and_then(Value::as_str) {
            if let Some(delay) = self.player_delay {
                tokio::time::sleep(delay).await;
            }
            let lang = context.get("lang").and_then(Value::as_str).unwrap_or_default();
            return self
                .player_urls
                .get(&(server_id.to_string(), lang.to_string()))
                .map(|url| Value::String(url.clone()))
                .ok_or_else(|| SandboxError::Execution(format!("no player for {}", server_id)));
        }

        Ok(Value::Null)
    }
}
