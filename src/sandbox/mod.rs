//! Script sandbox used to run the site's own client scripts
//!
//! Token signing and the player bootstrap are reproduced by executing the
//! site's obfuscated script bundle instead of re-deriving it natively.
//! `ScriptSandbox` is the seam, `QuickJsSandbox` runs the bundle in an
//! embedded QuickJS engine, and `SandboxSession` owns the per-origin
//! lifecycle: the sandbox is built once and woken before its first use.

use async_trait::async_trait;
use quick_js::Context;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::scraper::{FetchRequest, HttpFetch};

/// Errors raised while preparing or running a script
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    #[error("Failed to fetch signing script: {0}")]
    ScriptFetch(String),

    #[error("Sandbox has not been woken")]
    NotAwake,

    #[error("Failed to start script engine: {0}")]
    Engine(String),

    #[error("Script execution failed: {0}")]
    Execution(String),

    #[error("Script returned unusable output: {0}")]
    Output(String),

    #[error("Script execution timed out after {0:?}")]
    Timeout(Duration),
}

/// Script execution capability
#[async_trait]
pub trait ScriptSandbox: Send + Sync {
    /// Refresh session-bound state, e.g. re-fetch the signing script
    async fn wake(&self) -> Result<(), SandboxError>;

    /// Run `script` as the body of `function(context) { ... }` and return
    /// its result as JSON
    async fn execute(&self, script: &str, context: Value) -> Result<Value, SandboxError>;
}

/// Minimal browser globals the site's bundle touches at load time
const BROWSER_PRELUDE: &str = r#"
var window = globalThis;
var self = globalThis;
var location = { href: __ORIGIN__ + "/", origin: __ORIGIN__, hostname: __ORIGIN__.replace(/^https?:\/\//, "") };
var document = { cookie: "", referrer: "", location: location, addEventListener: function() {} };
var navigator = { userAgent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36" };
var __b64 = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/=";
function atob(input) {
  var str = String(input).replace(/=+$/, "");
  var out = "";
  for (var bc = 0, bs = 0, buffer, idx = 0; (buffer = str.charAt(idx++)); ~buffer && (bs = bc % 4 ? bs * 64 + buffer : buffer, bc++ % 4) ? out += String.fromCharCode(255 & bs >> (-2 * bc & 6)) : 0) {
    buffer = __b64.indexOf(buffer);
  }
  return out;
}
function btoa(input) {
  var str = String(input);
  var out = "";
  for (var block, charCode, idx = 0, map = __b64; str.charAt(idx | 0) || (map = "=", idx % 1); out += map.charAt(63 & block >> 8 - idx % 1 * 8)) {
    charCode = str.charCodeAt(idx += 3 / 4);
    block = block << 8 | charCode;
  }
  return out;
}
"#;

/// Wrap a script body so the engine hands back a JSON string
fn wrap_script(script: &str, context: &Value) -> Result<String, SandboxError> {
    let context = serde_json::to_string(context).map_err(|e| SandboxError::Output(e.to_string()))?;
    Ok(format!(
        "(function() {{ var __result = (function(context) {{ {script} }})({context}); return JSON.stringify(__result === undefined ? null : __result); }})()"
    ))
}

fn prelude_for(origin: &str) -> Result<String, SandboxError> {
    let origin = serde_json::to_string(origin).map_err(|e| SandboxError::Output(e.to_string()))?;
    Ok(BROWSER_PRELUDE.replace("__ORIGIN__", &origin))
}

/// Evaluate prelude, bundle and program in a fresh QuickJS context
fn run_program(prelude: &str, bundle: &str, program: &str) -> Result<String, SandboxError> {
    let context = Context::new().map_err(|e| SandboxError::Engine(e.to_string()))?;
    context
        .eval(prelude)
        .map_err(|e| SandboxError::Execution(format!("prelude: {}", e)))?;
    context
        .eval(bundle)
        .map_err(|e| SandboxError::Execution(format!("bundle: {}", e)))?;
    context
        .eval_as::<String>(program)
        .map_err(|e| SandboxError::Execution(e.to_string()))
}

/// Scripts that may occupy a blocking-pool thread at once
pub const MAX_RUNNING_SCRIPTS: usize = 4;

/// Sandbox that runs the site's script bundle in QuickJS
///
/// The bundle is downloaded on `wake` and kept as source; every `execute`
/// evaluates it in a fresh context on the blocking pool, so executions can
/// run concurrently.
///
/// QuickJS cannot be interrupted from outside, so a timed-out script keeps
/// running on its thread until it returns. Each running script holds one of
/// `MAX_RUNNING_SCRIPTS` permits until its thread is actually free, which
/// caps how many threads runaway scripts can pin. Once all permits are held
/// further executions time out waiting for one.
pub struct QuickJsSandbox {
    fetcher: Arc<dyn HttpFetch>,
    origin: String,
    script_url: String,
    timeout: Duration,
    bundle: RwLock<Option<Arc<String>>>,
    running: Arc<Semaphore>,
}

impl QuickJsSandbox {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        origin: impl Into<String>,
        script_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            origin: origin.into(),
            script_url: script_url.into(),
            timeout,
            bundle: RwLock::new(None),
            running: Arc::new(Semaphore::new(MAX_RUNNING_SCRIPTS)),
        }
    }

    #[cfg(test)]
    async fn load_bundle(&self, source: &str) {
        *self.bundle.write().await = Some(Arc::new(source.to_string()));
    }
}

#[async_trait]
impl ScriptSandbox for QuickJsSandbox {
    async fn wake(&self) -> Result<(), SandboxError> {
        info!("Fetching signing script from {}", self.script_url);

        let request = FetchRequest::new(&self.script_url)
            .referer(format!("{}/", self.origin))
            .timeout(self.timeout);
        let response = self
            .fetcher
            .get(request)
            .await
            .map_err(|e| SandboxError::ScriptFetch(e.to_string()))?;

        if response.body.trim().is_empty() {
            return Err(SandboxError::ScriptFetch("empty script".to_string()));
        }

        debug!("Loaded {} bytes of signing script", response.body.len());
        *self.bundle.write().await = Some(Arc::new(response.body));
        Ok(())
    }

    async fn execute(&self, script: &str, context: Value) -> Result<Value, SandboxError> {
        let bundle = self
            .bundle
            .read()
            .await
            .clone()
            .ok_or(SandboxError::NotAwake)?;
        let prelude = prelude_for(&self.origin)?;
        let program = wrap_script(script, &context)?;

        let running = self.running.clone();
        let task = async move {
            let permit = running
                .acquire_owned()
                .await
                .map_err(|e| SandboxError::Engine(e.to_string()))?;
            let output = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                run_program(&prelude, &bundle, &program)
            })
            .await
            .map_err(|e| SandboxError::Execution(format!("script task failed: {}", e)))??;
            Ok::<_, SandboxError>(output)
        };
        let output = timeout(self.timeout, task).await.map_err(|_| {
            warn!("Script exceeded {:?}, abandoning it", self.timeout);
            SandboxError::Timeout(self.timeout)
        })??;

        serde_json::from_str(&output).map_err(|e| SandboxError::Output(e.to_string()))
    }
}

/// Builds the sandbox the first time the session needs it
pub type SandboxFactory = Box<dyn Fn() -> Arc<dyn ScriptSandbox> + Send + Sync>;

/// Process-scoped sandbox for one site origin
///
/// Construction happens at most once. The wake transition is serialized by
/// an async mutex; executions after that run concurrently.
pub struct SandboxSession {
    origin: String,
    factory: SandboxFactory,
    sandbox: OnceLock<Arc<dyn ScriptSandbox>>,
    awake: Mutex<bool>,
}

impl SandboxSession {
    pub fn new(origin: impl Into<String>, factory: SandboxFactory) -> Self {
        Self {
            origin: origin.into(),
            factory,
            sandbox: OnceLock::new(),
            awake: Mutex::new(false),
        }
    }

    fn sandbox(&self) -> Arc<dyn ScriptSandbox> {
        self.sandbox
            .get_or_init(|| {
                info!("Constructing script sandbox for {}", self.origin);
                (self.factory)()
            })
            .clone()
    }

    /// The sandbox, woken if this is its first use in the session
    pub async fn ready(&self) -> Result<Arc<dyn ScriptSandbox>, SandboxError> {
        let sandbox = self.sandbox();
        let mut awake = self.awake.lock().await;
        if !*awake {
            sandbox.wake().await.map_err(|e| {
                warn!("Failed to wake sandbox for {}: {}", self.origin, e);
                e
            })?;
            *awake = true;
        }
        Ok(sandbox)
    }

    /// Force a fresh wake, e.g. after the site rotated its signing script
    pub async fn rewake(&self) -> Result<(), SandboxError> {
        let sandbox = self.sandbox();
        let mut awake = self.awake.lock().await;
        *awake = false;
        sandbox.wake().await?;
        *awake = true;
        Ok(())
    }

    pub async fn is_awake(&self) -> bool {
        *self.awake.lock().await
    }

    pub async fn execute(&self, script: &str, context: Value) -> Result<Value, SandboxError> {
        self.ready().await?.execute(script, context).await
    }
}
