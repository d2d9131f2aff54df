//! VRF token generation
//!
//! Every protected endpoint expects a `vrf` query parameter computed by the
//! site's client script. The site answers an unsigned or badly signed
//! request with an empty result, so a failed generation must surface as
//! `TokenUnavailable` and never as an empty token.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::ProviderError;
use crate::sandbox::{SandboxError, SandboxSession};

/// Percent-encode a token for use as a query parameter
///
/// Form encoding turns spaces into `+`; the server decodes a literal `+`
/// as a space before verifying the signature, so every `+` is re-escaped.
pub fn encode(input: &str) -> String {
    form_urlencoded::byte_serialize(input.as_bytes())
        .collect::<String>()
        .replace('+', "%2B")
}

/// Produces VRF tokens through the shared sandbox session
pub struct TokenGenerator {
    session: Arc<SandboxSession>,
    entry: String,
}

impl TokenGenerator {
    /// `entry` is the name of the signing function in the site's bundle
    pub fn new(session: Arc<SandboxSession>, entry: impl Into<String>) -> Self {
        Self {
            session,
            entry: entry.into(),
        }
    }

    fn script(&self) -> String {
        format!("return {}(context.input);", self.entry)
    }

    /// Wake the sandbox ahead of the first token request
    pub async fn prewarm(&self) -> Result<(), ProviderError> {
        self.session
            .ready()
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::token_unavailable("", e))
    }

    /// Re-fetch the signing script, e.g. after `TokenUnavailable`
    pub async fn rewake(&self) -> Result<(), ProviderError> {
        self.session
            .rewake()
            .await
            .map_err(|e| ProviderError::token_unavailable("", e))
    }

    /// Raw token for `input`
    pub async fn generate(&self, input: &str) -> Result<String, ProviderError> {
        let output = self
            .session
            .execute(&self.script(), json!({ "input": input }))
            .await
            .map_err(|e| {
                warn!("Token generation failed for {:?}: {}", input, e);
                ProviderError::token_unavailable(input, e)
            })?;

        match output {
            Value::String(token) if !token.is_empty() => {
                debug!("Generated token for {:?}", input);
                Ok(token)
            }
            Value::String(_) => Err(ProviderError::token_unavailable(input, "empty token")),
            other => Err(ProviderError::token_unavailable(
                input,
                SandboxError::Output(format!("expected a string, got {}", other)),
            )),
        }
    }

    /// Token for `input`, ready to append as `vrf=`
    pub async fn generate_encoded(&self, input: &str) -> Result<String, ProviderError> {
        Ok(encode(&self.generate(input).await?))
    }
}
