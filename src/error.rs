//! Global error handling module
//!
//! `ProviderError` is the taxonomy every resolver operation reports;
//! `AppError` unifies it with request validation for the REST layer and
//! converts both to HTTP responses with a consistent JSON structure.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::{ApiError, LanguageVariant};
use crate::scraper::ScraperError;

/// Failures of a catalog or stream resolution call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The sandbox could not produce a token; the site would answer an
    /// unsigned request with an empty result, so nothing was sent
    #[error("Token unavailable for {input:?}: {reason}")]
    TokenUnavailable { input: String, reason: String },

    /// A page-level required field is missing; the markup has changed
    #[error("Could not find {field} at {url}")]
    ExtractionFailed { field: String, url: String },

    /// No mirror candidate yielded a manifest
    #[error("No playable host for {episode_url} ({variant})")]
    NoPlayableHost {
        episode_url: String,
        variant: LanguageVariant,
    },

    /// The fetched manifest is not an HLS playlist
    #[error("Manifest at {url} is unparseable: {reason}")]
    ManifestUnparseable { url: String, reason: String },

    /// The site could not be reached or answered with an error status
    #[error(transparent)]
    Fetch(#[from] ScraperError),
}

impl ProviderError {
    pub fn extraction_failed(field: impl Into<String>, url: impl Into<String>) -> Self {
        ProviderError::ExtractionFailed {
            field: field.into(),
            url: url.into(),
        }
    }

    pub fn token_unavailable(input: impl Into<String>, reason: impl ToString) -> Self {
        ProviderError::TokenUnavailable {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn manifest_unparseable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ProviderError::ManifestUnparseable {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Application-wide error type for the REST surface
#[derive(Debug, Error)]
pub enum AppError {
    /// Resolver errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Validation errors (bad request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            AppError::Provider(provider_err) => match provider_err {
                ProviderError::TokenUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ProviderError::NoPlayableHost { .. } => StatusCode::NOT_FOUND,
                ProviderError::ExtractionFailed { .. }
                | ProviderError::ManifestUnparseable { .. }
                | ProviderError::Fetch(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),

            AppError::Provider(provider_err) => match provider_err {
                ProviderError::TokenUnavailable { .. } => {
                    "Request signing is unavailable, please try again later".to_string()
                }
                ProviderError::ExtractionFailed { field, url } => {
                    format!("Site markup changed: could not find {} at {}", field, url)
                }
                ProviderError::NoPlayableHost { episode_url, variant } => {
                    format!("No playable host for {} ({})", episode_url, variant)
                }
                ProviderError::ManifestUnparseable { url, .. } => {
                    format!("Stream manifest at {} could not be read", url)
                }
                ProviderError::Fetch(ScraperError::NetworkError(msg)) => {
                    format!("Failed to connect to server: {}", msg)
                }
                ProviderError::Fetch(ScraperError::HttpError(status)) => {
                    format!("Server returned error status: {}", status)
                }
                ProviderError::Fetch(ScraperError::ResponseError(msg)) => {
                    format!("Failed to read response: {}", msg)
                }
            },
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_response = ApiError::new(self.user_message());

        HttpResponse::build(status).json(error_response)
    }
}

/// Result type alias for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
