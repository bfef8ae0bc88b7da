//! Generation provider abstraction layer.
//!
//! One trait per creation kind: [`ImageProvider`] and [`StoryProvider`] return a finished result,
//! [`MusicProvider`] returns an acknowledgment and completes later through a callback to
//! `/webhooks/music`.
//!
//! Adapters never retry. Every failure is classified into [`ProviderError`]; the orchestrator
//! shows the end user one friendly message regardless of the variant.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};
use url::Url;

use crate::config::{ImageProviderConfig, MusicProviderConfig, ProvidersConfig, StoryProviderConfig};
use crate::db::models::creations::{ImageStyle, StoryGenre, StoryLength};

pub mod dummy;
pub mod image;
pub mod music;
pub mod story;

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur while calling a generation provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No API key configured. Fatal until configuration changes.
    #[error("No API key configured for {provider}")]
    MissingCredential { provider: &'static str },

    /// The provider refused the request (4xx other than 408 and 429)
    #[error("Provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The provider could not be reached or is overloaded (5xx, 408, 429, network, timeout)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Success status, but the payload was not what we expected
    #[error("Unexpected provider response: {0}")]
    InvalidResponseShape(String),
}

impl ProviderError {
    /// Classify a non-success status code
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match StatusCode::from_u16(status) {
            Ok(StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS) => {
                ProviderError::Unavailable(format!("status {status}: {body}"))
            }
            Ok(code) if code.is_client_error() => ProviderError::Rejected { status, body },
            _ => ProviderError::Unavailable(format!("status {status}: {body}")),
        }
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            ProviderError::MissingCredential { .. } => "missing_credential",
            ProviderError::Rejected { .. } => "rejected",
            ProviderError::Unavailable(_) => "unavailable",
            ProviderError::InvalidResponseShape(_) => "invalid_response",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Unavailable(format!("timed out: {err}"))
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub style: ImageStyle,
}

/// A generated image, either a provider URL or a `data:` URI
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryRequest {
    pub story_so_far: String,
    pub genre: StoryGenre,
    pub length: StoryLength,
    /// What the learner wants to happen next
    pub continuation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicRequest {
    pub prompt: String,
    pub style: String,
    pub title: String,
    pub instrumental: bool,
}

/// The provider accepted a music job; the result arrives on the callback URL
#[derive(Debug, Clone, PartialEq)]
pub struct MusicSubmission {
    pub task_id: String,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage>;
}

#[async_trait]
pub trait StoryProvider: Send + Sync {
    /// Returns the continuation text, trimmed and non-empty
    async fn continue_story(&self, request: &StoryRequest) -> Result<String>;
}

#[async_trait]
pub trait MusicProvider: Send + Sync {
    async fn submit(&self, request: &MusicRequest, callback_url: &Url) -> Result<MusicSubmission>;
}

/// The configured adapter for each creation kind
#[derive(Clone)]
pub struct Providers {
    pub image: Arc<dyn ImageProvider>,
    pub story: Arc<dyn StoryProvider>,
    pub music: Arc<dyn MusicProvider>,
}

/// Create the provider adapters from configuration
///
/// This is the single point where we convert config into provider instances.
pub fn create_providers(config: &ProvidersConfig) -> anyhow::Result<Providers> {
    let image: Arc<dyn ImageProvider> = match &config.image {
        ImageProviderConfig::OpenAI(openai) => Arc::new(image::OpenAIImageProvider::new(openai.clone())?),
        ImageProviderConfig::Dummy => Arc::new(dummy::DummyImageProvider),
    };
    let story: Arc<dyn StoryProvider> = match &config.story {
        StoryProviderConfig::OpenAI(openai) => Arc::new(story::OpenAIStoryProvider::new(openai.clone())?),
        StoryProviderConfig::Dummy => Arc::new(dummy::DummyStoryProvider),
    };
    let music: Arc<dyn MusicProvider> = match &config.music {
        MusicProviderConfig::Suno(suno) => Arc::new(music::SunoMusicProvider::new(suno.clone())?),
        MusicProviderConfig::Dummy(dummy) => Arc::new(dummy::DummyMusicProvider::new(dummy.clone())?),
    };
    Ok(Providers { image, story, music })
}

pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Makes sure a url has a trailing slash, so `join` appends rather than replaces the last
/// path segment.
pub(crate) fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}

pub(crate) fn endpoint(base_url: &Url, path: &str) -> Result<Url> {
    ensure_slash(base_url)
        .join(path)
        .map_err(|e| ProviderError::Unavailable(format!("invalid provider URL: {e}")))
}

/// POST a JSON body with bearer auth and decode the JSON response, classifying every failure
pub(crate) async fn send_json<B, R>(client: &Client, url: Url, api_key: &str, body: &B) -> Result<R>
where
    B: Serialize + ?Sized + Sync,
    R: DeserializeOwned,
{
    debug!(%url, "Calling provider");
    let response = client.post(url.clone()).bearer_auth(api_key).json(body).send().await?;

    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        error!(%url, status = status.as_u16(), "Provider request failed");
        debug!(body = %text, "Provider error body");
        return Err(ProviderError::from_status(status.as_u16(), text));
    }

    serde_json::from_str::<R>(&text).map_err(|e| {
        error!(%url, error = %e, "Failed to parse provider response");
        debug!(body = %text, "Provider response body");
        ProviderError::InvalidResponseShape(e.to_string())
    })
}
