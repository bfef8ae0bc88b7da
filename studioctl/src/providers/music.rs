//! Suno music generation. Submission only; results arrive on the callback URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use url::Url;

use super::{MusicProvider, MusicRequest, MusicSubmission, ProviderError, Result, endpoint, http_client, send_json};
use crate::config::SunoConfig;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    prompt: &'a str,
    style: &'a str,
    title: &'a str,
    custom_mode: bool,
    instrumental: bool,
    model: &'a str,
    call_back_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    code: u16,
    #[serde(default)]
    msg: String,
    data: Option<GenerateData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateData {
    task_id: Option<String>,
}

pub struct SunoMusicProvider {
    client: Client,
    config: SunoConfig,
}

impl SunoMusicProvider {
    pub fn new(config: SunoConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }
}

#[async_trait]
impl MusicProvider for SunoMusicProvider {
    #[instrument(skip_all, fields(model = %self.config.model, instrumental = request.instrumental))]
    async fn submit(&self, request: &MusicRequest, callback_url: &Url) -> Result<MusicSubmission> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            error!("Music provider has no API key configured");
            return Err(ProviderError::MissingCredential { provider: "suno" });
        };

        let body = GenerateRequest {
            prompt: &request.prompt,
            style: &request.style,
            title: &request.title,
            custom_mode: true,
            instrumental: request.instrumental,
            model: &self.config.model,
            call_back_url: callback_url.as_str(),
        };
        let url = endpoint(&self.config.base_url, "api/v1/generate")?;
        let response: GenerateResponse = send_json(&self.client, url, api_key, &body).await?;

        // The HTTP status can be 200 while the body reports the real outcome
        if response.code != 200 {
            return Err(ProviderError::from_status(response.code, response.msg));
        }

        match response.data.and_then(|d| d.task_id).filter(|id| !id.is_empty()) {
            Some(task_id) => {
                info!(%task_id, "Music generation submitted");
                Ok(MusicSubmission { task_id })
            }
            None => Err(ProviderError::InvalidResponseShape("response had no data.taskId".to_string())),
        }
    }
}
