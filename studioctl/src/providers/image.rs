//! OpenAI-compatible image generation (`images/generations`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use super::{GeneratedImage, ImageProvider, ImageRequest, ProviderError, Result, endpoint, http_client, send_json};
use crate::config::OpenAIImageConfig;
use crate::db::models::creations::ImageStyle;

const SAFETY_PREAMBLE: &str = "Create a bright, friendly illustration for young children. \
Keep it gentle and age-appropriate: no violence, weapons, blood, scary or upsetting imagery, \
no real people, and no written words.";

/// How each style is described to the model
pub fn style_description(style: ImageStyle) -> &'static str {
    match style {
        ImageStyle::Cartoon => "a colorful cartoon with bold outlines and simple shapes",
        ImageStyle::Watercolor => "a soft watercolor painting with gentle washes of color",
        ImageStyle::PixelArt => "cheerful retro pixel art with a limited palette",
        ImageStyle::Storybook => "a classic picture-book illustration with warm, cozy details",
        ImageStyle::Crayon => "a crayon drawing with visible strokes, as if drawn by a child",
        ImageStyle::Clay => "a claymation scene made of smooth, rounded modeling clay",
    }
}

/// The full prompt sent to the model: safety preamble, style, then the child's idea
pub fn wrap_prompt(request: &ImageRequest) -> String {
    format!(
        "{SAFETY_PREAMBLE}\nStyle: {}.\nScene: {}",
        style_description(request.style),
        request.prompt.trim()
    )
}

#[derive(Debug, Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: String,
    size: &'a str,
    quality: &'a str,
    output_format: &'a str,
    n: u8,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

pub struct OpenAIImageProvider {
    client: Client,
    config: OpenAIImageConfig,
}

impl OpenAIImageProvider {
    pub fn new(config: OpenAIImageConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }
}

#[async_trait]
impl ImageProvider for OpenAIImageProvider {
    #[instrument(skip_all, fields(style = ?request.style, model = %self.config.model))]
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            error!("Image provider has no API key configured");
            return Err(ProviderError::MissingCredential { provider: "openai" });
        };

        let body = ImagesRequest {
            model: &self.config.model,
            prompt: wrap_prompt(request),
            size: &self.config.size,
            quality: &self.config.quality,
            output_format: &self.config.output_format,
            n: 1,
        };
        let url = endpoint(&self.config.base_url, "images/generations")?;
        let response: ImagesResponse = send_json(&self.client, url, api_key, &body).await?;

        let first = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponseShape("response contained no images".to_string()))?;

        match first {
            ImageData { b64_json: Some(b64), .. } if !b64.is_empty() => Ok(GeneratedImage {
                url: format!("data:image/{};base64,{b64}", self.config.output_format),
            }),
            ImageData { url: Some(url), .. } if !url.is_empty() => Ok(GeneratedImage { url }),
            _ => Err(ProviderError::InvalidResponseShape(
                "image had neither b64_json nor url".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::install_crypto_provider;
    use url::Url;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, api_key: Option<&str>) -> OpenAIImageProvider {
        install_crypto_provider();
        OpenAIImageProvider::new(OpenAIImageConfig {
            api_key: api_key.map(str::to_string),
            base_url: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
            ..Default::default()
        })
        .unwrap()
    }

    fn request() -> ImageRequest {
        ImageRequest {
            prompt: "a turtle flying a kite".to_string(),
            style: ImageStyle::Watercolor,
        }
    }

    #[tokio::test]
    async fn test_b64_response_becomes_data_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-image-1",
                "n": 1,
                "output_format": "png"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "b64_json": "iVBORw0KGgo=" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let image = provider(&server, Some("sk-test")).generate(&request()).await.unwrap();
        assert_eq!(image.url, "data:image/png;base64,iVBORw0KGgo=");
    }

    #[tokio::test]
    async fn test_url_response_used_as_is() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "url": "https://cdn.example.com/turtle.png" }]
            })))
            .mount(&server)
            .await;

        let image = provider(&server, Some("sk-test")).generate(&request()).await.unwrap();
        assert_eq!(image.url, "https://cdn.example.com/turtle.png");
    }

    #[tokio::test]
    async fn test_prompt_is_wrapped_with_safety_preamble() {
        let server = MockServer::start().await;
        let wrapped = wrap_prompt(&request());
        assert!(wrapped.starts_with(SAFETY_PREAMBLE));
        assert!(wrapped.contains("watercolor"));
        assert!(wrapped.ends_with("a turtle flying a kite"));

        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "prompt": wrapped })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "url": "https://cdn.example.com/ok.png" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server, Some("sk-test")).generate(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("content policy violation"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
            .mount(&server)
            .await;

        let provider = provider(&server, Some("sk-test"));
        assert!(matches!(
            provider.generate(&request()).await,
            Err(ProviderError::Rejected { status: 400, .. })
        ));
        assert!(matches!(provider.generate(&request()).await, Err(ProviderError::Unavailable(_))));
        assert!(matches!(
            provider.generate(&request()).await,
            Err(ProviderError::InvalidResponseShape(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_never_calls_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let result = provider(&server, None).generate(&request()).await;
        assert!(matches!(result, Err(ProviderError::MissingCredential { .. })));
    }
}
