//! Dummy providers
//!
//! No network calls to any vendor. Useful for development and for exercising the full creation
//! flow in tests.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::{
    GeneratedImage, ImageProvider, ImageRequest, MusicProvider, MusicRequest, MusicSubmission, Result, StoryProvider,
    StoryRequest, http_client,
};
use crate::config::DummyMusicConfig;
use crate::db::models::creations::StoryGenre;

/// Returns a placeholder SVG with the style name on it
pub struct DummyImageProvider;

#[async_trait]
impl ImageProvider for DummyImageProvider {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="512" height="512"><rect width="100%" height="100%" fill="#fde68a"/><text x="50%" y="50%" text-anchor="middle" font-size="32" fill="#92400e">{:?}</text></svg>"##,
            request.style
        );
        tracing::info!("Dummy provider generated placeholder image");
        Ok(GeneratedImage {
            url: format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)),
        })
    }
}

/// Returns a canned continuation per genre
pub struct DummyStoryProvider;

#[async_trait]
impl StoryProvider for DummyStoryProvider {
    async fn continue_story(&self, request: &StoryRequest) -> Result<String> {
        let ending = match request.genre {
            StoryGenre::Adventure => "and set off over the hills before the sun came up.",
            StoryGenre::Fantasy => "and the old oak tree whispered a secret spell.",
            StoryGenre::Mystery => "and noticed that the footprints stopped at the garden gate.",
            StoryGenre::ScienceFiction => "and the little robot blinked its lights three times.",
            StoryGenre::Animals => "and a friendly fox poked its nose out of the bushes.",
            StoryGenre::Funny => "and everybody laughed so hard the teapot fell over.",
        };
        Ok(format!("{}, {ending}", request.continuation.trim().trim_end_matches('.')))
    }
}

/// Hands out task ids. With a `callback_delay` configured it later posts a `complete` callback
/// to the callback URL it was given, the way the real provider would.
pub struct DummyMusicProvider {
    client: Client,
    callback_delay: Option<Duration>,
}

impl DummyMusicProvider {
    pub fn new(config: DummyMusicConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(10))?,
            callback_delay: config.callback_delay,
        })
    }
}

#[async_trait]
impl MusicProvider for DummyMusicProvider {
    async fn submit(&self, request: &MusicRequest, callback_url: &Url) -> Result<MusicSubmission> {
        let task_id = format!("dummy_{}", uuid::Uuid::new_v4().simple());
        tracing::info!("Dummy provider accepted music task {} ({})", task_id, request.title);

        if let Some(delay) = self.callback_delay {
            let client = self.client.clone();
            let url = callback_url.clone();
            let body = serde_json::json!({
                "taskId": task_id,
                "status": "complete",
                "audioUrl": format!("https://studio.invalid/dummy-music/{task_id}.mp3"),
            });
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = client.post(url).json(&body).send().await {
                    tracing::warn!("Dummy music callback failed: {}", e);
                }
            });
        }

        Ok(MusicSubmission { task_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::creations::{ImageStyle, StoryLength};
    use crate::test_utils::install_crypto_provider;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_dummy_image_is_svg_data_uri() {
        let image = DummyImageProvider
            .generate(&ImageRequest {
                prompt: "a cat".to_string(),
                style: ImageStyle::Crayon,
            })
            .await
            .unwrap();
        assert!(image.url.starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn test_dummy_story_continues_the_idea() {
        let text = DummyStoryProvider
            .continue_story(&StoryRequest {
                story_so_far: String::new(),
                genre: StoryGenre::Animals,
                length: StoryLength::Short,
                continuation: "Mia opened the door.".to_string(),
            })
            .await
            .unwrap();
        assert!(text.starts_with("Mia opened the door, "));
    }

    #[tokio::test]
    async fn test_dummy_music_posts_its_own_callback() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhooks/music"))
            .and(query_param("token", "t0k"))
            .and(body_partial_json(serde_json::json!({ "status": "complete" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let provider = DummyMusicProvider::new(DummyMusicConfig {
            callback_delay: Some(Duration::from_millis(10)),
        })
        .unwrap();
        let callback = Url::parse(&format!("{}/webhooks/music?token=t0k", server.uri())).unwrap();
        let request = MusicRequest {
            prompt: "la la".to_string(),
            style: "pop".to_string(),
            title: "Test".to_string(),
            instrumental: true,
        };

        let submission = provider.submit(&request, &callback).await.unwrap();
        assert!(submission.task_id.starts_with("dummy_"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        server.verify().await;
    }
}
