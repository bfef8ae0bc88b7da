//! OpenAI-compatible story continuation (`chat/completions`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use super::{ProviderError, Result, StoryProvider, StoryRequest, endpoint, http_client, send_json};
use crate::config::OpenAIStoryConfig;
use crate::db::models::creations::{StoryGenre, StoryLength};

/// Target words for a continuation
pub fn word_budget(length: StoryLength) -> u32 {
    match length {
        StoryLength::Short => 80,
        StoryLength::Medium => 180,
        StoryLength::Long => 350,
    }
}

/// Completion token ceiling for a continuation
pub fn token_budget(length: StoryLength) -> u32 {
    match length {
        StoryLength::Short => 250,
        StoryLength::Medium => 500,
        StoryLength::Long => 900,
    }
}

fn genre_label(genre: StoryGenre) -> &'static str {
    match genre {
        StoryGenre::Adventure => "an adventure story",
        StoryGenre::Fantasy => "a fantasy story",
        StoryGenre::Mystery => "a gentle mystery",
        StoryGenre::ScienceFiction => "a science fiction story",
        StoryGenre::Animals => "a story about animals",
        StoryGenre::Funny => "a funny story",
    }
}

pub fn system_prompt(genre: StoryGenre, length: StoryLength) -> String {
    format!(
        "You are a warm, imaginative storyteller writing {} together with a child aged 6 to 12. \
Continue the story from where it left off, following the child's idea for what happens next. \
Write about {} words in simple, vivid language. Keep everything kind and age-appropriate: \
no violence, gore, frightening content, romance or real people. \
Reply with the story text only.",
        genre_label(genre),
        word_budget(length)
    )
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAIStoryProvider {
    client: Client,
    config: OpenAIStoryConfig,
}

impl OpenAIStoryProvider {
    pub fn new(config: OpenAIStoryConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }
}

#[async_trait]
impl StoryProvider for OpenAIStoryProvider {
    #[instrument(skip_all, fields(genre = ?request.genre, length = ?request.length, model = %self.config.model))]
    async fn continue_story(&self, request: &StoryRequest) -> Result<String> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            error!("Story provider has no API key configured");
            return Err(ProviderError::MissingCredential { provider: "openai" });
        };

        let system = system_prompt(request.genre, request.length);
        let mut messages = vec![ChatMessage {
            role: "system",
            content: &system,
        }];
        if !request.story_so_far.trim().is_empty() {
            messages.push(ChatMessage {
                role: "assistant",
                content: &request.story_so_far,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.continuation,
        });

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: token_budget(request.length),
            temperature: self.config.temperature,
        };
        let url = endpoint(&self.config.base_url, "chat/completions")?;
        let response: ChatResponse = send_json(&self.client, url, api_key, &body).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::InvalidResponseShape("completion had no content".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::install_crypto_provider;
    use url::Url;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAIStoryProvider {
        install_crypto_provider();
        OpenAIStoryProvider::new(OpenAIStoryConfig {
            api_key: Some("sk-story".to_string()),
            base_url: Url::parse(&format!("{}/v1/", server.uri())).unwrap(),
            ..Default::default()
        })
        .unwrap()
    }

    fn request(length: StoryLength) -> StoryRequest {
        StoryRequest {
            story_so_far: "Pip the penguin found a glowing shell.".to_string(),
            genre: StoryGenre::Adventure,
            length,
            continuation: "Pip takes the shell to the lighthouse".to_string(),
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    #[test]
    fn test_budgets_by_length() {
        assert_eq!(
            [StoryLength::Short, StoryLength::Medium, StoryLength::Long].map(word_budget),
            [80, 180, 350]
        );
        assert_eq!(
            [StoryLength::Short, StoryLength::Medium, StoryLength::Long].map(token_budget),
            [250, 500, 900]
        );
        assert!(system_prompt(StoryGenre::Funny, StoryLength::Long).contains("350 words"));
    }

    #[tokio::test]
    async fn test_prior_story_is_assistant_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("sk-story"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 500,
                "messages": [
                    { "role": "system" },
                    { "role": "assistant", "content": "Pip the penguin found a glowing shell." },
                    { "role": "user", "content": "Pip takes the shell to the lighthouse" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  The lighthouse keeper smiled.\n")))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server).continue_story(&request(StoryLength::Medium)).await.unwrap();
        assert_eq!(text, "The lighthouse keeper smiled.");
    }

    #[tokio::test]
    async fn test_blank_content_is_invalid_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&server)
            .await;

        let result = provider(&server).continue_story(&request(StoryLength::Short)).await;
        assert!(matches!(result, Err(ProviderError::InvalidResponseShape(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let result = provider(&server).continue_story(&request(StoryLength::Long)).await;
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }
}
