//! Quota-then-generate orchestration for every creation kind.
//!
//! Each request goes through the same steps, in order:
//!
//! 1. require an authenticated account ([`Error::Unauthenticated`])
//! 2. validate the input, before anything is debited ([`Error::BadRequest`])
//! 3. reserve one creation with the [`QuotaLedger`] ([`Error::LimitReached`]; the provider is
//!    not called and no record is written)
//! 4. call the provider adapter ([`Error::GenerationFailed`]; the debit stands)
//! 5. persist the record: images and stories `completed`, music `pending` with its task id
//!    ([`Error::RecordPersistence`] if the write fails after the provider succeeded)
//!
//! Every outcome is counted in `studio_creations_total{kind, outcome}`.

use std::sync::Arc;
use tracing::{Instrument, info, info_span};
use url::Url;

use crate::api::models::accounts::CurrentAccount;
use crate::api::models::creations::{ImageCreate, MAX_PROMPT_CHARS, MusicCreate, StoryCreate};
use crate::auth::current_account::RequestContext;
use crate::db::{
    CreationStore, Store,
    models::creations::{CreationCreateDBRequest, CreationDBResponse, CreationKind, CreationPayload},
};
use crate::errors::{Error, Result};
use crate::providers::{ImageRequest, MusicRequest, ProviderError, Providers, StoryRequest};
use crate::quota::{QuotaDecision, QuotaLedger};
use crate::types::abbrev_uuid;

const MAX_TITLE_CHARS: usize = 100;
const MAX_STYLE_CHARS: usize = 200;
const MAX_STORY_CHARS: usize = 20_000;

/// A persisted creation and the quota status after its reservation
#[derive(Debug, Clone)]
pub struct CreationOutcome {
    pub creation: CreationDBResponse,
    pub usage: QuotaDecision,
}

#[derive(Clone)]
pub struct CreationWorkflow {
    store: Arc<dyn Store>,
    ledger: QuotaLedger,
    providers: Providers,
    /// Handed to the music provider on submission
    callback_url: Url,
}

impl CreationWorkflow {
    pub fn new(store: Arc<dyn Store>, ledger: QuotaLedger, providers: Providers, callback_url: Url) -> Self {
        Self {
            store,
            ledger,
            providers,
            callback_url,
        }
    }

    pub async fn create_image(&self, ctx: &RequestContext, input: ImageCreate) -> Result<CreationOutcome> {
        let span = info_span!("create_image", request_id = %ctx.request_id);
        let result = self.image(ctx, input).instrument(span).await;
        record_outcome(CreationKind::Image, &result);
        result
    }

    pub async fn continue_story(&self, ctx: &RequestContext, input: StoryCreate) -> Result<CreationOutcome> {
        let span = info_span!("continue_story", request_id = %ctx.request_id);
        let result = self.story(ctx, input).instrument(span).await;
        record_outcome(CreationKind::Story, &result);
        result
    }

    pub async fn submit_music(&self, ctx: &RequestContext, input: MusicCreate) -> Result<CreationOutcome> {
        let span = info_span!("submit_music", request_id = %ctx.request_id);
        let result = self.music(ctx, input).instrument(span).await;
        record_outcome(CreationKind::Music, &result);
        result
    }

    async fn image(&self, ctx: &RequestContext, input: ImageCreate) -> Result<CreationOutcome> {
        let account = require_account(ctx)?;
        let prompt = required_text("prompt", &input.prompt, MAX_PROMPT_CHARS)?;

        let usage = self.reserve(account, CreationKind::Image).await?;

        let request = ImageRequest {
            prompt: prompt.clone(),
            style: input.style,
        };
        let image = self
            .providers
            .image
            .generate(&request)
            .await
            .map_err(|source| generation_failed(CreationKind::Image, source))?;

        let payload = CreationPayload::Image {
            prompt,
            style: input.style,
        };
        let creation = self
            .persist(CreationCreateDBRequest::completed(account.id, payload, vec![image.url]))
            .await?;
        Ok(CreationOutcome { creation, usage })
    }

    async fn story(&self, ctx: &RequestContext, input: StoryCreate) -> Result<CreationOutcome> {
        let account = require_account(ctx)?;
        let continuation = required_text("continuation", &input.continuation, MAX_PROMPT_CHARS)?;
        if input.story_so_far.chars().count() > MAX_STORY_CHARS {
            return Err(Error::BadRequest {
                message: format!("story_so_far must be at most {MAX_STORY_CHARS} characters"),
            });
        }

        let usage = self.reserve(account, CreationKind::Story).await?;

        let request = StoryRequest {
            story_so_far: input.story_so_far,
            genre: input.genre,
            length: input.length,
            continuation: continuation.clone(),
        };
        let text = self
            .providers
            .story
            .continue_story(&request)
            .await
            .map_err(|source| generation_failed(CreationKind::Story, source))?;

        let payload = CreationPayload::Story {
            genre: input.genre,
            length: input.length,
            prompt: continuation,
            text,
        };
        let creation = self
            .persist(CreationCreateDBRequest::completed(account.id, payload, Vec::new()))
            .await?;
        Ok(CreationOutcome { creation, usage })
    }

    async fn music(&self, ctx: &RequestContext, input: MusicCreate) -> Result<CreationOutcome> {
        let account = require_account(ctx)?;
        let prompt = required_text("prompt", &input.prompt, MAX_PROMPT_CHARS)?;
        let title = required_text("title", &input.title, MAX_TITLE_CHARS)?;
        let style = required_text("style", &input.style, MAX_STYLE_CHARS)?;

        let usage = self.reserve(account, CreationKind::Music).await?;

        let request = MusicRequest {
            prompt: prompt.clone(),
            style: style.clone(),
            title: title.clone(),
            instrumental: input.instrumental,
        };
        let submission = self
            .providers
            .music
            .submit(&request, &self.callback_url)
            .await
            .map_err(|source| generation_failed(CreationKind::Music, source))?;

        let payload = CreationPayload::Music {
            prompt,
            style,
            title,
            instrumental: input.instrumental,
        };
        let creation = self
            .persist(CreationCreateDBRequest::pending(account.id, payload, submission.task_id))
            .await?;
        Ok(CreationOutcome { creation, usage })
    }

    async fn reserve(&self, account: &CurrentAccount, kind: CreationKind) -> Result<QuotaDecision> {
        let decision = self.ledger.check_and_reserve(account.id, kind).await;
        if decision.can_proceed {
            Ok(decision)
        } else {
            Err(Error::LimitReached {
                decision: Box::new(decision),
            })
        }
    }

    async fn persist(&self, request: CreationCreateDBRequest) -> Result<CreationDBResponse> {
        let kind = request.payload.kind();
        let creation = self
            .store
            .create_creation(&request)
            .await
            .map_err(|source| Error::RecordPersistence { kind, source })?;
        info!(
            creation_id = %abbrev_uuid(&creation.id),
            account_id = %abbrev_uuid(&creation.account_id),
            kind = kind.as_str(),
            status = creation.status.as_str(),
            "Creation recorded"
        );
        Ok(creation)
    }
}

fn require_account(ctx: &RequestContext) -> Result<&CurrentAccount> {
    ctx.account.as_ref().ok_or(Error::Unauthenticated { message: None })
}

/// Trimmed text of 1 to `max` characters
fn required_text(field: &str, value: &str, max: usize) -> Result<String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(Error::BadRequest {
            message: format!("{field} cannot be empty"),
        });
    }
    if len > max {
        return Err(Error::BadRequest {
            message: format!("{field} must be at most {max} characters"),
        });
    }
    Ok(trimmed.to_string())
}

fn generation_failed(kind: CreationKind, source: ProviderError) -> Error {
    metrics::counter!("studio_provider_failures_total", "kind" => kind.as_str(), "error" => source.label()).increment(1);
    Error::GenerationFailed { kind, source }
}

fn record_outcome(kind: CreationKind, result: &Result<CreationOutcome>) {
    let outcome = match result {
        Ok(outcome) if outcome.creation.status.is_terminal() => "created",
        Ok(_) => "submitted",
        Err(Error::Unauthenticated { .. }) => "unauthenticated",
        Err(Error::BadRequest { .. }) => "invalid",
        Err(Error::LimitReached { .. }) => "limit_reached",
        Err(Error::GenerationFailed { .. }) => "generation_failed",
        Err(Error::RecordPersistence { .. }) => "persistence_failed",
        Err(_) => "error",
    };
    metrics::counter!("studio_creations_total", "kind" => kind.as_str(), "outcome" => outcome).increment(1);
}
