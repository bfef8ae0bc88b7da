//! Music provider callbacks: authentication, parsing and applying status changes.
//!
//! The provider posts to the callback URL we handed it at submission. Two body shapes are
//! accepted:
//!
//! ```text
//! flat:      { "taskId": "T123", "status": "complete", "audioUrl": "https://..." }
//! envelope:  { "code": 200, "msg": "success",
//!              "data": { "callbackType": "complete", "task_id": "T123",
//!                        "data": [ { "audio_url": "https://...", ... } ] } }
//! ```
//!
//! Callbacks are authenticated with a token carried in the callback URL's query string,
//! derived from `providers.callback_secret` with HMAC-SHA256.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use crate::db::{
    CreationStore,
    errors::Result,
    models::creations::{CreationStatus, StatusUpdateDBRequest, StatusUpdateOutcome},
};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_CONTEXT: &[u8] = b"studioctl:music-callback:v1";

/// Token appended to the callback URL as `?token=...`
pub fn callback_token(secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(TOKEN_CONTEXT);
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Constant-time check of a presented callback token
pub fn verify_callback_token(secret: &str, token: &str) -> bool {
    let Ok(presented) = URL_SAFE_NO_PAD.decode(token) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(TOKEN_CONTEXT);
    mac.verify_slice(&presented).is_ok()
}

/// A callback body in either accepted shape
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CallbackPayload {
    Envelope(EnvelopeCallback),
    Flat(FlatCallback),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlatCallback {
    #[serde(rename = "taskId", alias = "task_id")]
    pub task_id: String,
    pub status: String,
    #[serde(default, rename = "audioUrl", alias = "audio_url")]
    pub audio_url: Option<String>,
    #[serde(default, rename = "errorMessage", alias = "error_message", alias = "error")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeCallback {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: EnvelopeData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeData {
    #[serde(default, rename = "callbackType", alias = "callback_type")]
    pub callback_type: Option<String>,
    #[serde(alias = "taskId")]
    pub task_id: String,
    #[serde(default)]
    pub data: Option<Vec<EnvelopeTrack>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeTrack {
    #[serde(default, alias = "audioUrl")]
    pub audio_url: Option<String>,
}

/// A callback reduced to the status change it asks for
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub task_id: String,
    pub status: CreationStatus,
    pub asset_urls: Vec<String>,
    pub error_message: Option<String>,
}

/// Map a provider status word to a record status. Completion without audio counts as failure.
fn map_status(raw: &str, has_audio: bool) -> Option<CreationStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "complete" | "completed" | "success" if has_audio => Some(CreationStatus::Completed),
        "complete" | "completed" | "success" => Some(CreationStatus::Failed),
        "text" | "first" | "processing" | "pending" => Some(CreationStatus::Processing),
        "error" | "failed" => Some(CreationStatus::Failed),
        _ => None,
    }
}

impl CallbackPayload {
    /// Parse a raw body. `None` for bodies in neither shape.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    pub fn task_id(&self) -> &str {
        match self {
            CallbackPayload::Envelope(envelope) => &envelope.data.task_id,
            CallbackPayload::Flat(flat) => &flat.task_id,
        }
    }

    /// The status change this callback asks for, or `None` for a status word we don't know
    pub fn into_event(self) -> Option<CompletionEvent> {
        match self {
            CallbackPayload::Flat(flat) => {
                let asset_urls: Vec<String> = flat.audio_url.into_iter().filter(|url| !url.is_empty()).collect();
                let status = map_status(&flat.status, !asset_urls.is_empty())?;
                let error_message = match status {
                    CreationStatus::Failed => Some(flat.error_message.unwrap_or_else(|| failure_message(&flat.status))),
                    _ => None,
                };
                Some(CompletionEvent {
                    task_id: flat.task_id,
                    status,
                    asset_urls,
                    error_message,
                })
            }
            CallbackPayload::Envelope(envelope) => {
                let task_id = envelope.data.task_id;
                if envelope.code != 200 {
                    return Some(CompletionEvent {
                        task_id,
                        status: CreationStatus::Failed,
                        asset_urls: Vec::new(),
                        error_message: Some(format!("provider reported code {}: {}", envelope.code, envelope.msg)),
                    });
                }
                let asset_urls: Vec<String> = envelope
                    .data
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|track| track.audio_url)
                    .filter(|url| !url.is_empty())
                    .collect();
                let callback_type = envelope.data.callback_type.unwrap_or_else(|| "complete".to_string());
                let status = map_status(&callback_type, !asset_urls.is_empty())?;
                let error_message = (status == CreationStatus::Failed).then(|| failure_message(&callback_type));
                Some(CompletionEvent {
                    task_id,
                    status,
                    asset_urls,
                    error_message,
                })
            }
        }
    }
}

fn failure_message(raw_status: &str) -> String {
    match raw_status.to_ascii_lowercase().as_str() {
        "complete" | "completed" | "success" => "provider reported completion without audio".to_string(),
        other => format!("provider reported status '{other}'"),
    }
}

/// Apply a completion event to the record carrying its task id.
///
/// Unknown task ids and transitions that don't move the record forward are logged and
/// otherwise ignored; neither is an error.
#[instrument(skip(store, event), fields(task_id = %event.task_id, status = event.status.as_str()))]
pub async fn apply_event<S: CreationStore + ?Sized>(store: &S, event: CompletionEvent) -> Result<StatusUpdateOutcome> {
    let request = StatusUpdateDBRequest {
        status: event.status,
        asset_urls: event.asset_urls,
        error_message: event.error_message,
    };
    let outcome = store.update_creation_status(&event.task_id, &request).await?;

    let label = match &outcome {
        StatusUpdateOutcome::Applied(record) => {
            info!(creation_id = %record.id, "Creation status updated from callback");
            "applied"
        }
        StatusUpdateOutcome::Unchanged(record) => {
            debug!(creation_id = %record.id, current = record.status.as_str(), "Callback did not move creation forward");
            "unchanged"
        }
        StatusUpdateOutcome::UnknownTask => {
            warn!("Callback for unknown task id dropped");
            "unknown_task"
        }
    };
    metrics::counter!("studio_callbacks_total", "outcome" => label).increment(1);
    Ok(outcome)
}
