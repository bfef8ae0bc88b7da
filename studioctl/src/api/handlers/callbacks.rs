//! Music provider callback endpoint.
//!
//! Once a callback is authenticated the response is always `200 OK`, including for bodies we
//! cannot parse and task ids we never issued. Those are logged and counted.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{error, instrument, warn};

use crate::{
    AppState,
    completion::{CallbackPayload, apply_event, verify_callback_token},
    errors::{Error, Result},
};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    token: Option<String>,
}

#[instrument(skip_all)]
pub async fn music_callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>, body: Bytes) -> Result<StatusCode> {
    if let Some(secret) = &state.config.providers.callback_secret {
        let authenticated = query.token.as_deref().is_some_and(|token| verify_callback_token(secret, token));
        if !authenticated {
            warn!("Rejected music callback with missing or invalid token");
            return Err(Error::Unauthenticated {
                message: Some("Invalid callback token".to_string()),
            });
        }
    }

    let Some(payload) = CallbackPayload::parse(&body) else {
        warn!(body_len = body.len(), "Unparseable music callback dropped");
        metrics::counter!("studio_callbacks_total", "outcome" => "unparseable").increment(1);
        return Ok(StatusCode::OK);
    };
    let task_id = payload.task_id().to_string();
    let Some(event) = payload.into_event() else {
        warn!(%task_id, "Music callback without a usable status dropped");
        metrics::counter!("studio_callbacks_total", "outcome" => "unparseable").increment(1);
        return Ok(StatusCode::OK);
    };

    if let Err(e) = apply_event(state.store.as_ref(), event).await {
        error!(%task_id, error = %e, "Failed to apply music callback");
    }
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use crate::db::models::accounts::AccountTier;
    use crate::db::models::creations::{CreationCreateDBRequest, CreationPayload, CreationStatus};
    use crate::db::CreationStore;
    use crate::test_utils::*;
    use serde_json::json;

    #[test_log::test(tokio::test)]
    async fn test_envelope_callback_updates_record() {
        let state = create_test_state();
        let account = create_test_account(&state, AccountTier::FreeConsumer).await;
        let payload = CreationPayload::Music {
            prompt: "a song about snow".to_string(),
            style: "folk".to_string(),
            title: "Snow".to_string(),
            instrumental: false,
        };
        let record = state
            .store
            .create_creation(&CreationCreateDBRequest::pending(account.id, payload, "T123".to_string()))
            .await
            .unwrap();
        let server = create_test_server(state.clone());

        let first = json!({
            "code": 200,
            "msg": "All generated successfully.",
            "data": { "callbackType": "first", "task_id": "T123", "data": [] }
        });
        server.post("/webhooks/music").json(&first).await.assert_status_ok();
        let stored = state.store.get_creation(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CreationStatus::Processing);

        let complete = json!({
            "code": 200,
            "msg": "All generated successfully.",
            "data": {
                "callbackType": "complete",
                "task_id": "T123",
                "data": [{ "audio_url": "https://cdn.example.com/snow.mp3" }]
            }
        });
        server.post("/webhooks/music").json(&complete).await.assert_status_ok();
        let stored = state.store.get_creation(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CreationStatus::Completed);
        assert_eq!(stored.asset_urls, vec!["https://cdn.example.com/snow.mp3".to_string()]);

        // A late failure does not undo the completion
        let failed = json!({ "code": 500, "msg": "boom", "data": { "callbackType": "error", "task_id": "T123" } });
        server.post("/webhooks/music").json(&failed).await.assert_status_ok();
        let stored = state.store.get_creation(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CreationStatus::Completed);
    }
}
