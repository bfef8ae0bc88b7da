use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;

use crate::{
    AppState,
    api::models::{
        accounts::CurrentAccount,
        creations::{CreationCreatedResponse, CreationResponse, ImageCreate, ListCreationsQuery, MusicCreate, StoryCreate},
    },
    auth::{current_account::RequestContext, permissions},
    db::{CreationStore, models::creations::CreationFilter},
    errors::{Error, Result},
    types::{CreationId, Resource},
};

#[utoipa::path(
    post,
    path = "/creations/images",
    tag = "creations",
    summary = "Create an image",
    description = "Uses one creation, then generates an image from the prompt in the chosen style.",
    request_body = ImageCreate,
    responses(
        (status = 200, description = "The completed image and the quota status", body = CreationCreatedResponse),
        (status = 400, description = "Invalid prompt"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "No creations left", body = crate::quota::QuotaDecision),
        (status = 502, description = "The image could not be generated"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all)]
pub async fn create_image(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(input): Json<ImageCreate>,
) -> Result<Json<CreationCreatedResponse>> {
    let outcome = state.workflow.create_image(&ctx, input).await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    post,
    path = "/creations/stories",
    tag = "creations",
    summary = "Continue a story",
    description = "Uses one creation, then writes the next part of the story.",
    request_body = StoryCreate,
    responses(
        (status = 200, description = "The story continuation and the quota status", body = CreationCreatedResponse),
        (status = 400, description = "Invalid continuation"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "No creations left", body = crate::quota::QuotaDecision),
        (status = 502, description = "The story could not be generated"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all)]
pub async fn continue_story(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(input): Json<StoryCreate>,
) -> Result<Json<CreationCreatedResponse>> {
    let outcome = state.workflow.continue_story(&ctx, input).await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    post,
    path = "/creations/music",
    tag = "creations",
    summary = "Make a song",
    description = "Uses one creation and submits the song. The record starts `pending` and completes when the provider calls back; poll `GET /creations/{id}` for progress.",
    request_body = MusicCreate,
    responses(
        (status = 200, description = "The pending record and the quota status", body = CreationCreatedResponse),
        (status = 400, description = "Invalid prompt, style or title"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "No creations left", body = crate::quota::QuotaDecision),
        (status = 502, description = "The song could not be submitted"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all)]
pub async fn submit_music(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(input): Json<MusicCreate>,
) -> Result<Json<CreationCreatedResponse>> {
    let outcome = state.workflow.submit_music(&ctx, input).await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    get,
    path = "/creations",
    tag = "creations",
    summary = "List my creations",
    params(ListCreationsQuery),
    responses(
        (status = 200, description = "The signed in account's creations", body = [CreationResponse]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all)]
pub async fn list_creations(
    State(state): State<AppState>,
    Query(query): Query<ListCreationsQuery>,
    current: CurrentAccount,
) -> Result<Json<Vec<CreationResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = CreationFilter {
        kind: query.kind,
        order: query.order.unwrap_or_default(),
        ..CreationFilter::new(current.id, skip, limit)
    };
    let records = state.store.list_creations(&filter).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/creations/{id}",
    tag = "creations",
    summary = "Get a creation",
    params(("id" = uuid::Uuid, Path, description = "Creation ID")),
    responses(
        (status = 200, description = "The creation", body = CreationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found, or not yours"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all)]
pub async fn get_creation(
    State(state): State<AppState>,
    Path(id): Path<CreationId>,
    current: CurrentAccount,
) -> Result<Json<CreationResponse>> {
    let not_found = || Error::NotFound {
        resource: "Creation".to_string(),
        id: id.to_string(),
    };
    let record = state.store.get_creation(id).await?.ok_or_else(not_found)?;
    // Someone else's record is reported as missing
    if record.account_id != current.id && !permissions::can_read_all_resources(&current, Resource::Creations) {
        return Err(not_found());
    }
    Ok(Json(record.into()))
}
