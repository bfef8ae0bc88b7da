use crate::{
    AppState,
    api::models::accounts::CurrentAccount,
    auth::session,
    config::Config,
    db::{AccountStore, Store, errors::DbError, models::accounts::AccountCreateDBRequest},
    errors::{Error, Result},
    types::abbrev_uuid,
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

/// Find the session token in an `Authorization: Bearer` header or the session cookie
fn session_token<'a>(parts: &'a Parts, config: &Config) -> Option<&'a str> {
    if let Some(token) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        return Some(token.trim());
    }

    let cookie_str = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    let cookie_name = &config.auth.session.cookie_name;
    cookie_str.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == cookie_name).then_some(value)
    })
}

/// Authenticate from a JWT session token if present.
/// Returns:
/// - None: no token present
/// - Some(Ok(account)): valid token for an existing, active account
/// - Some(Err(error)): token present but invalid, or the account is gone or deactivated
#[instrument(skip(parts, config, store))]
async fn try_jwt_session_auth(parts: &Parts, config: &Config, store: &dyn Store) -> Option<Result<CurrentAccount>> {
    let token = session_token(parts, config)?;

    let claims = match session::verify_session_token(token, config) {
        Ok(claims) => claims,
        Err(e) => return Some(Err(e)),
    };

    Some(match store.get_account(claims.sub).await {
        Ok(Some(account)) if account.is_active => Ok(CurrentAccount::from(account)),
        Ok(Some(_)) => Err(Error::Unauthenticated {
            message: Some("This account has been deactivated".to_string()),
        }),
        Ok(None) => Err(Error::Unauthenticated { message: None }),
        Err(e) => Err(Error::Database(e)),
    })
}

/// Authenticate from the trusted proxy header if present, creating the account on first sight
/// when configured to.
#[instrument(skip(parts, config, store))]
async fn try_proxy_header_auth(parts: &Parts, config: &Config, store: &dyn Store) -> Option<Result<CurrentAccount>> {
    let email = parts
        .headers
        .get(&config.auth.proxy_header.header_name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())?;

    let account = match store.get_account_by_email(email).await {
        Ok(Some(account)) => account,
        Ok(None) if config.auth.proxy_header.auto_create_accounts => {
            match store.create_account(&AccountCreateDBRequest::free_consumer(email)).await {
                Ok(account) => {
                    info!(account_id = %abbrev_uuid(&account.id), "Created account from proxy header");
                    account
                }
                // Lost a race with a concurrent first request for the same email
                Err(DbError::UniqueViolation { .. }) => match store.get_account_by_email(email).await {
                    Ok(Some(account)) => account,
                    Ok(None) => return Some(Err(Error::Unauthenticated { message: None })),
                    Err(e) => return Some(Err(Error::Database(e))),
                },
                Err(e) => return Some(Err(Error::Database(e))),
            }
        }
        Ok(None) => return Some(Err(Error::Unauthenticated { message: None })),
        Err(e) => return Some(Err(Error::Database(e))),
    };

    if !account.is_active {
        return Some(Err(Error::Unauthenticated {
            message: Some("This account has been deactivated".to_string()),
        }));
    }
    Some(Ok(CurrentAccount::from(account)))
}

/// Try every enabled method.
///
/// `Ok(None)` when no credentials were presented or none were valid. Store failures are
/// returned as errors rather than treated as anonymous.
pub async fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<CurrentAccount>> {
    let config = &state.config;
    let store = state.store.as_ref();

    if config.auth.session.enabled {
        match try_jwt_session_auth(parts, config, store).await {
            Some(Ok(account)) => {
                debug!("Found JWT session authenticated account: {}", abbrev_uuid(&account.id));
                return Ok(Some(account));
            }
            Some(Err(e @ (Error::Database(_) | Error::Internal { .. }))) => return Err(e),
            Some(Err(e)) => trace!("JWT session authentication failed: {:?}", e),
            None => trace!("No JWT session authentication attempted"),
        }
    }

    if config.auth.proxy_header.enabled {
        match try_proxy_header_auth(parts, config, store).await {
            Some(Ok(account)) => {
                debug!("Found proxy header authenticated account: {}", abbrev_uuid(&account.id));
                return Ok(Some(account));
            }
            Some(Err(e @ Error::Database(_))) => return Err(e),
            Some(Err(e)) => trace!("Proxy header authentication failed: {:?}", e),
            None => trace!("No proxy header authentication attempted"),
        }
    }

    Ok(None)
}

impl FromRequestParts<AppState> for CurrentAccount {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        authenticate(parts, state)
            .await?
            .ok_or(Error::Unauthenticated { message: None })
    }
}

/// Per-request context handed to the creation workflow.
///
/// `account` is `None` for anonymous requests; the workflow decides what that means.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub account: Option<CurrentAccount>,
    /// From the `x-request-id` header when present, otherwise generated
    pub request_id: String,
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|h| h.to_str().ok())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let account = authenticate(parts, state).await?;
        Ok(Self { account, request_id })
    }
}
