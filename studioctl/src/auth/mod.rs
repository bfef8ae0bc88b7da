//! Authentication and authorization.
//!
//! # Authentication Methods
//!
//! ## 1. Session tokens
//!
//! HS256 JWTs signed with `secret_key`, presented as `Authorization: Bearer <token>` or in the
//! session cookie (`auth.session.cookie_name`). The token names the account; the account itself
//! is always loaded from the store.
//!
//! ## 2. Trusted proxy header
//!
//! An authenticating reverse proxy sets `auth.proxy_header.header_name` to the account's email.
//! Unknown emails get a free consumer account when `auto_create_accounts` is on.
//!
//! Deactivated accounts are rejected by both methods.
//!
//! # Authorization
//!
//! Access is decided by account tier; see [`permissions`].
//!
//! # Modules
//!
//! - [`current_account`]: extractors for the authenticated account and the request context
//! - [`permissions`]: tier-based access checks
//! - [`session`]: session token creation and verification
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use studioctl::api::models::accounts::CurrentAccount;
//!
//! async fn protected_handler(account: CurrentAccount) -> Result<String> {
//!     Ok(format!("Hello, {}!", account.email))
//! }
//! ```

pub mod current_account;
pub mod permissions;
pub mod session;
