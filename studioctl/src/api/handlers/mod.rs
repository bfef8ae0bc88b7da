//! HTTP request handlers for all API endpoints.
//!
//! # Handler Modules
//!
//! - [`accounts`]: the current account, its quota status, and admin updates
//! - [`usage`]: check-and-reserve on behalf of an account
//! - [`creations`]: image, story and music creation; listing and fetching records
//! - [`organizations`]: registration, approval, limits and usage counts
//! - [`callbacks`]: music provider completion callbacks
//!
//! # Authentication
//!
//! Handlers take [`CurrentAccount`](crate::api::models::accounts::CurrentAccount) when a signed
//! in account is required, or [`RequestContext`](crate::auth::current_account::RequestContext)
//! when the creation workflow decides. The callback handler authenticates with its own token.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to the right status code and a
//! user-safe body.

pub mod accounts;
pub mod callbacks;
pub mod creations;
pub mod organizations;
pub mod usage;
