//! API request and response data models.
//!
//! API models are distinct from database models, so storage and the public contract can evolve
//! separately. All models are annotated with `utoipa` for the generated docs.
//!
//! - [`accounts`]: the current account and admin updates
//! - [`creations`]: creation requests and records
//! - [`organizations`]: registration, updates and usage
//! - [`usage`]: check-and-reserve request
//! - [`pagination`]: shared `skip`/`limit` handling

pub mod accounts;
pub mod creations;
pub mod organizations;
pub mod pagination;
pub mod usage;
