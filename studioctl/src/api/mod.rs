//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Accounts** (`/api/v1/accounts/*`): the current account, its quota status, admin updates
//! - **Usage** (`/api/v1/usage/track`): check-and-reserve for clients that generate elsewhere
//! - **Creations** (`/api/v1/creations/*`): create images, stories and music; list and fetch records
//! - **Organizations** (`/api/v1/organizations/*`): registration, approval, limits and usage
//! - **Webhooks** (`/webhooks/music`): music provider callbacks
//!
//! All endpoints are documented with `utoipa`; the docs are served at `/docs`.

pub mod handlers;
pub mod models;
