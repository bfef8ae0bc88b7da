//! Database models for organizations.

use crate::types::OrganizationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Organization approval status, stored as TEXT in the database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    Pending,
    Approved,
    Rejected,
}

/// Purchased package, which determines default per-learner limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema, Default)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PackageTier {
    #[default]
    Starter,
    Classroom,
    District,
}

impl PackageTier {
    /// Default per-learner (daily, monthly) limits for the package
    pub fn default_limits(&self) -> (i64, i64) {
        match self {
            PackageTier::Starter => (10, 100),
            PackageTier::Classroom => (20, 300),
            PackageTier::District => (30, 500),
        }
    }
}

/// Database request for registering an organization. Registrations always start `pending`.
#[derive(Debug, Clone)]
pub struct OrganizationCreateDBRequest {
    pub name: String,
    pub subdomain: String,
    pub package_tier: PackageTier,
    pub daily_limit: i64,
    pub monthly_limit: i64,
}

/// Database request for updating an organization
#[derive(Debug, Clone, Default)]
pub struct OrganizationUpdateDBRequest {
    pub name: Option<String>,
    pub status: Option<OrganizationStatus>,
    pub package_tier: Option<PackageTier>,
    pub daily_limit: Option<i64>,
    pub monthly_limit: Option<i64>,
}

/// Database response for an organization
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrganizationDBResponse {
    pub id: OrganizationId,
    pub name: String,
    pub subdomain: String,
    pub status: OrganizationStatus,
    pub package_tier: PackageTier,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
