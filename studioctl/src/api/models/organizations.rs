//! API request/response models for organizations.

use crate::db::models::organizations::{OrganizationDBResponse, OrganizationStatus, PackageTier};
use crate::db::models::usage::OrganizationUsageDBResponse;
use crate::types::OrganizationId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Registration of a new school or district. Starts `pending` until a platform admin approves it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationCreate {
    pub name: String,
    /// Lowercase letters, digits and hyphens
    pub subdomain: String,
    #[serde(default)]
    pub package_tier: PackageTier,
    /// Per-learner creations per day; defaults from the package
    pub daily_limit: Option<i64>,
    /// Per-learner creations per month; defaults from the package
    pub monthly_limit: Option<i64>,
}

/// Platform admins may change anything here; organization admins only the limits
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub status: Option<OrganizationStatus>,
    pub package_tier: Option<PackageTier>,
    pub daily_limit: Option<i64>,
    pub monthly_limit: Option<i64>,
}

impl OrganizationUpdate {
    /// Whether anything other than the limits would change
    pub fn touches_administrative_fields(&self) -> bool {
        self.name.is_some() || self.status.is_some() || self.package_tier.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationResponse {
    #[schema(value_type = String, format = "uuid")]
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

impl From<OrganizationDBResponse> for OrganizationResponse {
    fn from(db: OrganizationDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            subdomain: db.subdomain,
            status: db.status,
            package_tier: db.package_tier,
            daily_limit: db.daily_limit,
            monthly_limit: db.monthly_limit,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Creations across all of an organization's accounts
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationUsageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub organization_id: OrganizationId,
    /// Local calendar day counted in `today`
    pub day: NaiveDate,
    /// First day of the local month counted in `this_month`
    pub month: NaiveDate,
    pub today: i64,
    pub this_month: i64,
}

impl From<OrganizationUsageDBResponse> for OrganizationUsageResponse {
    fn from(db: OrganizationUsageDBResponse) -> Self {
        Self {
            organization_id: db.organization_id,
            day: db.day,
            month: db.month,
            today: db.today,
            this_month: db.this_month,
        }
    }
}
