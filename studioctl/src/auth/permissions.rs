//! Tier-based access checks.
//!
//! Platform admins may read and update everything. Everyone else may act on their own
//! resources; organization admins may also adjust their own organization's limits, and
//! organization members may read their organization.

use crate::api::models::accounts::CurrentAccount;
use crate::db::models::accounts::AccountTier;
use crate::errors::Error;
use crate::types::{AccountId, Operation, OrganizationId, Resource};

pub fn can_read_all_resources(account: &CurrentAccount, _resource: Resource) -> bool {
    account.is_platform_admin()
}

pub fn can_update_all_resources(account: &CurrentAccount, _resource: Resource) -> bool {
    account.is_platform_admin()
}

pub fn can_act_for_account(account: &CurrentAccount, target: AccountId) -> bool {
    account.id == target || account.is_platform_admin()
}

pub fn can_read_organization(account: &CurrentAccount, organization_id: OrganizationId) -> bool {
    account.is_platform_admin() || account.organization_id == Some(organization_id)
}

/// Organization admins may change their own organization's limits
pub fn can_update_organization_limits(account: &CurrentAccount, organization_id: OrganizationId) -> bool {
    account.is_platform_admin() || (account.tier == AccountTier::OrgAdmin && account.organization_id == Some(organization_id))
}

pub fn require_platform_admin(account: &CurrentAccount, action: Operation, resource: Resource) -> Result<(), Error> {
    if can_update_all_resources(account, resource) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions { action, resource })
    }
}
