//! Who may do what.
//!
//! The sentinel identity (id 0) is special-cased explicitly everywhere: it is
//! never stored, so a role lookup would find nothing for it. For every other
//! caller the role that counts is the stored one, not the role in the claim.

use campus_db::Database;
use campus_types::api::Claims;
use campus_types::models::Role;
use tracing::warn;

use crate::error::ApiError;

/// Source of stored roles.
pub trait RoleSource {
    fn stored_role(&self, user_id: i64) -> anyhow::Result<Option<Role>>;
}

impl RoleSource for Database {
    fn stored_role(&self, user_id: i64) -> anyhow::Result<Option<Role>> {
        self.get_user_role(user_id)
    }
}

pub fn is_self_or_admin(claims: &Claims, owner_id: i64, stored_role: Option<Role>) -> bool {
    claims.is_sentinel() || claims.sub == owner_id || stored_role == Some(Role::Admin)
}

pub fn is_admin_only(claims: &Claims, stored_role: Option<Role>) -> bool {
    claims.is_sentinel() || stored_role == Some(Role::Admin)
}

/// Allow the owner of a resource, the sentinel, or any stored admin. The
/// store is only consulted when the cheaper checks fail.
pub fn ensure_self_or_admin(
    roles: &impl RoleSource,
    claims: &Claims,
    owner_id: i64,
) -> Result<(), ApiError> {
    if is_self_or_admin(claims, owner_id, None) {
        return Ok(());
    }
    let role = roles.stored_role(claims.sub)?;
    if is_self_or_admin(claims, owner_id, role) {
        return Ok(());
    }
    warn!("User {} denied access to a resource owned by {}", claims.sub, owner_id);
    Err(ApiError::forbidden("Unauthorized"))
}

pub fn ensure_admin(roles: &impl RoleSource, claims: &Claims) -> Result<(), ApiError> {
    if claims.is_sentinel() {
        return Ok(());
    }
    let role = roles.stored_role(claims.sub)?;
    if is_admin_only(claims, role) {
        return Ok(());
    }
    warn!("User {} denied admin access", claims.sub);
    Err(ApiError::forbidden("Access denied"))
}

/// Content needs a stored owner; the sentinel has none.
pub fn ensure_can_author(claims: &Claims, what: &str) -> Result<(), ApiError> {
    if claims.is_sentinel() {
        return Err(ApiError::forbidden(format!("Admin cannot create {what}")));
    }
    Ok(())
}
