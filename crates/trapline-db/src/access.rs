//! Database-backed access control
//!
//! Resolves memberships and applies the pure rules from
//! `trapline_core::authz`. Failures map onto HTTP-equivalent codes:
//! 401 for unauthenticated callers, 403 for missing roles, and 404 where a
//! plain 403 would reveal that a hidden project exists.

use crate::{Database, Error as DbError, Result as DbResult};
use thiserror::Error;
use trapline_core::authz;
use trapline_core::model::{Role, User};

/// Authorization failure, carrying its HTTP-equivalent status
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccessError {
    /// 401 - caller is not authenticated or not eligible (inactive,
    /// unverified)
    #[error("authentication required")]
    Unauthenticated,

    /// 403 - authenticated but lacking the required role
    #[error("access denied")]
    Forbidden,

    /// 404 - resource hidden from this caller
    #[error("not found")]
    NotFound,

    /// Store failure while resolving memberships
    #[error(transparent)]
    Store(#[from] DbError),
}

impl AccessError {
    /// HTTP-equivalent status code
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Unauthenticated => 401,
            AccessError::Forbidden => 403,
            AccessError::NotFound => 404,
            AccessError::Store(_) => 500,
        }
    }
}

impl Database {
    /// Require read access to a project (any membership, or server admin).
    ///
    /// # Errors
    /// `Unauthenticated` for ineligible users, `NotFound` for callers with no
    /// relationship to the project (existence must not leak).
    pub async fn require_read(&self, user: &User, project_id: i32) -> Result<(), AccessError> {
        self.check(user, project_id, authz::can_read, AccessError::NotFound)
            .await
    }

    /// Require admin access to a project (project-admin membership, or server
    /// admin).
    ///
    /// # Errors
    /// `Forbidden` for members without the admin role, `NotFound` for
    /// non-members.
    pub async fn require_admin(&self, user: &User, project_id: i32) -> Result<(), AccessError> {
        if !authz::is_eligible(user) {
            return Err(AccessError::Unauthenticated);
        }
        let membership = self.get_membership_role(user.id, project_id).await?;
        if authz::can_admin(user, membership) {
            return Ok(());
        }
        // Viewers learn they lack the role; outsiders learn nothing.
        match membership {
            Some(_) => Err(AccessError::Forbidden),
            None => Err(AccessError::NotFound),
        }
    }

    /// Require the server-admin flag.
    ///
    /// # Errors
    /// `Forbidden` for any non-admin.
    pub fn require_server_admin(&self, user: &User) -> Result<(), AccessError> {
        if !authz::is_eligible(user) {
            return Err(AccessError::Unauthenticated);
        }
        if authz::can_admin_server(user) {
            Ok(())
        } else {
            Err(AccessError::Forbidden)
        }
    }

    /// Project ids the user may read: all for server admins, membership
    /// projects otherwise.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn accessible_project_ids(&self, user: &User) -> DbResult<Vec<i32>> {
        if user.is_server_admin {
            let rows = self
                .client()
                .query("SELECT id FROM projects ORDER BY id", &[])
                .await?;
            return Ok(rows.iter().map(|row| row.get(0)).collect());
        }
        let rows = self
            .client()
            .query(
                "SELECT project_id FROM project_memberships WHERE user_id = $1 ORDER BY project_id",
                &[&user.id],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn check(
        &self,
        user: &User,
        project_id: i32,
        rule: fn(&User, Option<Role>) -> bool,
        denied: AccessError,
    ) -> Result<(), AccessError> {
        if !authz::is_eligible(user) {
            return Err(AccessError::Unauthenticated);
        }
        let membership = self.get_membership_role(user.id, project_id).await?;
        if rule(user, membership) {
            Ok(())
        } else {
            Err(denied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AccessError::Unauthenticated.status_code(), 401);
        assert_eq!(AccessError::Forbidden.status_code(), 403);
        assert_eq!(AccessError::NotFound.status_code(), 404);
    }
}
