//! Project-scoped authorization rules
//!
//! The pure rules live here; `trapline-db` resolves memberships and maps
//! failures onto 401/403/404 responses. Server admins have implicit
//! project-admin access to every project without any membership row.

use crate::model::{Role, User};

/// Effective role of a user within one project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveRole {
    /// From the user's server-admin flag; no membership row exists
    ServerAdmin,
    /// From a membership row
    Member(Role),
}

/// Resolve the effective role from the user flags and an optional membership
pub fn effective_role(user: &User, membership: Option<Role>) -> Option<EffectiveRole> {
    if user.is_server_admin {
        return Some(EffectiveRole::ServerAdmin);
    }
    membership.map(EffectiveRole::Member)
}

/// `can_read`: server admin or any membership
pub fn can_read(user: &User, membership: Option<Role>) -> bool {
    effective_role(user, membership).is_some()
}

/// `can_admin`: server admin or a project-admin membership
pub fn can_admin(user: &User, membership: Option<Role>) -> bool {
    matches!(
        effective_role(user, membership),
        Some(EffectiveRole::ServerAdmin) | Some(EffectiveRole::Member(Role::ProjectAdmin))
    )
}

/// `can_admin_server`: the server-admin flag alone
pub fn can_admin_server(user: &User) -> bool {
    user.is_server_admin
}

/// A user must be active and verified before any rule grants anything
pub fn is_eligible(user: &User) -> bool {
    user.is_active && user.is_verified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_server_admin: bool) -> User {
        User {
            id: 1,
            email: "ecologist@example.org".to_string(),
            hashed_password: String::new(),
            is_active: true,
            is_verified: true,
            is_server_admin,
        }
    }

    #[test]
    fn test_server_admin_reads_and_admins_everything() {
        let admin = user(true);
        assert!(can_read(&admin, None));
        assert!(can_admin(&admin, None));
        assert!(can_admin_server(&admin));
    }

    #[test]
    fn test_viewer_reads_but_does_not_admin() {
        let viewer = user(false);
        assert!(can_read(&viewer, Some(Role::ProjectViewer)));
        assert!(!can_admin(&viewer, Some(Role::ProjectViewer)));
        assert!(!can_admin_server(&viewer));
    }

    #[test]
    fn test_project_admin_admins_only_with_membership() {
        let member = user(false);
        assert!(can_admin(&member, Some(Role::ProjectAdmin)));
        assert!(!can_admin(&member, None));
        assert!(!can_read(&member, None));
    }

    #[test]
    fn test_eligibility_requires_active_and_verified() {
        let mut u = user(false);
        assert!(is_eligible(&u));
        u.is_verified = false;
        assert!(!is_eligible(&u));
        u.is_verified = true;
        u.is_active = false;
        assert!(!is_eligible(&u));
    }
}
