//! User, membership and invitation repository
//!
//! Registration is invitation-only: a token proves both intent and ownership
//! of the mailbox. Redeeming the token is the atomic step (`UPDATE ... WHERE
//! used = FALSE RETURNING`, with the email match inside the claim), so a
//! token can never admit two users and a mismatched email leaves the
//! invitation usable; a crash between claim and user creation burns the
//! token, which an admin can re-issue.

use crate::{Database, Error, Result};
use chrono::{Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tokio_postgres::Row;
use trapline_core::model::{ProjectMembership, Role, User, UserInvitation};

/// Invitation lifetime
pub const INVITATION_TTL_DAYS: i64 = 7;

const USER_COLUMNS: &str = "id, email, hashed_password, is_active, is_verified, is_server_admin";
const INVITATION_COLUMNS: &str = "id, email, role, project_id, token, expires_at, used, created_at";

pub(crate) fn user_from_row(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        hashed_password: row.try_get("hashed_password")?,
        is_active: row.try_get("is_active")?,
        is_verified: row.try_get("is_verified")?,
        is_server_admin: row.try_get("is_server_admin")?,
    })
}

fn invitation_from_row(row: &Row) -> Result<UserInvitation> {
    let role: String = row.try_get("role")?;
    Ok(UserInvitation {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        role: role.parse()?,
        project_id: row.try_get("project_id")?,
        token: row.try_get("token")?,
        expires_at: row.try_get("expires_at")?,
        used: row.try_get("used")?,
        created_at: row.try_get("created_at")?,
    })
}

/// URL-safe random token for invitations and Telegram linking
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Pbkdf2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::PasswordHash(e.to_string()))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hashed: &str) -> bool {
    PasswordHash::new(hashed)
        .map(|parsed| {
            Pbkdf2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

impl Database {
    /// Fetch a user by id.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such user exists.
    pub async fn get_user(&self, user_id: i32) -> Result<User> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                &[&user_id],
            )
            .await?
            .ok_or_else(|| Error::not_found("user", user_id))?;
        user_from_row(&row)
    }

    /// Fetch a user by email
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"),
                &[&email],
            )
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    /// Create an invitation with a fresh token, valid for
    /// [`INVITATION_TTL_DAYS`].
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn create_invitation(
        &self,
        email: &str,
        role: Role,
        project_id: Option<i32>,
    ) -> Result<UserInvitation> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::days(INVITATION_TTL_DAYS);
        let row = self
            .client()
            .query_one(
                &format!(
                    "INSERT INTO user_invitations (email, role, project_id, token, expires_at) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING {INVITATION_COLUMNS}"
                ),
                &[&email, &role.as_str(), &project_id, &token, &expires_at],
            )
            .await?;
        invitation_from_row(&row)
    }

    /// Look up an invitation by token
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn get_invitation_by_token(&self, token: &str) -> Result<Option<UserInvitation>> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {INVITATION_COLUMNS} FROM user_invitations WHERE token = $1"),
                &[&token],
            )
            .await?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    /// Register a user with an invitation token.
    ///
    /// The token must be unused, unexpired and issued for exactly the
    /// submitted email. On success the token is consumed, the user is created
    /// auto-verified, and the membership implied by the invitation is added.
    ///
    /// # Errors
    /// Returns `Error::InvalidInvitation` when the token is unknown, used,
    /// expired, or issued for another address.
    pub async fn register_with_invitation(
        &self,
        token: &str,
        email: &str,
        password: &str,
    ) -> Result<User> {
        // Claiming the token is the atomic step. The email match lives in
        // the claim itself: a submission with the right token but the wrong
        // address claims no row and leaves the invitation usable.
        let claimed = self
            .client()
            .query_opt(
                &format!(
                    "UPDATE user_invitations SET used = TRUE \
                     WHERE token = $1 AND lower(email) = lower($2) \
                       AND used = FALSE AND expires_at > now() \
                     RETURNING {INVITATION_COLUMNS}"
                ),
                &[&token, &email],
            )
            .await?;
        let invitation = match claimed {
            Some(row) => invitation_from_row(&row)?,
            None => {
                return Err(Error::InvalidInvitation(
                    "unknown, used or expired token, or email mismatch",
                ))
            }
        };

        if !invitation.email.eq_ignore_ascii_case(email) {
            return Err(Error::InvalidInvitation("email does not match invitation"));
        }

        let hashed = hash_password(password)?;
        let row = self
            .client()
            .query_one(
                &format!(
                    "INSERT INTO users (email, hashed_password, is_active, is_verified) \
                     VALUES ($1, $2, TRUE, TRUE) RETURNING {USER_COLUMNS}"
                ),
                &[&email, &hashed],
            )
            .await?;
        let user = user_from_row(&row)?;

        if let Some(project_id) = invitation.project_id {
            self.add_membership(user.id, project_id, invitation.role).await?;
        }

        tracing::info!(user_id = user.id, email, "user registered via invitation");
        Ok(user)
    }

    /// Add or update a membership (unique per user+project)
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn add_membership(
        &self,
        user_id: i32,
        project_id: i32,
        role: Role,
    ) -> Result<ProjectMembership> {
        let row = self
            .client()
            .query_one(
                "INSERT INTO project_memberships (user_id, project_id, role) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT ON CONSTRAINT uq_user_project \
                 DO UPDATE SET role = EXCLUDED.role \
                 RETURNING id, user_id, project_id, role",
                &[&user_id, &project_id, &role.as_str()],
            )
            .await?;
        let role: String = row.try_get("role")?;
        Ok(ProjectMembership {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            project_id: row.try_get("project_id")?,
            role: role.parse()?,
        })
    }

    /// Role of a user in a project, `None` without a membership row
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn get_membership_role(&self, user_id: i32, project_id: i32) -> Result<Option<Role>> {
        let row = self
            .client()
            .query_opt(
                "SELECT role FROM project_memberships WHERE user_id = $1 AND project_id = $2",
                &[&user_id, &project_id],
            )
            .await?;
        match row {
            Some(row) => {
                let role: String = row.try_get("role")?;
                Ok(Some(role.parse()?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_url_safe_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_password_round_trip() {
        let hashed = hash_password("correct horse battery staple").ok();
        let hashed = hashed.as_deref().unwrap_or_default();
        assert!(verify_password("correct horse battery staple", hashed));
        assert!(!verify_password("wrong password", hashed));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not a phc string"));
    }
}
