//! Authentication service.
//!
//! Email + password accounts verified with emailed one-time codes.

mod error;
pub mod otp;

pub use error::AuthError;
pub use otp::{OtpError, OtpPurpose, OtpStore};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;
use sqlx::PgPool;

use aurum_core::{Email, Phone, UserRole};

use crate::db::RepositoryError;
use crate::db::users::{NewUser, UserRepository};
use crate::models::User;
use crate::services::email::EmailService;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest accepted display name.
const MAX_NAME_LENGTH: usize = 100;

/// Registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
}

/// Authentication service.
///
/// Handles registration, code verification, login and password resets.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    otp: &'a OtpStore,
    email: &'a EmailService,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, otp: &'a OtpStore, email: &'a EmailService) -> Self {
        Self {
            users: UserRepository::new(pool),
            otp,
            email,
        }
    }

    /// Register an unverified customer and email them a verification code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`, `InvalidPhone`, `InvalidName` or
    /// `WeakPassword` for bad input, `UserAlreadyExists` for a taken email.
    pub async fn register(&self, input: &RegisterInput) -> Result<User, AuthError> {
        let name = validate_name(&input.name)?;
        let email = Email::parse(&input.email)?;
        let phone = input
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Phone::parse)
            .transpose()?;
        validate_password(&input.password)?;
        let password_hash = hash_password(&input.password)?;

        let user = self
            .users
            .create(&NewUser {
                name,
                email: &email,
                phone: phone.as_ref(),
                password_hash: &password_hash,
                role: UserRole::Customer,
                email_verified: false,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        self.send_code(&user, OtpPurpose::Verify).await?;
        Ok(user)
    }

    /// Check a verification code and mark the email verified.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Otp` if the code is wrong or expired.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::Otp(OtpError::NotFound))?;
        if user.is_blocked {
            return Err(AuthError::Blocked);
        }

        self.otp.verify(OtpPurpose::Verify, &email, code).await?;
        if !user.email_verified {
            self.users.mark_email_verified(user.id).await?;
        }

        Ok(User {
            email_verified: true,
            ..user
        })
    }

    /// Send another verification code. Unknown or already verified
    /// addresses succeed silently so the endpoint can't enumerate accounts.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Otp` with `Cooldown` when asked too soon.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        match self.users.get_by_email(&email).await? {
            Some(user) if !user.email_verified => {
                self.send_code(&user, OtpPurpose::Verify).await
            }
            _ => Ok(()),
        }
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong,
    /// `Blocked` for blocked accounts and `EmailNotVerified` (after sending a
    /// fresh code) for unverified ones.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        if user.is_blocked {
            return Err(AuthError::Blocked);
        }
        if !user.email_verified {
            match self.send_code(&user, OtpPurpose::Verify).await {
                Ok(()) | Err(AuthError::Otp(OtpError::Cooldown { .. })) => {}
                Err(e) => return Err(e),
            }
            return Err(AuthError::EmailNotVerified);
        }

        Ok(user)
    }

    /// Email a password reset code. Unknown addresses succeed silently.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Otp` with `Cooldown` when asked too soon.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        match self.users.get_by_email(&email).await? {
            Some(user) if !user.is_blocked => {
                self.send_code(&user, OtpPurpose::ResetPassword).await
            }
            _ => Ok(()),
        }
    }

    /// Set a new password with a reset code. Proving access to the inbox
    /// also verifies the email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` or `AuthError::Otp`.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        validate_password(new_password)?;
        let email = Email::parse(email)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::Otp(OtpError::NotFound))?;

        self.otp
            .verify(OtpPurpose::ResetPassword, &email, code)
            .await?;

        let password_hash = hash_password(new_password)?;
        self.users.update_password(user.id, &password_hash).await?;
        if !user.email_verified {
            self.users.mark_email_verified(user.id).await?;
        }

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(User {
            email_verified: true,
            ..user
        })
    }

    async fn send_code(&self, user: &User, purpose: OtpPurpose) -> Result<(), AuthError> {
        let code = self.otp.issue(purpose, &user.email).await?;
        let minutes = self.otp.ttl().as_secs().div_ceil(60);
        // Delivery failures are logged; the user can ask for a resend.
        if let Err(e) = self.email.send_otp(user, purpose, &code, minutes).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send one-time code");
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<&str, AuthError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::InvalidName("name is required".to_owned()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName(format!(
            "name cannot exceed {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name)
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` describing the unmet rule.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err(AuthError::WeakPassword(
            "password must contain a letter and a digit".to_owned(),
        ));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_rules() {
        assert!(validate_password("short1").is_err());
        assert!(validate_password("allletters").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("gold2026").is_ok());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("gold2026").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("gold2026", &hash).is_ok());
        assert!(matches!(
            verify_password("silver2026", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("  Asha Rao ").unwrap(), "Asha Rao");
        assert!(validate_name("   ").is_err());
    }
}
