//! Admin user management commands.

use aurum_core::{Email, UserRole};
use aurum_storefront::db::UserRepository;
use aurum_storefront::db::users::NewUser;
use aurum_storefront::services::auth::{hash_password, validate_password};

use super::{CommandError, connect};

/// Create a verified admin account.
///
/// # Errors
///
/// Returns an error if the email is invalid, the password is weak, or the
/// email is already registered.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<(), CommandError> {
    let email = Email::parse(email).map_err(|e| CommandError::InvalidEmail(e.to_string()))?;
    validate_password(password)?;

    let pool = connect().await?;
    let users = UserRepository::new(&pool);

    if users.get_by_email(&email).await?.is_some() {
        return Err(CommandError::UserExists(email.to_string()));
    }

    let password_hash = hash_password(password)?;
    let user = users
        .create(&NewUser {
            name: name.trim(),
            email: &email,
            phone: None,
            password_hash: &password_hash,
            role: UserRole::Admin,
            email_verified: true,
        })
        .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );
    Ok(())
}

/// Give an existing account the admin role.
///
/// # Errors
///
/// Returns an error if no account has this email.
pub async fn promote(email: &str) -> Result<(), CommandError> {
    let email = Email::parse(email).map_err(|e| CommandError::InvalidEmail(e.to_string()))?;

    let pool = connect().await?;
    let user = UserRepository::new(&pool)
        .set_role(&email, UserRole::Admin)
        .await
        .map_err(|e| match e {
            aurum_storefront::db::RepositoryError::NotFound => {
                CommandError::UserNotFound(email.to_string())
            }
            other => other.into(),
        })?;

    tracing::info!("{} ({}) is now an admin", user.email, user.id);
    Ok(())
}
