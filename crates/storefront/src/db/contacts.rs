//! Contact message repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use aurum_core::{ContactMessageId, Email, Phone};

use super::{Page, Pagination, RepositoryError};
use crate::models::{ContactInput, ContactMessage};

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id: i32,
    name: String,
    email: String,
    phone: Option<String>,
    subject: String,
    message: String,
    is_resolved: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContactRow> for ContactMessage {
    type Error = RepositoryError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let phone = row
            .phone
            .as_deref()
            .map(Phone::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid phone in database: {e}"))
            })?;

        Ok(Self {
            id: ContactMessageId::new(row.id),
            name: row.name,
            email,
            phone,
            subject: row.subject,
            message: row.message,
            is_resolved: row.is_resolved,
            created_at: row.created_at,
        })
    }
}

const CONTACT_COLUMNS: &str =
    "id, name, email, phone, subject, message, is_resolved, created_at";

/// Repository for contact form submissions.
pub struct ContactRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ContactRepository<'a> {
    /// Create a new contact repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a submission.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, input: &ContactInput) -> Result<ContactMessage, RepositoryError> {
        let row = sqlx::query_as::<_, ContactRow>(&format!(
            r"
            INSERT INTO contact_messages (name, email, phone, subject, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CONTACT_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.subject)
        .bind(&input.message)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Messages, unresolved first, newest first within each group.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        unresolved_only: bool,
        pagination: Pagination,
    ) -> Result<Page<ContactMessage>, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contact_messages WHERE NOT ($1 AND is_resolved)",
        )
        .bind(unresolved_only)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            r"
            SELECT {CONTACT_COLUMNS} FROM contact_messages
            WHERE NOT ($1 AND is_resolved)
            ORDER BY is_resolved, created_at DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(unresolved_only)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<ContactMessage>, _>>()?;
        Ok(Page::new(messages, total, pagination.page, pagination.per_page))
    }

    /// Mark a message resolved or reopen it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the message doesn't exist.
    pub async fn set_resolved(
        &self,
        id: ContactMessageId,
        resolved: bool,
    ) -> Result<ContactMessage, RepositoryError> {
        let row = sqlx::query_as::<_, ContactRow>(&format!(
            "UPDATE contact_messages SET is_resolved = $2 WHERE id = $1 RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(id)
        .bind(resolved)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }
}
