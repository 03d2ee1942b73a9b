//! Product reviews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aurum_core::{ProductId, Rating, ReviewId, UserId};

/// Longest accepted comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 2000;

/// A customer review, with the reviewer's display name.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub user_name: String,
    pub product_id: ProductId,
    pub rating: Rating,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    pub product_id: ProductId,
    pub rating: Rating,
    #[serde(default)]
    pub comment: String,
}

impl ReviewInput {
    /// Trim the comment and enforce its length limit.
    ///
    /// # Errors
    ///
    /// Returns a message when the comment is too long.
    pub fn normalize(mut self) -> Result<Self, String> {
        self.comment = self.comment.trim().to_owned();
        if self.comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(format!("comment cannot exceed {MAX_COMMENT_CHARS} characters"));
        }
        Ok(self)
    }
}
