//! Contact form messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aurum_core::{ContactMessageId, Email, Phone};

/// Longest accepted message body, in characters.
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// A stored contact form submission.
#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub id: ContactMessageId,
    pub name: String,
    pub email: Email,
    pub phone: Option<Phone>,
    pub subject: String,
    pub message: String,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// Contact form payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub email: Email,
    pub phone: Option<Phone>,
    #[serde(default)]
    pub subject: String,
    pub message: String,
}

impl ContactInput {
    /// Trim fields and check lengths.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn normalize(mut self) -> Result<Self, String> {
        self.name = self.name.trim().to_owned();
        self.subject = self.subject.trim().to_owned();
        self.message = self.message.trim().to_owned();
        if self.name.is_empty() {
            return Err("name is required".to_owned());
        }
        if self.message.is_empty() {
            return Err("message is required".to_owned());
        }
        if self.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(format!("message cannot exceed {MAX_MESSAGE_CHARS} characters"));
        }
        if self.subject.is_empty() {
            "General enquiry".clone_into(&mut self.subject);
        }
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults_subject() {
        let input = ContactInput {
            name: "Meera".to_owned(),
            email: Email::parse("meera@example.com").unwrap(),
            phone: None,
            subject: String::new(),
            message: " Do you resize rings? ".to_owned(),
        };
        let input = input.normalize().unwrap();
        assert_eq!(input.subject, "General enquiry");
        assert_eq!(input.message, "Do you resize rings?");
    }

    #[test]
    fn test_normalize_rejects_empty_message() {
        let input = ContactInput {
            name: "Meera".to_owned(),
            email: Email::parse("meera@example.com").unwrap(),
            phone: None,
            subject: "Hi".to_owned(),
            message: "   ".to_owned(),
        };
        assert!(input.normalize().is_err());
    }
}
