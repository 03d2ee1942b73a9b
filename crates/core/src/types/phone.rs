//! Indian mobile number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// Input contains characters other than digits, spaces, dashes and a leading `+`.
    #[error("phone number contains invalid characters")]
    InvalidCharacters,
    /// Input does not resolve to a 10-digit number.
    #[error("phone number must have 10 digits")]
    WrongLength,
    /// Mobile numbers start with 6, 7, 8 or 9.
    #[error("phone number must start with 6, 7, 8 or 9")]
    InvalidPrefix,
}

/// A 10-digit Indian mobile number.
///
/// Accepts the common ways customers type their number (`98765 43210`,
/// `+91-98765-43210`, `098765 43210`) and stores only the subscriber digits.
/// Shiprocket and the OTP flow both expect this bare form.
///
/// ```
/// use aurum_core::Phone;
///
/// let phone = Phone::parse("+91 98765-43210").unwrap();
/// assert_eq!(phone.as_str(), "9876543210");
/// assert_eq!(phone.e164(), "+919876543210");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Parse a phone number.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneError`] if the input is not a valid Indian mobile number.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let s = s.trim();
        let body = s.strip_prefix('+').unwrap_or(s);
        if !body
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
        {
            return Err(PhoneError::InvalidCharacters);
        }

        let digits: String = body.chars().filter(char::is_ascii_digit).collect();
        let subscriber = match digits.len() {
            10 => Some(digits.as_str()),
            11 => digits.strip_prefix('0'),
            12 => digits.strip_prefix("91"),
            _ => None,
        }
        .ok_or(PhoneError::WrongLength)?;

        if !subscriber.starts_with(['6', '7', '8', '9']) {
            return Err(PhoneError::InvalidPrefix);
        }

        Ok(Self(subscriber.to_owned()))
    }

    /// The bare 10 digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The number in E.164 form (`+91XXXXXXXXXX`).
    #[must_use]
    pub fn e164(&self) -> String {
        format!("+91{}", self.0)
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Phone {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Phone {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Phone {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_formats() {
        for input in [
            "9876543210",
            "98765 43210",
            "+91 98765 43210",
            "+91-98765-43210",
            "919876543210",
            "09876543210",
        ] {
            assert_eq!(Phone::parse(input).unwrap().as_str(), "9876543210", "{input}");
        }
    }

    #[test]
    fn test_rejects_landline_prefix() {
        assert_eq!(Phone::parse("2212345678"), Err(PhoneError::InvalidPrefix));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(Phone::parse("98765"), Err(PhoneError::WrongLength));
        assert_eq!(Phone::parse("449876543210"), Err(PhoneError::WrongLength));
    }

    #[test]
    fn test_rejects_letters() {
        assert_eq!(Phone::parse("98765abc10"), Err(PhoneError::InvalidCharacters));
    }
}
