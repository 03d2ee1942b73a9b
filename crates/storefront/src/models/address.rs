//! Saved shipping addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aurum_core::{AddressId, Phone, UserId};

/// A shipping address saved to a customer account.
#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub full_name: String,
    pub phone: Phone,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Address {
    /// Copy of the address frozen onto an order.
    #[must_use]
    pub fn snapshot(&self, email: &str) -> ShippingAddress {
        ShippingAddress {
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
            email: email.to_owned(),
            line1: self.line1.clone(),
            line2: self.line2.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            pincode: self.pincode.clone(),
            country: self.country.clone(),
        }
    }
}

/// Address as stored on an order (`JSONB`). Later edits to the saved
/// address do not affect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: Phone,
    pub email: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: String,
}

/// Create/update payload for an address.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    pub full_name: String,
    pub phone: Phone,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressInput {
    /// Trim fields and check required values and the pincode format.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn normalize(mut self) -> Result<Self, String> {
        for (field, value) in [
            ("full_name", &mut self.full_name),
            ("line1", &mut self.line1),
            ("city", &mut self.city),
            ("state", &mut self.state),
            ("pincode", &mut self.pincode),
        ] {
            *value = value.trim().to_owned();
            if value.is_empty() {
                return Err(format!("{field} is required"));
            }
        }
        if !is_valid_pincode(&self.pincode) {
            return Err("pincode must be 6 digits and cannot start with 0".to_owned());
        }
        self.line2 = self
            .line2
            .map(|l| l.trim().to_owned())
            .filter(|l| !l.is_empty());
        self.country = Some(
            self.country
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "India".to_owned()),
        );
        Ok(self)
    }
}

/// Indian PIN codes are six digits with a non-zero first digit.
#[must_use]
pub fn is_valid_pincode(pincode: &str) -> bool {
    pincode.len() == 6
        && pincode.bytes().all(|b| b.is_ascii_digit())
        && !pincode.starts_with('0')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input(pincode: &str) -> AddressInput {
        AddressInput {
            full_name: " Asha Rao ".to_owned(),
            phone: Phone::parse("9876543210").unwrap(),
            line1: "12 MG Road".to_owned(),
            line2: Some("   ".to_owned()),
            city: "Bengaluru".to_owned(),
            state: "Karnataka".to_owned(),
            pincode: pincode.to_owned(),
            country: None,
            is_default: false,
        }
    }

    #[test]
    fn test_pincode_validation() {
        assert!(is_valid_pincode("560001"));
        assert!(!is_valid_pincode("060001"));
        assert!(!is_valid_pincode("56000"));
        assert!(!is_valid_pincode("56000a"));
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let address = input("560001").normalize().unwrap();
        assert_eq!(address.full_name, "Asha Rao");
        assert_eq!(address.line2, None);
        assert_eq!(address.country.as_deref(), Some("India"));
    }

    #[test]
    fn test_normalize_rejects_bad_pincode_and_blank_city() {
        assert!(input("012345").normalize().is_err());
        let mut blank = input("560001");
        blank.city = "  ".to_owned();
        assert_eq!(blank.normalize().unwrap_err(), "city is required");
    }
}
