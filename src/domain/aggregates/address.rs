//! Customer addresses and the province/city reference data they point at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)] pub struct Province { pub id: Uuid, pub name: String }
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)] pub struct City { pub id: Uuid, pub province_id: Uuid, pub name: String }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub address_exact: String,
    pub description: String,
    pub province: Province,
    pub city: City,
    pub postal_code: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Address form as submitted by the customer.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewAddress {
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(max = 20))]
    #[serde(default)]
    pub phone: String,
    #[validate(length(min = 1, max = 255))]
    pub address_exact: String,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub description: String,
    pub province_id: Uuid,
    pub city_id: Uuid,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Address {
    /// Orders sort a user's addresses default first, then most recently updated.
    pub fn display_order(a: &Address, b: &Address) -> std::cmp::Ordering {
        b.is_default.cmp(&a.is_default).then(b.updated_at.cmp(&a.updated_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_address_validation() {
        let form = NewAddress {
            full_name: String::new(), phone: "0912".into(), address_exact: "Valiasr St".into(), description: String::new(),
            province_id: Uuid::now_v7(), city_id: Uuid::now_v7(), postal_code: "1234567890".into(), is_default: false,
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("full_name"));
    }
}
