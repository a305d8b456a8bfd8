//! Caller identity and user snapshots.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

/// Marketplace role asserted by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Supplier,
}

impl Role {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Supplier => "supplier",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buyer" => Ok(Role::Buyer),
            "supplier" => Ok(Role::Supplier),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The resolved caller of a core operation.
///
/// Passed explicitly into every service call; the core never looks up
/// session state on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub email: String,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role, email: impl Into<String>) -> Self {
        Self {
            user_id,
            role,
            email: email.into(),
        }
    }

    pub fn buyer(user_id: UserId, email: impl Into<String>) -> Self {
        Self::new(user_id, Role::Buyer, email)
    }

    pub fn supplier(user_id: UserId, email: impl Into<String>) -> Self {
        Self::new(user_id, Role::Supplier, email)
    }

    pub fn is_buyer(&self) -> bool {
        self.role == Role::Buyer
    }

    pub fn is_supplier(&self) -> bool {
        self.role == Role::Supplier
    }
}

/// Directory entry for a user, used to snapshot names into bids and orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub company: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Identity of an order party frozen at the time of writing.
///
/// Later profile edits never rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySnapshot {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<&UserProfile> for PartySnapshot {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile
                .company
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| profile.name.clone()),
            email: profile.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Supplier".parse::<Role>().unwrap(), Role::Supplier);
        assert_eq!("buyer".parse::<Role>().unwrap(), Role::Buyer);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn party_snapshot_prefers_company_name() {
        let mut profile = UserProfile {
            id: UserId::new(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Supplier,
            company: Some("Ada Textiles".to_string()),
            updated_at: Utc::now(),
        };
        assert_eq!(PartySnapshot::from(&profile).name, "Ada Textiles");

        profile.company = Some("  ".to_string());
        assert_eq!(PartySnapshot::from(&profile).name, "Ada");
    }
}
