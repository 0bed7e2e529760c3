//! Role and plan types.
//!
//! Both are closed sets. Values arriving from the identity provider are
//! parsed with [`FromStr`]; anything unrecognised is an error for the caller
//! to default away, never a new variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Principal classification, rank-ordered: admin ⊇ manager ⊇ inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Field inspector; sees only their own inspections.
    Inspector,
    /// Team manager; sees their team's and client's inspections.
    Manager,
    /// Organisation administrator; sees everything.
    Admin,
}

impl Role {
    /// All roles, lowest privilege first.
    pub const ALL: [Role; 3] = [Role::Inspector, Role::Manager, Role::Admin];

    /// The role assigned when nothing better is known.
    pub const LOWEST: Role = Role::Inspector;

    /// Numeric rank used for hierarchy comparisons.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Admin => 3,
            Self::Manager => 2,
            Self::Inspector => 1,
        }
    }

    /// Returns true if this role is `required` or ranks above it.
    #[must_use]
    pub const fn has_role_or_higher(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// Returns true for the admin role.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Inspector => "inspector",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "Administrator",
            Self::Manager => "Manager",
            Self::Inspector => "Inspector",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing tier controlling feature and quota access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Starter,
    Professional,
    Enterprise,
}

impl Plan {
    /// All plans, cheapest first.
    pub const ALL: [Plan; 3] = [Plan::Starter, Plan::Professional, Plan::Enterprise];

    /// Wire name of the plan.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role or plan string is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// Which enum was being parsed ("role" or "plan").
    pub kind: &'static str,
    /// The rejected value.
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "inspector" => Ok(Self::Inspector),
            _ => Err(UnknownVariant {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Plan {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(UnknownVariant {
                kind: "plan",
                value: s.to_string(),
            }),
        }
    }
}
