//! Typed records for each table, and the inputs that create or change them.

use chrono::{DateTime, Utc};
use fieldcheck_authz::InspectionStatus;
use fieldcheck_core::{ClientId, InspectionId, TeamId, TemplateId, TestId, UserId};
use fieldcheck_platform_access::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A field inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    pub id: InspectionId,
    pub title: String,
    pub status: InspectionStatus,
    /// The inspector who owns the inspection.
    pub inspector_id: UserId,
    pub created_by: UserId,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    #[serde(default)]
    pub site_address: Option<String>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewInspection {
    pub title: String,
    /// Defaults to the creator.
    pub inspector_id: Option<UserId>,
    /// Defaults to the creator's client.
    pub client_id: Option<ClientId>,
    pub template_id: Option<TemplateId>,
    pub site_address: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Fields to change on an inspection. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InspectionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InspectionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspector_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl InspectionUpdate {
    /// True if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of one test performed during an inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Pass,
    Fail,
    NotApplicable,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::NotApplicable => "not_applicable",
        })
    }
}

/// A test recorded against an inspection (insulation resistance, airflow,
/// panel output and the like).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionTest {
    pub id: TestId,
    pub inspection_id: InspectionId,
    pub name: String,
    pub outcome: TestOutcome,
    #[serde(default)]
    pub reading: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInspectionTest {
    pub name: String,
    pub outcome: TestOutcome,
    pub reading: Option<String>,
    pub notes: Option<String>,
}

/// A reusable inspection checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Trade the template is for (electrical, hvac, solar).
    #[serde(default)]
    pub trade: Option<String>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub trade: Option<String>,
    pub items: Vec<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A member of a team, or a pending invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub team_id: TeamId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: Role,
    pub invited_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeamMember {
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
}

/// A customer whose sites are inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewClient {
    pub name: String,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inspection_decodes_with_optional_columns_missing() {
        let inspection: Inspection = serde_json::from_value(json!({
            "id": "i1",
            "title": "Panel upgrade",
            "status": "in_progress",
            "inspector_id": "u1",
            "created_by": "m1",
            "created_at": "2026-10-19T08:00:00Z"
        }))
        .expect("decode");
        assert_eq!(inspection.status, InspectionStatus::InProgress);
        assert_eq!(inspection.team_id, None);
    }

    #[test]
    fn unknown_status_does_not_decode() {
        let result = serde_json::from_value::<Inspection>(json!({
            "id": "i1",
            "title": "x",
            "status": "archived",
            "inspector_id": "u1",
            "created_by": "u1",
            "created_at": "2026-10-19T08:00:00Z"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn updates_serialize_only_set_fields() {
        let update = InspectionUpdate {
            status: Some(InspectionStatus::Completed),
            ..InspectionUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(&update).expect("encode"),
            json!({"status": "completed"})
        );
        assert!(InspectionUpdate::default().is_empty());
    }
}
