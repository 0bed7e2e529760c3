//! Permissions and the static role table.

use fieldcheck_platform_access::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named capability granted per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewDashboard,
    ViewAnalytics,
    ManageTeam,
    ManageClients,
    ManageTemplates,
    CreateInspections,
    ExecuteInspections,
    ViewInspection,
    EditInspection,
    DeleteInspection,
    ViewTemplate,
    EditTemplate,
    ViewReports,
    ExportReports,
    ManageBilling,
    ManageSettings,
    UseVoiceAssistant,
    ViewAllInspections,
    AssignInspections,
}

impl Permission {
    pub const ALL: [Permission; 19] = [
        Permission::ViewDashboard,
        Permission::ViewAnalytics,
        Permission::ManageTeam,
        Permission::ManageClients,
        Permission::ManageTemplates,
        Permission::CreateInspections,
        Permission::ExecuteInspections,
        Permission::ViewInspection,
        Permission::EditInspection,
        Permission::DeleteInspection,
        Permission::ViewTemplate,
        Permission::EditTemplate,
        Permission::ViewReports,
        Permission::ExportReports,
        Permission::ManageBilling,
        Permission::ManageSettings,
        Permission::UseVoiceAssistant,
        Permission::ViewAllInspections,
        Permission::AssignInspections,
    ];

    /// Wire name of the permission.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ViewDashboard => "view_dashboard",
            Self::ViewAnalytics => "view_analytics",
            Self::ManageTeam => "manage_team",
            Self::ManageClients => "manage_clients",
            Self::ManageTemplates => "manage_templates",
            Self::CreateInspections => "create_inspections",
            Self::ExecuteInspections => "execute_inspections",
            Self::ViewInspection => "view_inspection",
            Self::EditInspection => "edit_inspection",
            Self::DeleteInspection => "delete_inspection",
            Self::ViewTemplate => "view_template",
            Self::EditTemplate => "edit_template",
            Self::ViewReports => "view_reports",
            Self::ExportReports => "export_reports",
            Self::ManageBilling => "manage_billing",
            Self::ManageSettings => "manage_settings",
            Self::UseVoiceAssistant => "use_voice_assistant",
            Self::ViewAllInspections => "view_all_inspections",
            Self::AssignInspections => "assign_inspections",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown permission name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPermission(pub String);

impl fmt::Display for UnknownPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown permission '{}'", self.0)
    }
}

impl std::error::Error for UnknownPermission {}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

const MANAGER: &[Permission] = &[
    Permission::ViewDashboard,
    Permission::ViewAnalytics,
    Permission::ManageTeam,
    Permission::ManageClients,
    Permission::ManageTemplates,
    Permission::CreateInspections,
    Permission::ExecuteInspections,
    Permission::ViewInspection,
    Permission::EditInspection,
    Permission::ViewTemplate,
    Permission::EditTemplate,
    Permission::ViewReports,
    Permission::ExportReports,
    Permission::AssignInspections,
    Permission::UseVoiceAssistant,
];

const INSPECTOR: &[Permission] = &[
    Permission::ViewDashboard,
    Permission::ExecuteInspections,
    Permission::ViewInspection,
    Permission::EditInspection,
    Permission::ViewTemplate,
    Permission::ViewReports,
    Permission::UseVoiceAssistant,
];

/// The permissions granted to `role`, in display order.
#[must_use]
pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => &Permission::ALL,
        Role::Manager => MANAGER,
        Role::Inspector => INSPECTOR,
    }
}

/// Static table lookup, ignoring any resource context.
#[must_use]
pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions_for(role).contains(&permission)
}

/// True if `role` holds at least one of `permissions`.
#[must_use]
pub fn has_any_permission(role: Role, permissions: &[Permission]) -> bool {
    permissions.iter().any(|p| has_permission(role, *p))
}

/// True if `role` holds every one of `permissions`. Vacuously true for an empty list.
#[must_use]
pub fn has_all_permissions(role: Role, permissions: &[Permission]) -> bool {
    permissions.iter().all(|p| has_permission(role, *p))
}
