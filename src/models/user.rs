use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    RootAdmin,
    SuperAdmin,
    CollegeAdmin,
    Faculty,
    Student,
}

/// What a role may do. Route guards consult this instead of comparing
/// role strings at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_manage_tests: bool,
    pub can_take_tests: bool,
    pub can_view_any_result: bool,
}

pub fn capabilities_for(role: Role) -> Capabilities {
    match role {
        Role::RootAdmin | Role::SuperAdmin | Role::CollegeAdmin => Capabilities {
            can_manage_tests: true,
            can_take_tests: false,
            can_view_any_result: true,
        },
        Role::Faculty => Capabilities {
            can_manage_tests: true,
            can_take_tests: false,
            can_view_any_result: true,
        },
        Role::Student => Capabilities {
            can_manage_tests: false,
            can_take_tests: true,
            can_view_any_result: false,
        },
    }
}
