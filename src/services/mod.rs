//! Business logic services layer

pub mod assignment_service;
pub mod authz_service;
pub mod catalog_service;
pub mod graph;
pub mod permission_service;
pub mod role_service;

pub use assignment_service::RoleAssignments;
pub use authz_service::{AuthorizationEngine, CriticalPolicy, GrantEditor, GrantOutcome};
pub use catalog_service::{CatalogSnapshot, PermissionCatalog};
pub use permission_service::{PermissionService, UserPermissions};
pub use role_service::RoleRegistry;
