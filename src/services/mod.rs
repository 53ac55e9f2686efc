//! Business logic services layer

pub mod access_control_service;
pub mod audit_service;
pub mod consent_service;
pub mod encryption_service;

pub use access_control_service::AccessControlService;
pub use audit_service::AuditService;
pub use consent_service::ConsentService;
pub use encryption_service::EncryptionService;
