pub mod audit_service;
pub mod auth;
pub mod bulk;
pub mod catalog_service;
pub mod export_service;
pub mod rbac_service;
