pub mod list_sql;
pub mod user_repo;
pub use user_repo::UserRepository;
pub mod catalog_repo;
pub use catalog_repo::CatalogRepository;
pub mod rbac_repo;
pub use rbac_repo::RbacRepository;
pub mod audit_repo;
pub use audit_repo::AuditRepository;
