pub mod audit;
pub mod auth;
pub mod catalog;
pub mod rbac;
pub mod view;
