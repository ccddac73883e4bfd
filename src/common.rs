pub mod error;
pub mod i18n;
pub mod list_query;
pub mod query_params;
pub mod code;
