pub mod config;
pub mod params;
pub mod rbac;
pub mod validate;
