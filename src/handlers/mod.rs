pub mod accounts;
pub mod common;
pub mod contracts;
pub mod engineers;
pub mod financial;
pub mod health;
pub mod labour;
pub mod material_requests;
pub mod materials;
pub mod notifications;
pub mod project_materials;
pub mod projects;
pub mod usage_logs;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
