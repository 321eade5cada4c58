//! sea-orm entity definitions. Every table is scoped to a company, either
//! directly through `company_id` or through its parent project.

pub mod company;
pub mod contract;
pub mod engineer;
pub mod labour;
pub mod labour_payment;
pub mod material;
pub mod material_request;
pub mod material_usage;
pub mod notification;
pub mod project;
pub mod project_assignment;
pub mod project_expense;
pub mod project_file;
pub mod project_material;
pub mod user;
