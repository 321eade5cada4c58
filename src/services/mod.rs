// Core workflow
pub mod material_requests;
pub mod project_materials;
pub mod usage;

// Catalog and projects
pub mod materials;
pub mod projects;

// People
pub mod accounts;
pub mod engineers;
pub mod labour;

// Commercial
pub mod contracts;
pub mod financial;

pub mod notifications;

// Shared helpers
pub mod codes;
pub mod scope;

use crate::{auth::AuthService, db::DbPool, storage::FileStorage};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial updates.
pub(crate) fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Services layer shared by every HTTP handler
#[derive(Clone)]
pub struct AppServices {
    pub accounts: Arc<accounts::AccountService>,
    pub material_requests: Arc<material_requests::MaterialRequestService>,
    pub project_materials: Arc<project_materials::ProjectMaterialService>,
    pub usage: Arc<usage::UsageService>,
    pub materials: Arc<materials::MaterialService>,
    pub projects: Arc<projects::ProjectService>,
    pub engineers: Arc<engineers::EngineerService>,
    pub labour: Arc<labour::LabourService>,
    pub contracts: Arc<contracts::ContractService>,
    pub financial: Arc<financial::FinancialService>,
    pub notifications: Arc<notifications::NotificationService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        auth: Arc<AuthService>,
        storage: Arc<FileStorage>,
        max_upload_bytes: usize,
    ) -> Self {
        let notifier: Arc<dyn notifications::Notifier> =
            Arc::new(notifications::DbNotifier::new(db_pool.clone()));

        Self {
            accounts: Arc::new(accounts::AccountService::new(db_pool.clone(), auth.clone())),
            material_requests: Arc::new(material_requests::MaterialRequestService::new(
                db_pool.clone(),
                notifier,
            )),
            project_materials: Arc::new(project_materials::ProjectMaterialService::new(
                db_pool.clone(),
            )),
            usage: Arc::new(usage::UsageService::new(db_pool.clone())),
            materials: Arc::new(materials::MaterialService::new(db_pool.clone())),
            projects: Arc::new(projects::ProjectService::new(
                db_pool.clone(),
                storage.clone(),
                max_upload_bytes,
            )),
            engineers: Arc::new(engineers::EngineerService::new(
                db_pool.clone(),
                auth,
                storage,
            )),
            labour: Arc::new(labour::LabourService::new(db_pool.clone())),
            contracts: Arc::new(contracts::ContractService::new(db_pool.clone())),
            financial: Arc::new(financial::FinancialService::new(db_pool.clone())),
            notifications: Arc::new(notifications::NotificationService::new(db_pool)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "present_or_null")]
        budget: Option<Option<i32>>,
    }

    #[test]
    fn absent_null_and_value_are_distinct() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"budget":null}"#).unwrap();
        let value: Patch = serde_json::from_str(r#"{"budget":5}"#).unwrap();
        assert_eq!(absent.budget, None);
        assert_eq!(null.budget, Some(None));
        assert_eq!(value.budget, Some(Some(5)));
    }
}
