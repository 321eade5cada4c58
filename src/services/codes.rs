//! Human-readable sequential codes ("MAT001", "REQ014").
//!
//! A new code is one past the highest numeric suffix already stored under the
//! prefix, so codes are never reused after deletions. Allocation runs inside the
//! inserting transaction; the unique index on each code column turns a race
//! between two allocators into a unique violation, which callers retry through
//! [`retry_on_code_collision`].

use crate::entities::{material, material_request};
use crate::errors::ServiceError;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use std::future::Future;
use tracing::warn;

pub const MATERIAL_PREFIX: &str = "MAT";
pub const REQUEST_PREFIX: &str = "REQ";

/// Attempts made before a persistent collision is surfaced to the caller.
pub const MAX_CODE_ATTEMPTS: usize = 3;

/// Formats the code following the largest numeric suffix in `existing`.
pub fn next_in_sequence<I, S>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let last = existing
        .into_iter()
        .filter_map(|code| {
            code.as_ref()
                .strip_prefix(prefix)
                .and_then(|suffix| suffix.parse::<u32>().ok())
        })
        .max()
        .unwrap_or(0);

    format!("{}{:03}", prefix, last.saturating_add(1))
}

pub async fn next_material_code<C>(db: &C) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    let codes: Vec<String> = material::Entity::find()
        .select_only()
        .column(material::Column::MaterialCode)
        .filter(material::Column::MaterialCode.starts_with(MATERIAL_PREFIX))
        .into_tuple()
        .all(db)
        .await?;

    Ok(next_in_sequence(MATERIAL_PREFIX, codes))
}

pub async fn next_request_code<C>(db: &C) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    let codes: Vec<String> = material_request::Entity::find()
        .select_only()
        .column(material_request::Column::RequestCode)
        .filter(material_request::Column::RequestCode.starts_with(REQUEST_PREFIX))
        .into_tuple()
        .all(db)
        .await?;

    Ok(next_in_sequence(REQUEST_PREFIX, codes))
}

/// Re-runs `attempt` while it fails on a unique index, up to
/// [`MAX_CODE_ATTEMPTS`] times. Each attempt must be a whole transaction.
pub async fn retry_on_code_collision<T, F, Fut>(
    operation: &str,
    mut attempt: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(err) if err.is_unique_violation() && tries < MAX_CODE_ATTEMPTS => {
                warn!(operation, tries, "code collision, retrying: {}", err);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::company;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    #[test_case(&[], "MAT001" ; "empty table starts at one")]
    #[test_case(&["MAT037"], "MAT038" ; "follows the last code")]
    #[test_case(&["MAT009", "MAT120", "MAT011"], "MAT121" ; "uses the highest not the latest")]
    #[test_case(&["MAT004", "MATX", "REQ900"], "MAT005" ; "ignores foreign and malformed codes")]
    #[test_case(&["MAT999"], "MAT1000" ; "grows past three digits")]
    fn material_sequence(existing: &[&str], expected: &str) {
        assert_eq!(next_in_sequence("MAT", existing.iter()), expected);
    }

    async fn pool() -> DatabaseConnection {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn material_code_reads_existing_rows() {
        let db = pool().await;
        assert_eq!(next_material_code(&db).await.unwrap(), "MAT001");

        let now = Utc::now();
        let tenant = company::ActiveModel {
            name: Set("Codes Co".into()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        material::ActiveModel {
            material_code: Set("MAT037".into()),
            name: Set("Cement".into()),
            category: Set("Civil".into()),
            unit: Set("bag".into()),
            default_rate: Set(dec!(420)),
            company_id: Set(tenant.id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        assert_eq!(next_material_code(&db).await.unwrap(), "MAT038");
        assert_eq!(next_request_code(&db).await.unwrap(), "REQ001");
    }

    #[tokio::test]
    async fn non_collision_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry_on_code_collision("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::DatabaseError(DbErr::Custom("down".into()))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
