/*!
 * Unit of work
 *
 * Every multi-row mutation runs inside `with_transaction`: the closure gets a
 * transactional handle, and its writes are committed together when it returns
 * `Ok` or rolled back together when it returns `Err`.
 */

use metrics::counter;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// The closure's own error type is preserved, so a `Conflict` raised halfway
/// through reaches the caller as a `Conflict` after the rollback.
///
/// # Example
///
/// ```rust,ignore
/// let usage = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let usage = usage_row.insert(txn).await?;
///         apply_usage_delta(txn, allocation_id, usage.quantity).await?;
///         Ok(usage)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: From<DbErr> + std::error::Error + Send,
{
    let result = db.transaction::<_, T, E>(f).await;

    match &result {
        Ok(_) => {
            counter!("buildsite_db.transaction.committed", 1);
        }
        Err(_) => {
            counter!("buildsite_db.transaction.rolled_back", 1);
            debug!("Transaction rolled back");
        }
    }

    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}
