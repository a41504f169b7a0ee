use sqlx::SqliteConnection;
use thiserror::Error;

/// First vendor id handed out on an empty system.
pub(crate) const VENDOR_SEQ_START: i64 = 1001;
/// Width of the employee-id range owned by each vendor: ids live in
/// `(vendor_id * 10000, vendor_id * 10000 + 10000)`, the admin at `+ 1`.
pub(crate) const EMPLOYEE_ID_SPAN: i64 = 10_000;

const VENDOR_NAMESPACE: &str = "vendor";

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Cannot allocate an identifier for vendor {0}: no such vendor")]
    InvalidNamespace(i64),
}

pub(crate) fn employee_namespace(vendor_id: i64) -> String {
    format!("employee:{vendor_id}")
}

pub(crate) fn task_namespace(vendor_id: i64) -> String {
    format!("task:{vendor_id}")
}

pub(crate) fn employee_id_base(vendor_id: i64) -> i64 {
    vendor_id * EMPLOYEE_ID_SPAN
}

/// Atomic fetch-and-add on a namespace counter. The counter row is created
/// at `seed` on first use and bumped by one on every later call, all inside
/// a single statement, so two concurrent callers can never observe the same
/// value. Run on the caller's transaction, a rolled-back insert also rolls
/// the counter back.
pub(crate) async fn reserve(
    conn: &mut SqliteConnection,
    namespace: &str,
    seed: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO sequences (namespace, value) VALUES ($1, $2)
         ON CONFLICT (namespace) DO UPDATE SET value = value + 1
         RETURNING value",
    )
    .bind(namespace)
    .bind(seed)
    .fetch_one(&mut *conn)
    .await
}

pub async fn next_vendor_id(conn: &mut SqliteConnection) -> Result<i64, SequenceError> {
    Ok(reserve(conn, VENDOR_NAMESPACE, VENDOR_SEQ_START).await?)
}

async fn require_vendor(conn: &mut SqliteConnection, vendor_id: i64) -> Result<(), SequenceError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM vendors WHERE vendor_id = $1")
        .bind(vendor_id)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        return Err(SequenceError::InvalidNamespace(vendor_id));
    }
    Ok(())
}

pub async fn next_employee_id(
    conn: &mut SqliteConnection,
    vendor_id: i64,
) -> Result<i64, SequenceError> {
    require_vendor(&mut *conn, vendor_id).await?;
    let id = reserve(
        &mut *conn,
        &employee_namespace(vendor_id),
        employee_id_base(vendor_id) + 1,
    )
    .await?;
    Ok(id)
}

/// Per-vendor task sequence; starts at 1 and never restarts. The caller
/// formats the composite task id from it.
pub async fn next_task_seq(
    conn: &mut SqliteConnection,
    vendor_id: i64,
) -> Result<i64, SequenceError> {
    require_vendor(&mut *conn, vendor_id).await?;
    let seq = reserve(&mut *conn, &task_namespace(vendor_id), 1).await?;
    Ok(seq)
}
