pub mod employee;
pub mod sequence;
pub mod task;
pub mod vendor;

/// Attempts before a post-allocation uniqueness violation is surfaced as an
/// allocation conflict.
pub(crate) const ALLOCATION_RETRY_LIMIT: usize = 5;

/// `table.column` of a violated UNIQUE or PRIMARY KEY constraint, if that is
/// what `err` is.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    let db_err = err.as_database_error()?;
    db_err
        .message()
        .strip_prefix("UNIQUE constraint failed: ")
        .map(|target| target.trim().to_string())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };

    if let Some(code) = db_err.code() {
        // SQLITE_CONSTRAINT_FOREIGNKEY
        if code == "787" {
            return true;
        }
    }

    db_err.message().contains("FOREIGN KEY constraint failed")
}
