use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use thiserror::Error;
use ts_rs::TS;

use crate::{
    models::{
        ALLOCATION_RETRY_LIMIT, is_foreign_key_violation,
        sequence::{self, SequenceError},
        task::Task,
        unique_violation,
        vendor::Vendor,
    },
    retry::{MaybeBusy, retry_on_sqlite_busy},
    types::Role,
};

#[derive(Debug, Error)]
pub enum EmployeeError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("Invalid Vendor ID. No such vendor exists")]
    VendorNotFound,
    #[error("Employee not found")]
    EmployeeNotFound,
    #[error("Email already exists")]
    DuplicateEmail,
    #[error("WhatsApp number already exists")]
    DuplicateWhatsapp,
    #[error("Identifier allocation conflicted; the registration is safe to retry")]
    AllocationConflict,
}

impl MaybeBusy for EmployeeError {
    fn is_sqlite_busy(&self) -> bool {
        match self {
            EmployeeError::Database(err) => err.is_sqlite_busy(),
            EmployeeError::Sequence(SequenceError::Database(err)) => err.is_sqlite_busy(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Employee {
    pub employee_id: i64,
    pub vendor_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub whatsapp_number: String,
    pub role: Role,
    pub department: String,
    pub designation: String,
    pub employee_code: String,
    pub active_status: String,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Resolved caller identity, handed in by the upstream auth layer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Principal {
    pub employee_id: i64,
    pub vendor_id: i64,
    pub role: Role,
}

impl From<&Employee> for Principal {
    fn from(employee: &Employee) -> Self {
        Self {
            employee_id: employee.employee_id,
            vendor_id: employee.vendor_id,
            role: employee.role,
        }
    }
}

impl Principal {
    pub fn is_admin_of(&self, vendor_id: i64) -> bool {
        self.role == Role::Admin && self.vendor_id == vendor_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateEmployee {
    pub vendor_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub whatsapp_number: String,
    pub department: String,
    pub designation: String,
    pub employee_code: String,
    pub active_status: String,
}

/// Partial update; only supplied fields are written. Vendor and role are
/// immutable after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateEmployee {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub whatsapp_number: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub employee_code: Option<String>,
    pub active_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EmployeeDeleted {
    pub vendor_id: i64,
    pub deleted_employee_id: i64,
    /// Tasks whose assignee list the employee was pulled out of.
    pub tasks_updated: u64,
}

pub(crate) enum IdentityConflict {
    Email,
    Whatsapp,
}

/// Email and WhatsApp numbers are unique across the whole system, not per
/// tenant. `exclude` skips the record being updated.
pub(crate) async fn identity_conflict(
    pool: &SqlitePool,
    email: &str,
    whatsapp_number: &str,
    exclude: Option<i64>,
) -> Result<Option<IdentityConflict>, sqlx::Error> {
    let email_taken = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM employees WHERE email = $1 AND ($2 IS NULL OR employee_id <> $2) LIMIT 1",
    )
    .bind(email)
    .bind(exclude)
    .fetch_optional(pool)
    .await?;
    if email_taken.is_some() {
        return Ok(Some(IdentityConflict::Email));
    }

    let whatsapp_taken = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM employees WHERE whatsapp_number = $1 AND ($2 IS NULL OR employee_id <> $2) LIMIT 1",
    )
    .bind(whatsapp_number)
    .bind(exclude)
    .fetch_optional(pool)
    .await?;
    if whatsapp_taken.is_some() {
        return Ok(Some(IdentityConflict::Whatsapp));
    }

    Ok(None)
}

pub(crate) async fn insert_row(
    conn: &mut SqliteConnection,
    employee_id: i64,
    role: Role,
    data: &CreateEmployee,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO employees (employee_id, vendor_id, first_name, last_name, email,
                                whatsapp_number, role, department, designation,
                                employee_code, active_status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(employee_id)
    .bind(data.vendor_id)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.email)
    .bind(&data.whatsapp_number)
    .bind(role)
    .bind(&data.department)
    .bind(&data.designation)
    .bind(&data.employee_code)
    .bind(&data.active_status)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn map_insert_error(err: sqlx::Error) -> EmployeeError {
    if let Some(target) = unique_violation(&err) {
        return match target.as_str() {
            "employees.email" => EmployeeError::DuplicateEmail,
            "employees.whatsapp_number" => EmployeeError::DuplicateWhatsapp,
            "employees.employee_id" => EmployeeError::AllocationConflict,
            _ => EmployeeError::Database(err),
        };
    }
    if is_foreign_key_violation(&err) {
        return EmployeeError::VendorNotFound;
    }
    EmployeeError::Database(err)
}

const SELECT_COLUMNS: &str = "SELECT employee_id, vendor_id, first_name, last_name, email,
        whatsapp_number, role, department, designation, employee_code,
        active_status, created_at, updated_at
 FROM employees";

impl Employee {
    /// Registers a regular employee under an existing vendor. The vendor's
    /// single admin record exists only via `Vendor::create`.
    pub async fn create(pool: &SqlitePool, data: &CreateEmployee) -> Result<Employee, EmployeeError> {
        if !Vendor::exists(pool, data.vendor_id).await? {
            return Err(EmployeeError::VendorNotFound);
        }
        match identity_conflict(pool, &data.email, &data.whatsapp_number, None).await? {
            Some(IdentityConflict::Email) => return Err(EmployeeError::DuplicateEmail),
            Some(IdentityConflict::Whatsapp) => return Err(EmployeeError::DuplicateWhatsapp),
            None => {}
        }

        let mut attempt = 0;
        loop {
            match retry_on_sqlite_busy(|| Self::try_create(pool, data)).await {
                Err(EmployeeError::AllocationConflict) if attempt + 1 < ALLOCATION_RETRY_LIMIT => {
                    attempt += 1;
                    tracing::warn!(
                        vendor_id = data.vendor_id,
                        attempt,
                        "Employee id allocation conflicted, re-allocating"
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_create(pool: &SqlitePool, data: &CreateEmployee) -> Result<Employee, EmployeeError> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;
        let employee_id = sequence::next_employee_id(&mut tx, data.vendor_id)
            .await
            .map_err(|err| match err {
                SequenceError::InvalidNamespace(_) => EmployeeError::VendorNotFound,
                other => other.into(),
            })?;
        insert_row(&mut tx, employee_id, Role::Employee, data, now)
            .await
            .map_err(map_insert_error)?;
        tx.commit().await?;

        Ok(Employee {
            employee_id,
            vendor_id: data.vendor_id,
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            email: data.email.clone(),
            whatsapp_number: data.whatsapp_number.clone(),
            role: Role::Employee,
            department: data.department.clone(),
            designation: data.designation.clone(),
            employee_code: data.employee_code.clone(),
            active_status: data.active_status.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        employee_id: i64,
    ) -> Result<Option<Employee>, sqlx::Error> {
        sqlx::query_as::<_, Employee>(&format!("{SELECT_COLUMNS} WHERE employee_id = $1"))
            .bind(employee_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_in_vendor(
        pool: &SqlitePool,
        vendor_id: i64,
        employee_id: i64,
    ) -> Result<Option<Employee>, sqlx::Error> {
        sqlx::query_as::<_, Employee>(&format!(
            "{SELECT_COLUMNS} WHERE vendor_id = $1 AND employee_id = $2"
        ))
        .bind(vendor_id)
        .bind(employee_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(
        pool: &SqlitePool,
        email: &str,
    ) -> Result<Option<Employee>, sqlx::Error> {
        sqlx::query_as::<_, Employee>(&format!("{SELECT_COLUMNS} WHERE email = $1"))
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_vendor(
        pool: &SqlitePool,
        vendor_id: i64,
    ) -> Result<Vec<Employee>, EmployeeError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(EmployeeError::VendorNotFound);
        }
        let employees = sqlx::query_as::<_, Employee>(&format!(
            "{SELECT_COLUMNS} WHERE vendor_id = $1 ORDER BY employee_id"
        ))
        .bind(vendor_id)
        .fetch_all(pool)
        .await?;
        Ok(employees)
    }

    /// Ids from `ids` that do not resolve to an employee of `vendor_id`.
    pub(crate) async fn missing_in_vendor(
        pool: &SqlitePool,
        vendor_id: i64,
        ids: &[i64],
    ) -> Result<Vec<i64>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT employee_id FROM employees WHERE vendor_id = ",
        );
        qb.push_bind(vendor_id);
        qb.push(" AND employee_id IN (");
        {
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(*id);
            }
        }
        qb.push(")");
        let found: Vec<i64> = qb.build_query_scalar().fetch_all(pool).await?;
        Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
    }

    /// Applies only the supplied fields; an email or WhatsApp change
    /// re-checks uniqueness before committing.
    pub async fn update(
        pool: &SqlitePool,
        employee_id: i64,
        updates: &UpdateEmployee,
    ) -> Result<Employee, EmployeeError> {
        let Some(existing) = Self::find_by_id(pool, employee_id).await? else {
            return Err(EmployeeError::EmployeeNotFound);
        };

        let email = updates.email.as_ref().unwrap_or(&existing.email);
        let whatsapp_number = updates
            .whatsapp_number
            .as_ref()
            .unwrap_or(&existing.whatsapp_number);
        if email != &existing.email || whatsapp_number != &existing.whatsapp_number {
            match identity_conflict(pool, email, whatsapp_number, Some(employee_id)).await? {
                Some(IdentityConflict::Email) => return Err(EmployeeError::DuplicateEmail),
                Some(IdentityConflict::Whatsapp) => return Err(EmployeeError::DuplicateWhatsapp),
                None => {}
            }
        }

        let mut next = existing;
        if let Some(first_name) = &updates.first_name {
            next.first_name = first_name.clone();
        }
        if let Some(last_name) = &updates.last_name {
            next.last_name = last_name.clone();
        }
        if let Some(email) = &updates.email {
            next.email = email.clone();
        }
        if let Some(whatsapp_number) = &updates.whatsapp_number {
            next.whatsapp_number = whatsapp_number.clone();
        }
        if let Some(department) = &updates.department {
            next.department = department.clone();
        }
        if let Some(designation) = &updates.designation {
            next.designation = designation.clone();
        }
        if let Some(employee_code) = &updates.employee_code {
            next.employee_code = employee_code.clone();
        }
        if let Some(active_status) = &updates.active_status {
            next.active_status = active_status.clone();
        }
        next.updated_at = Utc::now();

        retry_on_sqlite_busy(|| async {
            let result = sqlx::query(
                "UPDATE employees
                 SET first_name = $1, last_name = $2, email = $3, whatsapp_number = $4,
                     department = $5, designation = $6, employee_code = $7,
                     active_status = $8, updated_at = $9
                 WHERE employee_id = $10",
            )
            .bind(&next.first_name)
            .bind(&next.last_name)
            .bind(&next.email)
            .bind(&next.whatsapp_number)
            .bind(&next.department)
            .bind(&next.designation)
            .bind(&next.employee_code)
            .bind(&next.active_status)
            .bind(next.updated_at)
            .bind(employee_id)
            .execute(pool)
            .await
            .map_err(map_insert_error)?;
            if result.rows_affected() == 0 {
                return Err(EmployeeError::EmployeeNotFound);
            }
            Ok(())
        })
        .await?;

        Ok(next)
    }

    /// Deletes the employee and, in the same transaction, pulls the id out
    /// of every task's assignee list for the vendor. Tasks themselves are
    /// kept, even when their assignee list becomes empty.
    pub async fn delete(
        pool: &SqlitePool,
        vendor_id: i64,
        employee_id: i64,
    ) -> Result<EmployeeDeleted, EmployeeError> {
        retry_on_sqlite_busy(|| Self::try_delete(pool, vendor_id, employee_id)).await
    }

    async fn try_delete(
        pool: &SqlitePool,
        vendor_id: i64,
        employee_id: i64,
    ) -> Result<EmployeeDeleted, EmployeeError> {
        let mut tx = pool.begin().await?;

        let vendor_exists =
            sqlx::query_scalar::<_, i64>("SELECT 1 FROM vendors WHERE vendor_id = $1")
                .bind(vendor_id)
                .fetch_optional(&mut *tx)
                .await?;
        if vendor_exists.is_none() {
            return Err(EmployeeError::VendorNotFound);
        }

        let deleted = sqlx::query("DELETE FROM employees WHERE vendor_id = $1 AND employee_id = $2")
            .bind(vendor_id)
            .bind(employee_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(EmployeeError::EmployeeNotFound);
        }

        let tasks_updated = Task::pull_assignee(&mut tx, vendor_id, employee_id).await?;
        tx.commit().await?;

        Ok(EmployeeDeleted {
            vendor_id,
            deleted_employee_id: employee_id,
            tasks_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::vendor::{CreateAdmin, Vendor},
        test_support::{cleanup_db, setup_pool},
    };

    fn admin_fixture(tag: &str) -> CreateAdmin {
        CreateAdmin {
            first_name: "Mira".to_string(),
            last_name: "Shah".to_string(),
            email: format!("admin-{tag}@example.com"),
            whatsapp_number: format!("90000{tag:0>5}"),
            department: "Management".to_string(),
            designation: "Founder".to_string(),
            employee_code: format!("ADM-{tag}"),
            active_status: "active".to_string(),
        }
    }

    fn employee_fixture(vendor_id: i64, tag: &str) -> CreateEmployee {
        CreateEmployee {
            vendor_id,
            first_name: "Ravi".to_string(),
            last_name: "Kumar".to_string(),
            email: format!("emp-{tag}@example.com"),
            whatsapp_number: format!("80000{tag:0>5}"),
            department: "IT".to_string(),
            designation: "Engineer".to_string(),
            employee_code: format!("EMP-{tag}"),
            active_status: "active".to_string(),
        }
    }

    #[tokio::test]
    async fn employee_ids_continue_the_vendor_sequence() {
        let (pool, db_path) = setup_pool().await;

        let admin = Vendor::create(&pool, &admin_fixture("00001")).await.unwrap();
        assert_eq!(admin.employee_id, 10010001);

        let first = Employee::create(&pool, &employee_fixture(admin.vendor_id, "00001"))
            .await
            .unwrap();
        let second = Employee::create(&pool, &employee_fixture(admin.vendor_id, "00002"))
            .await
            .unwrap();
        assert_eq!(first.employee_id, 10010002);
        assert_eq!(second.employee_id, 10010003);
        assert_eq!(first.role, Role::Employee);

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn registration_requires_an_existing_vendor() {
        let (pool, db_path) = setup_pool().await;

        let err = Employee::create(&pool, &employee_fixture(9999, "00003"))
            .await
            .unwrap_err();
        assert!(matches!(err, EmployeeError::VendorNotFound));

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn duplicate_email_and_whatsapp_are_rejected_globally() {
        let (pool, db_path) = setup_pool().await;

        let admin_a = Vendor::create(&pool, &admin_fixture("00004")).await.unwrap();
        let admin_b = Vendor::create(&pool, &admin_fixture("00005")).await.unwrap();

        let employee = Employee::create(&pool, &employee_fixture(admin_a.vendor_id, "00006"))
            .await
            .unwrap();
        assert!(
            Employee::find_by_email(&pool, &employee.email)
                .await
                .unwrap()
                .is_some()
        );

        // Same email under the other vendor still collides.
        let mut dup = employee_fixture(admin_b.vendor_id, "00007");
        dup.email = employee.email.clone();
        let err = Employee::create(&pool, &dup).await.unwrap_err();
        assert!(matches!(err, EmployeeError::DuplicateEmail));

        let mut dup = employee_fixture(admin_b.vendor_id, "00008");
        dup.whatsapp_number = employee.whatsapp_number.clone();
        let err = Employee::create(&pool, &dup).await.unwrap_err();
        assert!(matches!(err, EmployeeError::DuplicateWhatsapp));

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn partial_update_touches_only_supplied_fields() {
        let (pool, db_path) = setup_pool().await;

        let admin = Vendor::create(&pool, &admin_fixture("00009")).await.unwrap();
        let employee = Employee::create(&pool, &employee_fixture(admin.vendor_id, "00010"))
            .await
            .unwrap();

        let updated = Employee::update(
            &pool,
            employee.employee_id,
            &UpdateEmployee {
                designation: Some("Senior Engineer".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.designation, "Senior Engineer");
        assert_eq!(updated.email, employee.email);
        assert_eq!(updated.department, employee.department);
        assert!(updated.updated_at >= employee.updated_at);

        let reloaded = Employee::find_by_id(&pool, employee.employee_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.designation, "Senior Engineer");

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn email_change_rechecks_uniqueness() {
        let (pool, db_path) = setup_pool().await;

        let admin = Vendor::create(&pool, &admin_fixture("00011")).await.unwrap();
        let first = Employee::create(&pool, &employee_fixture(admin.vendor_id, "00012"))
            .await
            .unwrap();
        let second = Employee::create(&pool, &employee_fixture(admin.vendor_id, "00013"))
            .await
            .unwrap();

        let err = Employee::update(
            &pool,
            second.employee_id,
            &UpdateEmployee {
                email: Some(first.email.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EmployeeError::DuplicateEmail));

        // Re-submitting the current email is not a collision.
        let unchanged = Employee::update(
            &pool,
            second.employee_id,
            &UpdateEmployee {
                email: Some(second.email.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(unchanged.email, second.email);

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn update_of_missing_employee_is_not_found() {
        let (pool, db_path) = setup_pool().await;

        let err = Employee::update(&pool, 12345678, &UpdateEmployee::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EmployeeError::EmployeeNotFound));

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn delete_is_scoped_to_the_owning_vendor() {
        let (pool, db_path) = setup_pool().await;

        let admin_a = Vendor::create(&pool, &admin_fixture("00014")).await.unwrap();
        let admin_b = Vendor::create(&pool, &admin_fixture("00015")).await.unwrap();
        let employee = Employee::create(&pool, &employee_fixture(admin_a.vendor_id, "00016"))
            .await
            .unwrap();

        // Another tenant cannot delete it.
        let err = Employee::delete(&pool, admin_b.vendor_id, employee.employee_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EmployeeError::EmployeeNotFound));

        let deleted = Employee::delete(&pool, admin_a.vendor_id, employee.employee_id)
            .await
            .unwrap();
        assert_eq!(deleted.deleted_employee_id, employee.employee_id);
        assert_eq!(deleted.tasks_updated, 0);

        assert!(
            Employee::find_by_id(&pool, employee.employee_id)
                .await
                .unwrap()
                .is_none()
        );

        drop(pool);
        cleanup_db(db_path);
    }
}
