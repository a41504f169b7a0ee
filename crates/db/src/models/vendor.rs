use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;

use crate::{
    models::{
        ALLOCATION_RETRY_LIMIT,
        employee::{self, CreateEmployee, Employee, IdentityConflict},
        sequence::{self, SequenceError},
        unique_violation,
    },
    retry::{MaybeBusy, retry_on_sqlite_busy},
    types::Role,
};

#[derive(Debug, Error)]
pub enum VendorError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("Invalid Vendor ID. No such vendor exists")]
    VendorNotFound,
    #[error("Email already exists")]
    DuplicateEmail,
    #[error("WhatsApp number already exists")]
    DuplicateWhatsapp,
    #[error("Identifier allocation conflicted; the registration is safe to retry")]
    AllocationConflict,
}

impl MaybeBusy for VendorError {
    fn is_sqlite_busy(&self) -> bool {
        match self {
            VendorError::Database(err) => err.is_sqlite_busy(),
            VendorError::Sequence(SequenceError::Database(err)) => err.is_sqlite_busy(),
            _ => false,
        }
    }
}

/// Tenant directory row. The admin's personal fields live on their employee
/// record; this row pins the tenant's identity and its admin.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Vendor {
    pub vendor_id: i64,
    pub admin_employee_id: i64,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateAdmin {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub whatsapp_number: String,
    pub department: String,
    pub designation: String,
    pub employee_code: String,
    pub active_status: String,
}

impl CreateAdmin {
    fn as_employee(&self, vendor_id: i64) -> CreateEmployee {
        CreateEmployee {
            vendor_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            whatsapp_number: self.whatsapp_number.clone(),
            department: self.department.clone(),
            designation: self.designation.clone(),
            employee_code: self.employee_code.clone(),
            active_status: self.active_status.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorDeleted {
    pub vendor_id: i64,
    pub deleted_employees: u64,
    pub deleted_tasks: u64,
}

impl Vendor {
    /// The tenant-isolation gate: every employee- and task-scoped operation
    /// resolves the vendor here first.
    pub async fn exists(pool: &SqlitePool, vendor_id: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM vendors WHERE vendor_id = $1")
            .bind(vendor_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        vendor_id: i64,
    ) -> Result<Option<Vendor>, sqlx::Error> {
        sqlx::query_as::<_, Vendor>(
            "SELECT vendor_id, admin_employee_id, created_at, updated_at
             FROM vendors WHERE vendor_id = $1",
        )
        .bind(vendor_id)
        .fetch_optional(pool)
        .await
    }

    /// Registers a tenant: allocates the vendor id and the admin's employee
    /// id, then writes the vendor row and the admin employee record in one
    /// transaction. An admin record never exists without its vendor row, and
    /// vice versa.
    pub async fn create(pool: &SqlitePool, data: &CreateAdmin) -> Result<Employee, VendorError> {
        match employee::identity_conflict(pool, &data.email, &data.whatsapp_number, None).await? {
            Some(IdentityConflict::Email) => return Err(VendorError::DuplicateEmail),
            Some(IdentityConflict::Whatsapp) => return Err(VendorError::DuplicateWhatsapp),
            None => {}
        }

        let mut attempt = 0;
        loop {
            match retry_on_sqlite_busy(|| Self::try_create(pool, data)).await {
                Err(VendorError::AllocationConflict) if attempt + 1 < ALLOCATION_RETRY_LIMIT => {
                    attempt += 1;
                    tracing::warn!(attempt, "Vendor id allocation conflicted, re-allocating");
                }
                other => return other,
            }
        }
    }

    async fn try_create(pool: &SqlitePool, data: &CreateAdmin) -> Result<Employee, VendorError> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let vendor_id = sequence::next_vendor_id(&mut tx).await?;
        // Raw counter reservation: the vendors row only lands later in this
        // same transaction, so the vendor-checked allocator would refuse the
        // namespace. A fresh vendor id means a fresh namespace, so this is
        // always the admin slot.
        let admin_employee_id = sequence::reserve(
            &mut tx,
            &sequence::employee_namespace(vendor_id),
            sequence::employee_id_base(vendor_id) + 1,
        )
        .await?;

        sqlx::query(
            "INSERT INTO vendors (vendor_id, admin_employee_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(vendor_id)
        .bind(admin_employee_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if unique_violation(&err).is_some_and(|t| t == "vendors.vendor_id") {
                VendorError::AllocationConflict
            } else {
                VendorError::Database(err)
            }
        })?;

        let admin = data.as_employee(vendor_id);
        employee::insert_row(&mut tx, admin_employee_id, Role::Admin, &admin, now)
            .await
            .map_err(|err| {
                if let Some(target) = unique_violation(&err) {
                    return match target.as_str() {
                        "employees.email" => VendorError::DuplicateEmail,
                        "employees.whatsapp_number" => VendorError::DuplicateWhatsapp,
                        "employees.employee_id" => VendorError::AllocationConflict,
                        _ => VendorError::Database(err),
                    };
                }
                VendorError::Database(err)
            })?;

        tx.commit().await?;

        Ok(Employee {
            employee_id: admin_employee_id,
            vendor_id,
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            email: data.email.clone(),
            whatsapp_number: data.whatsapp_number.clone(),
            role: Role::Admin,
            department: data.department.clone(),
            designation: data.designation.clone(),
            employee_code: data.employee_code.clone(),
            active_status: data.active_status.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Cascade delete of a tenant: tasks, employees, the vendor row and the
    /// vendor's counter rows go in one transaction. The global vendor
    /// counter is never reset, so the id is never reused.
    pub async fn delete(pool: &SqlitePool, vendor_id: i64) -> Result<VendorDeleted, VendorError> {
        retry_on_sqlite_busy(|| Self::try_delete(pool, vendor_id)).await
    }

    async fn try_delete(pool: &SqlitePool, vendor_id: i64) -> Result<VendorDeleted, VendorError> {
        let mut tx = pool.begin().await?;

        let deleted_tasks = sqlx::query("DELETE FROM tasks WHERE vendor_id = $1")
            .bind(vendor_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let deleted_employees = sqlx::query("DELETE FROM employees WHERE vendor_id = $1")
            .bind(vendor_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let deleted_vendor = sqlx::query("DELETE FROM vendors WHERE vendor_id = $1")
            .bind(vendor_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted_vendor == 0 {
            return Err(VendorError::VendorNotFound);
        }
        sqlx::query("DELETE FROM sequences WHERE namespace IN ($1, $2)")
            .bind(sequence::employee_namespace(vendor_id))
            .bind(sequence::task_namespace(vendor_id))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(vendor_id, deleted_employees, deleted_tasks, "Deleted vendor");

        Ok(VendorDeleted {
            vendor_id,
            deleted_employees,
            deleted_tasks,
        })
    }
}
