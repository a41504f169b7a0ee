use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use thiserror::Error;
use ts_rs::TS;

use crate::{
    models::{
        ALLOCATION_RETRY_LIMIT,
        employee::{Employee, Principal},
        sequence::{self, SequenceError},
        unique_violation,
        vendor::Vendor,
    },
    retry::{MaybeBusy, retry_on_sqlite_busy},
    types::{TaskCategory, TaskDisplayStatus, TaskPriority, TaskStatus},
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("Invalid Vendor ID. No such vendor exists")]
    VendorNotFound,
    #[error("Task not found for this vendor")]
    TaskNotFound,
    #[error("Assigned employee {0} does not exist for this vendor")]
    UnknownAssignee(i64),
    #[error("{0}")]
    ValidationError(String),
    #[error("Only a vendor admin can change a task's due date")]
    Unauthorized,
    #[error("Identifier allocation conflicted; the task creation is safe to retry")]
    AllocationConflict,
}

impl MaybeBusy for TaskError {
    fn is_sqlite_busy(&self) -> bool {
        match self {
            TaskError::Database(err) => err.is_sqlite_busy(),
            TaskError::Sequence(SequenceError::Database(err)) => err.is_sqlite_busy(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Task {
    /// Composite human-readable id: `T{vendorId}{seq:05}`, unique globally;
    /// the numeric suffix is unique within the vendor's namespace.
    pub task_id: String,
    pub vendor_id: i64,
    pub title: String,
    pub description: String,
    pub assigned_by: i64,
    /// Insertion order is display order; membership is what matters.
    pub assigned_to: Vec<i64>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub attachment: Option<String>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct TaskRow {
    task_id: String,
    vendor_id: i64,
    title: String,
    description: String,
    assigned_by: i64,
    assigned_to: String,
    category: TaskCategory,
    priority: TaskPriority,
    due_date: NaiveDate,
    status: TaskStatus,
    attachment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, sqlx::Error> {
        let assigned_to =
            serde_json::from_str(&self.assigned_to).map_err(|err| sqlx::Error::ColumnDecode {
                index: "assigned_to".to_string(),
                source: Box::new(err),
            })?;
        Ok(Task {
            task_id: self.task_id,
            vendor_id: self.vendor_id,
            title: self.title,
            description: self.description,
            assigned_by: self.assigned_by,
            assigned_to,
            category: self.category,
            priority: self.priority,
            due_date: self.due_date,
            status: self.status,
            attachment: self.attachment,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Read projection: the task joined with employee names plus the derived
/// display status.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TaskWithAssignees {
    #[serde(flatten)]
    #[ts(flatten)]
    pub task: Task,
    pub assigned_by_name: Option<String>,
    pub assigned_to_names: Vec<String>,
    pub display_status: TaskDisplayStatus,
}

impl std::ops::Deref for TaskWithAssignees {
    type Target = Task;
    fn deref(&self) -> &Self::Target {
        &self.task
    }
}

impl TaskWithAssignees {
    fn project(task: Task, names: &HashMap<i64, String>, today: NaiveDate) -> Self {
        let assigned_by_name = names.get(&task.assigned_by).cloned();
        let assigned_to_names = task
            .assigned_to
            .iter()
            .map(|id| names.get(id).cloned().unwrap_or_else(|| "Unknown".to_string()))
            .collect();
        let display_status = TaskDisplayStatus::derive(task.status, task.due_date, today);
        Self {
            task,
            assigned_by_name,
            assigned_to_names,
            display_status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateTask {
    pub vendor_id: i64,
    pub title: String,
    pub description: String,
    pub assigned_by: i64,
    pub assigned_to: Vec<i64>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub due_date: NaiveDate,
    pub attachment: Option<String>,
}

/// Partial update; a supplied `assigned_to` REPLACES the prior set, a
/// supplied `due_date` requires an admin actor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<Vec<i64>>,
    pub category: Option<TaskCategory>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
    pub attachment: Option<String>,
}

const SELECT_COLUMNS: &str = "SELECT task_id, vendor_id, title, description, assigned_by,
        assigned_to, category, priority, due_date, status, attachment,
        created_at, updated_at
 FROM tasks";

pub(crate) fn format_task_id(vendor_id: i64, seq: i64) -> String {
    format!("T{vendor_id}{seq:05}")
}

fn encode_assignees(ids: &[i64]) -> Result<String, TaskError> {
    serde_json::to_string(ids).map_err(|err| TaskError::ValidationError(err.to_string()))
}

/// Order-preserving dedup; assignee lists are sets for membership but keep
/// their insertion order for display.
fn dedup_assignees(ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

async fn ensure_assignees_exist(
    pool: &SqlitePool,
    vendor_id: i64,
    ids: &[i64],
) -> Result<(), TaskError> {
    let missing = Employee::missing_in_vendor(pool, vendor_id, ids).await?;
    if let Some(first) = missing.first() {
        return Err(TaskError::UnknownAssignee(*first));
    }
    Ok(())
}

impl Task {
    pub async fn create(pool: &SqlitePool, data: &CreateTask) -> Result<Task, TaskError> {
        if !Vendor::exists(pool, data.vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }

        let assigned_to = dedup_assignees(&data.assigned_to);
        if assigned_to.is_empty() {
            return Err(TaskError::ValidationError(
                "assignedTo must name at least one employee".to_string(),
            ));
        }

        let mut referenced = assigned_to.clone();
        if !referenced.contains(&data.assigned_by) {
            referenced.push(data.assigned_by);
        }
        ensure_assignees_exist(pool, data.vendor_id, &referenced).await?;

        let mut attempt = 0;
        loop {
            match retry_on_sqlite_busy(|| Self::try_insert(pool, data, &assigned_to)).await {
                Err(TaskError::AllocationConflict) if attempt + 1 < ALLOCATION_RETRY_LIMIT => {
                    attempt += 1;
                    tracing::warn!(
                        vendor_id = data.vendor_id,
                        attempt,
                        "Task id allocation conflicted, re-allocating"
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_insert(
        pool: &SqlitePool,
        data: &CreateTask,
        assigned_to: &[i64],
    ) -> Result<Task, TaskError> {
        let now = Utc::now();
        let assigned_to_json = encode_assignees(assigned_to)?;

        let mut tx = pool.begin().await?;
        let seq = sequence::next_task_seq(&mut tx, data.vendor_id)
            .await
            .map_err(|err| match err {
                SequenceError::InvalidNamespace(_) => TaskError::VendorNotFound,
                other => other.into(),
            })?;
        let task_id = format_task_id(data.vendor_id, seq);

        sqlx::query(
            "INSERT INTO tasks (task_id, vendor_id, seq, title, description, assigned_by,
                                assigned_to, category, priority, due_date, status,
                                attachment, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(&task_id)
        .bind(data.vendor_id)
        .bind(seq)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.assigned_by)
        .bind(&assigned_to_json)
        .bind(data.category)
        .bind(data.priority)
        .bind(data.due_date)
        .bind(TaskStatus::Pending)
        .bind(&data.attachment)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if let Some(target) = unique_violation(&err) {
                if target == "tasks.task_id" || target == "tasks.vendor_id, tasks.seq" {
                    return TaskError::AllocationConflict;
                }
            }
            TaskError::Database(err)
        })?;
        tx.commit().await?;

        Ok(Task {
            task_id,
            vendor_id: data.vendor_id,
            title: data.title.clone(),
            description: data.description.clone(),
            assigned_by: data.assigned_by,
            assigned_to: assigned_to.to_vec(),
            category: data.category,
            priority: data.priority,
            due_date: data.due_date,
            status: TaskStatus::Pending,
            attachment: data.attachment.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Partial update and reassignment. A supplied assignee set is validated
    /// exactly like at creation and replaces the old set; status moves are
    /// forward-only; a due-date change requires an admin of the task's
    /// vendor.
    pub async fn update(
        pool: &SqlitePool,
        vendor_id: i64,
        task_id: &str,
        updates: &UpdateTask,
        actor: Option<&Principal>,
    ) -> Result<Task, TaskError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }
        let Some(existing) = Self::find_by_task_id(pool, vendor_id, task_id).await? else {
            return Err(TaskError::TaskNotFound);
        };

        if updates.due_date.is_some() && !actor.is_some_and(|p| p.is_admin_of(vendor_id)) {
            return Err(TaskError::Unauthorized);
        }

        if let Some(next_status) = updates.status {
            if !existing.status.can_transition_to(next_status) {
                return Err(TaskError::ValidationError(format!(
                    "Cannot move task from {} back to {}",
                    existing.status, next_status
                )));
            }
        }

        let assigned_to = match &updates.assigned_to {
            Some(ids) => {
                let deduped = dedup_assignees(ids);
                if deduped.is_empty() {
                    return Err(TaskError::ValidationError(
                        "assignedTo must name at least one employee".to_string(),
                    ));
                }
                ensure_assignees_exist(pool, vendor_id, &deduped).await?;
                deduped
            }
            None => existing.assigned_to.clone(),
        };

        let mut next = existing;
        next.assigned_to = assigned_to;
        if let Some(title) = &updates.title {
            next.title = title.clone();
        }
        if let Some(description) = &updates.description {
            next.description = description.clone();
        }
        if let Some(category) = updates.category {
            next.category = category;
        }
        if let Some(priority) = updates.priority {
            next.priority = priority;
        }
        if let Some(due_date) = updates.due_date {
            next.due_date = due_date;
        }
        if let Some(status) = updates.status {
            next.status = status;
        }
        if let Some(attachment) = &updates.attachment {
            next.attachment = Some(attachment.clone());
        }
        next.updated_at = Utc::now();

        let assigned_to_json = encode_assignees(&next.assigned_to)?;
        retry_on_sqlite_busy(|| async {
            let result = sqlx::query(
                "UPDATE tasks
                 SET title = $1, description = $2, assigned_to = $3, category = $4,
                     priority = $5, due_date = $6, status = $7, attachment = $8,
                     updated_at = $9
                 WHERE vendor_id = $10 AND task_id = $11",
            )
            .bind(&next.title)
            .bind(&next.description)
            .bind(&assigned_to_json)
            .bind(next.category)
            .bind(next.priority)
            .bind(next.due_date)
            .bind(next.status)
            .bind(&next.attachment)
            .bind(next.updated_at)
            .bind(vendor_id)
            .bind(task_id)
            .execute(pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(TaskError::TaskNotFound);
            }
            Ok(())
        })
        .await?;

        Ok(next)
    }

    pub async fn find_by_task_id(
        pool: &SqlitePool,
        vendor_id: i64,
        task_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_COLUMNS} WHERE vendor_id = $1 AND task_id = $2"
        ))
        .bind(vendor_id)
        .bind(task_id)
        .fetch_optional(pool)
        .await?;
        row.map(TaskRow::into_task).transpose()
    }

    pub async fn find_by_vendor(pool: &SqlitePool, vendor_id: i64) -> Result<Vec<Task>, TaskError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_COLUMNS} WHERE vendor_id = $1 ORDER BY seq"
        ))
        .bind(vendor_id)
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(TaskRow::into_task)
            .collect::<Result<_, _>>()?)
    }

    pub async fn find_by_assigned_by(
        pool: &SqlitePool,
        vendor_id: i64,
        employee_id: i64,
    ) -> Result<Vec<Task>, TaskError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_COLUMNS} WHERE vendor_id = $1 AND assigned_by = $2 ORDER BY seq"
        ))
        .bind(vendor_id)
        .bind(employee_id)
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(TaskRow::into_task)
            .collect::<Result<_, _>>()?)
    }

    pub async fn find_by_assigned_to(
        pool: &SqlitePool,
        vendor_id: i64,
        employee_id: i64,
    ) -> Result<Vec<Task>, TaskError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_COLUMNS} WHERE vendor_id = $1
               AND EXISTS (SELECT 1 FROM json_each(tasks.assigned_to) WHERE value = $2)
             ORDER BY seq"
        ))
        .bind(vendor_id)
        .bind(employee_id)
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(TaskRow::into_task)
            .collect::<Result<_, _>>()?)
    }

    /// Joins tasks with the vendor's employee names and derives the display
    /// status. Names of since-deleted employees resolve to `None`/"Unknown".
    pub async fn with_assignees(
        pool: &SqlitePool,
        vendor_id: i64,
        tasks: Vec<Task>,
    ) -> Result<Vec<TaskWithAssignees>, sqlx::Error> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT employee_id, first_name, last_name FROM employees WHERE vendor_id = $1",
        )
        .bind(vendor_id)
        .fetch_all(pool)
        .await?;
        let names: HashMap<i64, String> = rows
            .into_iter()
            .map(|(id, first, last)| (id, format!("{first} {last}")))
            .collect();
        let today = Utc::now().date_naive();
        Ok(tasks
            .into_iter()
            .map(|task| TaskWithAssignees::project(task, &names, today))
            .collect())
    }

    /// Single-task read projection behind the vendor gate.
    pub async fn find_with_assignees(
        pool: &SqlitePool,
        vendor_id: i64,
        task_id: &str,
    ) -> Result<Option<TaskWithAssignees>, TaskError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }
        let Some(task) = Self::find_by_task_id(pool, vendor_id, task_id).await? else {
            return Ok(None);
        };
        let mut projected = Self::with_assignees(pool, vendor_id, vec![task]).await?;
        Ok(projected.pop())
    }

    /// Pulls the employee out of every assignee list for the vendor. Keeps
    /// the task even when the list becomes empty.
    pub(crate) async fn pull_assignee(
        conn: &mut SqliteConnection,
        vendor_id: i64,
        employee_id: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks
             SET assigned_to = (
                     SELECT json_group_array(value)
                     FROM json_each(tasks.assigned_to)
                     WHERE value <> $2
                 ),
                 updated_at = $3
             WHERE vendor_id = $1
               AND EXISTS (SELECT 1 FROM json_each(tasks.assigned_to) WHERE value = $2)",
        )
        .bind(vendor_id)
        .bind(employee_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn remove_assignee(
        pool: &SqlitePool,
        vendor_id: i64,
        employee_id: i64,
    ) -> Result<u64, TaskError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }
        let mut conn = pool.acquire().await?;
        let updated = Self::pull_assignee(&mut conn, vendor_id, employee_id).await?;
        Ok(updated)
    }

    pub async fn delete_by_task_id(
        pool: &SqlitePool,
        vendor_id: i64,
        task_id: &str,
    ) -> Result<(), TaskError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }
        let result = sqlx::query("DELETE FROM tasks WHERE vendor_id = $1 AND task_id = $2")
            .bind(vendor_id)
            .bind(task_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TaskError::TaskNotFound);
        }
        Ok(())
    }

    pub async fn delete_all_by_vendor(pool: &SqlitePool, vendor_id: i64) -> Result<u64, TaskError> {
        if !Vendor::exists(pool, vendor_id).await? {
            return Err(TaskError::VendorNotFound);
        }
        let result = sqlx::query("DELETE FROM tasks WHERE vendor_id = $1")
            .bind(vendor_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            employee::CreateEmployee,
            vendor::{CreateAdmin, Vendor},
        },
        test_support::{cleanup_db, setup_pool},
        types::Role,
    };

    fn admin_fixture(tag: &str) -> CreateAdmin {
        CreateAdmin {
            first_name: "Noor".to_string(),
            last_name: "Khan".to_string(),
            email: format!("task-admin-{tag}@example.com"),
            whatsapp_number: format!("50000{tag:0>5}"),
            department: "Management".to_string(),
            designation: "Owner".to_string(),
            employee_code: format!("TADM-{tag}"),
            active_status: "active".to_string(),
        }
    }

    fn employee_fixture(vendor_id: i64, tag: &str) -> CreateEmployee {
        CreateEmployee {
            vendor_id,
            first_name: "Sam".to_string(),
            last_name: "Joshi".to_string(),
            email: format!("task-emp-{tag}@example.com"),
            whatsapp_number: format!("40000{tag:0>5}"),
            department: "IT".to_string(),
            designation: "Engineer".to_string(),
            employee_code: format!("TEMP-{tag}"),
            active_status: "active".to_string(),
        }
    }

    fn task_fixture(vendor_id: i64, assigned_by: i64, assigned_to: Vec<i64>) -> CreateTask {
        CreateTask {
            vendor_id,
            title: "Ship the release".to_string(),
            description: "Cut, tag, publish".to_string(),
            assigned_by,
            assigned_to,
            category: TaskCategory::IT,
            priority: TaskPriority::Medium,
            due_date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            attachment: None,
        }
    }

    async fn setup_tenant(
        pool: &SqlitePool,
        tag: &str,
    ) -> (Employee, Employee, Employee) {
        let admin = Vendor::create(pool, &admin_fixture(tag)).await.unwrap();
        let first = crate::models::employee::Employee::create(
            pool,
            &employee_fixture(admin.vendor_id, &format!("{tag}a")),
        )
        .await
        .unwrap();
        let second = crate::models::employee::Employee::create(
            pool,
            &employee_fixture(admin.vendor_id, &format!("{tag}b")),
        )
        .await
        .unwrap();
        (admin, first, second)
    }

    #[tokio::test]
    async fn task_ids_are_composite_and_sequential_per_vendor() {
        let (pool, db_path) = setup_pool().await;
        let (admin, emp, _) = setup_tenant(&pool, "001").await;

        let first = Task::create(
            &pool,
            &task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]),
        )
        .await
        .unwrap();
        let second = Task::create(
            &pool,
            &task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]),
        )
        .await
        .unwrap();

        assert_eq!(first.task_id, "T100100001");
        assert_eq!(second.task_id, "T100100002");
        assert_eq!(first.status, TaskStatus::Pending);

        // A second tenant starts its own sequence.
        let (admin_b, emp_b, _) = setup_tenant(&pool, "002").await;
        let other = Task::create(
            &pool,
            &task_fixture(admin_b.vendor_id, admin_b.employee_id, vec![emp_b.employee_id]),
        )
        .await
        .unwrap();
        assert_eq!(other.task_id, "T100200001");

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn concurrent_creations_for_one_vendor_get_distinct_ids() {
        let (pool, db_path) = setup_pool().await;
        let (admin, emp, _) = setup_tenant(&pool, "003").await;

        let a = {
            let pool = pool.clone();
            let data = task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]);
            tokio::spawn(async move { Task::create(&pool, &data).await.unwrap().task_id })
        };
        let b = {
            let pool = pool.clone();
            let data = task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]);
            tokio::spawn(async move { Task::create(&pool, &data).await.unwrap().task_id })
        };

        let (id_a, id_b) = (a.await.unwrap(), b.await.unwrap());
        assert_ne!(id_a, id_b);
        let mut ids = vec![id_a, id_b];
        ids.sort();
        assert_eq!(ids, vec!["T100100001", "T100100002"]);

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn unknown_assignee_persists_nothing() {
        let (pool, db_path) = setup_pool().await;
        let (admin, _, _) = setup_tenant(&pool, "004").await;

        let err = Task::create(
            &pool,
            &task_fixture(admin.vendor_id, admin.employee_id, vec![99999999]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::UnknownAssignee(99999999)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn assignees_must_belong_to_the_same_vendor() {
        let (pool, db_path) = setup_pool().await;
        let (admin_a, _, _) = setup_tenant(&pool, "005").await;
        let (_, emp_b, _) = setup_tenant(&pool, "006").await;

        // emp_b exists, but under another tenant.
        let err = Task::create(
            &pool,
            &task_fixture(admin_a.vendor_id, admin_a.employee_id, vec![emp_b.employee_id]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::UnknownAssignee(_)));

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn reassignment_replaces_the_assignee_set() {
        let (pool, db_path) = setup_pool().await;
        let (admin, first, second) = setup_tenant(&pool, "007").await;

        let task = Task::create(
            &pool,
            &task_fixture(admin.vendor_id, admin.employee_id, vec![first.employee_id]),
        )
        .await
        .unwrap();

        let updated = Task::update(
            &pool,
            admin.vendor_id,
            &task.task_id,
            &UpdateTask {
                assigned_to: Some(vec![second.employee_id]),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

        assert_eq!(updated.assigned_to, vec![second.employee_id]);
        assert!(updated.updated_at >= task.updated_at);

        let reloaded = Task::find_by_task_id(&pool, admin.vendor_id, &task.task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.assigned_to, vec![second.employee_id]);

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn status_cannot_move_backwards() {
        let (pool, db_path) = setup_pool().await;
        let (admin, emp, _) = setup_tenant(&pool, "008").await;

        let task = Task::create(
            &pool,
            &task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]),
        )
        .await
        .unwrap();

        let updated = Task::update(
            &pool,
            admin.vendor_id,
            &task.task_id,
            &UpdateTask {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);

        let err = Task::update(
            &pool,
            admin.vendor_id,
            &task.task_id,
            &UpdateTask {
                status: Some(TaskStatus::Pending),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::ValidationError(_)));

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn due_date_change_is_admin_only() {
        let (pool, db_path) = setup_pool().await;
        let (admin, emp, _) = setup_tenant(&pool, "009").await;

        let task = Task::create(
            &pool,
            &task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]),
        )
        .await
        .unwrap();

        let new_due = NaiveDate::from_ymd_opt(2031, 1, 1).unwrap();
        let updates = UpdateTask {
            due_date: Some(new_due),
            ..Default::default()
        };

        // No principal at all.
        let err = Task::update(&pool, admin.vendor_id, &task.task_id, &updates, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Unauthorized));

        // A regular employee of the vendor.
        let employee_principal = Principal {
            employee_id: emp.employee_id,
            vendor_id: emp.vendor_id,
            role: Role::Employee,
        };
        let err = Task::update(
            &pool,
            admin.vendor_id,
            &task.task_id,
            &updates,
            Some(&employee_principal),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::Unauthorized));

        // An admin of a different vendor.
        let foreign_admin = Principal {
            employee_id: 10990001,
            vendor_id: 1099,
            role: Role::Admin,
        };
        let err = Task::update(
            &pool,
            admin.vendor_id,
            &task.task_id,
            &updates,
            Some(&foreign_admin),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::Unauthorized));

        // The vendor's own admin.
        let admin_principal = Principal::from(&admin);
        let updated = Task::update(
            &pool,
            admin.vendor_id,
            &task.task_id,
            &updates,
            Some(&admin_principal),
        )
        .await
        .unwrap();
        assert_eq!(updated.due_date, new_due);
        assert!(updated.updated_at > task.updated_at);

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn removing_an_assignee_keeps_the_task() {
        let (pool, db_path) = setup_pool().await;
        let (admin, first, second) = setup_tenant(&pool, "010").await;

        let solo = Task::create(
            &pool,
            &task_fixture(admin.vendor_id, admin.employee_id, vec![first.employee_id]),
        )
        .await
        .unwrap();
        let shared = Task::create(
            &pool,
            &task_fixture(
                admin.vendor_id,
                admin.employee_id,
                vec![first.employee_id, second.employee_id],
            ),
        )
        .await
        .unwrap();

        let updated = Task::remove_assignee(&pool, admin.vendor_id, first.employee_id)
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let solo = Task::find_by_task_id(&pool, admin.vendor_id, &solo.task_id)
            .await
            .unwrap()
            .unwrap();
        assert!(solo.assigned_to.is_empty());

        let shared = Task::find_by_task_id(&pool, admin.vendor_id, &shared.task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shared.assigned_to, vec![second.employee_id]);

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn projections_scope_by_vendor_and_derive_overdue() {
        let (pool, db_path) = setup_pool().await;
        let (admin, emp, _) = setup_tenant(&pool, "011").await;
        let (admin_b, emp_b, _) = setup_tenant(&pool, "012").await;

        let mut overdue = task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]);
        overdue.due_date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        Task::create(&pool, &overdue).await.unwrap();
        Task::create(
            &pool,
            &task_fixture(admin_b.vendor_id, admin_b.employee_id, vec![emp_b.employee_id]),
        )
        .await
        .unwrap();

        let tasks = Task::find_by_vendor(&pool, admin.vendor_id).await.unwrap();
        assert_eq!(tasks.len(), 1);

        let projected = Task::with_assignees(&pool, admin.vendor_id, tasks)
            .await
            .unwrap();
        assert_eq!(projected[0].display_status, TaskDisplayStatus::Overdue);
        assert_eq!(projected[0].status, TaskStatus::Pending);
        assert_eq!(
            projected[0].assigned_by_name.as_deref(),
            Some("Noor Khan")
        );
        assert_eq!(projected[0].assigned_to_names, vec!["Sam Joshi".to_string()]);

        let by_assignee = Task::find_by_assigned_to(&pool, admin.vendor_id, emp.employee_id)
            .await
            .unwrap();
        assert_eq!(by_assignee.len(), 1);
        let none = Task::find_by_assigned_to(&pool, admin.vendor_id, emp_b.employee_id)
            .await
            .unwrap();
        assert!(none.is_empty());

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn delete_is_scoped_to_the_vendor() {
        let (pool, db_path) = setup_pool().await;
        let (admin, emp, _) = setup_tenant(&pool, "013").await;
        let (admin_b, _, _) = setup_tenant(&pool, "014").await;

        let task = Task::create(
            &pool,
            &task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]),
        )
        .await
        .unwrap();

        let err = Task::delete_by_task_id(&pool, admin_b.vendor_id, &task.task_id)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::TaskNotFound));

        Task::delete_by_task_id(&pool, admin.vendor_id, &task.task_id)
            .await
            .unwrap();
        assert!(
            Task::find_by_task_id(&pool, admin.vendor_id, &task.task_id)
                .await
                .unwrap()
                .is_none()
        );

        drop(pool);
        cleanup_db(db_path);
    }

    #[tokio::test]
    async fn bulk_delete_reports_the_count() {
        let (pool, db_path) = setup_pool().await;
        let (admin, emp, _) = setup_tenant(&pool, "015").await;

        for _ in 0..3 {
            Task::create(
                &pool,
                &task_fixture(admin.vendor_id, admin.employee_id, vec![emp.employee_id]),
            )
            .await
            .unwrap();
        }

        let deleted = Task::delete_all_by_vendor(&pool, admin.vendor_id)
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        assert!(
            Task::find_by_vendor(&pool, admin.vendor_id)
                .await
                .unwrap()
                .is_empty()
        );

        drop(pool);
        cleanup_db(db_path);
    }
}
