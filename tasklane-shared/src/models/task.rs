//! Task model and Kanban ordering
//!
//! Tasks live in one of four status columns of their project's board. Each
//! column is ordered by `position`, and every write that changes column
//! membership rewrites the affected columns so positions stay dense
//! (`0..n-1`).
//!
//! ```text
//! todo ──► in_progress ──► review ──► done
//!   ▲                                   │
//!   └───────────── reopen ──────────────┘
//! ```
//!
//! Any transition is allowed. Entering `done` stamps `completed_at`, leaving
//! it clears the stamp.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::double_option;

const COLUMNS: &str = "id, organization_id, project_id, assignee_id, reporter_id, title, \
                       description, status, priority, due_date, position, tags, completed_at, \
                       created_at, updated_at";

/// Kanban column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// Board column order
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,

    /// Zero-based index inside the status column
    pub position: i32,

    pub tags: Vec<String>,

    /// Set while the task is `done`
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub organization_id: Uuid,
    pub project_id: Uuid,
    pub reporter_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update. `assignee_id: null` unassigns the task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<Uuid>,
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, organization_id: Uuid, filter: &TaskFilter) {
    qb.push(" WHERE organization_id = ").push_bind(organization_id);

    if let Some(project_id) = filter.project_id {
        qb.push(" AND project_id = ").push_bind(project_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(assignee_id) = filter.assignee_id {
        qb.push(" AND assignee_id = ").push_bind(assignee_id);
    }
}

/// One Kanban column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardColumn {
    pub status: TaskStatus,
    pub tasks: Vec<Task>,
}

/// Groups tasks into the four status columns, each ordered by position.
pub fn group_into_board(mut tasks: Vec<Task>) -> Vec<BoardColumn> {
    tasks.sort_by_key(|t| (t.position, t.created_at));

    let mut columns: Vec<BoardColumn> = TaskStatus::ALL
        .iter()
        .map(|&status| BoardColumn {
            status,
            tasks: Vec::new(),
        })
        .collect();

    for task in tasks {
        if let Some(column) = columns.iter_mut().find(|c| c.status == task.status) {
            column.tasks.push(task);
        }
    }

    columns
}

/// Computes the new order of the affected columns when `task_id` moves to
/// `position`.
///
/// `source` is the current order of the task's column. `target` is the
/// destination column when it differs from the source. The position is
/// clamped to the destination's length. Returns the new source order and,
/// for cross-column moves, the new target order.
pub fn reorder(
    source: &[Uuid],
    target: Option<&[Uuid]>,
    task_id: Uuid,
    position: usize,
) -> (Vec<Uuid>, Option<Vec<Uuid>>) {
    let mut source: Vec<Uuid> = source.iter().copied().filter(|id| *id != task_id).collect();

    match target {
        None => {
            let at = position.min(source.len());
            source.insert(at, task_id);
            (source, None)
        }
        Some(target) => {
            let mut target: Vec<Uuid> =
                target.iter().copied().filter(|id| *id != task_id).collect();
            let at = position.min(target.len());
            target.insert(at, task_id);
            (source, Some(target))
        }
    }
}

/// `completed_at` value implied by a status transition. `None` means the
/// column keeps its current value.
fn completion_change(from: TaskStatus, to: TaskStatus) -> Option<Option<DateTime<Utc>>> {
    match (from == TaskStatus::Done, to == TaskStatus::Done) {
        (false, true) => Some(Some(Utc::now())),
        (true, false) => Some(None),
        _ => None,
    }
}

async fn column_ids(
    conn: &mut PgConnection,
    project_id: Uuid,
    status: TaskStatus,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM tasks WHERE project_id = $1 AND status = $2 ORDER BY position, created_at",
    )
    .bind(project_id)
    .bind(status)
    .fetch_all(conn)
    .await
}

async fn write_positions(conn: &mut PgConnection, order: &[Uuid]) -> Result<(), sqlx::Error> {
    if order.is_empty() {
        return Ok(());
    }

    let positions: Vec<i32> = (0..order.len() as i32).collect();

    sqlx::query(
        r#"
        UPDATE tasks SET position = data.position
        FROM UNNEST($1::uuid[], $2::int4[]) AS data(id, position)
        WHERE tasks.id = data.id AND tasks.position <> data.position
        "#,
    )
    .bind(order)
    .bind(positions)
    .execute(conn)
    .await?;

    Ok(())
}

/// Serializes board writes of one project
async fn lock_project(conn: &mut PgConnection, project_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT id FROM projects WHERE id = $1 FOR UPDATE")
        .bind(project_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn find_for_update(
    conn: &mut PgConnection,
    organization_id: Uuid,
    id: Uuid,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "SELECT {COLUMNS} FROM tasks WHERE id = $1 AND organization_id = $2 FOR UPDATE"
    ))
    .bind(id)
    .bind(organization_id)
    .fetch_optional(conn)
    .await
}

/// Moves a locked task between columns (or within one) and rewrites positions.
async fn relocate(
    conn: &mut PgConnection,
    task: &Task,
    status: TaskStatus,
    position: usize,
) -> Result<(), sqlx::Error> {
    let source = column_ids(conn, task.project_id, task.status).await?;

    if status == task.status {
        let (order, _) = reorder(&source, None, task.id, position);
        return write_positions(conn, &order).await;
    }

    let target = column_ids(conn, task.project_id, status).await?;
    let (source, target) = reorder(&source, Some(target.as_slice()), task.id, position);

    let completed_at = completion_change(task.status, status).unwrap_or(task.completed_at);

    sqlx::query("UPDATE tasks SET status = $2, completed_at = $3, updated_at = NOW() WHERE id = $1")
        .bind(task.id)
        .bind(status)
        .bind(completed_at)
        .execute(&mut *conn)
        .await?;

    write_positions(conn, &source).await?;
    if let Some(target) = target {
        write_positions(conn, &target).await?;
    }

    Ok(())
}

impl Task {
    /// Inserts a task at the end of its status column.
    pub async fn create(pool: &PgPool, data: CreateTask) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;
        lock_project(&mut tx, data.project_id).await?;

        let completed_at = (data.status == TaskStatus::Done).then(Utc::now);

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks
                (organization_id, project_id, reporter_id, assignee_id, title, description,
                 status, priority, due_date, tags, completed_at, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                (SELECT COUNT(*)::int4 FROM tasks WHERE project_id = $2 AND status = $7))
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.organization_id)
        .bind(data.project_id)
        .bind(data.reporter_id)
        .bind(data.assignee_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.due_date)
        .bind(data.tags)
        .bind(completed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    pub async fn find(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }

    /// Applies the provided fields. A status change appends the task to the
    /// end of the new column and closes the gap it left behind.
    pub async fn update(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(project_id) = sqlx::query_scalar::<_, Uuid>(
            "SELECT project_id FROM tasks WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        lock_project(&mut tx, project_id).await?;
        let Some(current) = find_for_update(&mut tx, organization_id, id).await? else {
            return Ok(None);
        };

        if let Some(status) = data.status.filter(|s| *s != current.status) {
            relocate(&mut tx, &current, status, usize::MAX).await?;
        }

        let mut query = String::from("UPDATE tasks SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.priority.is_some() {
            bind_count += 1;
            query.push_str(&format!(", priority = ${}", bind_count));
        }
        if data.assignee_id.is_some() {
            bind_count += 1;
            query.push_str(&format!(", assignee_id = ${}", bind_count));
        }
        if data.due_date.is_some() {
            bind_count += 1;
            query.push_str(&format!(", due_date = ${}", bind_count));
        }
        if data.tags.is_some() {
            bind_count += 1;
            query.push_str(&format!(", tags = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND organization_id = $2 RETURNING {COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(organization_id);

        if let Some(title) = data.title {
            q = q.bind(title);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(priority) = data.priority {
            q = q.bind(priority);
        }
        if let Some(assignee_id) = data.assignee_id {
            q = q.bind(assignee_id);
        }
        if let Some(due_date) = data.due_date {
            q = q.bind(due_date);
        }
        if let Some(tags) = data.tags {
            q = q.bind(tags);
        }

        let task = q.fetch_optional(&mut *tx).await?;
        tx.commit().await?;

        Ok(task)
    }

    /// Moves a task to `status` at `position` (clamped to the column length),
    /// shifting its siblings so both columns stay dense.
    pub async fn move_to(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
        status: TaskStatus,
        position: usize,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(project_id) = sqlx::query_scalar::<_, Uuid>(
            "SELECT project_id FROM tasks WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        lock_project(&mut tx, project_id).await?;
        let Some(current) = find_for_update(&mut tx, organization_id, id).await? else {
            return Ok(None);
        };

        relocate(&mut tx, &current, status, position).await?;

        let task = sqlx::query_as::<_, Task>(&format!("SELECT {COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(task))
    }

    /// Deletes a task and closes the gap in its column.
    pub async fn delete(pool: &PgPool, organization_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(project_id) = sqlx::query_scalar::<_, Uuid>(
            "SELECT project_id FROM tasks WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(false);
        };

        lock_project(&mut tx, project_id).await?;

        // Status and position are read under the project lock
        let Some(task) = sqlx::query_as::<_, Task>(&format!(
            "DELETE FROM tasks WHERE id = $1 AND organization_id = $2 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE tasks SET position = position - 1
            WHERE project_id = $1 AND status = $2 AND position > $3
            "#,
        )
        .bind(task.project_id)
        .bind(task.status)
        .bind(task.position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn list(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &TaskFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM tasks"));
        push_filter(&mut qb, organization_id, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<Task>().fetch_all(pool).await
    }

    pub async fn count(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM tasks");
        push_filter(&mut qb, organization_id, filter);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }

    /// Kanban board of one project
    pub async fn board(pool: &PgPool, project_id: Uuid) -> Result<Vec<BoardColumn>, sqlx::Error> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE project_id = $1 ORDER BY status, position"
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await?;

        Ok(group_into_board(tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn task(status: TaskStatus, position: i32) -> Task {
        Task {
            id: Uuid::new_v4(),
            organization_id: Uuid::nil(),
            project_id: Uuid::nil(),
            assignee_id: None,
            reporter_id: None,
            title: format!("{}-{}", status.as_str(), position),
            description: None,
            status,
            priority: TaskPriority::Medium,
            due_date: None,
            position,
            tags: vec![],
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_and_priority_strings() {
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(TaskPriority::Urgent.as_str(), "urgent");
        assert_eq!(TaskStatus::default(), TaskStatus::Todo);
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn test_reorder_within_column_down() {
        let col = ids(4);
        let (order, target) = reorder(&col, None, col[0], 2);
        assert!(target.is_none());
        assert_eq!(order, vec![col[1], col[2], col[0], col[3]]);
    }

    #[test]
    fn test_reorder_within_column_up() {
        let col = ids(4);
        let (order, _) = reorder(&col, None, col[3], 0);
        assert_eq!(order, vec![col[3], col[0], col[1], col[2]]);
    }

    #[test]
    fn test_reorder_across_columns_keeps_both_dense() {
        let todo = ids(3);
        let review = ids(2);

        let (source, target) = reorder(&todo, Some(review.as_slice()), todo[1], 1);
        let target = target.unwrap();

        assert_eq!(source, vec![todo[0], todo[2]]);
        assert_eq!(target, vec![review[0], todo[1], review[1]]);
        assert_eq!(source.len() + target.len(), 5);
    }

    #[test]
    fn test_reorder_clamps_position() {
        let todo = ids(2);
        let done = ids(1);

        let (_, target) = reorder(&todo, Some(done.as_slice()), todo[0], 99);
        assert_eq!(target.unwrap(), vec![done[0], todo[0]]);

        let (order, _) = reorder(&todo, None, todo[0], usize::MAX);
        assert_eq!(order, vec![todo[1], todo[0]]);
    }

    #[test]
    fn test_reorder_into_empty_column() {
        let todo = ids(1);
        let (source, target) = reorder(&todo, Some(&[][..]), todo[0], 5);
        assert!(source.is_empty());
        assert_eq!(target.unwrap(), vec![todo[0]]);
    }

    #[test]
    fn test_completion_change() {
        assert!(matches!(
            completion_change(TaskStatus::Review, TaskStatus::Done),
            Some(Some(_))
        ));
        assert_eq!(completion_change(TaskStatus::Done, TaskStatus::Todo), Some(None));
        assert_eq!(completion_change(TaskStatus::Todo, TaskStatus::Review), None);
        assert_eq!(completion_change(TaskStatus::Done, TaskStatus::Done), None);
    }

    #[test]
    fn test_group_into_board() {
        let tasks = vec![
            task(TaskStatus::Done, 0),
            task(TaskStatus::Todo, 1),
            task(TaskStatus::Todo, 0),
            task(TaskStatus::Review, 0),
        ];

        let board = group_into_board(tasks);
        let statuses: Vec<_> = board.iter().map(|c| c.status).collect();
        assert_eq!(statuses, TaskStatus::ALL.to_vec());

        assert_eq!(board[0].tasks.len(), 2);
        assert_eq!(board[0].tasks[0].position, 0);
        assert_eq!(board[0].tasks[1].position, 1);
        assert!(board[1].tasks.is_empty());
        assert_eq!(board[2].tasks.len(), 1);
        assert_eq!(board[3].tasks.len(), 1);
    }

    #[test]
    fn test_update_assignee_null_clears() {
        let update: UpdateTask = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(update.assignee_id, Some(None));

        let update: UpdateTask = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(update.assignee_id, None);
    }
}
