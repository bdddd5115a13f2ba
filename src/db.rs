use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::model::{now_ts, Dept, NewTask, Role, Task, TaskStatus, User};

pub type DbResult<T> = Result<T, sqlx::Error>;

const LIST_LIMIT: i64 = 200;
const REMIND_LIMIT: i64 = 300;

const TASK_SELECT: &str = "SELECT t.id, COALESCE(t.title, '') AS title, t.dept, t.assignee_chat_id, \
     u.username AS assignee_username, t.due_ts, t.due_text, \
     COALESCE(t.status, 'assigned') AS status, t.created_ts, t.created_by, t.ack_ts, t.ack_by, \
     t.archived_ts, t.deleted_ts, t.reason_text, t.reason_ts, t.done_ts \
     FROM tasks t LEFT JOIN users u ON u.chat_id = t.assignee_chat_id";

const PENDING_FILTER: &str = "t.status IN ('assigned', 'in_progress', 'late')";

/// Columns added after the first release. Older databases get them on open.
const TASK_COLUMNS: [(&str, &str); 15] = [
    ("dept", "TEXT"),
    ("assignee_chat_id", "INTEGER"),
    ("due_ts", "INTEGER"),
    ("due_text", "TEXT"),
    ("status", "TEXT DEFAULT 'assigned'"),
    ("created_ts", "INTEGER"),
    ("created_by", "INTEGER"),
    ("ack_ts", "INTEGER"),
    ("ack_by", "INTEGER"),
    ("archived_ts", "INTEGER"),
    ("deleted_ts", "INTEGER"),
    ("reason_text", "TEXT"),
    ("reason_ts", "INTEGER"),
    ("done_ts", "INTEGER"),
    ("title", "TEXT"),
];

const USER_COLUMNS: [(&str, &str); 6] = [
    ("full_name", "TEXT"),
    ("username", "TEXT"),
    ("dept", "TEXT"),
    ("title", "TEXT"),
    ("phone", "TEXT"),
    ("role", "TEXT"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyDeleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub users: i64,
    pub per_dept: Vec<(Dept, i64)>,
    pub tasks: i64,
    pub pending: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn open(url: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::with_pool(pool).await
    }

    /// Single-connection in-memory database.
    #[cfg(test)]
    pub async fn in_memory() -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> DbResult<Self> {
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> DbResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users(
                chat_id INTEGER PRIMARY KEY,
                full_name TEXT, username TEXT,
                dept TEXT, title TEXT, phone TEXT,
                role TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        self.add_missing_columns("users", &USER_COLUMNS).await?;
        self.add_missing_columns("tasks", &TASK_COLUMNS).await
    }

    async fn add_missing_columns(&self, table: &str, columns: &[(&str, &str)]) -> DbResult<()> {
        let existing: Vec<String> =
            sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{table}')"))
                .fetch_all(&self.pool)
                .await?;
        for (col, ty) in columns {
            if !existing.iter().any(|c| c == col) {
                log::info!("adding column {table}.{col}");
                sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {col} {ty}"))
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    // users

    /// Inserts the user if unknown and refreshes name fields. The role is
    /// only assigned once, so later role changes stick.
    pub async fn ensure_user(
        &self,
        chat_id: i64,
        full_name: &str,
        username: Option<&str>,
        default_role: Role,
    ) -> DbResult<()> {
        let username = username.unwrap_or("");
        sqlx::query("INSERT OR IGNORE INTO users(chat_id, full_name, username) VALUES(?, ?, ?)")
            .bind(chat_id)
            .bind(full_name)
            .bind(username)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "UPDATE users SET role = COALESCE(role, ?), full_name = ?, username = ? WHERE chat_id = ?",
        )
        .bind(default_role.as_str())
        .bind(full_name)
        .bind(username)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn user(&self, chat_id: i64) -> DbResult<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT chat_id, full_name, username, dept, title, phone, role FROM users WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn is_registered(&self, chat_id: i64) -> DbResult<bool> {
        Ok(self.user(chat_id).await?.is_some_and(|u| u.is_registered()))
    }

    pub async fn set_dept(&self, chat_id: i64, dept: Dept) -> DbResult<bool> {
        self.set_user_field("dept", chat_id, dept.key()).await
    }

    pub async fn set_title(&self, chat_id: i64, title: &str) -> DbResult<bool> {
        self.set_user_field("title", chat_id, title).await
    }

    pub async fn set_phone(&self, chat_id: i64, phone: &str) -> DbResult<bool> {
        self.set_user_field("phone", chat_id, phone).await
    }

    pub async fn set_role(&self, chat_id: i64, role: Role) -> DbResult<bool> {
        self.set_user_field("role", chat_id, role.as_str()).await
    }

    async fn set_user_field(&self, column: &'static str, chat_id: i64, value: &str) -> DbResult<bool> {
        let res = sqlx::query(&format!("UPDATE users SET {column} = ? WHERE chat_id = ?"))
            .bind(value)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_user(&self, chat_id: i64) -> DbResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_users(&self) -> DbResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            "SELECT chat_id, full_name, username, dept, title, phone, role FROM users
             ORDER BY COALESCE(dept, ''), COALESCE(full_name, '')",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Users sorted by name, as offered when picking a reassignment target.
    pub async fn users_by_name(&self) -> DbResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            "SELECT chat_id, full_name, username, dept, title, phone, role FROM users
             ORDER BY COALESCE(full_name, '')",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Registered members of `dept`: a department alone isn't enough, a title is required too.
    pub async fn dept_members(&self, dept: Dept) -> DbResult<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT chat_id FROM users WHERE dept = ? AND title IS NOT NULL AND title != ''
             ORDER BY chat_id",
        )
            .bind(dept.key())
            .fetch_all(&self.pool)
            .await
    }

    pub async fn find_by_username(&self, username: &str) -> DbResult<Option<i64>> {
        sqlx::query_scalar("SELECT chat_id FROM users WHERE LOWER(username) = LOWER(?) LIMIT 1")
            .bind(username.trim_start_matches('@'))
            .fetch_optional(&self.pool)
            .await
    }

    /// Case-insensitive substring match; `%` and `_` in the fragment match literally.
    pub async fn find_by_name(&self, fragment: &str) -> DbResult<Option<i64>> {
        sqlx::query_scalar("SELECT chat_id FROM users WHERE full_name LIKE ? ESCAPE '\\' LIMIT 1")
            .bind(format!("%{}%", escape_like(fragment)))
            .fetch_optional(&self.pool)
            .await
    }

    /// Chats that receive admin notifications and the daily report.
    pub async fn admin_chat_ids(&self, admin_username: &str) -> DbResult<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT chat_id FROM users WHERE role = 'admin' OR LOWER(username) = LOWER(?) ORDER BY chat_id",
        )
        .bind(admin_username)
        .fetch_all(&self.pool)
        .await
    }

    // tasks

    pub async fn create_task(&self, task: &NewTask<'_>) -> DbResult<i64> {
        let id = sqlx::query(
            "INSERT INTO tasks(title, dept, assignee_chat_id, due_ts, due_text, status, created_ts, created_by)
             VALUES(?, ?, ?, ?, ?, 'assigned', ?, ?)",
        )
        .bind(task.title)
        .bind(task.dept.map(Dept::key))
        .bind(task.assignee_chat_id)
        .bind(task.due_ts)
        .bind(task.due_text)
        .bind(now_ts())
        .bind(task.created_by)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn task(&self, id: i64) -> DbResult<Option<Task>> {
        sqlx::query_as::<_, Task>(&format!("{TASK_SELECT} WHERE t.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Visible (not archived, not deleted) task, used for reminders.
    pub async fn active_task(&self, id: i64) -> DbResult<Option<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} WHERE t.id = ? AND t.archived_ts IS NULL AND t.deleted_ts IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn my_open_tasks(&self, chat_id: i64) -> DbResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} WHERE t.assignee_chat_id = ? AND t.archived_ts IS NULL
             AND t.deleted_ts IS NULL AND t.status != 'done' ORDER BY t.id ASC"
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn all_tasks(&self) -> DbResult<Vec<Task>> {
        self.visible_tasks("1 = 1").await
    }

    pub async fn incomplete_tasks(&self) -> DbResult<Vec<Task>> {
        self.visible_tasks("t.status != 'done'").await
    }

    pub async fn completed_tasks(&self) -> DbResult<Vec<Task>> {
        self.visible_tasks("t.status = 'done'").await
    }

    async fn visible_tasks(&self, filter: &str) -> DbResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} WHERE {filter} AND t.archived_ts IS NULL AND t.deleted_ts IS NULL
             ORDER BY t.id DESC LIMIT ?"
        ))
        .bind(LIST_LIMIT)
        .fetch_all(&self.pool)
        .await
    }

    /// Archived tasks of one assignee, or of everyone when `owner` is `None`.
    pub async fn archived_tasks(&self, owner: Option<i64>) -> DbResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} WHERE (? IS NULL OR t.assignee_chat_id = ?)
             AND t.archived_ts IS NOT NULL AND t.deleted_ts IS NULL
             ORDER BY t.archived_ts DESC, t.id DESC LIMIT ?"
        ))
        .bind(owner)
        .bind(owner)
        .bind(LIST_LIMIT)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn user_tasks(&self, chat_id: i64) -> DbResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} WHERE t.assignee_chat_id = ? AND t.deleted_ts IS NULL ORDER BY t.id DESC"
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn pending_tasks(&self) -> DbResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} WHERE {PENDING_FILTER} AND t.archived_ts IS NULL AND t.deleted_ts IS NULL
             ORDER BY t.id DESC LIMIT ?"
        ))
        .bind(REMIND_LIMIT)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn assignee_of(&self, id: i64) -> DbResult<Option<i64>> {
        let row: Option<Option<i64>> =
            sqlx::query_scalar("SELECT assignee_chat_id FROM tasks WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.flatten())
    }

    pub async fn acknowledge(&self, id: i64, by: i64) -> DbResult<bool> {
        let res = sqlx::query("UPDATE tasks SET ack_ts = ?, ack_by = ? WHERE id = ?")
            .bind(now_ts())
            .bind(by)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_status(&self, id: i64, status: TaskStatus) -> DbResult<bool> {
        let query = match status {
            TaskStatus::Done => sqlx::query("UPDATE tasks SET status = ?, done_ts = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(now_ts()),
            _ => sqlx::query("UPDATE tasks SET status = ?, done_ts = NULL WHERE id = ?").bind(status.as_str()),
        };
        let res = query.bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn record_reason(&self, id: i64, reason: &str) -> DbResult<bool> {
        let res = sqlx::query("UPDATE tasks SET reason_text = ?, reason_ts = ?, status = 'late' WHERE id = ?")
            .bind(reason)
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn archive(&self, id: i64) -> DbResult<bool> {
        let res = sqlx::query("UPDATE tasks SET archived_ts = ? WHERE id = ? AND deleted_ts IS NULL")
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn unarchive(&self, id: i64) -> DbResult<bool> {
        let res = sqlx::query("UPDATE tasks SET archived_ts = NULL WHERE id = ? AND archived_ts IS NOT NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn soft_delete(&self, id: i64) -> DbResult<DeleteOutcome> {
        let row: Option<Option<i64>> = sqlx::query_scalar("SELECT deleted_ts FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(DeleteOutcome::NotFound),
            Some(Some(_)) => Ok(DeleteOutcome::AlreadyDeleted),
            Some(None) => {
                sqlx::query("UPDATE tasks SET deleted_ts = ? WHERE id = ?")
                    .bind(now_ts())
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                Ok(DeleteOutcome::Deleted)
            }
        }
    }

    pub async fn restore(&self, id: i64) -> DbResult<bool> {
        let res = sqlx::query("UPDATE tasks SET deleted_ts = NULL WHERE id = ? AND deleted_ts IS NOT NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn reassign(&self, id: i64, to: i64) -> DbResult<bool> {
        let res = sqlx::query("UPDATE tasks SET assignee_chat_id = ? WHERE id = ?")
            .bind(to)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn reassign_all(&self, from: i64, to: i64) -> DbResult<u64> {
        let res = sqlx::query(
            "UPDATE tasks SET assignee_chat_id = ? WHERE assignee_chat_id = ? AND deleted_ts IS NULL",
        )
        .bind(to)
        .bind(from)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    pub async fn stats(&self) -> DbResult<Stats> {
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let mut per_dept = Vec::with_capacity(Dept::ALL.len());
        for dept in Dept::ALL {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE dept = ?")
                .bind(dept.key())
                .fetch_one(&self.pool)
                .await?;
            per_dept.push((dept, n));
        }
        let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE deleted_ts IS NULL")
            .fetch_one(&self.pool)
            .await?;
        let pending: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM tasks t WHERE {PENDING_FILTER}
             AND t.archived_ts IS NULL AND t.deleted_ts IS NULL"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(Stats {
            users,
            per_dept,
            tasks,
            pending,
        })
    }

    /// Tasks finished within `[from, to)`.
    pub async fn done_between(&self, from: i64, to: i64) -> DbResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} WHERE t.done_ts >= ? AND t.done_ts < ? AND t.deleted_ts IS NULL ORDER BY t.id"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
    }

    /// Tasks created within `[from, to)` that are still open.
    pub async fn open_created_between(&self, from: i64, to: i64) -> DbResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} WHERE t.created_ts >= ? AND t.created_ts < ? AND t.status != 'done'
             AND t.archived_ts IS NULL AND t.deleted_ts IS NULL ORDER BY t.id"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
    }
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db_with_staff() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.ensure_user(1, "Boss Man", Some("boss"), Role::Admin).await.unwrap();
        db.ensure_user(2, "Ali Hassan", Some("ali"), Role::Member).await.unwrap();
        db.ensure_user(3, "Sara Kareem", None, Role::Member).await.unwrap();
        db.set_dept(2, Dept::Solar).await.unwrap();
        db.set_dept(3, Dept::Solar).await.unwrap();
        db
    }

    fn new_task(title: &str, assignee: i64) -> NewTask<'_> {
        NewTask {
            title,
            dept: None,
            assignee_chat_id: assignee,
            due_ts: None,
            due_text: "tomorrow",
            created_by: 1,
        }
    }

    #[tokio::test]
    async fn ensure_user_keeps_assigned_role() {
        let db = db_with_staff().await;
        db.set_role(2, Role::Admin).await.unwrap();
        db.ensure_user(2, "Ali H.", Some("ali_h"), Role::Member).await.unwrap();

        let user = db.user(2).await.unwrap().unwrap();
        assert_eq!(user.role(), Role::Admin);
        assert_eq!(user.full_name.as_deref(), Some("Ali H."));
        assert_eq!(user.username.as_deref(), Some("ali_h"));
    }

    #[tokio::test]
    async fn registration_state() {
        let db = db_with_staff().await;
        assert!(!db.is_registered(2).await.unwrap());
        db.set_title(2, "Technician").await.unwrap();
        assert!(db.is_registered(2).await.unwrap());
        assert!(!db.is_registered(42).await.unwrap());
    }

    #[tokio::test]
    async fn lookups() {
        let db = db_with_staff().await;
        assert_eq!(db.find_by_username("@ALI").await.unwrap(), Some(2));
        assert_eq!(db.find_by_username("nobody").await.unwrap(), None);
        assert_eq!(db.find_by_name("Kare").await.unwrap(), Some(3));
        assert!(db.dept_members(Dept::Cameras).await.unwrap().is_empty());
        assert_eq!(db.admin_chat_ids("boss").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn dept_members_need_a_title() {
        let db = db_with_staff().await;
        assert!(db.dept_members(Dept::Solar).await.unwrap().is_empty());
        db.set_title(2, "Technician").await.unwrap();
        assert_eq!(db.dept_members(Dept::Solar).await.unwrap(), vec![2]);
        db.set_title(3, "").await.unwrap();
        assert_eq!(db.dept_members(Dept::Solar).await.unwrap(), vec![2]);
        db.set_title(3, "Engineer").await.unwrap();
        assert_eq!(db.dept_members(Dept::Solar).await.unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn name_search_takes_wildcards_literally() {
        let db = db_with_staff().await;
        assert_eq!(db.find_by_name("%").await.unwrap(), None);
        assert_eq!(db.find_by_name("_").await.unwrap(), None);
        assert_eq!(db.find_by_name("\\").await.unwrap(), None);
        db.ensure_user(4, "Noor 100% Ready", None, Role::Member).await.unwrap();
        assert_eq!(db.find_by_name("100%").await.unwrap(), Some(4));
        assert_eq!(escape_like(r"a%b_c\d"), r"a\%b\_c\\d");
    }

    #[tokio::test]
    async fn reopening_clears_done_time() {
        let db = db_with_staff().await;
        let id = db.create_task(&new_task("Fix inverter", 2)).await.unwrap();
        db.set_status(id, TaskStatus::Done).await.unwrap();
        assert!(db.task(id).await.unwrap().unwrap().done_ts.is_some());

        db.set_status(id, TaskStatus::InProgress).await.unwrap();
        assert_eq!(db.task(id).await.unwrap().unwrap().done_ts, None);
        let now = now_ts();
        assert!(db.done_between(now - 60, now + 60).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn task_lifecycle() {
        let db = db_with_staff().await;
        let id = db.create_task(&new_task("Fix inverter", 2)).await.unwrap();

        let task = db.task(id).await.unwrap().unwrap();
        assert_eq!(task.status, "assigned");
        assert_eq!(task.assignee_username.as_deref(), Some("ali"));
        assert!(task.created_ts.is_some());

        assert!(db.acknowledge(id, 2).await.unwrap());
        assert!(db.set_status(id, TaskStatus::InProgress).await.unwrap());
        assert_eq!(db.my_open_tasks(2).await.unwrap().len(), 1);

        assert!(db.set_status(id, TaskStatus::Done).await.unwrap());
        let task = db.task(id).await.unwrap().unwrap();
        assert_eq!(task.ack_by, Some(2));
        assert!(task.done_ts.is_some());
        assert!(db.my_open_tasks(2).await.unwrap().is_empty());
        assert_eq!(db.completed_tasks().await.unwrap().len(), 1);
        assert!(db.incomplete_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reason_marks_task_late() {
        let db = db_with_staff().await;
        let id = db.create_task(&new_task("Replace camera", 3)).await.unwrap();
        assert!(db.record_reason(id, "no spare parts").await.unwrap());

        let task = db.task(id).await.unwrap().unwrap();
        assert_eq!(task.status, "late");
        assert_eq!(task.reason_text.as_deref(), Some("no spare parts"));
        assert_eq!(db.pending_tasks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn archive_and_delete() {
        let db = db_with_staff().await;
        let a = db.create_task(&new_task("a", 2)).await.unwrap();
        let b = db.create_task(&new_task("b", 3)).await.unwrap();

        assert!(db.archive(a).await.unwrap());
        assert_eq!(db.all_tasks().await.unwrap().len(), 1);
        assert_eq!(db.archived_tasks(Some(2)).await.unwrap().len(), 1);
        assert!(db.archived_tasks(Some(3)).await.unwrap().is_empty());
        assert_eq!(db.archived_tasks(None).await.unwrap().len(), 1);
        assert!(db.active_task(a).await.unwrap().is_none());

        assert!(db.unarchive(a).await.unwrap());
        assert!(!db.unarchive(a).await.unwrap());

        assert_eq!(db.soft_delete(b).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(db.soft_delete(b).await.unwrap(), DeleteOutcome::AlreadyDeleted);
        assert_eq!(db.soft_delete(999).await.unwrap(), DeleteOutcome::NotFound);
        assert!(!db.archive(b).await.unwrap());
        assert!(db.user_tasks(3).await.unwrap().is_empty());

        assert!(db.restore(b).await.unwrap());
        assert!(!db.restore(b).await.unwrap());
        assert_eq!(db.user_tasks(3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reassignment_skips_deleted_tasks() {
        let db = db_with_staff().await;
        let a = db.create_task(&new_task("a", 2)).await.unwrap();
        let b = db.create_task(&new_task("b", 2)).await.unwrap();
        let c = db.create_task(&new_task("c", 2)).await.unwrap();
        db.soft_delete(c).await.unwrap();

        assert!(db.reassign(a, 3).await.unwrap());
        assert_eq!(db.reassign_all(2, 3).await.unwrap(), 1);
        assert_eq!(db.assignee_of(b).await.unwrap(), Some(3));
        assert_eq!(db.assignee_of(c).await.unwrap(), Some(2));
        assert_eq!(db.assignee_of(404).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stats_count_pending() {
        let db = db_with_staff().await;
        let a = db.create_task(&new_task("a", 2)).await.unwrap();
        db.create_task(&new_task("b", 3)).await.unwrap();
        db.set_status(a, TaskStatus::Done).await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.users, 3);
        assert_eq!(stats.tasks, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.per_dept[0], (Dept::Solar, 2));
    }

    #[tokio::test]
    async fn report_windows() {
        let db = db_with_staff().await;
        let a = db.create_task(&new_task("a", 2)).await.unwrap();
        db.create_task(&new_task("b", 3)).await.unwrap();
        db.set_status(a, TaskStatus::Done).await.unwrap();

        let now = now_ts();
        let done = db.done_between(now - 60, now + 60).await.unwrap();
        assert_eq!(done.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a]);
        assert!(db.done_between(now + 60, now + 120).await.unwrap().is_empty());

        let open = db.open_created_between(now - 60, now + 60).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].title, "b");
    }

    #[tokio::test]
    async fn migrates_legacy_tables() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE tasks(id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO tasks(title) VALUES('old')")
            .execute(&pool)
            .await
            .unwrap();

        let db = Database::with_pool(pool).await.unwrap();
        let task = db.task(1).await.unwrap().unwrap();
        assert_eq!(task.title, "old");
        assert_eq!(task.status, "assigned");
    }
}
