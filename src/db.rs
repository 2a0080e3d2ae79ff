use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::ValueEnum;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    ActivityLog, NewNotification, Notification, NotificationType, ReworkCheck, Task, Timesheet,
    User, UserScope, DAILY_ACTIVITY_EVENT, REWORK_CHECK_EVENT,
};
use crate::store::Store;
use crate::window;

const USER_COLUMNS: &str =
    "id, email, full_name, tenant_id, role, custom_role, status, is_overloaded";

const NOTIFICATION_COLUMNS: &str = "id, tenant_id, recipient_email, subject_email, rule_id, \
     type, category, status, title, message, read, created_date";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        tenant_id: row.get("tenant_id"),
        role: row.get("role"),
        custom_role: row.get("custom_role"),
        status: row.get("status"),
        is_overloaded: row.get("is_overloaded"),
    }
}

fn notification_from_row(row: &PgRow) -> StoreResult<Notification> {
    Ok(Notification {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        recipient_email: row.get("recipient_email"),
        subject_email: row.get("subject_email"),
        rule_id: row.get("rule_id"),
        kind: row.get::<String, _>("type").parse()?,
        category: row.get::<String, _>("category").parse()?,
        status: row.get::<String, _>("status").parse()?,
        title: row.get("title"),
        message: row.get("message"),
        read: row.get("read"),
        created_date: row.get("created_date"),
    })
}

impl Store for PgStore {
    async fn users_in_scope(&self, scope: UserScope) -> StoreResult<Vec<User>> {
        let filter = match scope {
            UserScope::ActiveViewers => {
                "status <> 'inactive' AND role = 'member' AND custom_role = 'viewer'"
            }
            UserScope::ActiveMembers => "status = 'active' AND role = 'member'",
        };
        let query = format!(
            "SELECT {USER_COLUMNS} FROM timesheet_alarms.users WHERE {filter} ORDER BY email"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn find_user(&self, email: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM timesheet_alarms.users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn project_managers(&self, tenant_id: &str) -> StoreResult<Vec<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM timesheet_alarms.users \
             WHERE tenant_id = $1 AND custom_role = 'project_manager' ORDER BY email"
        );
        let rows = sqlx::query(&query)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn daily_log(&self, user_id: Uuid, day: NaiveDate) -> StoreResult<Option<ActivityLog>> {
        let (start, end) = window::day_bounds(day);
        let row = sqlx::query(
            r#"
            SELECT id, scheduled_working_start, total_assigned_tasks,
                   submitted_timesheets_count, ignored_alert_count, timestamp
            FROM timesheet_alarms.activity_logs
            WHERE user_id = $1 AND event_type = $2 AND timestamp >= $3 AND timestamp < $4
            ORDER BY timestamp
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(DAILY_ACTIVITY_EVENT)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ActivityLog {
            id: row.get("id"),
            scheduled_working_start: row.get("scheduled_working_start"),
            total_assigned_tasks: row.get("total_assigned_tasks"),
            submitted_timesheets_count: row.get("submitted_timesheets_count"),
            ignored_alert_count: row.get("ignored_alert_count"),
            timestamp: row.get("timestamp"),
        }))
    }

    async fn increment_ignored_alerts(&self, log_id: Uuid) -> StoreResult<i32> {
        let row = sqlx::query(
            r#"
            UPDATE timesheet_alarms.activity_logs
            SET ignored_alert_count = ignored_alert_count + 1
            WHERE id = $1
            RETURNING ignored_alert_count
            "#,
        )
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            entity: "activity log",
            id: log_id.to_string(),
        })?;
        Ok(row.get("ignored_alert_count"))
    }

    async fn set_overloaded(&self, user_id: Uuid, overloaded: bool) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE timesheet_alarms.users
            SET is_overloaded = $2
            WHERE id = $1 AND is_overloaded <> $2
            "#,
        )
        .bind(user_id)
        .bind(overloaded)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tasks_assigned_to(&self, email: &str) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT status, due_date, estimated_hours, story_points
            FROM timesheet_alarms.tasks
            WHERE assigned_to = $1
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Task {
                status: row.get("status"),
                due_date: row.get("due_date"),
                estimated_hours: row.get("estimated_hours"),
                story_points: row.get("story_points"),
            })
            .collect())
    }

    async fn timesheets_since(&self, email: &str, since: NaiveDate) -> StoreResult<Vec<Timesheet>> {
        let rows = sqlx::query(
            r#"
            SELECT date, hours, minutes, work_type
            FROM timesheet_alarms.timesheets
            WHERE user_email = $1 AND date >= $2
            ORDER BY date
            "#,
        )
        .bind(email)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Timesheet {
                date: row.get("date"),
                hours: row.get("hours"),
                minutes: row.get("minutes"),
                work_type: row.get("work_type"),
            })
            .collect())
    }

    async fn record_rework_check(
        &self,
        user: &User,
        percentage: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO timesheet_alarms.activity_logs
            (id, user_id, email, tenant_id, event_type, rework_percentage, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.tenant_id)
        .bind(REWORK_CHECK_EVENT)
        .bind(percentage)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_rework_checks(&self, since: DateTime<Utc>) -> StoreResult<Vec<ReworkCheck>> {
        let rows = sqlx::query(
            r#"
            SELECT email, tenant_id, rework_percentage, timestamp
            FROM timesheet_alarms.activity_logs
            WHERE event_type = $1 AND timestamp >= $2 AND rework_percentage IS NOT NULL
            ORDER BY timestamp DESC
            "#,
        )
        .bind(REWORK_CHECK_EVENT)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ReworkCheck {
                email: row.get("email"),
                tenant_id: row.get("tenant_id"),
                rework_percentage: row.get("rework_percentage"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }

    async fn open_notification(
        &self,
        notification: NewNotification,
        also_blocked_by: &[NotificationType],
    ) -> StoreResult<Option<Notification>> {
        let blocking: Vec<String> = std::iter::once(notification.kind)
            .chain(also_blocked_by.iter().copied())
            .map(|kind| kind.as_str().to_string())
            .collect();

        // One statement: the NOT EXISTS covers the extra blocking types and the
        // partial unique index settles races on the notification's own type.
        let query = format!(
            r#"
            INSERT INTO timesheet_alarms.notifications
            (id, tenant_id, recipient_email, subject_email, rule_id, type, category, status,
             title, message, sender_name)
            SELECT $1, $2, $3, $4, $5, $6, $7, 'OPEN', $8, $9, $10
            WHERE NOT EXISTS (
                SELECT 1 FROM timesheet_alarms.notifications
                WHERE recipient_email = $3 AND subject_email = $4
                  AND type = ANY($11) AND status IN ('OPEN', 'APPEALED')
            )
            ON CONFLICT (recipient_email, subject_email, type)
                WHERE status IN ('OPEN', 'APPEALED') DO NOTHING
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&notification.tenant_id)
            .bind(&notification.recipient_email)
            .bind(&notification.subject_email)
            .bind(&notification.rule_id)
            .bind(notification.kind.as_str())
            .bind(notification.kind.category().as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.sender_name)
            .bind(&blocking)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn has_open(
        &self,
        recipient_email: &str,
        subject_email: &str,
        kind: NotificationType,
    ) -> StoreResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM timesheet_alarms.notifications
                WHERE recipient_email = $1 AND subject_email = $2 AND type = $3
                  AND status = 'OPEN'
            ) AS has_open
            "#,
        )
        .bind(recipient_email)
        .bind(subject_email)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("has_open"))
    }

    async fn resolve_open(
        &self,
        recipient_email: &str,
        subject_email: &str,
        kind: NotificationType,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE timesheet_alarms.notifications
            SET status = 'RESOLVED', updated_at = now()
            WHERE recipient_email = $1 AND subject_email = $2 AND type = $3 AND status = 'OPEN'
            "#,
        )
        .bind(recipient_email)
        .bind(subject_email)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn resolve_notification(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE timesheet_alarms.notifications
            SET status = 'RESOLVED', updated_at = now()
            WHERE id = $1 AND status = 'OPEN'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn open_notifications(&self, kind: NotificationType) -> StoreResult<Vec<Notification>> {
        let query = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM timesheet_alarms.notifications \
             WHERE type = $1 AND status = 'OPEN' ORDER BY created_date"
        );
        let rows = sqlx::query(&query)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn active_notifications(
        &self,
        tenant_id: Option<&str>,
    ) -> StoreResult<Vec<Notification>> {
        let mut query = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM timesheet_alarms.notifications \
             WHERE status IN ('OPEN', 'APPEALED')"
        );
        if tenant_id.is_some() {
            query.push_str(" AND tenant_id = $1");
        }
        query.push_str(" ORDER BY created_date DESC");

        let mut rows = sqlx::query(&query);
        if let Some(value) = tenant_id {
            rows = rows.bind(value);
        }
        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(notification_from_row).collect()
    }
}

pub async fn seed(pool: &PgPool, now: DateTime<Utc>) -> anyhow::Result<()> {
    let users = vec![
        (
            Uuid::parse_str("852b9299-896c-4587-86ec-aa9d032d1f8f")?,
            "vera.lin@acme.io",
            "Vera Lin",
            "member",
            "viewer",
        ),
        (
            Uuid::parse_str("3825a4f3-9cf6-4b9f-9fcb-197a0c530ee2")?,
            "mia.torres@acme.io",
            "Mia Torres",
            "member",
            "contributor",
        ),
        (
            Uuid::parse_str("4ca7c5de-33a6-4e5c-8e85-84471abd2dd8")?,
            "rae.okafor@acme.io",
            "Rae Okafor",
            "member",
            "contributor",
        ),
        (
            Uuid::parse_str("bd65e26d-4393-497f-94a8-24a6dfdc17b5")?,
            "pat.nguyen@acme.io",
            "Pat Nguyen",
            "admin",
            "project_manager",
        ),
    ];

    for (id, email, full_name, role, custom_role) in &users {
        sqlx::query(
            r#"
            INSERT INTO timesheet_alarms.users
            (id, email, full_name, tenant_id, role, custom_role, status)
            VALUES ($1, $2, $3, 'acme', $4, $5, 'active')
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, role = EXCLUDED.role,
                custom_role = EXCLUDED.custom_role
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(full_name)
        .bind(role)
        .bind(custom_role)
        .execute(pool)
        .await?;
    }

    let (viewer_id, viewer_email, ..) = users[0];
    let yesterday = now.date_naive() - Duration::days(1);
    let logged_at = yesterday
        .and_time(NaiveTime::from_hms_opt(9, 0, 0).context("invalid time")?)
        .and_utc();
    sqlx::query(
        r#"
        INSERT INTO timesheet_alarms.activity_logs
        (id, user_id, email, tenant_id, event_type, scheduled_working_start,
         total_assigned_tasks, submitted_timesheets_count, ignored_alert_count, timestamp)
        SELECT $1, $2, $3, 'acme', $4, '10:00', 5, 3, 0, $5
        WHERE NOT EXISTS (
            SELECT 1 FROM timesheet_alarms.activity_logs
            WHERE user_id = $2 AND event_type = $4 AND timestamp = $5
        )
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(viewer_id)
    .bind(viewer_email)
    .bind(DAILY_ACTIVITY_EVENT)
    .bind(logged_at)
    .execute(pool)
    .await?;

    let today = now.date_naive();
    let overdue = today - Duration::days(10);
    let tasks = vec![
        ("seed-task-001", "Migrate billing exports", "in_progress", None, Some(6.0), None),
        ("seed-task-002", "Quarterly access review", "todo", Some(today), None, Some(3.0)),
        ("seed-task-003", "Vendor contract follow-up", "todo", Some(overdue), Some(4.0), None),
    ];
    for (source_key, title, status, due_date, hours, points) in tasks {
        sqlx::query(
            r#"
            INSERT INTO timesheet_alarms.tasks
            (id, tenant_id, title, status, due_date, estimated_hours, story_points,
             assigned_to, source_key)
            VALUES ($1, 'acme', $2, $3, $4, $5, $6, 'mia.torres@acme.io', $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(status)
        .bind(due_date)
        .bind(hours)
        .bind(points)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let timesheets = vec![
        ("seed-ts-001", 1, 6, 0, "development"),
        ("seed-ts-002", 2, 2, 30, "rework"),
        ("seed-ts-003", 3, 5, 0, "development"),
    ];
    for (source_key, days_ago, hours, minutes, work_type) in timesheets {
        sqlx::query(
            r#"
            INSERT INTO timesheet_alarms.timesheets
            (id, user_email, date, hours, minutes, work_type, source_key)
            VALUES ($1, 'rae.okafor@acme.io', $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(today - Duration::days(days_ago))
        .bind(hours)
        .bind(minutes)
        .bind(work_type)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportKind {
    Timesheets,
    Tasks,
}

pub async fn import_csv(
    pool: &PgPool,
    kind: ImportKind,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    match kind {
        ImportKind::Timesheets => import_timesheets(pool, &mut reader).await,
        ImportKind::Tasks => import_tasks(pool, &mut reader).await,
    }
}

async fn import_timesheets(
    pool: &PgPool,
    reader: &mut csv::Reader<std::fs::File>,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        user_email: String,
        date: NaiveDate,
        hours: i32,
        minutes: Option<i32>,
        work_type: String,
        source_key: Option<String>,
    }

    let mut inserted = 0usize;
    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO timesheet_alarms.timesheets
            (id, user_email, date, hours, minutes, work_type, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.user_email)
        .bind(row.date)
        .bind(row.hours)
        .bind(row.minutes.unwrap_or(0))
        .bind(&row.work_type)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

async fn import_tasks(
    pool: &PgPool,
    reader: &mut csv::Reader<std::fs::File>,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        tenant_id: String,
        title: String,
        status: String,
        due_date: Option<NaiveDate>,
        estimated_hours: Option<f64>,
        story_points: Option<f64>,
        assigned_to: String,
        source_key: Option<String>,
    }

    let mut inserted = 0usize;
    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO timesheet_alarms.tasks
            (id, tenant_id, title, status, due_date, estimated_hours, story_points,
             assigned_to, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.tenant_id)
        .bind(&row.title)
        .bind(&row.status)
        .bind(row.due_date)
        .bind(row.estimated_hours)
        .bind(row.story_points)
        .bind(&row.assigned_to)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
