use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dept {
    Solar,
    Maintenance,
    Cameras,
    Networks,
}

impl Dept {
    pub const ALL: [Dept; 4] = [Dept::Solar, Dept::Maintenance, Dept::Cameras, Dept::Networks];

    pub fn key(self) -> &'static str {
        match self {
            Dept::Solar => "solar",
            Dept::Maintenance => "maintenance",
            Dept::Cameras => "cameras",
            Dept::Networks => "networks",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dept::Solar => "🔆 Solar energy",
            Dept::Maintenance => "🧰 Maintenance",
            Dept::Cameras => "📷 Cameras",
            Dept::Networks => "🌐 Networks",
        }
    }
}

impl fmt::Display for Dept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Dept {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dept::ALL
            .into_iter()
            .find(|d| d.key() == s)
            .ok_or_else(|| UnknownValue(s.to_owned()))
    }
}

/// Label for a stored department key; unknown keys are shown verbatim.
pub fn dept_label(key: Option<&str>) -> String {
    match key {
        None | Some("") => "—".to_owned(),
        Some(k) => k.parse::<Dept>().map(|d| d.label().to_owned()).unwrap_or_else(|_| k.to_owned()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(UnknownValue(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Assigned,
    InProgress,
    Late,
    Done,
}

impl TaskStatus {
    pub const PENDING: [TaskStatus; 3] = [TaskStatus::Assigned, TaskStatus::InProgress, TaskStatus::Late];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Late => "late",
            TaskStatus::Done => "done",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Assigned => "Assigned",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Late => "Late",
            TaskStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "late" => Ok(TaskStatus::Late),
            "done" => Ok(TaskStatus::Done),
            other => Err(UnknownValue(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue(pub String);

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value: {}", self.0)
    }
}

impl std::error::Error for UnknownValue {}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub chat_id: i64,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub dept: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

impl User {
    pub fn is_registered(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.dept) && set(&self.title)
    }

    pub fn role(&self) -> Role {
        self.role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(Role::Member)
    }

    /// `@username` when known, otherwise the full name.
    pub fn display_name(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(u) => format!("@{u}"),
            None => self.full_name.clone().unwrap_or_else(|| "no name".to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub dept: Option<String>,
    pub assignee_chat_id: Option<i64>,
    pub assignee_username: Option<String>,
    pub due_ts: Option<i64>,
    pub due_text: Option<String>,
    pub status: String,
    pub created_ts: Option<i64>,
    pub created_by: Option<i64>,
    pub ack_ts: Option<i64>,
    pub ack_by: Option<i64>,
    pub archived_ts: Option<i64>,
    pub deleted_ts: Option<i64>,
    pub reason_text: Option<String>,
    pub reason_ts: Option<i64>,
    pub done_ts: Option<i64>,
}

impl Task {
    pub fn status_label(&self) -> String {
        self.status
            .parse::<TaskStatus>()
            .map(|s| s.label().to_owned())
            .unwrap_or_else(|_| self.status.clone())
    }

    /// Free-text due wins over the parsed timestamp.
    pub fn due_display(&self) -> String {
        match self.due_text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => text.to_owned(),
            None => self.due_ts.map(format_ts).unwrap_or_else(|| "—".to_owned()),
        }
    }
}

/// Longest task title accepted from the add flow, in characters.
pub const MAX_TASK_TITLE: usize = 1000;

/// Values needed to insert a task row.
#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub title: &'a str,
    pub dept: Option<Dept>,
    pub assignee_chat_id: i64,
    pub due_ts: Option<i64>,
    pub due_text: &'a str,
    pub created_by: i64,
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

pub fn format_ts(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => ts.to_string(),
    }
}

/// Parses `+2h`, `+1d` or an ISO date/datetime into a unix timestamp.
pub fn parse_due(input: &str, now: DateTime<Utc>) -> Option<i64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(rel) = s.strip_prefix('+') {
        let unit = rel.chars().last()?;
        let n: i64 = rel[..rel.len() - unit.len_utf8()].parse().ok()?;
        let delta = match unit.to_ascii_lowercase() {
            'h' => Duration::try_hours(n)?,
            'd' => Duration::try_days(n)?,
            _ => return None,
        };
        return now.checked_add_signed(delta).map(|dt| dt.timestamp());
    }

    let s = s.replace('/', "-");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.timestamp());
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    if let Some(dt) = FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(&s, f).ok())
    {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_due() {
        let base = now().timestamp();
        assert_eq!(parse_due("+2h", now()), Some(base + 2 * 3600));
        assert_eq!(parse_due(" +1D ", now()), Some(base + 86400));
        assert_eq!(parse_due("+xh", now()), None);
        assert_eq!(parse_due("+3w", now()), None);
    }

    #[test]
    fn absolute_due() {
        let midnight = Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap().timestamp();
        assert_eq!(parse_due("2024-05-03", now()), Some(midnight));
        assert_eq!(parse_due("2024/05/03", now()), Some(midnight));
        assert_eq!(parse_due("2024-05-03 10:30", now()), Some(midnight + 37800));
        assert_eq!(parse_due("2024-05-03T10:30:00", now()), Some(midnight + 37800));
        assert_eq!(parse_due("2024-05-03T10:30:00+03:00", now()), Some(midnight + 37800 - 10800));
    }

    #[test]
    fn free_text_due_is_not_a_timestamp() {
        assert_eq!(parse_due("next sunday", now()), None);
        assert_eq!(parse_due("", now()), None);
    }

    #[test]
    fn formats_timestamps() {
        assert_eq!(format_ts(now().timestamp()), "2024-05-01 12:00 UTC");
    }

    #[test]
    fn dept_keys_round_trip_labels() {
        assert_eq!("cameras".parse::<Dept>().unwrap(), Dept::Cameras);
        assert!("kitchen".parse::<Dept>().is_err());
        assert_eq!(dept_label(Some("solar")), Dept::Solar.label());
        assert_eq!(dept_label(Some("legacy")), "legacy");
        assert_eq!(dept_label(None), "—");
    }

    #[test]
    fn registration_requires_dept_and_title() {
        let mut user = User {
            chat_id: 1,
            full_name: Some("Ali".into()),
            username: None,
            dept: Some("solar".into()),
            title: None,
            phone: None,
            role: None,
        };
        assert!(!user.is_registered());
        user.title = Some("Engineer".into());
        assert!(user.is_registered());
        assert_eq!(user.role(), Role::Member);
        assert_eq!(user.display_name(), "Ali");
    }

    #[test]
    fn due_display_prefers_text() {
        let task = Task {
            id: 1,
            title: "t".into(),
            dept: None,
            assignee_chat_id: None,
            assignee_username: None,
            due_ts: Some(now().timestamp()),
            due_text: Some("  ".into()),
            status: "weird".into(),
            created_ts: None,
            created_by: None,
            ack_ts: None,
            ack_by: None,
            archived_ts: None,
            deleted_ts: None,
            reason_text: None,
            reason_ts: None,
            done_ts: None,
        };
        assert_eq!(task.due_display(), "2024-05-01 12:00 UTC");
        assert_eq!(task.status_label(), "weird");
    }
}
