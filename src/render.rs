//! Message bodies. Everything here returns HTML-mode text with user input escaped.

use std::{borrow::Cow, collections::BTreeMap};

use chrono::NaiveDate;
use teloxide::utils::html::escape;

use crate::{
    db::Stats,
    model::{dept_label, Task, User, MAX_TASK_TITLE},
};

/// Telegram rejects messages above 4096 characters; keep some headroom.
const MESSAGE_LIMIT: usize = 4000;

pub const PAGE_SIZE: usize = 10;

/// Per-field caps inside a list block. Even fully escaped (`&quot;` is 6 bytes per char)
/// one block stays under `MESSAGE_LIMIT`.
const LIST_TITLE: usize = 300;
const LIST_WHO: usize = 64;
const LIST_DUE: usize = 100;
const LIST_STATUS: usize = 32;
const ROW_TITLE: usize = 60;
const ROW_DUE: usize = 40;
const CARD_FIELD: usize = 100;

/// Cuts `text` to at most `max` characters, marking the cut with an ellipsis.
fn clip(text: &str, max: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max) {
        None => Cow::Borrowed(text),
        Some(_) => {
            let kept: String = text.chars().take(max.saturating_sub(1)).collect();
            Cow::Owned(kept + "…")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub count: usize,
    pub start: usize,
    pub end: usize,
}

impl Page {
    pub fn has_prev(&self) -> bool {
        self.index > 0
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.count
    }
}

/// Clamps `page` into range; an empty list still has one page.
pub fn paginate(total: usize, page: usize, size: usize) -> Page {
    let count = total.div_ceil(size).max(1);
    let index = page.min(count - 1);
    let start = (index * size).min(total);
    let end = (start + size).min(total);
    Page {
        index,
        count,
        start,
        end,
    }
}

pub fn task_block(task: &Task) -> String {
    let who = match task.assignee_username.as_deref().filter(|u| !u.is_empty()) {
        Some(u) => format!("@{u}"),
        None => dept_label(task.dept.as_deref()),
    };
    format!(
        "<b>#{}</b> — {}\n👤: {}\n⏰: {}\n📌: {}\n<i>————————————</i>",
        task.id,
        escape(&clip(&task.title, LIST_TITLE)),
        escape(&clip(&who, LIST_WHO)),
        escape(&clip(&task.due_display(), LIST_DUE)),
        escape(&clip(&task.status_label(), LIST_STATUS)),
    )
}

/// Joins blocks under a header, splitting into several messages when long.
/// The header always shares its message with the first block.
fn chunked(header: &str, blocks: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = header.to_owned();
    let mut has_block = false;
    for block in blocks {
        if has_block && current.len() + block.len() + 1 > MESSAGE_LIMIT {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&block);
        has_block = true;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn task_list(header: &str, tasks: &[Task], empty: &str) -> Vec<String> {
    if tasks.is_empty() {
        return vec![empty.to_owned()];
    }
    chunked(header, tasks.iter().map(task_block))
}

pub fn all_tasks(tasks: &[Task]) -> Vec<String> {
    task_list("📋 <b>All tasks (latest 200)</b>", tasks, "No tasks yet.")
}

pub fn incomplete_tasks(tasks: &[Task]) -> Vec<String> {
    task_list(
        &format!("⏳ <b>Not done ({})</b>", tasks.len()),
        tasks,
        "No unfinished tasks 🎉.",
    )
}

pub fn completed_tasks(tasks: &[Task]) -> Vec<String> {
    task_list(
        &format!("✅ <b>Completed ({})</b>", tasks.len()),
        tasks,
        "No completed tasks yet.",
    )
}

pub fn archived_tasks(tasks: &[Task], everyone: bool) -> Vec<String> {
    let header = if everyone {
        "📦 <b>Archive (everyone)</b>"
    } else {
        "📦 <b>My archive</b>"
    };
    task_list(header, tasks, "Nothing archived.")
}

pub fn my_open_tasks(tasks: &[Task]) -> Vec<String> {
    task_list("🔸 <b>Your unfinished tasks</b>:", tasks, "You have no unfinished tasks 🎉.")
}

pub fn new_task(task: &Task) -> String {
    format!(
        "🎯 New task #{}\n• Title: {}\n• Due: {}\n\n\
         Please tap «📥 Received», then «🚀 In progress» or «🏁 Finish task ✅».",
        task.id,
        escape(&clip(&task.title, MAX_TASK_TITLE)),
        escape(&clip(&task.due_display(), LIST_DUE)),
    )
}

pub fn diagnostics(stats: &Stats) -> String {
    let per_dept = stats
        .per_dept
        .iter()
        .map(|(dept, n)| format!("{}: {n}", dept.label()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "🧪 <b>Quick diagnostics</b>:\n• Users: {}\n• Departments: {}\n• Tasks: {} | pending: {}",
        stats.users, per_dept, stats.tasks, stats.pending
    )
}

pub fn user_card(user: &User) -> String {
    format!(
        "👤 {} (@{})\n• Department: {}\n• Title: {}\n• Role: {}",
        escape(&clip(user.full_name.as_deref().unwrap_or("-"), CARD_FIELD)),
        escape(user.username.as_deref().filter(|u| !u.is_empty()).unwrap_or("-")),
        escape(&dept_label(user.dept.as_deref())),
        escape(&clip(user.title.as_deref().unwrap_or("—"), CARD_FIELD)),
        user.role().as_str(),
    )
}

/// Short button label for a user row.
pub fn user_button_label(user: &User) -> String {
    let label = format!(
        "{} • @{} • {}",
        user.full_name.as_deref().unwrap_or("no name"),
        user.username.as_deref().filter(|u| !u.is_empty()).unwrap_or("-"),
        dept_label(user.dept.as_deref()),
    );
    label.chars().take(60).collect()
}

pub fn user_tasks_page(tasks: &[Task], page: Page) -> String {
    let mut lines = vec![format!(
        "🧾 Employee tasks (page {}/{})",
        page.index + 1,
        page.count
    )];
    for task in &tasks[page.start..page.end] {
        let due = task.due_text.as_deref().map(str::trim).filter(|d| !d.is_empty()).unwrap_or("-");
        lines.push(format!(
            "#{} • {} • {} • {}",
            task.id,
            escape(&clip(&task.title, ROW_TITLE)),
            escape(&clip(&task.status, LIST_STATUS)),
            escape(&clip(due, ROW_DUE))
        ));
    }
    lines.join("\n")
}

fn group_by_assignee(tasks: &[Task]) -> BTreeMap<String, Vec<&Task>> {
    let mut groups: BTreeMap<String, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        let name = match task.assignee_username.as_deref().filter(|u| !u.is_empty()) {
            Some(u) => format!("@{u}"),
            None => "no name".to_owned(),
        };
        groups.entry(name).or_default().push(task);
    }
    groups
}

/// One or more messages when the day was busy.
pub fn daily_report(day: NaiveDate, done: &[Task], open: &[Task]) -> Vec<String> {
    let mut lines = vec![String::new(), "✅ Done:".to_owned()];
    if done.is_empty() {
        lines.push("• nothing".to_owned());
    }
    for (user, tasks) in group_by_assignee(done) {
        lines.push(format!("• {}:", escape(&user)));
        lines.extend(
            tasks
                .iter()
                .map(|t| format!("   - #{} {}", t.id, escape(&clip(&t.title, LIST_TITLE)))),
        );
    }

    lines.push(String::new());
    lines.push("⏳ Not done (created today):".to_owned());
    if open.is_empty() {
        lines.push("• nothing".to_owned());
    }
    for (user, tasks) in group_by_assignee(open) {
        lines.push(format!("• {}:", escape(&user)));
        lines.extend(
            tasks
                .iter()
                .map(|t| {
                    format!(
                        "   - #{} {} • status: {}",
                        t.id,
                        escape(&clip(&t.title, LIST_TITLE)),
                        escape(&clip(&t.status_label(), LIST_STATUS))
                    )
                }),
        );
    }
    chunked(&format!("🗓 Daily report — {day}"), lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dept;

    fn task(id: i64, title: &str, username: Option<&str>) -> Task {
        Task {
            id,
            title: title.into(),
            dept: Some("cameras".into()),
            assignee_chat_id: Some(7),
            assignee_username: username.map(Into::into),
            due_ts: None,
            due_text: Some("Friday".into()),
            status: "in_progress".into(),
            created_ts: None,
            created_by: None,
            ack_ts: None,
            ack_by: None,
            archived_ts: None,
            deleted_ts: None,
            reason_text: None,
            reason_ts: None,
            done_ts: None,
        }
    }

    #[test]
    fn pagination_clamps() {
        assert_eq!(
            paginate(25, 5, 10),
            Page {
                index: 2,
                count: 3,
                start: 20,
                end: 25
            }
        );
        let empty = paginate(0, 3, 10);
        assert_eq!((empty.index, empty.count, empty.start, empty.end), (0, 1, 0, 0));
        assert!(!empty.has_prev() && !empty.has_next());
        let first = paginate(11, 0, 10);
        assert!(first.has_next() && !first.has_prev());
    }

    #[test]
    fn task_block_escapes_and_falls_back_to_dept() {
        let block = task_block(&task(4, "<fix> & test", None));
        assert!(block.contains("<b>#4</b> — &lt;fix&gt; &amp; test"));
        assert!(block.contains(Dept::Cameras.label()));
        assert!(block.contains("Friday"));
        assert!(block.contains("In progress"));

        let block = task_block(&task(5, "x", Some("ali")));
        assert!(block.contains("@ali"));
    }

    #[test]
    fn empty_lists_use_placeholder() {
        assert_eq!(all_tasks(&[]), vec!["No tasks yet.".to_owned()]);
        assert_eq!(archived_tasks(&[], true), vec!["Nothing archived.".to_owned()]);
    }

    #[test]
    fn long_lists_are_split() {
        let tasks: Vec<Task> = (0..200).map(|i| task(i, "a fairly long task title", Some("ali"))).collect();
        let messages = incomplete_tasks(&tasks);
        assert!(messages.len() > 1);
        assert!(messages.iter().all(|m| m.len() <= MESSAGE_LIMIT));
        assert!(messages[0].starts_with("⏳ <b>Not done (200)</b>"));
        let blocks: usize = messages.iter().map(|m| m.matches("<b>#").count()).sum();
        assert_eq!(blocks, 200);
    }

    fn fits(messages: &[String]) -> bool {
        messages.iter().all(|m| m.len() <= MESSAGE_LIMIT)
    }

    #[test]
    fn oversized_titles_stay_within_limits() {
        let huge = task(1, &"x".repeat(4050), Some("ali"));
        let messages = all_tasks(&[huge.clone(), task(2, "short", None)]);
        assert!(fits(&messages));
        assert!(messages[0].starts_with("📋 <b>All tasks (latest 200)</b>\n<b>#1</b>"));
        assert!(messages.iter().any(|m| m.contains("<b>#2</b>")));

        let card = new_task(&huge);
        assert!(card.chars().count() <= MESSAGE_LIMIT);
        assert!(card.contains('…'));

        // worst case: every capped field made of characters that escape to six bytes
        let mut quoted = task(3, &"\"".repeat(5000), Some("ali"));
        quoted.due_text = Some("\"".repeat(5000));
        quoted.status = "\"".repeat(5000);
        assert!(task_block(&quoted).len() <= MESSAGE_LIMIT);
        assert!(fits(&my_open_tasks(&[quoted.clone(), quoted])));
    }

    #[test]
    fn clip_counts_characters() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdef", 4), "abc…");
        assert_eq!(clip("ملاحظة", 3), "مل…");
    }

    #[test]
    fn busy_report_is_split() {
        let done: Vec<Task> = (0..300).map(|i| task(i, &"t".repeat(200), Some("ali"))).collect();
        let report = daily_report(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), &done, &[]);
        assert!(report.len() > 1);
        assert!(fits(&report));
        assert!(report[0].starts_with("🗓 Daily report — 2024-05-01\n\n✅ Done:"));
    }

    #[test]
    fn report_groups_by_assignee() {
        let done = vec![task(1, "a", Some("ali")), task(2, "b", Some("ali")), task(3, "c", None)];
        let report = daily_report(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), &done, &[]).join("\n");
        assert!(report.starts_with("🗓 Daily report — 2024-05-01"));
        assert_eq!(report.matches("• @ali:").count(), 1);
        assert!(report.contains("• no name:\n   - #3 c"));
        assert!(report.ends_with("⏳ Not done (created today):\n• nothing"));
    }

    #[test]
    fn user_tasks_page_lists_slice() {
        let tasks: Vec<Task> = (1..=12).map(|i| task(i, "t", None)).collect();
        let page = paginate(tasks.len(), 1, PAGE_SIZE);
        let text = user_tasks_page(&tasks, page);
        assert!(text.starts_with("🧾 Employee tasks (page 2/2)"));
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("#11 • t • in_progress • Friday"));
    }
}
