use std::{fmt, str::FromStr};

use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

use crate::{
    model::{Dept, Role, Task, TaskStatus, User},
    render::{self, Page, PAGE_SIZE},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Add,
    All,
    Incomplete,
    Completed,
    RemindPending,
    Archives,
    ArchivesMine,
    ArchivesAll,
    Users,
    Diag,
    Manage,
    Back,
}

impl AdminAction {
    fn key(self) -> &'static str {
        use AdminAction::*;
        match self {
            Add => "add",
            All => "all",
            Incomplete => "incomplete",
            Completed => "completed",
            RemindPending => "remind_pending",
            Archives => "archives",
            ArchivesMine => "archives:self",
            ArchivesAll => "archives:all",
            Users => "users",
            Diag => "diag",
            Manage => "manage",
            Back => "back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    User,
    Dept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsersAction {
    ListPage(usize),
    Open(i64),
    SetDept(i64),
    SetDeptTo(i64, Dept),
    SetTitle(i64),
    SetRole(i64),
    SetRoleTo(i64, Role),
    Delete(i64),
    Tasks(i64, usize),
    DeleteTask(i64),
    Reassign { task: i64, page: usize },
    ReassignTo { task: i64, to: i64 },
    ReassignAll { from: i64, page: usize },
    ReassignAllTo { from: i64, to: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageAction {
    Remind,
    Archive,
    Unarchive,
    Delete,
    Restore,
}

impl ManageAction {
    fn key(self) -> &'static str {
        match self {
            ManageAction::Remind => "remind",
            ManageAction::Archive => "archive",
            ManageAction::Unarchive => "unarchive",
            ManageAction::Delete => "del",
            ManageAction::Restore => "restore",
        }
    }
}

/// Payload carried in inline button callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RegisterDept(Dept),
    Ack(i64),
    SetStatus(TaskStatus, i64),
    Reason(i64),
    Admin(AdminAction),
    AddDestination(Destination),
    AddDept(Dept),
    Users(UsersAction),
    Manage(ManageAction, i64),
}

impl Action {
    /// Everything except the registration and assignee task buttons.
    pub fn needs_admin(&self) -> bool {
        !matches!(
            self,
            Action::RegisterDept(_) | Action::Ack(_) | Action::SetStatus(..) | Action::Reason(_)
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use UsersAction::*;
        match *self {
            Action::RegisterDept(d) => write!(f, "reg:dept:{d}"),
            Action::Ack(id) => write!(f, "ack:{id}"),
            Action::SetStatus(st, id) => write!(f, "st:{st}:{id}"),
            Action::Reason(id) => write!(f, "reason:{id}"),
            Action::Admin(a) => write!(f, "admin:{}", a.key()),
            Action::AddDestination(Destination::User) => f.write_str("add:dest:user"),
            Action::AddDestination(Destination::Dept) => f.write_str("add:dest:dept"),
            Action::AddDept(d) => write!(f, "add:dept:{d}"),
            Action::Manage(op, id) => write!(f, "manage:{}:{id}", op.key()),
            Action::Users(u) => match u {
                ListPage(p) => write!(f, "users:page:{p}"),
                Open(c) => write!(f, "users:open:{c}"),
                SetDept(c) => write!(f, "users:setdept:{c}"),
                SetDeptTo(c, d) => write!(f, "users:setdeptchoose:{c}:{d}"),
                SetTitle(c) => write!(f, "users:settitle:{c}"),
                SetRole(c) => write!(f, "users:setrole:{c}"),
                SetRoleTo(c, r) => write!(f, "users:setrolechoose:{c}:{}", r.as_str()),
                Delete(c) => write!(f, "users:del:{c}"),
                Tasks(c, p) => write!(f, "users:tasks:{c}:{p}"),
                DeleteTask(t) => write!(f, "users:deltask:{t}"),
                Reassign { task, page } => write!(f, "users:reassign:{task}:{page}"),
                ReassignTo { task, to } => write!(f, "users:pickto:{task}:{to}"),
                ReassignAll { from, page } => write!(f, "users:reassignall:{from}:{page}"),
                ReassignAllTo { from, to } => write!(f, "users:pickallto:{from}:{to}"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAction(pub String);

impl fmt::Display for InvalidAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid callback data: {}", self.0)
    }
}

impl std::error::Error for InvalidAction {}

impl FromStr for Action {
    type Err = InvalidAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidAction(s.to_owned());
        let parts: Vec<&str> = s.split(':').collect();
        let num = |i: usize| -> Result<i64, InvalidAction> {
            parts.get(i).and_then(|p| p.parse().ok()).ok_or_else(invalid)
        };
        let page = |i: usize| -> Result<usize, InvalidAction> {
            parts.get(i).and_then(|p| p.parse().ok()).ok_or_else(invalid)
        };
        let dept = |i: usize| -> Result<Dept, InvalidAction> {
            parts.get(i).and_then(|p| p.parse().ok()).ok_or_else(invalid)
        };

        use UsersAction::*;
        let action = match parts.as_slice() {
            ["reg", "dept", _] => Action::RegisterDept(dept(2)?),
            ["ack", _] => Action::Ack(num(1)?),
            ["st", status, _] => Action::SetStatus(status.parse::<TaskStatus>().map_err(|_| invalid())?, num(2)?),
            ["reason", _] => Action::Reason(num(1)?),
            ["admin", rest @ ..] => {
                let key = rest.join(":");
                use AdminAction::*;
                let admin = [
                    Add,
                    All,
                    Incomplete,
                    Completed,
                    RemindPending,
                    Archives,
                    ArchivesMine,
                    ArchivesAll,
                    Users,
                    Diag,
                    Manage,
                    Back,
                ]
                .into_iter()
                .find(|a| a.key() == key)
                .ok_or_else(invalid)?;
                Action::Admin(admin)
            }
            ["add", "dest", "user"] => Action::AddDestination(Destination::User),
            ["add", "dest", "dept"] => Action::AddDestination(Destination::Dept),
            ["add", "dept", _] => Action::AddDept(dept(2)?),
            ["manage", op, _] => {
                let op = [
                    ManageAction::Remind,
                    ManageAction::Archive,
                    ManageAction::Unarchive,
                    ManageAction::Delete,
                    ManageAction::Restore,
                ]
                .into_iter()
                .find(|a| a.key() == *op)
                .ok_or_else(invalid)?;
                Action::Manage(op, num(2)?)
            }
            ["users", op, ..] => Action::Users(match (*op, parts.len()) {
                ("page", 3) => ListPage(page(2)?),
                ("open", 3) => Open(num(2)?),
                ("setdept", 3) => SetDept(num(2)?),
                ("setdeptchoose", 4) => SetDeptTo(num(2)?, dept(3)?),
                ("settitle", 3) => SetTitle(num(2)?),
                ("setrole", 3) => SetRole(num(2)?),
                ("setrolechoose", 4) => SetRoleTo(num(2)?, parts[3].parse::<Role>().map_err(|_| invalid())?),
                ("del", 3) => Delete(num(2)?),
                ("tasks", 4) => Tasks(num(2)?, page(3)?),
                ("deltask", 3) => DeleteTask(num(2)?),
                ("reassign", 4) => Reassign {
                    task: num(2)?,
                    page: page(3)?,
                },
                ("pickto", 4) => ReassignTo {
                    task: num(2)?,
                    to: num(3)?,
                },
                ("reassignall", 4) => ReassignAll {
                    from: num(2)?,
                    page: page(3)?,
                },
                ("pickallto", 4) => ReassignAllTo {
                    from: num(2)?,
                    to: num(3)?,
                },
                _ => return Err(invalid()),
            }),
            _ => return Err(invalid()),
        };
        Ok(action)
    }
}

fn button(text: impl Into<String>, action: Action) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.to_string())
}

fn nav_row(page: Page, to: impl Fn(usize) -> Action) -> Option<Vec<InlineKeyboardButton>> {
    let mut row = Vec::new();
    if page.has_prev() {
        row.push(button("« Previous", to(page.index - 1)));
    }
    if page.has_next() {
        row.push(button("Next »", to(page.index + 1)));
    }
    (!row.is_empty()).then_some(row)
}

pub fn task_controls(task: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("📥 Received", Action::Ack(task))],
        vec![
            button("🚀 In progress", Action::SetStatus(TaskStatus::InProgress, task)),
            button("🏁 Finish task ✅", Action::SetStatus(TaskStatus::Done, task)),
        ],
        vec![button("❗️ Can't complete", Action::Reason(task))],
    ])
}

pub fn admin_menu() -> InlineKeyboardMarkup {
    use AdminAction::*;
    let b = |text: &str, a| button(text, Action::Admin(a));
    InlineKeyboardMarkup::new(vec![
        vec![b("🧩 Add task", Add), b("📋 All tasks", All)],
        vec![b("⏳ Not done", Incomplete), b("✅ Done", Completed)],
        vec![b("🔔 Remind pending", RemindPending), b("📦 Archive", Archives)],
        vec![b("👥 Staff", Users), b("🧪 Diagnostics", Diag)],
        vec![b("🛠 Manage task by id", Manage)],
    ])
}

pub fn archive_scope() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("My archive", Action::Admin(AdminAction::ArchivesMine)),
        button("Whole archive", Action::Admin(AdminAction::ArchivesAll)),
    ]])
}

pub fn dept_picker(to: impl Fn(Dept) -> Action) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(Dept::ALL.map(|d| vec![button(d.label(), to(d))]))
}

pub fn add_destination() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(
            "👤 To an employee (@username/@me)",
            Action::AddDestination(Destination::User),
        )],
        vec![button("🏷 To a department", Action::AddDestination(Destination::Dept))],
    ])
}

pub fn share_contact() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new("📱 Share phone number").request(ButtonRequest::Contact)
    ]])
    .resize_keyboard(true)
    .one_time_keyboard(true)
}

pub fn users_page(users: &[User], page: Page) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = users[page.start..page.end]
        .iter()
        .map(|u| {
            vec![button(
                render::user_button_label(u),
                Action::Users(UsersAction::Open(u.chat_id)),
            )]
        })
        .collect();
    rows.extend(nav_row(page, |p| Action::Users(UsersAction::ListPage(p))));
    rows.push(vec![button("⤴️ Back to panel", Action::Admin(AdminAction::Back))]);
    InlineKeyboardMarkup::new(rows)
}

pub fn user_manage(user: i64) -> InlineKeyboardMarkup {
    use UsersAction::*;
    let b = |text: &str, a| vec![button(text, Action::Users(a))];
    InlineKeyboardMarkup::new(vec![
        b("🏷 Change department", SetDept(user)),
        b("📝 Change title", SetTitle(user)),
        b("⭐️ Change role", SetRole(user)),
        b("🧾 Their tasks", Tasks(user, 0)),
        b("🔁 Reassign all their tasks", ReassignAll { from: user, page: 0 }),
        b("🗑 Delete employee", Delete(user)),
        vec![button("⤴️ Back to list", Action::Admin(AdminAction::Users))],
    ])
}

pub fn role_picker(user: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(
            "Member",
            Action::Users(UsersAction::SetRoleTo(user, Role::Member)),
        )],
        vec![button(
            "Admin",
            Action::Users(UsersAction::SetRoleTo(user, Role::Admin)),
        )],
    ])
}

pub fn user_tasks(user: i64, tasks: &[Task], page: Page) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = tasks[page.start..page.end]
        .iter()
        .map(|t| {
            vec![
                button(format!("🗑 Delete #{}", t.id), Action::Users(UsersAction::DeleteTask(t.id))),
                button(
                    format!("🔁 Reassign #{}", t.id),
                    Action::Users(UsersAction::Reassign { task: t.id, page: 0 }),
                ),
            ]
        })
        .collect();
    rows.extend(nav_row(page, |p| Action::Users(UsersAction::Tasks(user, p))));
    rows.push(vec![button(
        "⤴️ Back to employee",
        Action::Users(UsersAction::Open(user)),
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// What a reassignment target list applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassignScope {
    Task(i64),
    AllFrom(i64),
}

impl ReassignScope {
    fn pick(self, to: i64) -> Action {
        Action::Users(match self {
            ReassignScope::Task(task) => UsersAction::ReassignTo { task, to },
            ReassignScope::AllFrom(from) => UsersAction::ReassignAllTo { from, to },
        })
    }

    fn page(self, page: usize) -> Action {
        Action::Users(match self {
            ReassignScope::Task(task) => UsersAction::Reassign { task, page },
            ReassignScope::AllFrom(from) => UsersAction::ReassignAll { from, page },
        })
    }
}

/// `users` must already exclude the source employee for `AllFrom`.
pub fn reassign_targets(users: &[User], scope: ReassignScope, page: Page) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = users[page.start..page.end]
        .iter()
        .map(|u| {
            let label = format!(
                "{} (@{})",
                u.full_name.as_deref().unwrap_or("no name"),
                u.username.as_deref().filter(|n| !n.is_empty()).unwrap_or("-")
            );
            vec![button(label.chars().take(60).collect::<String>(), scope.pick(u.chat_id))]
        })
        .collect();
    rows.extend(nav_row(page, |p| scope.page(p)));
    rows.push(vec![button("⤴️ Back", Action::Admin(AdminAction::Users))]);
    InlineKeyboardMarkup::new(rows)
}

pub fn manage_task(task: i64) -> InlineKeyboardMarkup {
    use ManageAction::*;
    let b = |text: &str, op| button(text, Action::Manage(op, task));
    InlineKeyboardMarkup::new(vec![
        vec![b("🔔 Remind", Remind), b("📦 Archive", Archive)],
        vec![b("📦 Unarchive", Unarchive)],
        vec![b("🗑 Soft delete", Delete), b("♻️ Restore", Restore)],
    ])
}

pub fn paged(total: usize, page: usize) -> Page {
    render::paginate(total, page, PAGE_SIZE)
}
