use chrono::Utc;
use teloxide::prelude::*;

use super::{
    callback_chat, send_all, send_html, staff,
    states::{Assignment, HandlerResult, MyDialogue, State},
    user_id,
};
use crate::{
    db::Database,
    keyboards::{self, Action, AdminAction, Destination},
    model::{parse_due, Dept, NewTask, MAX_TASK_TITLE},
    notify::{self, NotifyFailure},
    render,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    All,
    Incomplete,
    Completed,
}

pub async fn send_menu(bot: &Bot, chat: ChatId) -> HandlerResult {
    bot.send_message(chat, "Admin panel:")
        .reply_markup(keyboards::admin_menu())
        .await?;
    Ok(())
}

pub async fn send_list(bot: &Bot, chat: ChatId, listing: Listing, db: &Database) -> HandlerResult {
    let messages = match listing {
        Listing::All => render::all_tasks(&db.all_tasks().await?),
        Listing::Incomplete => render::incomplete_tasks(&db.incomplete_tasks().await?),
        Listing::Completed => render::completed_tasks(&db.completed_tasks().await?),
    };
    send_all(bot, chat, messages).await
}

/// Archived tasks of `owner`, or everyone's when `None`.
pub async fn send_archive(bot: &Bot, chat: ChatId, owner: Option<i64>, db: &Database) -> HandlerResult {
    let tasks = db.archived_tasks(owner).await?;
    send_all(bot, chat, render::archived_tasks(&tasks, owner.is_none())).await
}

pub async fn remind_pending(bot: &Bot, chat: ChatId, db: &Database) -> HandlerResult {
    let tasks = db.pending_tasks().await?;
    if tasks.is_empty() {
        bot.send_message(chat, "No tasks need a reminder 👌").await?;
        return Ok(());
    }

    let mut sent = 0;
    let mut failed = 0;
    for task in &tasks {
        match notify::send_task(bot, task).await {
            Ok(()) => sent += 1,
            Err(_) => failed += 1,
        }
    }
    log::info!("reminded {sent} pending tasks, {failed} failed");

    let mut text = format!("🔔 Re-sent {sent} task notification(s).");
    if failed > 0 {
        text.push_str(&format!(
            "\n⚠️ {failed} reminder(s) failed (the user hasn't started the bot or blocked it)."
        ));
    }
    bot.send_message(chat, text).await?;
    Ok(())
}

pub async fn on_menu(
    bot: &Bot,
    q: &CallbackQuery,
    action: AdminAction,
    dialogue: &MyDialogue,
    db: &Database,
) -> HandlerResult {
    let chat = callback_chat(q);
    match action {
        AdminAction::Add => start_add(bot, chat, dialogue).await?,
        AdminAction::All => send_list(bot, chat, Listing::All, db).await?,
        AdminAction::Incomplete => send_list(bot, chat, Listing::Incomplete, db).await?,
        AdminAction::Completed => send_list(bot, chat, Listing::Completed, db).await?,
        AdminAction::RemindPending => remind_pending(bot, chat, db).await?,
        AdminAction::Archives => {
            bot.send_message(chat, "Choose:")
                .reply_markup(keyboards::archive_scope())
                .await?;
        }
        AdminAction::ArchivesMine => send_archive(bot, chat, Some(user_id(&q.from)), db).await?,
        AdminAction::ArchivesAll => send_archive(bot, chat, None, db).await?,
        AdminAction::Users => staff::send_list(bot, chat, db).await?,
        AdminAction::Diag => {
            send_html(bot, chat, render::diagnostics(&db.stats().await?)).await?;
        }
        AdminAction::Manage => {
            dialogue.update(State::AwaitingManageId).await?;
            bot.send_message(
                chat,
                "Send the task id to manage (remind/archive/delete/restore).",
            )
            .await?;
        }
        AdminAction::Back => send_menu(bot, chat).await?,
    }
    Ok(())
}

pub async fn start_add(bot: &Bot, chat: ChatId, dialogue: &MyDialogue) -> HandlerResult {
    dialogue.update(State::AddTitle).await?;
    bot.send_message(chat, "🎯 Task title? Type it ✍️").await?;
    Ok(())
}

/// The trimmed title, or the reply explaining why it was refused.
fn valid_task_title(text: &str) -> Result<&str, String> {
    let title = text.trim();
    if title.is_empty() {
        return Err("Please type the task title.".to_owned());
    }
    if title.chars().count() > MAX_TASK_TITLE {
        return Err(format!(
            "The title is too long, keep it under {MAX_TASK_TITLE} characters."
        ));
    }
    Ok(title)
}

pub async fn add_title(bot: Bot, msg: Message, dialogue: MyDialogue) -> HandlerResult {
    let title = match valid_task_title(msg.text().unwrap_or_default()) {
        Ok(title) => title,
        Err(why) => {
            bot.send_message(msg.chat.id, why).await?;
            return Ok(());
        }
    };
    dialogue
        .update(State::AddDestination {
            title: title.to_owned(),
        })
        .await?;
    bot.send_message(msg.chat.id, "Choose who gets it:")
        .reply_markup(keyboards::add_destination())
        .await?;
    Ok(())
}

fn pending_title(state: Option<State>) -> Option<String> {
    match state? {
        State::AddDestination { title } | State::AddAssignee { title } | State::AddDept { title } => Some(title),
        _ => None,
    }
}

pub async fn on_destination(bot: &Bot, chat: ChatId, dest: Destination, dialogue: &MyDialogue) -> HandlerResult {
    let Some(title) = pending_title(dialogue.get().await?) else {
        bot.send_message(chat, "⚠️ No task in progress. Send /add to start again.")
            .await?;
        return Ok(());
    };
    match dest {
        Destination::User => {
            dialogue.update(State::AddAssignee { title }).await?;
            bot.send_message(chat, "Type @username, @me, or part of the employee's name:")
                .await?;
        }
        Destination::Dept => {
            dialogue.update(State::AddDept { title }).await?;
            bot.send_message(chat, "Choose the department:")
                .reply_markup(keyboards::dept_picker(Action::AddDept))
                .await?;
        }
    }
    Ok(())
}

pub async fn on_dept(bot: &Bot, chat: ChatId, dept: Dept, dialogue: &MyDialogue) -> HandlerResult {
    let Some(title) = pending_title(dialogue.get().await?) else {
        bot.send_message(chat, "⚠️ No task in progress. Send /add to start again.")
            .await?;
        return Ok(());
    };
    dialogue
        .update(State::AddDue {
            title,
            target: Assignment::Dept(dept),
        })
        .await?;
    bot.send_message(chat, "🗓 Due date (free text, or +2h / +1d / 2024-05-01):")
        .await?;
    Ok(())
}

/// `@me`/`me`, `@username`, or a fragment of the full name.
async fn resolve_assignee(db: &Database, sender: i64, input: &str) -> Result<Option<i64>, sqlx::Error> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("@me") || input.eq_ignore_ascii_case("me") {
        return Ok(Some(sender));
    }
    match input.strip_prefix('@') {
        Some(username) => db.find_by_username(username).await,
        None => db.find_by_name(input).await,
    }
}

pub async fn add_assignee(bot: Bot, msg: Message, dialogue: MyDialogue, title: String, db: Database) -> HandlerResult {
    let (Some(text), Some(sender)) = (msg.text(), msg.from()) else {
        return Ok(());
    };
    let Some(assignee) = resolve_assignee(&db, user_id(sender), text).await? else {
        bot.send_message(msg.chat.id, "❗️ Employee not found. Try again or /cancel.")
            .await?;
        return Ok(());
    };
    dialogue
        .update(State::AddDue {
            title,
            target: Assignment::User(assignee),
        })
        .await?;
    bot.send_message(msg.chat.id, "🗓 Due date (free text, or +2h / +1d / 2024-05-01):")
        .await?;
    Ok(())
}

pub async fn add_due(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    (title, target): (String, Assignment),
    db: Database,
) -> HandlerResult {
    let Some(sender) = msg.from() else {
        return Ok(());
    };
    let due = msg.text().map(str::trim).unwrap_or_default();
    dialogue.exit().await?;

    let (dept, recipients) = match target {
        Assignment::User(chat) => (None, vec![chat]),
        Assignment::Dept(dept) => (Some(dept), db.dept_members(dept).await?),
    };
    if recipients.is_empty() {
        bot.send_message(
            msg.chat.id,
            "The department has no registered employees. Ask them to send /start.",
        )
        .await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, "⏳ Creating tasks and sending notifications…")
        .await?;

    let due_ts = parse_due(due, Utc::now());
    let mut created = 0;
    let mut failed: Vec<(i64, NotifyFailure)> = Vec::new();
    for assignee in recipients {
        let id = db
            .create_task(&NewTask {
                title: &title,
                dept,
                assignee_chat_id: assignee,
                due_ts,
                due_text: due,
                created_by: user_id(sender),
            })
            .await?;
        created += 1;
        log::info!("task #{id} created for {assignee}");

        let Some(task) = db.task(id).await? else {
            continue;
        };
        if let Err(why) = notify::send_task(&bot, &task).await {
            failed.push((assignee, why));
        }
    }

    let text = if failed.is_empty() {
        format!("✅ Created {created} task(s) and notified everyone.")
    } else {
        let mut names = Vec::with_capacity(failed.len());
        for (chat, why) in &failed {
            let name = match db.user(*chat).await? {
                Some(u) => u.display_name(),
                None => chat.to_string(),
            };
            names.push(format!("{name} ({why})"));
        }
        format!(
            "✅ Created {created} task(s).\n⚠️ Couldn't notify: {}",
            names.join(", ")
        )
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[test]
    fn only_add_states_carry_a_title() {
        assert_eq!(
            pending_title(Some(State::AddDept { title: "x".into() })),
            Some("x".to_owned())
        );
        assert_eq!(pending_title(Some(State::AddTitle)), None);
        assert_eq!(pending_title(None), None);
    }

    #[test]
    fn task_titles_are_bounded() {
        assert_eq!(valid_task_title("  Fix inverter "), Ok("Fix inverter"));
        assert!(valid_task_title(" \n ").is_err());
        let longest = "x".repeat(MAX_TASK_TITLE);
        assert_eq!(valid_task_title(&longest), Ok(longest.as_str()));
        assert!(valid_task_title(&"x".repeat(MAX_TASK_TITLE + 1)).is_err());
    }

    #[tokio::test]
    async fn resolves_assignees() {
        let db = Database::in_memory().await.unwrap();
        db.ensure_user(5, "Huda Salim", Some("huda"), Role::Member).await.unwrap();

        assert_eq!(resolve_assignee(&db, 1, "@me").await.unwrap(), Some(1));
        assert_eq!(resolve_assignee(&db, 1, " Me ").await.unwrap(), Some(1));
        assert_eq!(resolve_assignee(&db, 1, "@Huda").await.unwrap(), Some(5));
        assert_eq!(resolve_assignee(&db, 1, "Salim").await.unwrap(), Some(5));
        assert_eq!(resolve_assignee(&db, 1, "@nobody").await.unwrap(), None);
    }
}
