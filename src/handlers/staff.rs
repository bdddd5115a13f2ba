use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};

use super::{
    callback_chat, is_admin,
    registration::valid_job_title,
    states::{HandlerResult, MyDialogue, State},
};
use crate::{
    config::Config,
    db::{Database, DeleteOutcome},
    keyboards::{self, Action, ReassignScope, UsersAction},
    notify, render,
};

pub async fn send_list(bot: &Bot, chat: ChatId, db: &Database) -> HandlerResult {
    let users = db.list_users().await?;
    if users.is_empty() {
        bot.send_message(chat, "No registered employees yet.").await?;
        return Ok(());
    }
    let page = keyboards::paged(users.len(), 0);
    bot.send_message(chat, "👥 Employees:")
        .reply_markup(keyboards::users_page(&users, page))
        .await?;
    Ok(())
}

/// Flips the list in place, or sends it anew when the message can't be edited.
async fn turn_page(bot: &Bot, q: &CallbackQuery, page: usize, db: &Database) -> HandlerResult {
    let users = db.list_users().await?;
    let page = keyboards::paged(users.len(), page);
    let markup = keyboards::users_page(&users, page);
    if let Some(m) = &q.message {
        match bot
            .edit_message_reply_markup(m.chat.id, m.id)
            .reply_markup(markup.clone())
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) => log::debug!("could not edit the staff list: {e}"),
        }
    }
    bot.send_message(callback_chat(q), "👥 Employees:")
        .reply_markup(markup)
        .await?;
    Ok(())
}

pub async fn on_action(
    bot: &Bot,
    q: &CallbackQuery,
    action: UsersAction,
    dialogue: &MyDialogue,
    db: &Database,
) -> HandlerResult {
    let chat = callback_chat(q);
    match action {
        UsersAction::ListPage(page) => turn_page(bot, q, page, db).await?,
        UsersAction::Open(user) => {
            let Some(u) = db.user(user).await? else {
                bot.send_message(chat, "Employee not found.").await?;
                return Ok(());
            };
            bot.send_message(chat, render::user_card(&u))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::user_manage(user))
                .await?;
        }
        UsersAction::SetDept(user) => {
            bot.send_message(chat, "Choose the new department:")
                .reply_markup(keyboards::dept_picker(|d| {
                    Action::Users(UsersAction::SetDeptTo(user, d))
                }))
                .await?;
        }
        UsersAction::SetDeptTo(user, dept) => {
            let text = if db.set_dept(user, dept).await? {
                format!("✅ Department changed to {}.", dept.label())
            } else {
                "Employee not found.".to_owned()
            };
            bot.send_message(chat, text).await?;
        }
        UsersAction::SetTitle(user) => {
            dialogue.update(State::AwaitingUserTitle { user_id: user }).await?;
            bot.send_message(chat, "Type the new job title:").await?;
        }
        UsersAction::SetRole(user) => {
            bot.send_message(chat, "Choose the role:")
                .reply_markup(keyboards::role_picker(user))
                .await?;
        }
        UsersAction::SetRoleTo(user, role) => {
            let text = if db.set_role(user, role).await? {
                format!("✅ Role set to {}.", role.as_str())
            } else {
                "Employee not found.".to_owned()
            };
            bot.send_message(chat, text).await?;
        }
        UsersAction::Delete(user) => {
            let text = if db.delete_user(user).await? {
                log::info!("employee {user} deleted by {}", q.from.id);
                "🗑 Employee deleted."
            } else {
                "Employee not found."
            };
            bot.send_message(chat, text).await?;
        }
        UsersAction::Tasks(user, page) => {
            let tasks = db.user_tasks(user).await?;
            if tasks.is_empty() {
                bot.send_message(chat, "This employee has no tasks.").await?;
                return Ok(());
            }
            let page = keyboards::paged(tasks.len(), page);
            bot.send_message(chat, render::user_tasks_page(&tasks, page))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::user_tasks(user, &tasks, page))
                .await?;
        }
        UsersAction::DeleteTask(task) => {
            let text = match db.soft_delete(task).await? {
                DeleteOutcome::Deleted => format!("🗑 Task #{task} deleted (soft)."),
                DeleteOutcome::AlreadyDeleted => format!("Task #{task} is already deleted."),
                DeleteOutcome::NotFound => format!("Task #{task} not found."),
            };
            bot.send_message(chat, text).await?;
        }
        UsersAction::Reassign { task, page } => {
            let users = db.users_by_name().await?;
            let page = keyboards::paged(users.len(), page);
            bot.send_message(chat, format!("Pick the new assignee for #{task}:"))
                .reply_markup(keyboards::reassign_targets(&users, ReassignScope::Task(task), page))
                .await?;
        }
        UsersAction::ReassignAll { from, page } => {
            let users: Vec<_> = db
                .users_by_name()
                .await?
                .into_iter()
                .filter(|u| u.chat_id != from)
                .collect();
            if users.is_empty() {
                bot.send_message(chat, "There is nobody to reassign to.").await?;
                return Ok(());
            }
            let page = keyboards::paged(users.len(), page);
            bot.send_message(chat, "Pick who takes over all their tasks:")
                .reply_markup(keyboards::reassign_targets(
                    &users,
                    ReassignScope::AllFrom(from),
                    page,
                ))
                .await?;
        }
        UsersAction::ReassignTo { task, to } => {
            if !db.reassign(task, to).await? {
                bot.send_message(chat, format!("Task #{task} not found.")).await?;
                return Ok(());
            }
            bot.send_message(chat, format!("🔁 Task #{task} reassigned.")).await?;
            if let Some(t) = db.active_task(task).await? {
                if let Err(why) = notify::send_task(bot, &t).await {
                    bot.send_message(chat, format!("⚠️ Couldn't notify the new assignee ({why})."))
                        .await?;
                }
            }
        }
        UsersAction::ReassignAllTo { from, to } => {
            let moved = db.reassign_all(from, to).await?;
            log::info!("{moved} tasks moved from {from} to {to}");
            bot.send_message(chat, format!("🔁 Moved {moved} task(s).")).await?;
        }
    }
    Ok(())
}

pub async fn title_text(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    user_id: i64,
    db: Database,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(sender) = msg.from() else {
        return Ok(());
    };
    if !is_admin(&db, &config, sender).await? {
        dialogue.exit().await?;
        return Ok(());
    }
    let Some(title) = msg.text().and_then(valid_job_title) else {
        bot.send_message(msg.chat.id, "Please type a longer title.").await?;
        return Ok(());
    };
    dialogue.exit().await?;
    let text = if db.set_title(user_id, title).await? {
        "✅ Title updated."
    } else {
        "Employee not found."
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
