use std::sync::Arc;

use teloxide::{prelude::*, types::User};

use super::{
    admin, is_admin, owner_or_admin, parse_task_id,
    states::{HandlerResult, MyDialogue},
    user_id,
};
use crate::{
    config::Config,
    db::{Database, DeleteOutcome},
    keyboards::{self, ManageAction},
    notify,
};

/// Operations on a single task addressed by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Remind,
    Archive,
    Unarchive,
    Delete,
    Restore,
}

impl Op {
    fn command(self) -> &'static str {
        match self {
            Op::Remind => "remind",
            Op::Archive => "archive",
            Op::Unarchive => "unarchive",
            Op::Delete => "del",
            Op::Restore => "restore",
        }
    }
}

impl From<ManageAction> for Op {
    fn from(action: ManageAction) -> Self {
        match action {
            ManageAction::Remind => Op::Remind,
            ManageAction::Archive => Op::Archive,
            ManageAction::Unarchive => Op::Unarchive,
            ManageAction::Delete => Op::Delete,
            ManageAction::Restore => Op::Restore,
        }
    }
}

pub async fn command(
    bot: &Bot,
    chat: ChatId,
    user: &User,
    op: Op,
    arg: &str,
    db: &Database,
    config: &Config,
) -> HandlerResult {
    if arg.is_empty() {
        bot.send_message(chat, format!("Usage: /{} <task id>", op.command()))
            .await?;
        return Ok(());
    }
    let Some(task) = parse_task_id(arg) else {
        bot.send_message(chat, "Invalid task id.").await?;
        return Ok(());
    };
    perform(bot, chat, user, op, task, db, config).await
}

pub async fn perform(
    bot: &Bot,
    chat: ChatId,
    user: &User,
    op: Op,
    task: i64,
    db: &Database,
    config: &Config,
) -> HandlerResult {
    if !owner_or_admin(db, config, user, task).await? {
        bot.send_message(chat, "You have no rights over this task.").await?;
        return Ok(());
    }

    let text = match op {
        Op::Remind => match db.active_task(task).await? {
            None => format!("Task #{task} not found (it may be deleted or archived)."),
            Some(t) => match notify::send_task(bot, &t).await {
                Ok(()) => "🔔 Notification re-sent.".to_owned(),
                Err(why) => format!("⚠️ Couldn't notify ({why})."),
            },
        },
        Op::Archive => {
            if db.archive(task).await? {
                "📦 Archived.".to_owned()
            } else {
                "Not archived (the task may be deleted).".to_owned()
            }
        }
        Op::Unarchive => {
            if db.unarchive(task).await? {
                "📦 Removed from the archive.".to_owned()
            } else {
                "Nothing changed.".to_owned()
            }
        }
        Op::Delete => match db.soft_delete(task).await? {
            DeleteOutcome::Deleted => "🗑 Soft-deleted.".to_owned(),
            DeleteOutcome::AlreadyDeleted => "The task is already deleted.".to_owned(),
            DeleteOutcome::NotFound => "The task doesn't exist.".to_owned(),
        },
        Op::Restore => {
            if db.restore(task).await? {
                "♻️ Restored.".to_owned()
            } else {
                "The task isn't deleted.".to_owned()
            }
        }
    };
    log::info!("{:?} on #{task} by {}", op, user.id);
    bot.send_message(chat, text).await?;
    Ok(())
}

pub async fn archives(
    bot: &Bot,
    chat: ChatId,
    user: &User,
    arg: &str,
    db: &Database,
    config: &Config,
) -> HandlerResult {
    let everyone = arg
        .split_whitespace()
        .next()
        .is_some_and(|a| a.eq_ignore_ascii_case("all"));
    if everyone && !is_admin(db, config, user).await? {
        bot.send_message(chat, "Only the admin can see everyone's archive.")
            .await?;
        return Ok(());
    }
    let owner = (!everyone).then(|| user_id(user));
    admin::send_archive(bot, chat, owner, db).await
}

pub async fn manage_id(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
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
    let Some(task) = msg.text().and_then(parse_task_id) else {
        bot.send_message(msg.chat.id, "Send a valid task number, or /cancel.")
            .await?;
        return Ok(());
    };
    dialogue.exit().await?;
    bot.send_message(msg.chat.id, format!("Choose an action for task #{task}:"))
        .reply_markup(keyboards::manage_task(task))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manage_buttons_map_onto_ops() {
        assert_eq!(Op::from(ManageAction::Delete), Op::Delete);
        assert_eq!(Op::from(ManageAction::Unarchive).command(), "unarchive");
        assert_eq!(Op::Delete.command(), "del");
    }
}
