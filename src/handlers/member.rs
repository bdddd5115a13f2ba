use std::sync::Arc;

use teloxide::{prelude::*, ApiError, RequestError};

use super::{
    at_least, callback_chat, owner_or_admin, send_all,
    states::{HandlerError, HandlerResult, MyDialogue, State},
    user_id, who,
};
use crate::{
    config::Config,
    db::Database,
    keyboards,
    model::TaskStatus,
    notify, render,
};

const MIN_REASON_LEN: usize = 3;

fn valid_reason(text: &str) -> Option<&str> {
    at_least(text, MIN_REASON_LEN)
}

pub async fn send_my_tasks(bot: &Bot, chat: ChatId, user: i64, db: &Database) -> HandlerResult {
    let tasks = db.my_open_tasks(user).await?;
    send_all(bot, chat, render::my_open_tasks(&tasks)).await
}

/// Replies when the presser may not touch the task; `Ok(false)` means stop.
async fn check_access(
    bot: &Bot,
    q: &CallbackQuery,
    task: i64,
    db: &Database,
    config: &Config,
) -> Result<bool, HandlerError> {
    if db.task(task).await?.is_none() {
        bot.send_message(callback_chat(q), format!("Task #{task} no longer exists."))
            .await?;
        return Ok(false);
    }
    if !owner_or_admin(db, config, &q.from, task).await? {
        bot.send_message(callback_chat(q), "This task isn't assigned to you.")
            .await?;
        return Ok(false);
    }
    Ok(true)
}

pub async fn acknowledge(
    bot: &Bot,
    q: &CallbackQuery,
    task: i64,
    db: &Database,
    config: &Config,
) -> HandlerResult {
    if !check_access(bot, q, task, db, config).await? {
        return Ok(());
    }
    db.acknowledge(task, user_id(&q.from)).await?;
    bot.send_message(callback_chat(q), "📥 Receipt recorded. Thank you 👌")
        .await?;
    notify::admins(
        bot,
        db,
        config,
        &format!("🔔 Confirmation: {} received task #{task} ✅", who(&q.from)),
    )
    .await;
    Ok(())
}

pub async fn set_status(
    bot: &Bot,
    q: &CallbackQuery,
    status: TaskStatus,
    task: i64,
    db: &Database,
    config: &Config,
) -> HandlerResult {
    if !check_access(bot, q, task, db, config).await? {
        return Ok(());
    }
    let chat = callback_chat(q);
    db.set_status(task, status).await?;

    let (reply, admin_text) = match status {
        TaskStatus::Done => (
            format!("🏁 Well done! Task #{task} is finished ✅"),
            format!("🎉 Task completed 👑\nby {} — #{task}", who(&q.from)),
        ),
        TaskStatus::InProgress => (
            format!("🚀 Work started, good luck! (#{task})"),
            format!("🔔 Status of #{task} from {} → {status}", who(&q.from)),
        ),
        _ => (
            format!("👌 Updated. (#{task})"),
            format!("🔔 Status of #{task} from {} → {status}", who(&q.from)),
        ),
    };
    if let Err(e) = bot.send_message(chat, reply).await {
        log::warn!("status reply for #{task} failed: {e}");
    }
    notify::admins(bot, db, config, &admin_text).await;

    refresh_controls(bot, q, task).await;
    Ok(())
}

/// Re-attaches the controls to the pressed message, or sends them anew.
async fn refresh_controls(bot: &Bot, q: &CallbackQuery, task: i64) {
    if let Some(m) = &q.message {
        let edited = bot
            .edit_message_reply_markup(m.chat.id, m.id)
            .reply_markup(keyboards::task_controls(task))
            .await;
        match edited {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => return,
            Err(e) => log::debug!("could not edit controls of #{task}: {e}"),
        }
    }
    let resend = bot
        .send_message(callback_chat(q), format!("Controls for task #{task}:"))
        .reply_markup(keyboards::task_controls(task))
        .await;
    if let Err(e) = resend {
        log::warn!("could not resend controls of #{task}: {e}");
    }
}

pub async fn ask_reason(
    bot: &Bot,
    q: &CallbackQuery,
    task: i64,
    dialogue: &MyDialogue,
    db: &Database,
    config: &Config,
) -> HandlerResult {
    if !check_access(bot, q, task, db, config).await? {
        return Ok(());
    }
    dialogue.update(State::AwaitingReason { task_id: task }).await?;
    bot.send_message(
        callback_chat(q),
        "Now type why the task couldn't be completed…",
    )
    .await?;
    Ok(())
}

pub async fn reason_text(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    task_id: i64,
    db: Database,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(reason) = msg.text().and_then(valid_reason) else {
        bot.send_message(msg.chat.id, "Please give a clear reason.").await?;
        return Ok(());
    };

    dialogue.exit().await?;
    if !db.record_reason(task_id, reason).await? {
        bot.send_message(msg.chat.id, format!("Task #{task_id} no longer exists."))
            .await?;
        return Ok(());
    }
    bot.send_message(msg.chat.id, "Reason recorded and management informed ✅")
        .await?;

    let from = msg.from().map(who).unwrap_or_else(|| "someone".to_owned());
    notify::admins(
        &bot,
        &db,
        &config,
        &format!("📣 Reason #{task_id} wasn't completed, from {from}:\n{reason}"),
    )
    .await;
    Ok(())
}
