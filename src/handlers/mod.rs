use teloxide::{
    prelude::*,
    types::{ParseMode, User},
    RequestError,
};

use crate::{config::Config, db::Database, model::Role};

mod admin;
mod member;
mod registration;
mod staff;
mod states;
mod tasks;

pub use states::{schema, State};
use states::HandlerResult;

/// Private chats share the user's id.
pub(crate) fn user_id(user: &User) -> i64 {
    user.id.0 as i64
}

/// `@username` if set, otherwise the full name.
pub(crate) fn who(user: &User) -> String {
    match user.username.as_deref() {
        Some(u) if !u.is_empty() => format!("@{u}"),
        _ => user.full_name(),
    }
}

pub(crate) fn callback_chat(q: &CallbackQuery) -> ChatId {
    q.message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or_else(|| q.from.id.into())
}

/// The configured admin username, or anyone whose stored role is admin.
pub(crate) async fn is_admin(db: &Database, config: &Config, user: &User) -> Result<bool, sqlx::Error> {
    if config.is_admin_username(user.username.as_deref()) {
        return Ok(true);
    }
    Ok(db
        .user(user_id(user))
        .await?
        .is_some_and(|u| u.role() == Role::Admin))
}

/// Admin or the task's assignee.
pub(crate) async fn owner_or_admin(
    db: &Database,
    config: &Config,
    user: &User,
    task: i64,
) -> Result<bool, sqlx::Error> {
    if is_admin(db, config, user).await? {
        return Ok(true);
    }
    Ok(db.assignee_of(task).await? == Some(user_id(user)))
}

pub(crate) async fn send_html(bot: &Bot, chat: ChatId, text: impl Into<String>) -> Result<Message, RequestError> {
    bot.send_message(chat, text).parse_mode(ParseMode::Html).await
}

pub(crate) async fn send_all(bot: &Bot, chat: ChatId, messages: Vec<String>) -> HandlerResult {
    for text in messages {
        send_html(bot, chat, text).await?;
    }
    Ok(())
}

/// Trimmed `text`, if it has at least `min` characters.
pub(crate) fn at_least(text: &str, min: usize) -> Option<&str> {
    let text = text.trim();
    (text.chars().count() >= min).then_some(text)
}

pub(crate) fn parse_task_id(arg: &str) -> Option<i64> {
    arg.split_whitespace().next()?.trim_start_matches('#').parse().ok()
}
