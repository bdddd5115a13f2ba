use std::fmt::{self, Display, Formatter};

use futures::future::join_all;
use teloxide::{prelude::*, types::ParseMode, ApiError, RequestError};

use crate::{config::Config, db::Database, keyboards, model::Task, render};

/// Why a task notification didn't reach the assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyFailure {
    /// Blocked the bot or never started it.
    Forbidden,
    BadRequest,
    Other,
}

impl Display for NotifyFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyFailure::Forbidden => "forbidden",
            NotifyFailure::BadRequest => "bad request",
            NotifyFailure::Other => "other",
        })
    }
}

impl From<&RequestError> for NotifyFailure {
    fn from(e: &RequestError) -> Self {
        match e {
            RequestError::Api(
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::UserDeactivated
                | ApiError::CantInitiateConversation,
            ) => NotifyFailure::Forbidden,
            RequestError::Api(_) => NotifyFailure::BadRequest,
            _ => NotifyFailure::Other,
        }
    }
}

/// Sends the new-task card with status controls to the assignee.
pub async fn send_task(bot: &Bot, task: &Task) -> Result<(), NotifyFailure> {
    let Some(chat) = task.assignee_chat_id else {
        return Err(NotifyFailure::BadRequest);
    };
    bot.send_message(ChatId(chat), render::new_task(task))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::task_controls(task.id))
        .await
        .map(|_| ())
        .map_err(|e| {
            let failure = NotifyFailure::from(&e);
            log::warn!("notify {chat} about task #{} failed ({failure}): {e}", task.id);
            failure
        })
}

/// Best-effort message to every admin chat.
pub async fn admins(bot: &Bot, db: &Database, config: &Config, text: &str) {
    let chats = match db.admin_chat_ids(&config.admin_username).await {
        Ok(chats) => chats,
        Err(e) => {
            log::error!("admin lookup failed: {e}");
            return;
        }
    };
    let sends = chats.into_iter().map(|chat| async move {
        if let Err(e) = bot.send_message(ChatId(chat), text).await {
            log::warn!("admin notification to {chat} failed: {e}");
        }
    });
    join_all(sends).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request_errors() {
        assert_eq!(
            NotifyFailure::from(&RequestError::Api(ApiError::BotBlocked)),
            NotifyFailure::Forbidden
        );
        assert_eq!(
            NotifyFailure::from(&RequestError::Api(ApiError::ChatNotFound)),
            NotifyFailure::BadRequest
        );
        assert_eq!(NotifyFailure::Forbidden.to_string(), "forbidden");
    }
}
