use teloxide::{
    prelude::*,
    types::{KeyboardRemove, User},
};

use super::{
    at_least, callback_chat, is_admin, member,
    states::{HandlerResult, MyDialogue, State},
    user_id,
};
use crate::{
    config::Config,
    db::Database,
    keyboards::{self, Action},
    model::{Dept, Role},
};

const MIN_TITLE_LEN: usize = 2;

/// Job titles, typed by the employee or set by an admin.
pub(crate) fn valid_job_title(text: &str) -> Option<&str> {
    at_least(text, MIN_TITLE_LEN)
}

/// `/skip` only means something while the phone number is being asked for.
fn can_skip(state: Option<&State>) -> bool {
    matches!(state, Some(State::AwaitingPhone))
}

async fn ensure(db: &Database, config: &Config, user: &User) -> Result<(), sqlx::Error> {
    let role = if config.is_admin_username(user.username.as_deref()) {
        Role::Admin
    } else {
        Role::Member
    };
    db.ensure_user(user_id(user), &user.full_name(), user.username.as_deref(), role)
        .await
}

pub async fn start(
    bot: &Bot,
    msg: &Message,
    user: &User,
    dialogue: &MyDialogue,
    db: &Database,
    config: &Config,
) -> HandlerResult {
    ensure(db, config, user).await?;
    dialogue.exit().await?;

    if db.is_registered(user_id(user)).await? {
        if is_admin(db, config, user).await? {
            bot.send_message(msg.chat.id, "Admin panel:")
                .reply_markup(keyboards::admin_menu())
                .await?;
        } else {
            bot.send_message(msg.chat.id, "🎉 Ready!\n• /mytasks — your tasks 👀")
                .await?;
        }
        return Ok(());
    }

    bot.send_message(
        msg.chat.id,
        format!(
            "Hi {}! 😄 Let's finish your registration:\n\
             1) pick your department\n2) type your job title\n3) (optional) share your phone",
            user.full_name()
        ),
    )
    .await?;
    bot.send_message(msg.chat.id, "Pick your department 👇")
        .reply_markup(keyboards::dept_picker(Action::RegisterDept))
        .await?;
    Ok(())
}

pub async fn dept_chosen(
    bot: &Bot,
    q: &CallbackQuery,
    dept: Dept,
    dialogue: &MyDialogue,
    db: &Database,
    config: &Config,
) -> HandlerResult {
    ensure(db, config, &q.from).await?;
    db.set_dept(user_id(&q.from), dept).await?;
    bot.send_message(
        callback_chat(q),
        format!("✅ You chose: {}\nNow type your job title.", dept.label()),
    )
    .await?;
    dialogue.update(State::AwaitingJobTitle).await?;
    Ok(())
}

pub async fn job_title(bot: Bot, msg: Message, dialogue: MyDialogue, db: Database) -> HandlerResult {
    let Some(title) = msg.text().and_then(valid_job_title) else {
        bot.send_message(msg.chat.id, "Please type a clear job title 💪.").await?;
        return Ok(());
    };
    let Some(user) = msg.from() else {
        return Ok(());
    };

    db.set_title(user_id(user), title).await?;
    bot.send_message(
        msg.chat.id,
        "Great ✅ If you like, share your number with the button (optional) or /skip.",
    )
    .reply_markup(keyboards::share_contact())
    .await?;
    dialogue.update(State::AwaitingPhone).await?;
    Ok(())
}

pub async fn contact(bot: Bot, msg: Message, dialogue: MyDialogue, db: Database) -> HandlerResult {
    let (Some(user), Some(contact)) = (msg.from(), msg.contact()) else {
        return Ok(());
    };
    db.set_phone(user_id(user), &contact.phone_number).await?;
    finish(&bot, msg.chat.id, user_id(user), &dialogue, &db).await
}

pub async fn skip(bot: &Bot, chat: ChatId, dialogue: &MyDialogue, db: &Database) -> HandlerResult {
    if can_skip(dialogue.get().await?.as_ref()) {
        return finish(bot, chat, chat.0, dialogue, db).await;
    }
    bot.send_message(chat, "Nothing to skip.").await?;
    Ok(())
}

async fn finish(bot: &Bot, chat: ChatId, user: i64, dialogue: &MyDialogue, db: &Database) -> HandlerResult {
    dialogue.exit().await?;
    bot.send_message(chat, "🎫 You're all set! Here are your tasks 👇")
        .reply_markup(KeyboardRemove::new())
        .await?;
    member::send_my_tasks(bot, chat, user, db).await
}
