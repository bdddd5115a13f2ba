use std::sync::Arc;

use teloxide::{
    dispatching::{dialogue, dialogue::InMemStorage, UpdateFilterExt, UpdateHandler},
    prelude::*,
    types::Update,
    utils::command::{BotCommands, ParseError},
    Bot,
};

use super::{admin, callback_chat, is_admin, member, registration, staff, tasks, tasks::Op, user_id};
use crate::{
    config::Config,
    db::Database,
    keyboards::Action,
    model::Dept,
};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type HandlerResult = Result<(), HandlerError>;
pub type MyDialogue = Dialogue<State, InMemStorage<State>>;

/// Who a task being created goes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Assignment {
    User(i64),
    Dept(Dept),
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum State {
    #[default]
    Idle,
    AwaitingJobTitle,
    AwaitingPhone,
    AddTitle,
    AddDestination {
        title: String,
    },
    AddAssignee {
        title: String,
    },
    AddDept {
        title: String,
    },
    AddDue {
        title: String,
        target: Assignment,
    },
    AwaitingReason {
        task_id: i64,
    },
    AwaitingUserTitle {
        user_id: i64,
    },
    AwaitingManageId,
}

fn rest_of_line(input: String) -> Result<(String,), ParseError> {
    Ok((input.trim().to_owned(),))
}

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "display this text.")]
    Help,
    #[command(description = "register or open your panel.")]
    Start,
    #[command(description = "skip sharing your phone number.")]
    Skip,
    #[command(description = "abort the current step.")]
    Cancel,
    #[command(description = "your unfinished tasks.")]
    MyTasks,
    #[command(description = "admin panel.")]
    Menu,
    #[command(description = "create a task (admin).")]
    Add,
    #[command(description = "all visible tasks (admin).")]
    AllTasks,
    #[command(description = "re-send a task notification: /remind <id> (admin).", parse_with = rest_of_line)]
    Remind(String),
    #[command(rename = "remind_pending", description = "re-send every pending task (admin).")]
    RemindPending,
    #[command(description = "archive a task: /archive <id>.", parse_with = rest_of_line)]
    Archive(String),
    #[command(description = "take a task out of the archive: /unarchive <id>.", parse_with = rest_of_line)]
    Unarchive(String),
    #[command(description = "soft-delete a task: /del <id>.", parse_with = rest_of_line)]
    Del(String),
    #[command(description = "restore a deleted task: /restore <id>.", parse_with = rest_of_line)]
    Restore(String),
    #[command(description = "your archive, or everyone's with /archives all (admin).", parse_with = rest_of_line)]
    Archives(String),
}

impl Command {
    fn needs_admin(&self) -> bool {
        matches!(
            self,
            Command::Menu | Command::Add | Command::AllTasks | Command::Remind(_) | Command::RemindPending
        )
    }
}

async fn command(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    cmd: Command,
    db: Database,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(user) = msg.from().cloned() else {
        return Ok(());
    };
    let chat = msg.chat.id;

    if cmd.needs_admin() && !is_admin(&db, &config, &user).await? {
        bot.send_message(chat, "This command is for the admin only 🙅‍♂️.").await?;
        return Ok(());
    }

    match cmd {
        Command::Help => {
            bot.send_message(chat, Command::descriptions().to_string()).await?;
        }
        Command::Start => registration::start(&bot, &msg, &user, &dialogue, &db, &config).await?,
        Command::Skip => registration::skip(&bot, chat, &dialogue, &db).await?,
        Command::Cancel => {
            dialogue.exit().await?;
            bot.send_message(chat, "Cancelled.").await?;
        }
        Command::MyTasks => member::send_my_tasks(&bot, chat, user_id(&user), &db).await?,
        Command::Menu => admin::send_menu(&bot, chat).await?,
        Command::Add => admin::start_add(&bot, chat, &dialogue).await?,
        Command::AllTasks => admin::send_list(&bot, chat, admin::Listing::All, &db).await?,
        Command::RemindPending => admin::remind_pending(&bot, chat, &db).await?,
        Command::Remind(arg) => tasks::command(&bot, chat, &user, Op::Remind, &arg, &db, &config).await?,
        Command::Archive(arg) => tasks::command(&bot, chat, &user, Op::Archive, &arg, &db, &config).await?,
        Command::Unarchive(arg) => tasks::command(&bot, chat, &user, Op::Unarchive, &arg, &db, &config).await?,
        Command::Del(arg) => tasks::command(&bot, chat, &user, Op::Delete, &arg, &db, &config).await?,
        Command::Restore(arg) => tasks::command(&bot, chat, &user, Op::Restore, &arg, &db, &config).await?,
        Command::Archives(arg) => tasks::archives(&bot, chat, &user, &arg, &db, &config).await?,
    }
    Ok(())
}

async fn callback(
    bot: Bot,
    q: CallbackQuery,
    action: Action,
    dialogue: MyDialogue,
    db: Database,
    config: Arc<Config>,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let chat = callback_chat(&q);

    if action.needs_admin() && !is_admin(&db, &config, &q.from).await? {
        bot.send_message(chat, "This panel is for the admin only 🙅‍♂️.").await?;
        return Ok(());
    }

    match action {
        Action::RegisterDept(dept) => registration::dept_chosen(&bot, &q, dept, &dialogue, &db, &config).await?,
        Action::Ack(task) => member::acknowledge(&bot, &q, task, &db, &config).await?,
        Action::SetStatus(status, task) => member::set_status(&bot, &q, status, task, &db, &config).await?,
        Action::Reason(task) => member::ask_reason(&bot, &q, task, &dialogue, &db, &config).await?,
        Action::Admin(a) => admin::on_menu(&bot, &q, a, &dialogue, &db).await?,
        Action::AddDestination(dest) => admin::on_destination(&bot, chat, dest, &dialogue).await?,
        Action::AddDept(dept) => admin::on_dept(&bot, chat, dept, &dialogue).await?,
        Action::Users(u) => staff::on_action(&bot, &q, u, &dialogue, &db).await?,
        Action::Manage(op, task) => tasks::perform(&bot, chat, &q.from, Op::from(op), task, &db, &config).await?,
    }
    Ok(())
}

pub fn schema() -> UpdateHandler<HandlerError> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>().endpoint(command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            case![State::AwaitingPhone]
                .filter(|msg: Message| msg.contact().is_some())
                .endpoint(registration::contact),
        )
        .branch(case![State::AwaitingJobTitle].endpoint(registration::job_title))
        .branch(case![State::AddTitle].endpoint(admin::add_title))
        .branch(case![State::AddAssignee { title }].endpoint(admin::add_assignee))
        .branch(case![State::AddDue { title, target }].endpoint(admin::add_due))
        .branch(case![State::AwaitingReason { task_id }].endpoint(member::reason_text))
        .branch(case![State::AwaitingUserTitle { user_id }].endpoint(staff::title_text))
        .branch(case![State::AwaitingManageId].endpoint(tasks::manage_id));

    let callback_handler = Update::filter_callback_query()
        .filter_map(|q: CallbackQuery| q.data.as_deref().and_then(|d| d.parse::<Action>().ok()))
        .endpoint(callback);

    dialogue::enter::<Update, InMemStorage<State>, State, _>()
        .branch(message_handler)
        .branch(callback_handler)
}
