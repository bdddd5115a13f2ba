use std::{fmt::Debug, hash::Hash, net::SocketAddr, sync::Arc};

use anyhow::Context;
use teloxide::{
    dispatching::{dialogue::InMemStorage, DefaultKey, UpdateHandler},
    prelude::*,
    update_listeners::{webhooks, UpdateListener},
    Bot,
};
use url::Url;

use crate::{
    config::{Config, Mode},
    db::Database,
    error::StartupError,
    handlers::{schema, State},
    lock::InstanceLock,
};

mod config;
mod db;
mod error;
mod handlers;
mod keyboards;
mod lock;
mod model;
mod notify;
mod render;
mod report;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();

    let config = Arc::new(Config::from_env().map_err(StartupError::from)?);
    let _lock = InstanceLock::acquire(&config.lock_file).map_err(StartupError::Lock)?;
    let db = Database::open(&config.database_url)
        .await
        .map_err(StartupError::from)
        .with_context(|| format!("opening {}", config.database_url))?;
    log::info!("database ready at {}", config.database_url);

    let bot = Bot::new(&config.token);
    tokio::spawn(report::run(bot.clone(), db.clone(), config.clone()));

    let dispatcher = create_dispatcher(
        schema(),
        dptree::deps![InMemStorage::<State>::new(), db, config.clone()],
    )(bot.clone());

    match config.mode.clone() {
        Mode::Polling => run_polling(bot, dispatcher).await?,
        Mode::Webhook { url, addr } => run_webhook(bot, dispatcher, url, addr).await?,
    }
    log::info!("bot stopped");
    Ok(())
}

fn create_dispatcher<Err>(
    schema: UpdateHandler<Err>,
    dependencies: DependencyMap,
) -> impl FnOnce(Bot) -> Dispatcher<Bot, Err, DefaultKey>
where
    Err: Debug + Send + Sync + 'static,
{
    |bot: Bot| {
        Dispatcher::builder(bot, schema)
            .dependencies(dependencies)
            .enable_ctrlc_handler()
            .build()
    }
}

async fn run_polling<Err, Key>(bot: Bot, mut dispatcher: Dispatcher<Bot, Err, Key>) -> Result<(), StartupError>
where
    Err: Debug + Send + Sync + 'static,
    Key: Hash + Eq + Clone + Send + 'static,
{
    bot.delete_webhook()
        .drop_pending_updates(true)
        .await
        .map_err(StartupError::Listener)?;
    log::info!("long polling started");
    dispatcher.dispatch().await;
    Ok(())
}

async fn run_webhook<Err, Key>(
    bot: Bot,
    mut dispatcher: Dispatcher<Bot, Err, Key>,
    url: Url,
    addr: SocketAddr,
) -> Result<(), StartupError>
where
    Err: Debug + Send + Sync + 'static,
    Key: Hash + Eq + Clone + Send + 'static,
{
    let options = webhooks::Options::new(addr, url.clone()).drop_pending_updates();
    let (mut listener, stop_flag, router) = webhooks::axum_to_router(bot, options)
        .await
        .map_err(StartupError::Listener)?;

    let stop_token = listener.stop_token();
    let server = tokio::spawn(async move {
        let _ = axum::Server::bind(&addr)
            .serve(router.into_make_service())
            .with_graceful_shutdown(stop_flag)
            .await
            .map_err(|e| {
                log::error!("axum server error: {e}, stopping dispatcher");
                stop_token.stop();
            });
    });

    log::info!("listening webhook {url} on {addr}");
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("webhook listener error"),
        )
        .await;
    let _ = server.await;
    Ok(())
}
