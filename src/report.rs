use std::sync::Arc;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use teloxide::{prelude::*, types::ParseMode};

use crate::{config::Config, db::Database, render};

/// First instant strictly after `now` at which the local clock reads `at`.
pub fn next_run(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local_day = now.with_timezone(&offset).date_naive();
    let fire = |day: NaiveDate| {
        offset
            .from_local_datetime(&day.and_time(at))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    };
    match fire(local_day) {
        Some(t) if t > now => t,
        _ => local_day
            .checked_add_days(Days::new(1))
            .and_then(fire)
            .unwrap_or(now),
    }
}

/// Unix bounds `[start, end)` of a local calendar day.
pub fn day_window(day: NaiveDate, offset: FixedOffset) -> (i64, i64) {
    let start = |d: NaiveDate| {
        d.and_hms_opt(0, 0, 0)
            .and_then(|midnight| offset.from_local_datetime(&midnight).single())
            .map(|dt| dt.timestamp())
    };
    let from = start(day).unwrap_or_default();
    let to = day
        .checked_add_days(Days::new(1))
        .and_then(start)
        .unwrap_or(from + 86_400);
    (from, to)
}

pub async fn build(db: &Database, day: NaiveDate, offset: FixedOffset) -> Result<Vec<String>, sqlx::Error> {
    let (from, to) = day_window(day, offset);
    let done = db.done_between(from, to).await?;
    let open = db.open_created_between(from, to).await?;
    Ok(render::daily_report(day, &done, &open))
}

pub async fn send(bot: &Bot, db: &Database, config: &Config, day: NaiveDate) -> Result<(), sqlx::Error> {
    let admins = db.admin_chat_ids(&config.admin_username).await?;
    if admins.is_empty() {
        log::warn!("daily report skipped: no admin has started the bot");
        return Ok(());
    }
    let messages = build(db, day, config.report_offset).await?;
    'chats: for chat in admins {
        for text in &messages {
            let sent = bot
                .send_message(ChatId(chat), text.clone())
                .parse_mode(ParseMode::Html)
                .await;
            if let Err(e) = sent {
                log::warn!("daily report to {chat} failed: {e}");
                continue 'chats;
            }
        }
        log::info!("daily report for {day} sent to {chat}");
    }
    Ok(())
}

/// Sleeps until the configured local time, sends the report, repeats.
pub async fn run(bot: Bot, db: Database, config: Arc<Config>) {
    loop {
        let now = Utc::now();
        let at = next_run(now, config.report_time, config.report_offset);
        log::info!("next daily report at {at}");
        let wait = (at - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let day = at.with_timezone(&config.report_offset).date_naive();
        if let Err(e) = send(&bot, &db, &config, day).await {
            log::error!("daily report failed: {e}");
        }
    }
}
