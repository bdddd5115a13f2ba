use std::{
    env,
    fmt::{Display, Formatter},
    net::SocketAddr,
    path::PathBuf,
};

use chrono::{FixedOffset, NaiveTime};
use url::Url;

const DEFAULT_DATABASE_URL: &str = "sqlite:tasks.db";
const DEFAULT_PORT: u16 = 10000;
const DEFAULT_REPORT_TIME: &str = "23:30";
const DEFAULT_REPORT_OFFSET: &str = "+03:00";
const DEFAULT_LOCK_FILE: &str = "bot.lock";

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ConfigError::*;
        match self {
            Missing(var) => write!(f, "{var} is not set"),
            Invalid { var, value } => write!(f, "{var} has invalid value: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Polling,
    Webhook { url: Url, addr: SocketAddr },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub admin_username: String,
    pub database_url: String,
    pub mode: Mode,
    pub report_time: NaiveTime,
    pub report_offset: FixedOffset,
    pub lock_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't touch the process env.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = get("BOT_TOKEN")
            .or_else(|| get("TOKEN"))
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let admin_username = get("ADMIN_USERNAME")
            .map(|u| u.trim().trim_start_matches('@').to_owned())
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing("ADMIN_USERNAME"))?;

        let database_url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned());

        let mode = if get("USE_WEBHOOK").as_deref().map(str::trim) == Some("1") {
            let raw = get("WEBHOOK_URL").ok_or(ConfigError::Missing("WEBHOOK_URL"))?;
            let url = raw.parse().map_err(|_| ConfigError::Invalid {
                var: "WEBHOOK_URL",
                value: raw.clone(),
            })?;
            let port = match get("PORT") {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "PORT",
                    value: raw.clone(),
                })?,
                None => DEFAULT_PORT,
            };
            Mode::Webhook {
                url,
                addr: ([0, 0, 0, 0], port).into(),
            }
        } else {
            Mode::Polling
        };

        let raw_time = get("REPORT_TIME").unwrap_or_else(|| DEFAULT_REPORT_TIME.to_owned());
        let report_time =
            NaiveTime::parse_from_str(raw_time.trim(), "%H:%M").map_err(|_| ConfigError::Invalid {
                var: "REPORT_TIME",
                value: raw_time.clone(),
            })?;

        let raw_offset = get("REPORT_UTC_OFFSET").unwrap_or_else(|| DEFAULT_REPORT_OFFSET.to_owned());
        let report_offset = parse_offset(&raw_offset).ok_or(ConfigError::Invalid {
            var: "REPORT_UTC_OFFSET",
            value: raw_offset.clone(),
        })?;

        let lock_file = get("LOCK_FILE")
            .unwrap_or_else(|| DEFAULT_LOCK_FILE.to_owned())
            .into();

        Ok(Self {
            token,
            admin_username,
            database_url,
            mode,
            report_time,
            report_offset,
            lock_file,
        })
    }

    pub fn is_admin_username(&self, username: Option<&str>) -> bool {
        username.is_some_and(|u| u.eq_ignore_ascii_case(&self.admin_username))
    }
}

/// Accepts `+HH:MM`, `-HH:MM`, `+H` and `HH`.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => (1, raw),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_to_polling() {
        let cfg = config(&[("BOT_TOKEN", "1:abc"), ("ADMIN_USERNAME", "@Boss")]).unwrap();
        assert_eq!(cfg.mode, Mode::Polling);
        assert_eq!(cfg.admin_username, "Boss");
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.report_time, NaiveTime::from_hms_opt(23, 30, 0).unwrap());
        assert_eq!(cfg.report_offset.local_minus_utc(), 3 * 3600);
        assert!(cfg.is_admin_username(Some("boss")));
        assert!(!cfg.is_admin_username(None));
    }

    #[test]
    fn legacy_token_variable_is_accepted() {
        let cfg = config(&[("TOKEN", "1:abc"), ("ADMIN_USERNAME", "boss")]).unwrap();
        assert_eq!(cfg.token, "1:abc");
    }

    #[test]
    fn webhook_requires_url() {
        let err = config(&[
            ("BOT_TOKEN", "1:abc"),
            ("ADMIN_USERNAME", "boss"),
            ("USE_WEBHOOK", "1"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("WEBHOOK_URL")));

        let cfg = config(&[
            ("BOT_TOKEN", "1:abc"),
            ("ADMIN_USERNAME", "boss"),
            ("USE_WEBHOOK", "1"),
            ("WEBHOOK_URL", "https://example.org/hook"),
            ("PORT", "8443"),
        ])
        .unwrap();
        match cfg.mode {
            Mode::Webhook { url, addr } => {
                assert_eq!(url.as_str(), "https://example.org/hook");
                assert_eq!(addr.port(), 8443);
            }
            Mode::Polling => panic!("expected webhook mode"),
        }
    }

    #[test]
    fn rejects_bad_report_time() {
        let err = config(&[
            ("BOT_TOKEN", "1:abc"),
            ("ADMIN_USERNAME", "boss"),
            ("REPORT_TIME", "25:99"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "REPORT_TIME", .. }));
    }

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("+03:00").unwrap().local_minus_utc(), 10800);
        assert_eq!(parse_offset("-05:30").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_offset("4").unwrap().local_minus_utc(), 14400);
        assert!(parse_offset("+03:75").is_none());
        assert!(parse_offset("").is_none());
    }
}
