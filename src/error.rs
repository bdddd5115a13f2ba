use std::{
    error::Error,
    fmt::{Display, Formatter},
    io,
};

use crate::config::ConfigError;

/// Anything that stops the bot before it starts serving updates.
#[derive(Debug)]
pub enum StartupError {
    Config(ConfigError),
    Lock(io::Error),
    Database(sqlx::Error),
    Listener(teloxide::RequestError),
}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        StartupError::Config(e)
    }
}

impl From<sqlx::Error> for StartupError {
    fn from(e: sqlx::Error) -> Self {
        StartupError::Database(e)
    }
}

impl Display for StartupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use StartupError::*;
        match self {
            Config(e) => write!(f, "configuration: {e}"),
            Lock(e) => write!(f, "instance lock: {e}"),
            Database(e) => write!(f, "database: {e}"),
            Listener(e) => write!(f, "update listener: {e}"),
        }
    }
}

impl Error for StartupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use StartupError::*;
        match self {
            Config(e) => Some(e),
            Lock(e) => Some(e),
            Database(e) => Some(e),
            Listener(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_the_failing_stage() {
        let e = StartupError::from(ConfigError::Missing("BOT_TOKEN"));
        assert_eq!(e.to_string(), "configuration: BOT_TOKEN is not set");
        assert!(e.source().is_some());
    }
}
