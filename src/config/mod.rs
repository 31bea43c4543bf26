//! Configuration for pixiv-courier.
//!
//! Everything is read from the environment at startup, matching the
//! deployment model of a scheduler-invoked one-shot process. Only the cache
//! directory has a default (`~/.cache/pixiv-courier`); every other value is
//! required.

use std::env;
use std::path::PathBuf;

use lettre::message::Mailbox;

/// Runtime configuration, fully resolved before any work starts.
#[derive(Debug, Clone)]
pub struct Config {
    pub smtp: SmtpConfig,
    pub from: Mailbox,
    pub to: Mailbox,
    /// Long-lived provider refresh token.
    pub refresh_token: String,
    /// Path of the JSON cache file.
    pub cache_file: PathBuf,
    /// Root directory the external downloader writes into.
    pub download_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Mail addresses are parsed here so that a bad address fails the run
    /// before any feed item is touched.
    pub fn from_env() -> Result<Self, ConfigError> {
        let smtp = SmtpConfig {
            host: require("SMTP_HOST")?,
            port: require("SMTP_PORT")?
                .parse()
                .map_err(|e| ConfigError::Invalid {
                    var: "SMTP_PORT",
                    message: format!("{e}"),
                })?,
            username: require("SMTP_USERNAME")?,
            password: require("SMTP_PASSWORD")?,
        };

        let from = parse_mailbox("FROM_EMAIL")?;
        let to = parse_mailbox("TO_EMAIL")?;

        let cache_file = match env::var_os("CACHE_FOLDER") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .ok_or(ConfigError::NoCacheDir)?
                .join("pixiv-courier"),
        }
        .join("pixiv-courier.cache");

        Ok(Self {
            smtp,
            from,
            to,
            refresh_token: require("PIXIV_REFRESH_TOKEN")?,
            cache_file,
            download_root: PathBuf::from(require("GALLERY_DL_FOLDER")?),
        })
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parse_mailbox(var: &'static str) -> Result<Mailbox, ConfigError> {
    require(var)?.parse().map_err(|e| ConfigError::Invalid {
        var,
        message: format!("{e}"),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("Could not determine cache directory")]
    NoCacheDir,
}
