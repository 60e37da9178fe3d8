//! Application configuration, read once at startup.
//!
//! | Variable | Default |
//! |---|---|
//! | `NOTEKEEP_TOKEN_SECRET` | required |
//! | `NOTEKEEP_TOKEN_VALIDITY_SECS` | `1800` |
//! | `NOTEKEEP_SESSION_TTL_SECS` | `1800` |
//! | `NOTEKEEP_SESSION_KEY_PREFIX` | `session:` |
//! | `NOTEKEEP_MAIL_ENDPOINT` | Brevo transactional endpoint |
//! | `NOTEKEEP_MAIL_API_KEY` | required |
//! | `NOTEKEEP_MAIL_SENDER_EMAIL` | required |
//! | `NOTEKEEP_MAIL_SENDER_NAME` | unset |
//! | `NOTEKEEP_MAIL_MAX_ATTEMPTS` | `10`, `0` retries forever |
//! | `NOTEKEEP_POLICY_PATH` | `policy.json` |
//! | `NOTEKEEP_POLICY_RELOAD_SECS` | `60` |
//! | `NOTEKEEP_CACHE_PURGE_SECS` | `60` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use notekeep_identity::PasswordConfig;
use notekeep_mail::{MailConfig, RetryPolicy};
use notekeep_policy::PolicyConfig;
use notekeep_session::{SessionConfig, TokenConfig};

use crate::NotekeepError;

/// Every component's configuration in one place.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub token: TokenConfig,
    pub session: SessionConfig,
    pub mail: MailConfig,
    pub retry: RetryPolicy,
    pub policy: PolicyConfig,
    pub password: PasswordConfig,
    /// How often the in-process cache drops lapsed sessions.
    pub cache_purge_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            session: SessionConfig::default(),
            mail: MailConfig::default(),
            retry: RetryPolicy::default(),
            policy: PolicyConfig::default(),
            password: PasswordConfig::default(),
            cache_purge_interval: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, NotekeepError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    ///
    /// Missing optional keys keep their defaults. Blank values count as
    /// missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotekeepError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| NotekeepError::Config(format!("{key} must be set")));

        let mut config = Self::default();

        config.token.secret = require("NOTEKEEP_TOKEN_SECRET")?;
        if let Some(secs) = parse::<u64>(&get, "NOTEKEEP_TOKEN_VALIDITY_SECS")? {
            config.token.validity = Duration::from_secs(secs);
        }

        if let Some(secs) = parse::<u64>(&get, "NOTEKEEP_SESSION_TTL_SECS")? {
            config.session.ttl = Duration::from_secs(secs);
        }
        if let Some(prefix) = get("NOTEKEEP_SESSION_KEY_PREFIX") {
            config.session.key_prefix = prefix;
        }

        if let Some(endpoint) = get("NOTEKEEP_MAIL_ENDPOINT") {
            config.mail.endpoint = endpoint;
        }
        config.mail.api_key = require("NOTEKEEP_MAIL_API_KEY")?;
        config.mail.sender_email = require("NOTEKEEP_MAIL_SENDER_EMAIL")?;
        config.mail.sender_name = get("NOTEKEEP_MAIL_SENDER_NAME");
        if let Some(max) = parse::<u32>(&get, "NOTEKEEP_MAIL_MAX_ATTEMPTS")? {
            config.retry.max_attempts = (max > 0).then_some(max);
        }

        if let Some(path) = get("NOTEKEEP_POLICY_PATH") {
            config.policy.path = PathBuf::from(path);
        }
        if let Some(secs) = parse::<u64>(&get, "NOTEKEEP_POLICY_RELOAD_SECS")? {
            config.policy.reload_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&get, "NOTEKEEP_CACHE_PURGE_SECS")? {
            config.cache_purge_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, NotekeepError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| NotekeepError::Config(format!("{key}: {e}")))
        })
        .transpose()
}
