use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use sellscale_core::model::MAX_PURGATORY_DAYS;
use sellscale_core::transition::DEFAULT_BUMP_PURGATORY_DAYS;
use sellscale_core::{NotifyChannel, PlannerSettings};

use crate::state_machine::outbox::OutboxSettings;
use crate::state_machine::store::StoreSettings;

/// Deployment environment, from `APP_SETTINGS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Testing,
    Production,
}

impl AppEnvironment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "testing" | "test" => Some(Self::Testing),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    Path(PathBuf),
}

#[derive(Clone)]
pub struct Config {
    pub environment: AppEnvironment,
    pub database: DatabaseLocation,
    pub port: u16,
    /// Base URL of the web app, for direct links in Slack messages.
    pub app_base_url: String,
    /// Incoming-webhook URLs per Slack channel. A channel without URLs is
    /// disabled.
    pub slack_webhooks: HashMap<NotifyChannel, Vec<String>>,
    pub bump_purgatory_days: i64,
    pub outbox_poll_interval: Duration,
    pub outbox_max_attempts: u32,
    pub outbox_backoff_base: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let environment = match env::var("APP_SETTINGS") {
            Ok(value) => AppEnvironment::parse(&value).with_context(|| {
                format!(
                    "APP_SETTINGS must be development, testing or production, got {:?}",
                    value
                )
            })?,
            Err(_) => AppEnvironment::Development,
        };

        let database = parse_database_url(
            &env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://sellscale.db".to_string()),
        )
        .context("DATABASE_URL must be sqlite://<path>, sqlite::memory: or a file path")?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let app_base_url = env::var("APP_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "https://app.sellscale.com".to_string());

        let slack_webhooks = slack_webhooks_from_env();

        let settings = store_settings_from_env()?;

        let config = Config {
            environment,
            database,
            port,
            app_base_url,
            slack_webhooks,
            bump_purgatory_days: settings.planner.bump_purgatory_days,
            outbox_poll_interval: settings.outbox.poll_interval,
            outbox_max_attempts: settings.outbox.max_attempts,
            outbox_backoff_base: settings.outbox.backoff_base,
        };
        config.check_required_webhooks()?;
        Ok(config)
    }

    /// Production must be able to announce demos.
    fn check_required_webhooks(&self) -> Result<()> {
        if self.environment == AppEnvironment::Production
            && self.webhooks_for(NotifyChannel::Demos).is_empty()
        {
            bail!("SLACK_DEMOS_WEBHOOK_URLS is required when APP_SETTINGS=production");
        }
        Ok(())
    }

    pub fn webhooks_for(&self, channel: NotifyChannel) -> &[String] {
        self.slack_webhooks
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            planner: PlannerSettings {
                bump_purgatory_days: self.bump_purgatory_days,
            },
            outbox: OutboxSettings {
                poll_interval: self.outbox_poll_interval,
                max_attempts: self.outbox_max_attempts,
                backoff_base: self.outbox_backoff_base,
            },
        }
    }
}

/// Planner and outbox tunables from `BUMP_PURGATORY_DAYS` and the
/// `OUTBOX_*` variables. Shared by the server and the CLI.
pub fn store_settings_from_env() -> Result<StoreSettings> {
    let bump_purgatory_days = parse_purgatory_days(env::var("BUMP_PURGATORY_DAYS").ok())?;

    let poll_interval = Duration::from_secs(
        env::var("OUTBOX_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .context("OUTBOX_POLL_INTERVAL_SECS must be a valid number")?
            .max(1),
    );

    let max_attempts = env::var("OUTBOX_MAX_ATTEMPTS")
        .unwrap_or_else(|_| "3".to_string())
        .parse::<u32>()
        .context("OUTBOX_MAX_ATTEMPTS must be a valid number")?
        .max(1);

    let backoff_base = Duration::from_secs(
        env::var("OUTBOX_BACKOFF_BASE_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .context("OUTBOX_BACKOFF_BASE_SECS must be a valid number")?,
    );

    Ok(StoreSettings {
        planner: PlannerSettings {
            bump_purgatory_days,
        },
        outbox: OutboxSettings {
            poll_interval,
            max_attempts,
            backoff_base,
        },
    })
}

/// Parse BUMP_PURGATORY_DAYS, falling back to the default when unset.
pub fn parse_purgatory_days(value: Option<String>) -> Result<i64> {
    let days = match value {
        Some(value) => value
            .trim()
            .parse::<i64>()
            .context("BUMP_PURGATORY_DAYS must be a valid number")?,
        None => DEFAULT_BUMP_PURGATORY_DAYS,
    };
    if !(0..=MAX_PURGATORY_DAYS).contains(&days) {
        bail!(
            "BUMP_PURGATORY_DAYS must be between 0 and {}, got {}",
            MAX_PURGATORY_DAYS,
            days
        );
    }
    Ok(days)
}

/// Webhook URLs for every Slack channel from the `SLACK_*_WEBHOOK_URLS`
/// variables.
pub fn slack_webhooks_from_env() -> HashMap<NotifyChannel, Vec<String>> {
    [
        (NotifyChannel::Pipeline, "SLACK_PIPELINE_WEBHOOK_URLS"),
        (NotifyChannel::Demos, "SLACK_DEMOS_WEBHOOK_URLS"),
        (NotifyChannel::DemoDetection, "SLACK_DETECTION_WEBHOOK_URLS"),
    ]
    .into_iter()
    .map(|(channel, var)| (channel, parse_webhook_urls(env::var(var).ok())))
    .collect()
}

/// Parse DATABASE_URL.
///
/// Accepts `sqlite::memory:`, `sqlite://<path>`, `sqlite:<path>` and a bare
/// file path. Returns None for an empty value or another URL scheme.
pub fn parse_database_url(value: &str) -> Option<DatabaseLocation> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value == "sqlite::memory:" || value == ":memory:" {
        return Some(DatabaseLocation::Memory);
    }
    let path = if let Some(rest) = value.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = value.strip_prefix("sqlite:") {
        rest
    } else if value.contains("://") {
        return None;
    } else {
        value
    };
    if path.is_empty() {
        return None;
    }
    Some(DatabaseLocation::Path(PathBuf::from(path)))
}

/// Parse a comma-separated webhook URL list.
///
/// Blank entries are dropped, so an unset, empty or whitespace-only value
/// yields an empty list (channel disabled).
pub fn parse_webhook_urls(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(environment: AppEnvironment, demos: Vec<String>) -> Config {
        let mut slack_webhooks = HashMap::new();
        slack_webhooks.insert(NotifyChannel::Demos, demos);
        Config {
            environment,
            database: DatabaseLocation::Memory,
            port: 5000,
            app_base_url: "https://app.sellscale.com".to_string(),
            slack_webhooks,
            bump_purgatory_days: 2,
            outbox_poll_interval: Duration::from_secs(30),
            outbox_max_attempts: 3,
            outbox_backoff_base: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_parse_environment() {
        assert_eq!(
            AppEnvironment::parse("production"),
            Some(AppEnvironment::Production)
        );
        assert_eq!(
            AppEnvironment::parse(" Testing "),
            Some(AppEnvironment::Testing)
        );
        assert_eq!(AppEnvironment::parse("staging"), None);
    }

    #[test]
    fn test_parse_database_url_forms() {
        assert_eq!(
            parse_database_url("sqlite::memory:"),
            Some(DatabaseLocation::Memory)
        );
        assert_eq!(
            parse_database_url("sqlite://data/sellscale.db"),
            Some(DatabaseLocation::Path(PathBuf::from("data/sellscale.db")))
        );
        assert_eq!(
            parse_database_url("sqlite:///var/lib/sellscale.db"),
            Some(DatabaseLocation::Path(PathBuf::from(
                "/var/lib/sellscale.db"
            )))
        );
        assert_eq!(
            parse_database_url("local.db"),
            Some(DatabaseLocation::Path(PathBuf::from("local.db")))
        );
    }

    #[test]
    fn test_parse_database_url_rejects_other_schemes() {
        assert_eq!(parse_database_url("postgres://localhost/sellscale"), None);
        assert_eq!(parse_database_url("sqlite://"), None);
        assert_eq!(parse_database_url("   "), None);
    }

    #[test]
    fn test_parse_webhook_urls_none() {
        assert!(parse_webhook_urls(None).is_empty());
    }

    #[test]
    fn test_parse_webhook_urls_blank() {
        // Empty and whitespace-only values leave the channel disabled
        assert!(parse_webhook_urls(Some("".to_string())).is_empty());
        assert!(parse_webhook_urls(Some(" , ,".to_string())).is_empty());
    }

    #[test]
    fn test_parse_webhook_urls_list() {
        assert_eq!(
            parse_webhook_urls(Some(
                "https://hooks.slack.com/a, https://hooks.slack.com/b".to_string()
            )),
            vec![
                "https://hooks.slack.com/a".to_string(),
                "https://hooks.slack.com/b".to_string()
            ]
        );
    }

    #[test]
    fn test_production_requires_demos_webhook() {
        assert!(config(AppEnvironment::Production, Vec::new())
            .check_required_webhooks()
            .is_err());
        assert!(config(
            AppEnvironment::Production,
            vec!["https://hooks.slack.com/x".to_string()]
        )
        .check_required_webhooks()
        .is_ok());
        assert!(config(AppEnvironment::Development, Vec::new())
            .check_required_webhooks()
            .is_ok());
    }

    #[test]
    fn test_parse_purgatory_days() {
        assert_eq!(parse_purgatory_days(None).unwrap(), DEFAULT_BUMP_PURGATORY_DAYS);
        assert_eq!(parse_purgatory_days(Some(" 7 ".to_string())).unwrap(), 7);
        assert_eq!(
            parse_purgatory_days(Some(MAX_PURGATORY_DAYS.to_string())).unwrap(),
            MAX_PURGATORY_DAYS
        );
    }

    #[test]
    fn test_parse_purgatory_days_rejects_out_of_range() {
        assert!(parse_purgatory_days(Some("-1".to_string())).is_err());
        assert!(parse_purgatory_days(Some("1000000000".to_string())).is_err());
        assert!(parse_purgatory_days(Some("two".to_string())).is_err());
    }

    #[test]
    fn test_store_settings_carry_overrides() {
        let mut c = config(AppEnvironment::Testing, Vec::new());
        c.bump_purgatory_days = 5;
        c.outbox_max_attempts = 7;
        let settings = c.store_settings();
        assert_eq!(settings.planner.bump_purgatory_days, 5);
        assert_eq!(settings.outbox.max_attempts, 7);
        assert_eq!(settings.outbox.backoff_base, Duration::from_secs(60));
    }
}
