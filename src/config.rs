use crate::api::AppError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_PATH_VAR: &str = "ALERTS_CONFIG";

/// Process-wide settings, built once in `main` and shared by `Arc`.
///
/// Values are layered: built-in defaults, then the vendor TOML file named by
/// `ALERTS_CONFIG`, then `ALERTS_*` environment variables for this run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub job: JobConfig,
    pub notification: NotificationConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    /// Width of the daily slot in which the inactive-test warning may fire.
    /// Must match the trigger period so the warning goes out once a day; when
    /// `interval_secs` is set it overrides this value.
    pub inactive_window_secs: u64,
    /// Upper bound on modules reconciled concurrently. 1 keeps passes sequential.
    pub parallelism: usize,
    /// Built-in trigger period. `None` leaves triggering to `POST /jobs/alert`.
    pub interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    pub default_email: Option<String>,
    pub email_domain: String,
    pub subject_prefix: String,
    pub dashboard_url: String,
    pub mail_relay_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:3000".to_string(),
            },
            job: JobConfig {
                inactive_window_secs: 180,
                parallelism: 1,
                interval_secs: None,
            },
            notification: NotificationConfig {
                default_email: None,
                email_domain: "example.com".to_string(),
                subject_prefix: "[VTS]".to_string(),
                dashboard_url: "http://localhost:3000".to_string(),
                mail_relay_url: "http://localhost:8025/send".to_string(),
            },
        }
    }
}

/// One override layer. Every field is optional; present fields win over the
/// layer below.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigLayer {
    pub server: ServerLayer,
    pub job: JobLayer,
    pub notification: NotificationLayer,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerLayer {
    pub bind_address: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobLayer {
    pub inactive_window_secs: Option<u64>,
    pub parallelism: Option<usize>,
    pub interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationLayer {
    pub default_email: Option<String>,
    pub email_domain: Option<String>,
    pub subject_prefix: Option<String>,
    pub dashboard_url: Option<String>,
    pub mail_relay_url: Option<String>,
}

impl ConfigLayer {
    pub fn from_toml(s: &str) -> Result<Self, AppError> {
        toml::from_str(s).map_err(|e| AppError::Config(format!("parse vendor config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml(&s)
    }

    /// Builds the run-specific layer from `ALERTS_*` variables.
    pub fn from_env<I>(vars: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = ConfigLayer::default();
        for (key, value) in vars {
            match key.as_str() {
                "ALERTS_BIND_ADDRESS" => layer.server.bind_address = Some(value),
                "ALERTS_INACTIVE_WINDOW_SECS" => {
                    layer.job.inactive_window_secs = Some(parse_number(&key, &value)?)
                }
                "ALERTS_PARALLELISM" => layer.job.parallelism = Some(parse_number(&key, &value)?),
                "ALERTS_INTERVAL_SECS" => {
                    layer.job.interval_secs = Some(parse_number(&key, &value)?)
                }
                "ALERTS_DEFAULT_EMAIL" => layer.notification.default_email = Some(value),
                "ALERTS_EMAIL_DOMAIN" => layer.notification.email_domain = Some(value),
                "ALERTS_SUBJECT_PREFIX" => layer.notification.subject_prefix = Some(value),
                "ALERTS_DASHBOARD_URL" => layer.notification.dashboard_url = Some(value),
                "ALERTS_MAIL_RELAY_URL" => layer.notification.mail_relay_url = Some(value),
                _ => {}
            }
        }
        Ok(layer)
    }
}

fn parse_number<N: std::str::FromStr>(key: &str, value: &str) -> Result<N, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} is not a number: {:?}", key, value)))
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let vendor = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => ConfigLayer::from_file(Path::new(&path))?,
            Err(_) => ConfigLayer::default(),
        };
        let run = ConfigLayer::from_env(std::env::vars())?;
        Config::default().merge(vendor).merge(run).validated()
    }

    pub fn merge(mut self, layer: ConfigLayer) -> Self {
        if let Some(bind_address) = layer.server.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(window) = layer.job.inactive_window_secs {
            self.job.inactive_window_secs = window;
        }
        if let Some(parallelism) = layer.job.parallelism {
            self.job.parallelism = parallelism;
        }
        if layer.job.interval_secs.is_some() {
            self.job.interval_secs = layer.job.interval_secs;
        }
        let notification = layer.notification;
        if notification.default_email.is_some() {
            self.notification.default_email = notification.default_email;
        }
        if let Some(domain) = notification.email_domain {
            self.notification.email_domain = domain;
        }
        if let Some(prefix) = notification.subject_prefix {
            self.notification.subject_prefix = prefix;
        }
        if let Some(url) = notification.dashboard_url {
            self.notification.dashboard_url = url;
        }
        if let Some(url) = notification.mail_relay_url {
            self.notification.mail_relay_url = url;
        }
        self
    }

    pub fn validated(mut self) -> Result<Self, AppError> {
        if let Some(interval) = self.job.interval_secs {
            if interval == 0 {
                return Err(AppError::Config("job.interval_secs must be positive".to_string()));
            }
            self.job.inactive_window_secs = interval;
        }
        if self.job.parallelism == 0 {
            return Err(AppError::Config("job.parallelism must be at least 1".to_string()));
        }
        if self.job.inactive_window_secs == 0 {
            return Err(AppError::Config(
                "job.inactive_window_secs must be positive".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.notification.dashboard_url).is_err() {
            return Err(AppError::Config(format!(
                "notification.dashboard_url is not a URL: {:?}",
                self.notification.dashboard_url
            )));
        }
        if self.notification.email_domain.trim().is_empty() {
            return Err(AppError::Config(
                "notification.email_domain must not be empty".to_string(),
            ));
        }
        Ok(self)
    }
}
