use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::baseline::DEFAULT_BASELINE_KEY;
use crate::error::ErrorCode;
use crate::retry::RetryPolicy;
use crate::run::RunSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub discogs: DiscogsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscogsConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DiscogsConfig {
    fn default() -> Self {
        Self {
            username: None,
            token: None,
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
            pacing_ms: default_pacing_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_state_key")]
    pub key: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: None,
            key: default_state_key(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Fixed offset such as `"+09:00"`; the host zone is used when unset.
    #[serde(default)]
    pub utc_offset: Option<String>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

/// How e-mail leaves the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailTransport {
    /// Authenticated SMTP. Port 465 uses implicit TLS, any other port STARTTLS.
    #[default]
    Smtp,
    /// Pipe the message into a local sendmail-compatible program.
    Sendmail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub transport: EmailTransport,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP login; `from` is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_sendmail")]
    pub command: String,
    #[serde(default = "default_sendmail_args")]
    pub args: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from: String::new(),
            to: String::new(),
            transport: EmailTransport::default(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_user: None,
            password: None,
            command: default_sendmail(),
            args: default_sendmail_args(),
        }
    }
}

impl EmailConfig {
    /// Login name presented to the SMTP relay.
    #[must_use]
    pub fn smtp_login(&self) -> &str {
        self.smtp_user.as_deref().unwrap_or(&self.from)
    }
}

impl WatchConfig {
    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
    }

    /// Overlay values from `lookup`, which maps a variable name to its value.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(user) = lookup("USER_NAME") {
            self.discogs.username = Some(user);
        }
        if let Some(token) = lookup("DISCOGS_TOKEN") {
            self.discogs.token = Some(token);
        }
        if let Some(url) = lookup("DISCORD_WEBHOOK_URL") {
            self.notify.webhook = Some(WebhookConfig { url });
        }

        let email_from = lookup("EMAIL_FROM");
        let email_to = lookup("EMAIL_TO");
        let email_pass = lookup("EMAIL_PASS");
        if email_from.is_some() || email_to.is_some() || email_pass.is_some() {
            let email = self.notify.email.get_or_insert_with(EmailConfig::default);
            if let Some(from) = email_from {
                email.from = from;
            }
            if let Some(to) = email_to {
                email.to = to;
            }
            if let Some(pass) = email_pass {
                email.password = Some(pass);
            }
        }

        if let Some(dir) = lookup("WANTWATCH_STATE_DIR") {
            self.state.dir = Some(PathBuf::from(dir));
        }
    }

    /// Reject configurations that cannot complete a run, before any I/O.
    pub fn validate(&self) -> Result<()> {
        let code = ErrorCode::ConfigIncomplete;
        if self.discogs.username.as_deref().is_none_or(str::is_empty) {
            anyhow::bail!("{code}: discogs.username is not set (or USER_NAME)");
        }
        if self.discogs.token.as_deref().is_none_or(str::is_empty) {
            anyhow::bail!("{code}: discogs.token is not set (or DISCOGS_TOKEN)");
        }
        if let Some(email) = &self.notify.email {
            if email.from.is_empty() || email.to.is_empty() {
                anyhow::bail!("{code}: notify.email needs both `from` and `to`");
            }
            if email.transport == EmailTransport::Smtp && email.smtp_host.trim().is_empty() {
                anyhow::bail!("{code}: notify.email.smtp_host must not be empty");
            }
        }
        if self.http.timeout_secs == 0 {
            anyhow::bail!("{code}: http.timeout_secs must be at least 1");
        }
        if self.fetch.max_attempts == 0 {
            anyhow::bail!("{code}: fetch.max_attempts must be at least 1");
        }
        self.utc_offset()?;
        Ok(())
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch.max_attempts,
            Duration::from_secs(self.fetch.backoff_secs),
        )
    }

    #[must_use]
    pub const fn run_settings(&self, dry_run: bool) -> RunSettings {
        RunSettings {
            retry: self.retry_policy(),
            pacing: Duration::from_millis(self.fetch.pacing_ms),
            dry_run,
        }
    }

    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Parsed notification offset, `None` meaning the host's local zone.
    pub fn utc_offset(&self) -> Result<Option<FixedOffset>> {
        self.notify
            .utc_offset
            .as_deref()
            .map(|raw| {
                raw.trim().parse::<FixedOffset>().map_err(|err| {
                    anyhow::anyhow!(
                        "{}: invalid notify.utc_offset '{raw}': {err}",
                        ErrorCode::ConfigParseError
                    )
                })
            })
            .transpose()
    }

    /// Directory holding the baseline document and the run lock.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state.dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("wantwatch"))
            .context("no data directory on this platform; set state.dir or WANTWATCH_STATE_DIR")
    }

    /// Copy safe to print: credentials are replaced by a marker.
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if masked.discogs.token.is_some() {
            masked.discogs.token = Some(MASK.to_string());
        }
        if let Some(webhook) = &mut masked.notify.webhook {
            webhook.url = mask_url(&webhook.url);
        }
        if let Some(email) = &mut masked.notify.email {
            if email.password.is_some() {
                email.password = Some(MASK.to_string());
            }
        }
        masked
    }
}

const MASK: &str = "********";

/// Keep scheme and host of a webhook URL; the path carries the secret.
fn mask_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return MASK.to_string();
    };
    let host = rest.split('/').next().unwrap_or_default();
    format!("{scheme}://{host}/{MASK}")
}

/// Default config location: `<config_dir>/wantwatch/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wantwatch/config.toml"))
}

/// Load the config file, falling back to defaults when the default location
/// has no file. An explicitly requested file must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<WatchConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(WatchConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<WatchConfig>(&content).with_context(|| {
        format!(
            "{}: failed to parse {}",
            ErrorCode::ConfigParseError,
            path.display()
        )
    })
}

/// File config overlaid with the environment.
pub fn resolve_config(explicit: Option<&Path>) -> Result<WatchConfig> {
    let mut config = load_config(explicit)?;
    config.apply_env();
    Ok(config)
}

fn default_base_url() -> String {
    "https://api.discogs.com".to_string()
}

fn default_user_agent() -> String {
    format!("wantwatch/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_secs() -> u64 {
    5
}

const fn default_pacing_ms() -> u64 {
    1_000
}

fn default_state_key() -> String {
    DEFAULT_BASELINE_KEY.to_string()
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

const fn default_smtp_port() -> u16 {
    465
}

fn default_sendmail() -> String {
    "sendmail".to_string()
}

fn default_sendmail_args() -> Vec<String> {
    vec!["-t".to_string(), "-i".to_string()]
}
