//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$ATTACHPOLL_CONFIG` (environment variable)
//! 2. the `--config` command-line option
//! 3. `~/.config/attachpoll/config.toml` (Linux/macOS)
//!    `%APPDATA%\attachpoll\config.toml` (Windows)
//! 4. Built-in defaults
//!
//! `EMAIL_USER` and `EMAIL_PASS` override the IMAP credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging and directories.
    pub general: GeneralConfig,
    /// Mail server connection.
    pub imap: ImapConfig,
    /// Polling and attachment selection.
    pub sync: SyncConfig,
    /// Where attachments and the cursor live.
    pub storage: StorageConfig,
}

/// Logging and directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Directory for `attachpoll.log`. Defaults to the cache directory.
    pub log_dir: Option<PathBuf>,
    /// Override cache directory.
    pub cache_dir: Option<PathBuf>,
}

/// Mail server connection.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Mailbox to poll.
    pub mailbox: String,
    pub connect_timeout_secs: u64,
    /// Read/write timeout on the established connection.
    pub io_timeout_secs: u64,
    /// Skip TLS certificate verification. Only for self-signed test servers.
    pub accept_invalid_certs: bool,
}

/// Polling and attachment selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between the start of two cycles.
    pub interval_secs: u64,
    /// Only keep attachments with this extension. Empty keeps all.
    pub extension: String,
    /// First component of every stored attachment name.
    pub filename_prefix: String,
}

/// Where attachments and the cursor live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub attachments_dir: PathBuf,
    /// SQLite database holding the cursor.
    pub database: PathBuf,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            cache_dir: None,
        }
    }
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            username: String::new(),
            password: String::new(),
            mailbox: "INBOX".to_string(),
            connect_timeout_secs: 30,
            io_timeout_secs: 60,
            accept_invalid_certs: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            extension: "pdf".to_string(),
            filename_prefix: "attachment".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            attachments_dir: PathBuf::from("attachments"),
            database: PathBuf::from("email_tracker.db"),
        }
    }
}

impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("io_timeout_secs", &self.io_timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl ImapConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.max(1))
    }
}

impl SyncConfig {
    /// The extension filter, without a leading dot. `None` keeps everything.
    pub fn accepted_extension(&self) -> Option<String> {
        let ext = self.extension.trim().trim_start_matches('.');
        (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }
}

impl Config {
    /// Fill credentials from `EMAIL_USER` / `EMAIL_PASS` when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var("EMAIL_USER").ok(),
            std::env::var("EMAIL_PASS").ok(),
        );
    }

    fn apply_overrides(&mut self, user: Option<String>, pass: Option<String>) {
        if let Some(user) = user.filter(|u| !u.is_empty()) {
            self.imap.username = user;
        }
        if let Some(pass) = pass.filter(|p| !p.is_empty()) {
            self.imap.password = pass;
        }
    }

    /// Reject configurations the poller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.imap.host.trim().is_empty() {
            return Err(SyncError::Config("imap.host is empty".into()));
        }
        if self.imap.username.is_empty() || self.imap.password.is_empty() {
            return Err(SyncError::Config(
                "IMAP credentials missing: set imap.username/imap.password or EMAIL_USER/EMAIL_PASS"
                    .into(),
            ));
        }
        if self.imap.mailbox.trim().is_empty() {
            return Err(SyncError::Config("imap.mailbox is empty".into()));
        }
        if self.sync.interval_secs == 0 {
            return Err(SyncError::Config("sync.interval_secs must be at least 1".into()));
        }
        if self.sync.extension.contains(['/', '\\']) {
            return Err(SyncError::Config(format!(
                "sync.extension '{}' must not contain path separators",
                self.sync.extension
            )));
        }
        if self.sync.filename_prefix.contains(['/', '\\']) {
            return Err(SyncError::Config(format!(
                "sync.filename_prefix '{}' must not contain path separators",
                self.sync.filename_prefix
            )));
        }
        Ok(())
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// A missing file yields the defaults. An explicitly named file that cannot
/// be read or parsed is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let (path, required) = match std::env::var_os("ATTACHPOLL_CONFIG") {
        Some(p) => (Some(PathBuf::from(p)), true),
        None => match explicit {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (default_config_path(), false),
        },
    };

    let Some(path) = path else {
        return Ok(Config::default());
    };
    if !path.exists() {
        if required {
            return Err(SyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| SyncError::io(&path, e))?;
    let cfg = parse_config(&contents)
        .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

/// Parse a TOML configuration document.
pub fn parse_config(contents: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(contents)
}

/// `<config dir>/attachpoll/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("attachpoll").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("attachpoll")
}

/// Directory `attachpoll.log` is written to.
pub fn log_dir(config: &Config) -> PathBuf {
    config
        .general
        .log_dir
        .clone()
        .unwrap_or_else(|| cache_dir(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut cfg = Config::default();
        cfg.imap.username = "me@example.com".into();
        cfg.imap.password = "secret".into();
        cfg
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.imap.host, "imap.gmail.com");
        assert_eq!(cfg.imap.port, 993);
        assert_eq!(cfg.imap.mailbox, "INBOX");
        assert_eq!(cfg.sync.interval_secs, 30);
        assert_eq!(cfg.sync.accepted_extension().as_deref(), Some("pdf"));
        assert_eq!(cfg.storage.database, PathBuf::from("email_tracker.db"));
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = valid();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed = parse_config(&toml_str).expect("deserialize");
        assert_eq!(parsed.imap.username, cfg.imap.username);
        assert_eq!(parsed.sync.extension, cfg.sync.extension);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[imap]
host = "mail.example.org"

[sync]
interval_secs = 120
extension = ""
"#;
        let cfg = parse_config(partial).expect("parse partial");
        assert_eq!(cfg.imap.host, "mail.example.org");
        assert_eq!(cfg.imap.port, 993);
        assert_eq!(cfg.sync.interval_secs, 120);
        assert_eq!(cfg.sync.accepted_extension(), None);
        assert_eq!(cfg.general.log_level, "info");
    }

    #[test]
    fn test_extension_normalized() {
        let mut cfg = Config::default();
        cfg.sync.extension = ".PDF".into();
        assert_eq!(cfg.sync.accepted_extension().as_deref(), Some("pdf"));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = valid();
        cfg.sync.interval_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.sync.extension = "../pdf".into();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.imap.host = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_overrides_fill_credentials() {
        let mut cfg = Config::default();
        cfg.apply_overrides(Some("env-user".into()), Some(String::new()));
        assert_eq!(cfg.imap.username, "env-user");
        assert_eq!(cfg.imap.password, "");
    }

    #[test]
    fn test_debug_redacts_password() {
        let cfg = valid();
        let dbg = format!("{:?}", cfg.imap);
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_log_dir_prefers_explicit() {
        let mut cfg = Config::default();
        cfg.general.log_dir = Some(PathBuf::from("/var/log/attachpoll"));
        assert_eq!(log_dir(&cfg), PathBuf::from("/var/log/attachpoll"));
    }
}
