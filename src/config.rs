use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::paths;

/// Environment variable that overrides `remote_credential` from the file.
pub const CREDENTIAL_ENV: &str = "LBMIRROR_REMOTE_CREDENTIAL";

const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 60;

/// Backup settings loaded from `config.toml`.
///
/// Example TOML:
/// ```toml
/// enabled          = true
/// author_name      = "lb-api"
/// author_email     = "lb-api@example.com"
/// remote_url       = "https://git.example.com/infra/lb-backup.git"
/// local_repo_path  = "/var/lib/lbmirror/repo"
/// remote_username  = "lb-api"
/// # remote_credential is usually supplied through LBMIRROR_REMOTE_CREDENTIAL
/// ```
///
/// Every field is optional in the file. A missing `enabled` means backup is off.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub author_name: String,
    pub author_email: String,
    pub remote_url: String,
    pub local_repo_path: PathBuf,
    pub remote_username: String,
    pub remote_credential: String,
    /// Upper bound for a single clone, fetch or push. `0` disables the limit.
    pub network_timeout_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            author_name: String::new(),
            author_email: String::new(),
            remote_url: String::new(),
            local_repo_path: PathBuf::new(),
            remote_username: String::new(),
            remote_credential: String::new(),
            network_timeout_secs: DEFAULT_NETWORK_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("enabled", &self.enabled)
            .field("author_name", &self.author_name)
            .field("author_email", &self.author_email)
            .field("remote_url", &self.remote_url)
            .field("local_repo_path", &self.local_repo_path)
            .field("remote_username", &self.remote_username)
            .field("remote_credential", &"<redacted>")
            .field("network_timeout_secs", &self.network_timeout_secs)
            .finish()
    }
}

impl BackupConfig {
    /// Network deadline for clone, fetch and push, if any.
    pub fn network_timeout(&self) -> Option<Duration> {
        (self.network_timeout_secs > 0).then(|| Duration::from_secs(self.network_timeout_secs))
    }

    /// Copy of the configuration that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if !cfg.remote_credential.is_empty() {
            cfg.remote_credential = "<redacted>".to_string();
        }
        cfg
    }

    /// Check the fields an enabled backup cannot run without.
    ///
    /// A disabled configuration is always valid; it is never used for I/O.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.remote_url.trim().is_empty() {
            bail!("remote_url must be set when backup is enabled");
        }
        if self.local_repo_path.as_os_str().is_empty() {
            bail!("local_repo_path must be set when backup is enabled");
        }
        if self.author_name.trim().is_empty() || self.author_email.trim().is_empty() {
            bail!("author_name and author_email must be set when backup is enabled");
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(cred) = std::env::var_os(CREDENTIAL_ENV) {
            self.remote_credential = cred.to_string_lossy().into_owned();
        }
    }
}

/// Parse and validate a configuration from TOML text.
///
/// Environment overrides are applied before validation.
pub fn parse_config(txt: &str) -> Result<BackupConfig> {
    let mut cfg: BackupConfig = toml::from_str(txt).context("failed to parse config.toml")?;
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

/// Load the configuration from `path`, or from the default location
/// (see [`paths()`]) when `path` is `None`.
///
/// # Errors
/// - The file cannot be read; the message includes the resolved path.
/// - The TOML is malformed or an enabled config is missing required fields.
pub fn load_config(path: Option<&Path>) -> Result<BackupConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => paths()?.config,
    };
    let txt = fs::read_to_string(&path)
        .with_context(|| format!("config not found: {}", path.display()))?;
    parse_config(&txt).with_context(|| format!("invalid config: {}", path.display()))
}

/// CLI command: print the effective configuration with the credential hidden.
pub fn cmd_config(path: Option<&Path>) -> Result<()> {
    let cfg = load_config(path)?;
    let txt = toml::to_string_pretty(&cfg.redacted()).context("failed to render config")?;
    print!("{}", txt);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EnvGuard;
    use serial_test::serial;

    const ENABLED: &str = r#"
        enabled = true
        author_name = "lb-api"
        author_email = "lb-api@example.com"
        remote_url = "https://git.example.com/lb.git"
        local_repo_path = "/var/lib/lbmirror/repo"
        remote_username = "lb-api"
        remote_credential = "from-file"
    "#;

    #[test]
    #[serial]
    fn empty_file_is_a_disabled_default() {
        let _g = EnvGuard::set(&[(CREDENTIAL_ENV, None)]);
        let cfg = parse_config("").unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.network_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    #[serial]
    fn parses_all_fields() {
        let _g = EnvGuard::set(&[(CREDENTIAL_ENV, None)]);
        let cfg = parse_config(ENABLED).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.author_email, "lb-api@example.com");
        assert_eq!(cfg.local_repo_path, PathBuf::from("/var/lib/lbmirror/repo"));
        assert_eq!(cfg.remote_credential, "from-file");
    }

    #[test]
    #[serial]
    fn credential_env_overrides_file() {
        let _g = EnvGuard::set(&[(CREDENTIAL_ENV, Some("from-env"))]);
        let cfg = parse_config(ENABLED).unwrap();
        assert_eq!(cfg.remote_credential, "from-env");
    }

    #[test]
    #[serial]
    fn enabled_without_remote_is_rejected() {
        let _g = EnvGuard::set(&[(CREDENTIAL_ENV, None)]);
        let err = parse_config("enabled = true\nlocal_repo_path = \"/tmp/x\"").unwrap_err();
        assert!(err.to_string().contains("remote_url"));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let cfg = BackupConfig {
            network_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.network_timeout(), None);
    }

    #[test]
    fn debug_and_redacted_hide_the_credential() {
        let cfg = BackupConfig {
            remote_credential: "s3cret".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", cfg).contains("s3cret"));
        assert_eq!(cfg.redacted().remote_credential, "<redacted>");
    }

    #[test]
    #[serial]
    fn load_config_reports_missing_path() {
        let td = tempfile::tempdir().unwrap();
        let missing = td.path().join("nope.toml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("config not found"));
    }
}
