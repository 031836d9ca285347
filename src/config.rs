use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LOGIN_HLEVEL: &str = "H12";
pub const DEFAULT_LOGIN_USERID: &str = "guest";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DOMAIN: &str = "sales";

pub const ENV_BASE_URL: &str = "REPORT_API_BASE_URL";
pub const ENV_DOMAIN: &str = "REPORT_API_DOMAIN";
pub const ENV_TIMEOUT_SECS: &str = "REPORT_API_TIMEOUT_SECS";
pub const ENV_REPAIR_JSON: &str = "REPORT_API_REPAIR_JSON";
pub const ENV_LOGIN_USERID: &str = "REPORT_LOGIN_USERID";
pub const ENV_LOGIN_HLEVEL: &str = "REPORT_LOGIN_HLEVEL";
pub const ENV_DOWNLOAD_DIR: &str = "REPORT_DOWNLOAD_DIR";

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_SECS * 1000
}

fn default_login_userid() -> String {
    DEFAULT_LOGIN_USERID.to_string()
}

fn default_login_hlevel() -> String {
    DEFAULT_LOGIN_HLEVEL.to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,

    #[serde(default = "default_domain")]
    pub domain: String,

    /// Client-side limit for a whole request, including reading the body, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Run the heuristic repair pass on bodies that are not valid JSON.
    #[serde(default)]
    pub repair_malformed: bool,

    #[serde(default = "default_login_userid")]
    pub login_userid: String,

    #[serde(default = "default_login_hlevel")]
    pub login_hlevel: String,

    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            domain: default_domain(),
            timeout_ms: default_timeout_ms(),
            repair_malformed: false,
            login_userid: default_login_userid(),
            login_hlevel: default_login_hlevel(),
            download_dir: default_download_dir(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        self
    }

    pub fn with_repair(mut self, repair: bool) -> Self {
        self.repair_malformed = repair;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_BASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ReportError::validation(ENV_BASE_URL, "is required"))?;

        let mut config = Self::new(base_url.trim());

        if let Some(domain) = lookup(ENV_DOMAIN) {
            config.domain = domain.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            // fractional seconds are accepted, e.g. "1.5"
            config.timeout_ms = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(|secs| (secs * 1000.0).round().max(1.0) as u64)
                .ok_or_else(|| {
                    ReportError::validation(
                        ENV_TIMEOUT_SECS,
                        format!("expected a positive number of seconds, got '{}'", raw),
                    )
                })?;
        }

        if let Some(raw) = lookup(ENV_REPAIR_JSON) {
            config.repair_malformed = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(ReportError::validation(
                        ENV_REPAIR_JSON,
                        format!("expected a boolean, got '{}'", other),
                    ))
                }
            };
        }

        if let Some(userid) = lookup(ENV_LOGIN_USERID) {
            config.login_userid = userid;
        }
        if let Some(hlevel) = lookup(ENV_LOGIN_HLEVEL) {
            config.login_hlevel = hlevel;
        }
        if let Some(dir) = lookup(ENV_DOWNLOAD_DIR) {
            config.download_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ReportError::validation(
                "base_url",
                format!("'{}' must start with http:// or https://", self.base_url),
            ));
        }
        if self.domain.trim().is_empty() {
            return Err(ReportError::validation("domain", "must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(ReportError::validation("timeout_ms", "must be positive"));
        }
        Ok(())
    }

    /// `{base}/{domain}/{path}` with redundant slashes removed.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.domain.trim_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
