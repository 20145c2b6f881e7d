//! CLI settings file.
//!
//! A small YAML document, by default `$HOME/.logto-playground.yaml`:
//!
//! ```yaml
//! pat: "pat_..."
//! logto:
//!   tenant_url: "https://<tenant>.logto.app"
//!   client_id: "..."
//!   client_secret: "..."     # only used with client_auth basic|post
//!   client_auth: none         # none | basic | post
//!   scope: "read:generic_data"
//!   resource: "https://api.example.com"
//! ```
//!
//! Keys this tool does not know about are kept when the file is rewritten.

use anyhow::Context;
use common::secret::SecretString;
use common::token_exchange::{ClientAuthentication, ExchangeRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the settings file in the home directory.
pub const DEFAULT_SETTINGS_FILE: &str = ".logto-playground.yaml";

/// How `deploy test` authenticates the client to the token endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuthMode {
    #[default]
    None,
    Basic,
    Post,
}

/// Top-level settings.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Personal access token, set with `pat add`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pat: Option<String>,

    #[serde(default, skip_serializing_if = "LogtoSettings::is_empty")]
    pub logto: LogtoSettings,

    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

/// Identity provider settings under `logto:`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogtoSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_auth: Option<ClientAuthMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

impl LogtoSettings {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn client_auth_mode(&self) -> ClientAuthMode {
        self.client_auth.unwrap_or_default()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("pat", &self.pat.as_ref().map(|_| "[REDACTED]"))
            .field("logto", &self.logto)
            .field("other", &self.other)
            .finish()
    }
}

impl fmt::Debug for LogtoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogtoSettings")
            .field("tenant_url", &self.tenant_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("client_auth", &self.client_auth)
            .field("scope", &self.scope)
            .field("resource", &self.resource)
            .field("other", &self.other)
            .finish()
    }
}

/// `$HOME/.logto-playground.yaml`.
pub fn default_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?;
    Ok(home.join(DEFAULT_SETTINGS_FILE))
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Load settings. A missing or empty file yields empty settings.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(target: "pat_cli", path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Error reading settings file {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content)
            .with_context(|| format!("Error parsing settings file {}", path.display()))
    }

    /// Write settings, creating parent directories. The file is private to
    /// the current user on unix.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Error creating settings directory {}", parent.display())
            })?;
        }

        let content = serde_yaml::to_string(self)?;
        write_private(path, &content)
            .with_context(|| format!("Error writing settings to {}", path.display()))
    }

    /// Settings `deploy test` needs that are absent or empty.
    pub fn missing_exchange_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if non_empty(self.pat.as_ref()).is_none() {
            missing.push("pat");
        }
        if non_empty(self.logto.tenant_url.as_ref()).is_none() {
            missing.push("logto.tenant_url");
        }
        if non_empty(self.logto.client_id.as_ref()).is_none() {
            missing.push("logto.client_id");
        }
        if self.logto.client_auth_mode() != ClientAuthMode::None
            && non_empty(self.logto.client_secret.as_ref()).is_none()
        {
            missing.push("logto.client_secret");
        }

        missing
    }

    /// Build the token-exchange request described by these settings.
    pub fn exchange_request(&self) -> anyhow::Result<ExchangeRequest> {
        let missing = self.missing_exchange_settings();
        if !missing.is_empty() {
            anyhow::bail!("Missing required settings: {}", missing.join(", "));
        }

        let secret = || SecretString::from(self.logto.client_secret.clone().unwrap_or_default());
        let client_auth = match self.logto.client_auth_mode() {
            ClientAuthMode::None => ClientAuthentication::None,
            ClientAuthMode::Basic => ClientAuthentication::Basic(secret()),
            ClientAuthMode::Post => ClientAuthentication::Post(secret()),
        };

        Ok(ExchangeRequest::new(
            self.logto.tenant_url.clone().unwrap_or_default(),
            self.logto.client_id.clone().unwrap_or_default(),
            SecretString::from(self.pat.clone().unwrap_or_default()),
        )
        .with_scope(self.logto.scope.clone())
        .with_resource(self.logto.resource.clone())
        .with_client_auth(client_auth))
    }
}

fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(content.as_bytes())?;

    // `mode` only applies on creation; tighten files that already existed
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
