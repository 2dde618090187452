//! Daemon configuration (environment) and the policy manifest (strict YAML).
//!
//! The manifest is the hot-reloadable "module artifact": a small YAML file
//! naming a registered policy implementation and carrying its parameters.
//! Parsing is strict — unknown fields and out-of-range values are
//! configuration errors, not warnings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use tollgate_core::error::{Result, TollgateError};

/// Environment variable naming the manifest directory.
pub const POLICY_DIR_ENV: &str = "TOLLGATE_POLICY_DIR";
/// Environment variable naming the virtual interface.
pub const IFACE_ENV: &str = "TOLLGATE_IFACE";

pub const DEFAULT_POLICY_DIR: &str = "/etc/tollgate";
pub const DEFAULT_IFACE: &str = "tollgate0";

/// Basename the hot-reload watcher matches verbatim.
pub const MANIFEST_BASENAME: &str = "policy.yaml";

/// Fixed local address plan for the interface bring-up.
pub const IFACE_ADDR_V4: &str = "169.254.73.254/31";
pub const IFACE_ADDR_V6: &str = "fd00:9a7e::1/127";

/// Linux IFNAMSIZ is 16 including the trailing NUL.
const IFACE_NAME_MAX: usize = 15;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub iface: String,
    pub policy_dir: PathBuf,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        let iface = env::var(IFACE_ENV).unwrap_or_else(|_| DEFAULT_IFACE.to_string());
        let policy_dir = env::var(POLICY_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_POLICY_DIR));

        let cfg = Self { iface, policy_dir };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iface.is_empty() || self.iface.len() > IFACE_NAME_MAX {
            return Err(TollgateError::Config(format!(
                "interface name must be 1..={IFACE_NAME_MAX} bytes: {:?}",
                self.iface
            )));
        }
        if self.iface.contains('/') || self.iface.contains(char::is_whitespace) {
            return Err(TollgateError::Config(format!(
                "interface name contains invalid characters: {:?}",
                self.iface
            )));
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.policy_dir.join(MANIFEST_BASENAME)
    }
}

/// The policy module artifact.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyManifest {
    /// Registry name of the policy implementation to load.
    pub policy: String,

    #[serde(default)]
    pub params: PolicyParams,
}

impl PolicyManifest {
    pub fn validate(&self) -> Result<()> {
        if self.policy.is_empty() {
            return Err(TollgateError::Config("policy must not be empty".into()));
        }
        self.params.validate()
    }
}

/// Parameters handed to the policy factory. Individual policies pick what
/// they need and reject what they require but did not get.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyParams {
    /// DNS question name that triggers a trust grant (dns-gate).
    #[serde(default)]
    pub secret_query: Option<String>,

    #[serde(default = "default_trust_window_secs")]
    pub trust_window_secs: u64,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    #[serde(default = "default_wireguard_port")]
    pub wireguard_port: u16,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            secret_query: None,
            trust_window_secs: default_trust_window_secs(),
            ssh_port: default_ssh_port(),
            wireguard_port: default_wireguard_port(),
        }
    }
}

impl PolicyParams {
    pub fn validate(&self) -> Result<()> {
        if self.trust_window_secs == 0 {
            return Err(TollgateError::Config(
                "params.trust_window_secs must be greater than zero".into(),
            ));
        }
        if let Some(secret) = &self.secret_query {
            if secret.is_empty() {
                return Err(TollgateError::Config(
                    "params.secret_query must not be empty when set".into(),
                ));
            }
        }
        Ok(())
    }
}

fn default_trust_window_secs() -> u64 {
    100
}
fn default_ssh_port() -> u16 {
    22
}
fn default_wireguard_port() -> u16 {
    51_820
}

pub fn load_manifest_from_file(path: &Path) -> Result<PolicyManifest> {
    let s = fs::read_to_string(path).map_err(|e| {
        TollgateError::Config(format!("read manifest {} failed: {e}", path.display()))
    })?;
    load_manifest_from_str(&s)
}

pub fn load_manifest_from_str(s: &str) -> Result<PolicyManifest> {
    let manifest: PolicyManifest = serde_yaml::from_str(s)
        .map_err(|e| TollgateError::Config(format!("invalid manifest yaml: {e}")))?;
    manifest.validate()?;
    Ok(manifest)
}
