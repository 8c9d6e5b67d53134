//! Configuration types for ossgate
//!
//! The configuration is a TOML document with one table per concern:
//!
//! ```toml
//! [account]
//! access_id = "LTAI..."
//! access_secret = "..."
//! bucket = "media"
//! endpoint = "oss-cn-hangzhou.aliyuncs.com"
//!
//! [upload]
//! dir = "uploads/"
//! callback_url = "https://app.example.com/oss/callback"
//!
//! [verifier]
//! key_cache_ttl_secs = 300
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage account credentials
    pub account: AccountConfig,
    /// Defaults for direct-upload authorization
    pub upload: UploadDefaults,
    /// Callback verification settings
    pub verifier: VerifierConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a configuration from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load the configuration file at `path`, falling back to defaults when
    /// the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check that everything needed to sign upload forms is present
    pub fn validate(&self) -> Result<()> {
        self.account.validate()?;
        if self.upload.expire_secs <= 0 {
            return Err(Error::InvalidConfig(format!(
                "upload.expire_secs must be positive, got {}",
                self.upload.expire_secs
            )));
        }
        if self.upload.max_size <= 0 {
            return Err(Error::InvalidConfig(format!(
                "upload.max_size must be positive, got {}",
                self.upload.max_size
            )));
        }
        if self.verifier.connect_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "verifier.connect_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Object storage account credentials
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Access key ID
    pub access_id: String,
    /// Access key secret used for HMAC signing
    pub access_secret: String,
    /// Bucket name
    pub bucket: String,
    /// Endpoint host (e.g. "oss-cn-hangzhou.aliyuncs.com")
    pub endpoint: String,
    /// Temporary STS security token
    pub security_token: Option<String>,
    /// Endpoint is a custom domain bound to the bucket
    pub is_cname: bool,
    /// Build object URLs with https
    pub use_ssl: bool,
}

impl AccountConfig {
    /// Check that all credential fields are set
    pub fn validate(&self) -> Result<()> {
        if self.access_id.is_empty() {
            return Err(Error::MissingValue("account.access_id"));
        }
        if self.access_secret.is_empty() {
            return Err(Error::MissingValue("account.access_secret"));
        }
        if self.bucket.is_empty() {
            return Err(Error::MissingValue("account.bucket"));
        }
        if self.endpoint.is_empty() {
            return Err(Error::MissingValue("account.endpoint"));
        }
        Ok(())
    }
}

/// Defaults applied to direct-upload authorization requests
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadDefaults {
    /// Key prefix uploads must start with
    pub dir: String,
    /// Policy lifetime in seconds
    pub expire_secs: i64,
    /// Maximum object size in bytes (default: 1000 MB)
    pub max_size: i64,
    /// URL the storage service calls after an upload completes
    pub callback_url: String,
    /// Always pin the bucket in the policy conditions
    pub bind_bucket: bool,
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            dir: String::new(),
            expire_secs: 30,
            max_size: 1_048_576_000,
            callback_url: String::new(),
            bind_bucket: false,
        }
    }
}

/// Callback verification settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Connect timeout for the public key fetch
    pub connect_timeout_secs: u64,
    /// Overall timeout for the public key fetch
    pub timeout_secs: u64,
    /// Accepted public key URL prefixes; empty accepts any URL
    pub trusted_key_url_prefixes: Vec<String>,
    /// How long fetched public keys are reused (0 = no caching)
    pub key_cache_ttl_secs: u64,
}

/// Public key hosts used by the storage service for callback signatures
pub const DEFAULT_TRUSTED_KEY_URL_PREFIXES: &[&str] = &[
    "http://gosspublic.alicdn.com/",
    "https://gosspublic.alicdn.com/",
];

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 30,
            trusted_key_url_prefixes: DEFAULT_TRUSTED_KEY_URL_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            key_cache_ttl_secs: 0,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level filter
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
