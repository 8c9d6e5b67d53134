//! Direct-upload authorization
//!
//! Produces the signed form fields a browser or mobile client submits, along
//! with the file, straight to the storage service:
//!
//! ```text
//! OSSAccessKeyId = accessid      key      = dir + filename
//! policy         = policy        callback = callback
//! signature      = signature     x:...    = callback-var entries
//! ```

use crate::account::AccountContext;
use crate::callback::CallbackBodyBuilder;
use crate::clock::{Clock, SystemClock};
use crate::error::UploadError;
use crate::policy::PolicyBuilder;
use crate::signature::SignatureEngine;
use indexmap::IndexMap;
use ossgate_common::UploadDefaults;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-request upload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Prefix every uploaded key must start with
    pub key_prefix: String,
    /// Policy lifetime in seconds
    pub expire_seconds: i64,
    /// Largest accepted object, in bytes
    pub max_content_length: i64,
    /// Where the storage service posts the completion callback
    pub callback_url: String,
    /// Replacement for the default system callback fields
    pub system_field_overrides: IndexMap<String, String>,
    /// Custom callback variables, sent back as `x:` fields
    pub custom_fields: IndexMap<String, String>,
    /// Pin the bucket in the policy even without custom fields
    pub bind_bucket: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self::from(&UploadDefaults::default())
    }
}

impl From<&UploadDefaults> for UploadConfig {
    fn from(defaults: &UploadDefaults) -> Self {
        Self {
            key_prefix: defaults.dir.clone(),
            expire_seconds: defaults.expire_secs,
            max_content_length: defaults.max_size,
            callback_url: defaults.callback_url.clone(),
            system_field_overrides: IndexMap::new(),
            custom_fields: IndexMap::new(),
            bind_bucket: defaults.bind_bucket,
        }
    }
}

impl UploadConfig {
    pub fn new(key_prefix: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            callback_url: callback_url.into(),
            ..Default::default()
        }
    }

    pub fn with_expire_seconds(mut self, expire_seconds: i64) -> Self {
        self.expire_seconds = expire_seconds;
        self
    }

    pub fn with_max_content_length(mut self, max_content_length: i64) -> Self {
        self.max_content_length = max_content_length;
        self
    }

    pub fn with_system_field(mut self, name: impl Into<String>, placeholder: impl Into<String>) -> Self {
        self.system_field_overrides
            .insert(name.into(), placeholder.into());
        self
    }

    pub fn with_custom_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(name.into(), value.into());
        self
    }

    pub fn with_bind_bucket(mut self, bind_bucket: bool) -> Self {
        self.bind_bucket = bind_bucket;
        self
    }
}

/// Signed form handed to the uploading client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUploadForm {
    pub accessid: String,
    pub host: String,
    /// Base64 policy document
    pub policy: String,
    /// Base64 HMAC-SHA1 of `policy`
    pub signature: String,
    /// Policy expiry, unix seconds
    pub expire: i64,
    /// Base64 callback descriptor
    pub callback: String,
    #[serde(rename = "callback-var")]
    pub callback_var: IndexMap<String, String>,
    /// Key prefix
    pub dir: String,
    /// STS token, submitted as `x-oss-security-token`
    #[serde(
        rename = "security-token",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub security_token: Option<String>,
}

impl SignedUploadForm {
    /// Object key for a client-side file name
    pub fn object_key(&self, filename: &str) -> String {
        format!("{}{}", self.dir, filename)
    }
}

/// Signs direct-upload forms for one account
#[derive(Clone)]
pub struct DirectUploadSigner {
    account: Arc<AccountContext>,
    clock: Arc<dyn Clock>,
}

impl DirectUploadSigner {
    pub fn new(account: Arc<AccountContext>) -> Self {
        Self {
            account,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    /// Build and sign an upload form
    pub fn authorize(&self, config: &UploadConfig) -> Result<SignedUploadForm, UploadError> {
        let callback = CallbackBodyBuilder::new(config.callback_url.clone())
            .with_system_fields(config.system_field_overrides.clone())
            .with_custom_fields(config.custom_fields.clone())
            .build()?;
        let callback_base64 = callback.encode()?;

        let mut builder = PolicyBuilder::new(
            config.key_prefix.clone(),
            config.expire_seconds,
            config.max_content_length,
        );
        if callback.has_custom_fields() || config.bind_bucket {
            builder = builder.with_bucket(self.account.bucket());
        }
        // Custom variables are client-controlled, so the descriptor that
        // references them must be pinned by the signed policy.
        if callback.has_custom_fields() {
            builder = builder.with_callback(callback_base64.clone());
        }
        let policy = builder.build(self.clock.now())?;

        let policy_base64 = policy.encode()?;
        let signature = SignatureEngine::sign(&policy_base64, self.account.secret_key());

        tracing::debug!(
            bucket = self.account.bucket(),
            dir = %config.key_prefix,
            expiration = policy.expiration(),
            conditions = policy.conditions().len(),
            "signed direct upload policy"
        );

        Ok(SignedUploadForm {
            accessid: self.account.access_id().to_string(),
            host: self.account.host(),
            policy: policy_base64,
            signature,
            expire: policy.expires_at().timestamp(),
            callback: callback_base64,
            callback_var: callback.callback_vars().clone(),
            dir: config.key_prefix.clone(),
            security_token: self.account.security_token().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use serde_json::Value;

    const NOW: i64 = 1_704_067_200;

    fn signer() -> DirectUploadSigner {
        let account = AccountContext::new(
            "LTAIexample",
            "secret",
            "media",
            "oss-cn-hangzhou.aliyuncs.com",
        );
        DirectUploadSigner::new(Arc::new(account))
            .with_clock(Arc::new(FixedClock::at_timestamp(NOW).unwrap()))
    }

    fn scenario_a() -> UploadConfig {
        UploadConfig::new("uploads/", "https://app/cb")
            .with_expire_seconds(30)
            .with_max_content_length(100)
    }

    fn decode_json(b64: &str) -> Value {
        serde_json::from_slice(&BASE64.decode(b64).unwrap()).unwrap()
    }

    #[test]
    fn test_without_custom_fields() {
        let form = signer().authorize(&scenario_a()).unwrap();

        assert_eq!(form.accessid, "LTAIexample");
        assert_eq!(form.host, "media.oss-cn-hangzhou.aliyuncs.com");
        assert_eq!(form.dir, "uploads/");
        assert_eq!(form.expire, NOW + 30);
        assert!(form.callback_var.is_empty());
        assert!(form.security_token.is_none());

        let policy = decode_json(&form.policy);
        assert_eq!(policy["expiration"], "2024-01-01T00:00:30Z");
        assert_eq!(
            policy["conditions"],
            serde_json::json!([
                ["content-length-range", 0, 100],
                ["starts-with", "$key", "uploads/"]
            ])
        );
        assert_eq!(form.signature, "nkDbTzNEk0xMW+4RexyWxeime8g=");
        assert!(SignatureEngine::verify(&form.policy, "secret", &form.signature));
    }

    #[test]
    fn test_with_custom_fields() {
        let form = signer()
            .authorize(&scenario_a().with_custom_field("userId", "42"))
            .unwrap();

        assert_eq!(form.callback_var["x:userId"], "42");

        let callback = decode_json(&form.callback);
        assert_eq!(callback["callbackUrl"], "https://app/cb");
        assert_eq!(callback["callbackBodyType"], "application/x-www-form-urlencoded");
        let body = callback["callbackBody"].as_str().unwrap();
        assert!(body.contains("userId=${x:userId}"));
        assert!(body.starts_with("bucket=${bucket}&"));

        let conditions = decode_json(&form.policy)["conditions"].clone();
        let conditions = conditions.as_array().unwrap();
        assert_eq!(conditions.len(), 4);
        assert_eq!(conditions[2], serde_json::json!({"bucket": "media"}));
        assert_eq!(conditions[3], serde_json::json!({"callback": form.callback}));
    }

    #[test]
    fn test_bind_bucket_without_custom_fields() {
        let form = signer()
            .authorize(&scenario_a().with_bind_bucket(true))
            .unwrap();
        let policy = decode_json(&form.policy);
        let conditions = policy["conditions"].as_array().unwrap();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[2], serde_json::json!({"bucket": "media"}));
    }

    #[test]
    fn test_system_field_override() {
        let form = signer()
            .authorize(&scenario_a().with_system_field("object", "${object}"))
            .unwrap();
        let callback = decode_json(&form.callback);
        assert_eq!(callback["callbackBody"], "object=${object}");
    }

    #[test]
    fn test_invalid_system_field_override() {
        let err = signer()
            .authorize(&scenario_a().with_system_field("owner", "${owner}"))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn test_invalid_limits() {
        let err = signer()
            .authorize(&scenario_a().with_expire_seconds(0))
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigError");

        let err = signer()
            .authorize(&scenario_a().with_max_content_length(-1))
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn test_security_token() {
        let account = AccountContext::new("id", "secret", "media", "oss.example.com")
            .with_security_token("sts-token");
        let form = DirectUploadSigner::new(Arc::new(account))
            .authorize(&scenario_a())
            .unwrap();
        assert_eq!(form.security_token.as_deref(), Some("sts-token"));

        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json["security-token"], "sts-token");
    }

    #[test]
    fn test_wire_field_names() {
        let form = signer()
            .authorize(&scenario_a().with_custom_field("userId", "42"))
            .unwrap();
        let json = serde_json::to_value(&form).unwrap();

        for field in [
            "accessid",
            "host",
            "policy",
            "signature",
            "expire",
            "callback",
            "callback-var",
            "dir",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json.get("security-token").is_none());
        assert_eq!(json["expire"], NOW + 30);
        assert_eq!(json["callback-var"]["x:userId"], "42");
    }

    #[test]
    fn test_object_key() {
        let form = signer().authorize(&scenario_a()).unwrap();
        assert_eq!(form.object_key("a.png"), "uploads/a.png");
    }

    #[test]
    fn test_config_from_defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.expire_seconds, 30);
        assert_eq!(config.max_content_length, 1_048_576_000);
    }
}
