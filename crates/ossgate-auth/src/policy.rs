//! Upload policy documents
//!
//! A policy is a JSON document of the form
//!
//! ```json
//! {"expiration":"2024-01-01T00:00:30Z","conditions":[["content-length-range",0,100],["starts-with","$key","uploads/"]]}
//! ```
//!
//! The storage service re-checks every condition against the submitted form,
//! so the serialized order and shape of the conditions are part of the wire
//! contract.

use crate::error::UploadError;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, TimeDelta, Utc};
use serde::ser::{Serialize, SerializeMap, SerializeTuple, Serializer};

/// Expiration format: UTC, whole seconds, literal `Z`
pub const ISO8601_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a timestamp the way policy expirations are written
pub fn gmt_iso8601(at: DateTime<Utc>) -> String {
    at.format(ISO8601_FORMAT).to_string()
}

/// A single policy condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `["content-length-range", min, max]`
    ContentLengthRange { min: i64, max: i64 },
    /// `["starts-with", field, prefix]`
    StartsWith { field: String, prefix: String },
    /// `{field: value}`
    Equals { field: String, value: String },
}

impl Condition {
    /// Object key must start with `prefix`
    pub fn key_starts_with(prefix: impl Into<String>) -> Self {
        Condition::StartsWith {
            field: "$key".to_string(),
            prefix: prefix.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Equals {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl Serialize for Condition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Condition::ContentLengthRange { min, max } => {
                let mut seq = serializer.serialize_tuple(3)?;
                seq.serialize_element("content-length-range")?;
                seq.serialize_element(min)?;
                seq.serialize_element(max)?;
                seq.end()
            }
            Condition::StartsWith { field, prefix } => {
                let mut seq = serializer.serialize_tuple(3)?;
                seq.serialize_element("starts-with")?;
                seq.serialize_element(field)?;
                seq.serialize_element(prefix)?;
                seq.end()
            }
            Condition::Equals { field, value } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(field, value)?;
                map.end()
            }
        }
    }
}

/// A built upload policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    expires_at: DateTime<Utc>,
    expiration: String,
    conditions: Vec<Condition>,
}

impl UploadPolicy {
    /// Expiration as written into the document
    pub fn expiration(&self) -> &str {
        &self.expiration
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Canonical JSON document
    pub fn to_json(&self) -> Result<String, UploadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Base64 of the canonical JSON document; this is the string that gets
    /// signed and handed to clients
    pub fn encode(&self) -> Result<String, UploadError> {
        Ok(BASE64.encode(self.to_json()?))
    }
}

impl Serialize for UploadPolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("expiration", &self.expiration)?;
        map.serialize_entry("conditions", &self.conditions)?;
        map.end()
    }
}

/// Builds upload policies
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    key_prefix: String,
    expire_seconds: i64,
    max_content_length: i64,
    bucket: Option<String>,
    callback: Option<String>,
}

impl PolicyBuilder {
    pub fn new(key_prefix: impl Into<String>, expire_seconds: i64, max_content_length: i64) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            expire_seconds,
            max_content_length,
            bucket: None,
            callback: None,
        }
    }

    /// Pin the upload to a bucket
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Pin the base64 callback descriptor so clients cannot swap it
    pub fn with_callback(mut self, callback_base64: impl Into<String>) -> Self {
        self.callback = Some(callback_base64.into());
        self
    }

    /// Build the policy relative to `now`
    pub fn build(&self, now: DateTime<Utc>) -> Result<UploadPolicy, UploadError> {
        if self.expire_seconds <= 0 {
            return Err(UploadError::Config(format!(
                "expire seconds must be positive, got {}",
                self.expire_seconds
            )));
        }
        if self.max_content_length <= 0 {
            return Err(UploadError::Config(format!(
                "max content length must be positive, got {}",
                self.max_content_length
            )));
        }
        if self.key_prefix.starts_with('/') {
            return Err(UploadError::Config(format!(
                "key prefix must not start with '/': {}",
                self.key_prefix
            )));
        }

        let expires_at = TimeDelta::try_seconds(self.expire_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                UploadError::Config(format!(
                    "expire seconds out of range: {}",
                    self.expire_seconds
                ))
            })?;

        let mut conditions = vec![
            Condition::ContentLengthRange {
                min: 0,
                max: self.max_content_length,
            },
            Condition::key_starts_with(self.key_prefix.clone()),
        ];
        if let Some(bucket) = &self.bucket {
            conditions.push(Condition::equals("bucket", bucket.clone()));
        }
        if let Some(callback) = &self.callback {
            conditions.push(Condition::equals("callback", callback.clone()));
        }

        Ok(UploadPolicy {
            expires_at,
            expiration: gmt_iso8601(expires_at),
            conditions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan_first() -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_200, 0).unwrap()
    }

    #[test]
    fn test_expiration_format() {
        let policy = PolicyBuilder::new("uploads/", 30, 100)
            .build(jan_first())
            .unwrap();
        assert_eq!(policy.expiration(), "2024-01-01T00:00:30Z");
        assert_eq!(policy.expires_at().timestamp(), 1_704_067_230);
    }

    #[test]
    fn test_expiration_drops_fractional_seconds() {
        let now = DateTime::from_timestamp(1_704_067_200, 750_000_000).unwrap();
        let policy = PolicyBuilder::new("", 3600, 1).build(now).unwrap();
        assert_eq!(policy.expiration(), "2024-01-01T01:00:00Z");
        assert!(policy.expires_at() > now);
    }

    #[test]
    fn test_canonical_json() {
        let policy = PolicyBuilder::new("uploads/", 30, 100)
            .build(jan_first())
            .unwrap();
        assert_eq!(
            policy.to_json().unwrap(),
            r#"{"expiration":"2024-01-01T00:00:30Z","conditions":[["content-length-range",0,100],["starts-with","$key","uploads/"]]}"#
        );
        assert_eq!(
            policy.encode().unwrap(),
            "eyJleHBpcmF0aW9uIjoiMjAyNC0wMS0wMVQwMDowMDozMFoiLCJjb25kaXRpb25zIjpbWyJjb250ZW50LWxlbmd0aC1yYW5nZSIsMCwxMDBdLFsic3RhcnRzLXdpdGgiLCIka2V5IiwidXBsb2Fkcy8iXV19"
        );
    }

    #[test]
    fn test_condition_order_with_bucket_and_callback() {
        let policy = PolicyBuilder::new("a/", 60, 10)
            .with_bucket("media")
            .with_callback("eyJ9")
            .build(jan_first())
            .unwrap();

        assert_eq!(
            policy.conditions(),
            &[
                Condition::ContentLengthRange { min: 0, max: 10 },
                Condition::key_starts_with("a/"),
                Condition::equals("bucket", "media"),
                Condition::equals("callback", "eyJ9"),
            ]
        );

        let json: serde_json::Value = serde_json::from_str(&policy.to_json().unwrap()).unwrap();
        assert_eq!(json["conditions"][2], serde_json::json!({"bucket": "media"}));
        assert_eq!(json["conditions"][3], serde_json::json!({"callback": "eyJ9"}));
    }

    #[test]
    fn test_rejects_non_positive_expire() {
        for expire in [0, -5] {
            let err = PolicyBuilder::new("a/", expire, 10)
                .build(jan_first())
                .unwrap_err();
            assert_eq!(err.kind(), "ConfigError");
        }
    }

    #[test]
    fn test_rejects_non_positive_size() {
        let err = PolicyBuilder::new("a/", 30, 0).build(jan_first()).unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[test]
    fn test_rejects_absolute_prefix() {
        let err = PolicyBuilder::new("/a/", 30, 10)
            .build(jan_first())
            .unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[test]
    fn test_rejects_overflowing_expire() {
        let err = PolicyBuilder::new("a/", i64::MAX, 10)
            .build(jan_first())
            .unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }
}
