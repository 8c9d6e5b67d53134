//! Storage account credentials shared by the signer and verifier

use ossgate_common::AccountConfig;
use std::fmt;

/// Credentials and addressing for one bucket
///
/// Built once and shared by reference; never mutated after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountContext {
    access_id: String,
    secret_key: String,
    bucket: String,
    endpoint: String,
    security_token: Option<String>,
    is_cname: bool,
    use_ssl: bool,
}

impl AccountContext {
    /// Create an account context
    pub fn new(
        access_id: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            access_id: access_id.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            endpoint: endpoint.into(),
            security_token: None,
            is_cname: false,
            use_ssl: false,
        }
    }

    /// Attach a temporary STS security token
    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }

    /// Treat the endpoint as a custom domain bound to the bucket
    pub fn with_cname(mut self, is_cname: bool) -> Self {
        self.is_cname = is_cname;
        self
    }

    /// Build object URLs with https
    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn access_id(&self) -> &str {
        &self.access_id
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn security_token(&self) -> Option<&str> {
        self.security_token.as_deref()
    }

    /// Upload host handed to clients: `bucket.endpoint`
    pub fn host(&self) -> String {
        format!("{}.{}", self.bucket, self.endpoint)
    }

    /// Public URL of an object
    ///
    /// With a CNAME endpoint the bucket is implied by the domain and is not
    /// prepended.
    pub fn object_url(&self, key: &str) -> String {
        let domain = if self.is_cname {
            self.endpoint.clone()
        } else {
            self.host()
        };
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!(
            "{}://{}/{}",
            scheme,
            domain.trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    }
}

impl From<&AccountConfig> for AccountContext {
    fn from(config: &AccountConfig) -> Self {
        let mut account = AccountContext::new(
            &config.access_id,
            &config.access_secret,
            &config.bucket,
            &config.endpoint,
        )
        .with_cname(config.is_cname)
        .with_ssl(config.use_ssl);
        if let Some(token) = config.security_token.as_deref().filter(|t| !t.is_empty()) {
            account = account.with_security_token(token);
        }
        account
    }
}

// The secret never shows up in logs.
impl fmt::Debug for AccountContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountContext")
            .field("access_id", &self.access_id)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("security_token", &self.security_token.as_ref().map(|_| "<redacted>"))
            .field("is_cname", &self.is_cname)
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountContext {
        AccountContext::new("LTAIexample", "secret", "media", "oss-cn-hangzhou.aliyuncs.com")
    }

    #[test]
    fn test_host() {
        assert_eq!(account().host(), "media.oss-cn-hangzhou.aliyuncs.com");
    }

    #[test]
    fn test_object_url() {
        assert_eq!(
            account().object_url("/photos/a.png"),
            "http://media.oss-cn-hangzhou.aliyuncs.com/photos/a.png"
        );
        assert_eq!(
            account().with_ssl(true).object_url("a.png"),
            "https://media.oss-cn-hangzhou.aliyuncs.com/a.png"
        );
    }

    #[test]
    fn test_object_url_cname() {
        let account = AccountContext::new("id", "secret", "media", "cdn.example.com/")
            .with_cname(true)
            .with_ssl(true);
        assert_eq!(account.object_url("a.png"), "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", account().with_security_token("sts-token"));
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("sts-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_from_config() {
        let config = AccountConfig {
            access_id: "id".to_string(),
            access_secret: "secret".to_string(),
            bucket: "media".to_string(),
            endpoint: "oss.example.com".to_string(),
            security_token: Some(String::new()),
            is_cname: false,
            use_ssl: true,
        };
        let account = AccountContext::from(&config);
        assert_eq!(account.secret_key(), "secret");
        assert_eq!(account.security_token(), None);
        assert!(account.object_url("k").starts_with("https://"));
    }
}
