//! Upload callback descriptors
//!
//! After a direct upload completes, the storage service POSTs a form body to
//! the application. The body is a template of `name=${placeholder}` pairs the
//! service fills in: system placeholders such as `${object}` or `${size}`,
//! and `${x:name}` placeholders for custom variables the client submits
//! alongside the upload.

use crate::error::UploadError;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use indexmap::IndexMap;
use serde::Serialize;

/// Content type of the callback body
pub const CALLBACK_BODY_TYPE: &str = "application/x-www-form-urlencoded";

/// Prefix of custom callback variables
pub const CUSTOM_VAR_PREFIX: &str = "x:";

/// Default system fields and the placeholders they map to
pub const SYSTEM_FIELDS: &[(&str, &str)] = &[
    ("bucket", "${bucket}"),
    ("etag", "${etag}"),
    ("filename", "${object}"),
    ("size", "${size}"),
    ("mimeType", "${mimeType}"),
    ("height", "${imageInfo.height}"),
    ("width", "${imageInfo.width}"),
    ("format", "${imageInfo.format}"),
];

/// Whether `value` is one of the recognized system placeholders
pub fn is_system_placeholder(value: &str) -> bool {
    SYSTEM_FIELDS.iter().any(|(_, placeholder)| *placeholder == value)
}

/// Callback settings handed to the storage service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackDescriptor {
    url: String,
    body_template: String,
    body_content_type: String,
    callback_vars: IndexMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackParam<'a> {
    callback_url: &'a str,
    callback_body: &'a str,
    callback_body_type: &'a str,
}

impl CallbackDescriptor {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `name=${placeholder}&...`
    pub fn body_template(&self) -> &str {
        &self.body_template
    }

    pub fn body_content_type(&self) -> &str {
        &self.body_content_type
    }

    /// `x:`-prefixed variables the client must submit with the upload
    pub fn callback_vars(&self) -> &IndexMap<String, String> {
        &self.callback_vars
    }

    pub fn has_custom_fields(&self) -> bool {
        !self.callback_vars.is_empty()
    }

    /// JSON document understood by the storage service
    pub fn to_json(&self) -> Result<String, UploadError> {
        let param = CallbackParam {
            callback_url: &self.url,
            callback_body: &self.body_template,
            callback_body_type: &self.body_content_type,
        };
        Ok(serde_json::to_string(&param)?)
    }

    /// Base64 of [`Self::to_json`], the value of the `callback` form field
    pub fn encode(&self) -> Result<String, UploadError> {
        Ok(BASE64.encode(self.to_json()?))
    }
}

/// Builds callback descriptors
#[derive(Debug, Clone, Default)]
pub struct CallbackBodyBuilder {
    url: String,
    system_fields: IndexMap<String, String>,
    custom_fields: IndexMap<String, String>,
}

impl CallbackBodyBuilder {
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            url: callback_url.into(),
            ..Default::default()
        }
    }

    /// Replace the default system fields
    ///
    /// An empty mapping keeps the defaults.
    pub fn with_system_fields(mut self, fields: IndexMap<String, String>) -> Self {
        self.system_fields = fields;
        self
    }

    pub fn with_custom_fields(mut self, fields: IndexMap<String, String>) -> Self {
        self.custom_fields = fields;
        self
    }

    /// Add one custom field
    pub fn custom_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(name.into(), value.into());
        self
    }

    pub fn build(&self) -> Result<CallbackDescriptor, UploadError> {
        validate_callback_url(&self.url)?;

        let mut body: IndexMap<String, String> = if self.system_fields.is_empty() {
            SYSTEM_FIELDS
                .iter()
                .map(|(name, placeholder)| (name.to_string(), placeholder.to_string()))
                .collect()
        } else {
            let mut fields = IndexMap::with_capacity(self.system_fields.len());
            for (name, placeholder) in &self.system_fields {
                if !is_system_placeholder(placeholder) {
                    return Err(UploadError::InvalidArgument(format!(
                        "invalid system field placeholder: {}",
                        placeholder
                    )));
                }
                validate_field_name(name)?;
                fields.insert(name.clone(), placeholder.clone());
            }
            fields
        };

        let mut callback_vars = IndexMap::with_capacity(self.custom_fields.len());
        for (name, value) in &self.custom_fields {
            validate_field_name(name)?;
            callback_vars.insert(format!("{CUSTOM_VAR_PREFIX}{name}"), value.clone());
            // A custom name shadowing a system field takes over its slot.
            body.insert(name.clone(), format!("${{{CUSTOM_VAR_PREFIX}{name}}}"));
        }

        let body_template = body
            .iter()
            .map(|(name, placeholder)| format!("{name}={placeholder}"))
            .collect::<Vec<_>>()
            .join("&");

        Ok(CallbackDescriptor {
            url: self.url.clone(),
            body_template,
            body_content_type: CALLBACK_BODY_TYPE.to_string(),
            callback_vars,
        })
    }
}

fn validate_callback_url(raw: &str) -> Result<(), UploadError> {
    if raw.is_empty() {
        return Err(UploadError::Config("callback url must not be empty".to_string()));
    }
    let url = url::Url::parse(raw)
        .map_err(|e| UploadError::Config(format!("invalid callback url {raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UploadError::Config(format!(
            "callback url must be http or https, got {scheme}"
        ))),
    }
}

// Names land verbatim in the `a=b&c=d` template.
fn validate_field_name(name: &str) -> Result<(), UploadError> {
    if name.is_empty() || name.contains(['&', '=']) {
        return Err(UploadError::InvalidArgument(format!(
            "invalid callback field name: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_BODY: &str = "bucket=${bucket}&etag=${etag}&filename=${object}&size=${size}&mimeType=${mimeType}&height=${imageInfo.height}&width=${imageInfo.width}&format=${imageInfo.format}";

    #[test]
    fn test_default_system_fields() {
        let descriptor = CallbackBodyBuilder::new("https://app/cb").build().unwrap();
        assert_eq!(descriptor.url(), "https://app/cb");
        assert_eq!(descriptor.body_template(), DEFAULT_BODY);
        assert_eq!(descriptor.body_content_type(), CALLBACK_BODY_TYPE);
        assert!(!descriptor.has_custom_fields());
    }

    #[test]
    fn test_custom_fields() {
        let descriptor = CallbackBodyBuilder::new("https://app/cb")
            .custom_field("userId", "42")
            .custom_field("album", "summer")
            .build()
            .unwrap();

        assert_eq!(
            descriptor.body_template(),
            format!("{DEFAULT_BODY}&userId=${{x:userId}}&album=${{x:album}}")
        );
        let keys: Vec<&str> = descriptor.callback_vars().keys().map(String::as_str).collect();
        assert_eq!(keys, ["x:userId", "x:album"]);
        assert_eq!(descriptor.callback_vars()["x:userId"], "42");
        assert!(descriptor.has_custom_fields());
    }

    #[test]
    fn test_custom_field_shadows_system_field() {
        let descriptor = CallbackBodyBuilder::new("https://app/cb")
            .with_system_fields(IndexMap::from([
                ("filename".to_string(), "${object}".to_string()),
                ("size".to_string(), "${size}".to_string()),
            ]))
            .custom_field("filename", "ignored")
            .build()
            .unwrap();
        assert_eq!(
            descriptor.body_template(),
            "filename=${x:filename}&size=${size}"
        );
    }

    #[test]
    fn test_override_replaces_defaults() {
        let descriptor = CallbackBodyBuilder::new("https://app/cb")
            .with_system_fields(IndexMap::from([(
                "object".to_string(),
                "${object}".to_string(),
            )]))
            .build()
            .unwrap();

        assert_eq!(descriptor.body_template(), "object=${object}");
        assert!(!descriptor.body_template().contains("etag"));
        assert!(!descriptor.body_template().contains("mimeType"));
    }

    #[test]
    fn test_override_with_unknown_placeholder() {
        let err = CallbackBodyBuilder::new("https://app/cb")
            .with_system_fields(IndexMap::from([(
                "owner".to_string(),
                "${owner}".to_string(),
            )]))
            .build()
            .unwrap_err();

        assert_eq!(err.kind(), "InvalidArgument");
        assert!(err.to_string().contains("${owner}"));
    }

    #[test]
    fn test_rejects_bad_field_names() {
        for name in ["", "a&b", "a=b"] {
            let err = CallbackBodyBuilder::new("https://app/cb")
                .custom_field(name, "v")
                .build()
                .unwrap_err();
            assert!(matches!(err, UploadError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_rejects_bad_callback_url() {
        for url in ["", "not a url", "ftp://app/cb"] {
            let err = CallbackBodyBuilder::new(url).build().unwrap_err();
            assert!(matches!(err, UploadError::Config(_)), "{url}");
        }
    }

    #[test]
    fn test_encoded_document() {
        let descriptor = CallbackBodyBuilder::new("https://app/cb")
            .with_system_fields(IndexMap::from([(
                "size".to_string(),
                "${size}".to_string(),
            )]))
            .build()
            .unwrap();

        assert_eq!(
            descriptor.to_json().unwrap(),
            r#"{"callbackUrl":"https://app/cb","callbackBody":"size=${size}","callbackBodyType":"application/x-www-form-urlencoded"}"#
        );
        let decoded = BASE64.decode(descriptor.encode().unwrap()).unwrap();
        assert_eq!(decoded, descriptor.to_json().unwrap().into_bytes());
    }
}
