//! Upload callback verification
//!
//! The storage service signs every callback with RSA (PKCS#1 v1.5, MD5
//! digest) over a string built from the request target and body:
//!
//! ```text
//! urldecode(path) [ "?" raw_query ] "\n" body
//! ```
//!
//! The query string is appended exactly as received. The signature and the
//! URL of the public key arrive base64-encoded in the `Authorization` and
//! `x-oss-pub-key-url` headers.

use crate::error::CallbackRejection;
use crate::keys::{CachingKeyFetcher, HttpKeyFetcher, KeyFetchError, PublicKeyFetcher};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use http::HeaderMap;
use indexmap::IndexMap;
use md5::Md5;
use ossgate_common::VerifierConfig;
use ossgate_common::config::DEFAULT_TRUSTED_KEY_URL_PREFIXES;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the base64 signature
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Header carrying the base64 public key URL
pub const PUB_KEY_URL_HEADER: &str = "x-oss-pub-key-url";

/// Fields of a verified callback body, in body order
pub type CallbackFields = IndexMap<String, String>;

/// An inbound callback request, as received by the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Request headers
    pub headers: HeaderMap,
    /// Raw request target: path plus optional `?query`, undecoded
    pub uri: String,
    /// Raw request body
    pub body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(headers: HeaderMap, uri: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            uri: uri.into(),
            body: body.into(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

impl<B: AsRef<[u8]>> From<http::Request<B>> for InboundRequest {
    fn from(request: http::Request<B>) -> Self {
        let uri = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let (parts, body) = request.into_parts();
        Self {
            headers: parts.headers,
            uri,
            body: body.as_ref().to_vec(),
        }
    }
}

/// Outcome of an RSA signature check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    /// Signature matches the message
    Valid,
    /// Signature does not match the message
    Invalid,
    /// The check could not be carried out (bad key, malformed signature)
    Error(String),
}

/// Rebuild the string the storage service signed
///
/// `uri` is the raw request target. Only the path is URL-decoded; the query,
/// including its leading `?`, is copied byte for byte.
pub fn signing_string(uri: &str, body: &[u8]) -> Vec<u8> {
    let (path, query) = match uri.find('?') {
        Some(pos) => uri.split_at(pos),
        None => (uri, ""),
    };

    let mut out = url_decode(path);
    out.extend_from_slice(query.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(body);
    out
}

// `urldecode` semantics: `+` is a space, `%XX` is a byte.
fn url_decode(s: &str) -> Vec<u8> {
    let plus_decoded = s.replace('+', " ");
    urlencoding::decode_binary(plus_decoded.as_bytes()).into_owned()
}

/// Parse a PEM public key, SubjectPublicKeyInfo or PKCS#1
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, String> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| format!("unreadable public key: {e}"))
}

/// Check an RSA PKCS#1 v1.5 / MD5 signature over `message`
pub fn verify_md5_signature(public_key_pem: &str, message: &[u8], signature: &[u8]) -> SignatureCheck {
    let public_key = match parse_public_key(public_key_pem) {
        Ok(key) => key,
        Err(e) => return SignatureCheck::Error(e),
    };
    let signature = match Signature::try_from(signature) {
        Ok(sig) => sig,
        Err(e) => return SignatureCheck::Error(format!("malformed signature: {e}")),
    };

    let verifying_key = VerifyingKey::<Md5>::new(public_key);
    match verifying_key.verify(message, &signature) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Invalid,
    }
}

/// Parse an `application/x-www-form-urlencoded` body
pub fn parse_form_body(body: &[u8]) -> Result<CallbackFields, CallbackRejection> {
    let text = std::str::from_utf8(body)
        .map_err(|_| CallbackRejection::malformed_body("callback body is not valid UTF-8"))?;

    let mut fields = CallbackFields::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = form_decode(name)?;
        if name.is_empty() {
            return Err(CallbackRejection::malformed_body(format!(
                "callback body has a field without a name: {pair:?}"
            )));
        }
        let value = form_decode(value)?;
        fields.insert(name, value);
    }
    Ok(fields)
}

fn form_decode(s: &str) -> Result<String, CallbackRejection> {
    String::from_utf8(url_decode(s)).map_err(|_| {
        CallbackRejection::malformed_body(format!("callback body field is not valid UTF-8: {s:?}"))
    })
}

/// Verifies upload callbacks sent by the storage service
pub struct CallbackVerifier {
    fetcher: Arc<dyn PublicKeyFetcher>,
    trusted_key_url_prefixes: Vec<String>,
}

impl CallbackVerifier {
    /// Create a verifier trusting the storage service's public key host
    pub fn new(fetcher: Arc<dyn PublicKeyFetcher>) -> Self {
        Self {
            fetcher,
            trusted_key_url_prefixes: DEFAULT_TRUSTED_KEY_URL_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Restrict the public key URLs the verifier will fetch from
    ///
    /// An empty list accepts any URL.
    pub fn with_trusted_key_url_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.trusted_key_url_prefixes = prefixes;
        self
    }

    /// Build a verifier with an HTTP key fetcher, cached when configured
    pub fn from_config(config: &VerifierConfig) -> Result<Self, KeyFetchError> {
        let http = HttpKeyFetcher::from_config(config)?;
        let fetcher: Arc<dyn PublicKeyFetcher> = if config.key_cache_ttl_secs > 0 {
            Arc::new(CachingKeyFetcher::new(
                http,
                Duration::from_secs(config.key_cache_ttl_secs),
            ))
        } else {
            Arc::new(http)
        };
        Ok(Self::new(fetcher).with_trusted_key_url_prefixes(config.trusted_key_url_prefixes.clone()))
    }

    fn is_trusted_key_url(&self, url: &str) -> bool {
        self.trusted_key_url_prefixes.is_empty()
            || self
                .trusted_key_url_prefixes
                .iter()
                .any(|prefix| url.starts_with(prefix.as_str()))
    }

    /// Verify a callback and return its body fields
    ///
    /// Performs one public key fetch per call (unless cached). Every rejection
    /// is returned as a [`CallbackRejection`].
    pub async fn verify(&self, request: &InboundRequest) -> Result<CallbackFields, CallbackRejection> {
        let result = self.verify_inner(request).await;
        if let Err(rejection) = &result {
            tracing::warn!(
                kind = %rejection.kind,
                uri = %request.uri,
                "rejected upload callback: {}",
                rejection.message
            );
        }
        result
    }

    async fn verify_inner(&self, request: &InboundRequest) -> Result<CallbackFields, CallbackRejection> {
        let (Some(authorization), Some(pub_key_url)) = (
            request.header(AUTHORIZATION_HEADER),
            request.header(PUB_KEY_URL_HEADER),
        ) else {
            return Err(CallbackRejection::missing_auth_headers(
                "authorization or public key url header is missing",
            ));
        };

        let signature = BASE64.decode(authorization).map_err(|e| {
            CallbackRejection::signature_invalid(format!("authorization is not base64: {e}"))
        })?;
        let pub_key_url = BASE64
            .decode(pub_key_url)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or_else(|| {
                CallbackRejection::key_fetch_failure("public key url header is not base64 text")
            })?;

        if !self.is_trusted_key_url(&pub_key_url) {
            return Err(CallbackRejection::key_fetch_failure(format!(
                "untrusted public key url: {pub_key_url}"
            )));
        }

        let public_key = self
            .fetcher
            .fetch(&pub_key_url)
            .await
            .map_err(|e| CallbackRejection::key_fetch_failure(e.to_string()))?;

        let auth_str = signing_string(&request.uri, &request.body);
        tracing::debug!(
            "callback string to sign: {}",
            String::from_utf8_lossy(&auth_str)
        );

        match verify_md5_signature(&public_key, &auth_str, &signature) {
            SignatureCheck::Valid => {}
            SignatureCheck::Invalid => {
                return Err(CallbackRejection::signature_invalid(
                    "callback signature does not match",
                ));
            }
            SignatureCheck::Error(e) => {
                return Err(CallbackRejection::signature_invalid(format!(
                    "callback signature could not be checked: {e}"
                )));
            }
        }

        parse_form_body(&request.body)
    }
}
