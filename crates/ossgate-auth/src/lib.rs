//! ossgate direct-upload authorization
//!
//! This crate provides:
//! - Upload policy documents and their HMAC-SHA1 signatures
//! - Callback descriptors with system and custom (`x:`) fields
//! - Signed upload forms for browser/mobile direct uploads
//! - RSA verification of upload-completed callbacks
//!
//! # Example
//!
//! ```rust,ignore
//! use ossgate_auth::{AccountContext, DirectUploadSigner, UploadConfig};
//! use std::sync::Arc;
//!
//! let account = AccountContext::new("LTAI...", "secret", "media", "oss-cn-hangzhou.aliyuncs.com");
//! let signer = DirectUploadSigner::new(Arc::new(account));
//! let form = signer.authorize(
//!     &UploadConfig::new("uploads/", "https://app.example.com/oss/callback")
//!         .with_custom_field("userId", "42"),
//! )?;
//!
//! // Later, in the callback handler:
//! // let fields = verifier.verify(&InboundRequest::from(request)).await?;
//! ```

pub mod account;
pub mod callback;
pub mod clock;
pub mod error;
pub mod keys;
pub mod policy;
pub mod signature;
pub mod upload;
pub mod verifier;

pub use account::AccountContext;
pub use callback::{CallbackBodyBuilder, CallbackDescriptor};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CallbackRejection, RejectionKind, UploadError};
pub use keys::{CachingKeyFetcher, HttpKeyFetcher, KeyFetchError, PublicKeyFetcher, StaticKeyFetcher};
pub use policy::{Condition, PolicyBuilder, UploadPolicy};
pub use signature::SignatureEngine;
pub use upload::{DirectUploadSigner, SignedUploadForm, UploadConfig};
pub use verifier::{CallbackFields, CallbackVerifier, InboundRequest, SignatureCheck};
