//! Peer credential validation for idkeep.
//!
//! [`ChainValidator`] decides whether a credential presented by a peer is
//! acceptable for an expected identity: time window with skew tolerance,
//! claimed identity, then X.509 path verification against the trust bundle
//! for the expected trust domain, then the identity in the verified leaf.
//!
//! # Example
//!
//! ```rust,ignore
//! use idkeep_verify::{ChainValidator, StaticBundleSource};
//! use std::sync::Arc;
//!
//! let mut bundles = StaticBundleSource::new();
//! bundles.load_pem_file(&trust_domain, "/etc/idkeep/bundle.pem").await?;
//! let validator = ChainValidator::new(Arc::new(bundles));
//! validator.validate(&peer_credential, &expected).await?;
//! ```

mod bundle;
mod path;
mod validator;

pub use bundle::StaticBundleSource;
pub use path::{verify_path, MAX_CHAIN_DEPTH};
pub use validator::{ChainValidator, ChainValidatorBuilder, DEFAULT_SKEW_TOLERANCE};

// Re-export the boundary so users need only this crate
pub use idkeep_core::TrustBundleSource;
