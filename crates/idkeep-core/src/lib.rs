//! Core identity and credential types for idkeep.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - **Identity**: [`Identity`] and [`TrustDomain`], compared by canonical form
//! - **Credentials**: [`Credential`] with its [`Certificate`] chain and [`PrivateKey`]
//! - **Errors**: [`Error`] with a branchable [`ErrorKind`]
//! - **Ports**: the [`CredentialFetcher`] and [`TrustBundleSource`] boundaries
//!
//! # Example
//!
//! ```rust,ignore
//! use idkeep_core::{Credential, Identity, Result};
//!
//! fn load(chain_pem: &[u8], key_pem: &[u8]) -> Result<Credential> {
//!     let expected = Identity::parse("spiffe://example.org/ns/prod/sa/api")?;
//!     let cred = Credential::from_pem(chain_pem, key_pem)?;
//!     if cred.identity() != &expected {
//!         return Err(idkeep_core::Error::identity_mismatch(&expected, cred.identity()));
//!     }
//!     Ok(cred)
//! }
//! ```

mod clock;
mod credential;
mod error;
mod identity;
mod material;
mod ports;
pub mod x509;

pub use clock::{fixed_clock, system_clock, Clock};
pub use credential::Credential;
pub use error::{Error, ErrorKind, Result};
pub use identity::{Identity, TrustDomain, DEFAULT_SCHEME};
pub use material::{Certificate, PrivateKey};
pub use ports::{CredentialFetcher, ProcessDescriptor, TrustBundleSource};
