//! Auto-refreshing credential cache.
//!
//! [`CredentialCache`] keeps one credential for the current process and
//! replaces it through a [`CredentialFetcher`] when [`needs_refresh`] says it
//! is stale. At most one fetch runs per cache at any time; concurrent callers
//! that find the credential stale wait for that fetch and share its result.
//!
//! # Example
//!
//! ```rust,ignore
//! use idkeep_cache::{CredentialCache, RefreshOptions};
//!
//! let cache = CredentialCache::builder(expected_identity, fetcher)
//!     .options(RefreshOptions::new().renew_threshold_fraction(0.25))
//!     .build();
//!
//! let cred = cache.get_credential().await?;
//! println!("serving as {} until {}", cred.identity(), cred.not_after());
//!
//! cache.close().await?;
//! ```

mod cache;
mod policy;

pub use cache::{CredentialCache, CredentialCacheBuilder};
pub use idkeep_core::{CredentialFetcher, ProcessDescriptor};
pub use policy::{
    needs_refresh, status_of, CredentialStatus, RefreshOptions, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_NOT_BEFORE_SKEW_TOLERANCE, DEFAULT_RENEW_THRESHOLD_FRACTION,
};
