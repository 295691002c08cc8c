//! Test fixtures shared by the idkeep crates.
//!
//! - [`TestPki`] issues real X.509 SVIDs from a throwaway root and intermediate
//! - [`ScriptedFetcher`] replays fetch results and counts calls
//! - [`CountingBundleSource`] counts trust bundle lookups
//! - [`credential_with_window`] builds a credential that only carries a window

mod fetcher;
mod pki;

pub use fetcher::{CountingBundleSource, ScriptedFetcher};
pub use pki::{Authority, Signer, SvidSpec, TestPki};

use chrono::{DateTime, Utc};
use idkeep_core::{Certificate, Credential, Identity, PrivateKey};

/// A credential with placeholder key material and the given validity window.
///
/// Good for refresh-policy and cache tests; never passes chain validation.
#[must_use]
pub fn credential_with_window(
    identity: &str,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Credential {
    Credential::new(
        Identity::parse(identity).expect("valid identity"),
        Certificate::from_der(format!("test-cert:{identity}:{}", not_after.timestamp()).into_bytes()),
        PrivateKey::from_pkcs8_der(b"test-key".to_vec()),
        Vec::new(),
        not_before,
        not_after,
    )
}
