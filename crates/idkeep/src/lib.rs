//! Workload identity credentials for Rust services.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use idkeep::{ChainValidator, IdkeepConfig, StaticBundleSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> idkeep::Result<()> {
//!     let config = IdkeepConfig::load("/etc/idkeep/idkeep.toml".as_ref())?;
//!
//!     // My own credential, refreshed before it runs out
//!     let cache = config.cache_builder(Arc::new(MyAuthority::connect().await?)).build();
//!     let mine = cache.get_credential().await?;
//!
//!     // Is the peer who it says it is?
//!     let mut bundles = StaticBundleSource::new();
//!     bundles
//!         .load_pem_file(config.expected_identity.trust_domain(), "/etc/idkeep/bundle.pem")
//!         .await?;
//!     let validator = config.validator_builder().bundle_source(Arc::new(bundles)).build();
//!     validator.validate(&peer_credential, &peer_identity).await?;
//!
//!     cache.close().await
//! }
//! ```
//!
//! # Crates
//!
//! - `idkeep-core` - identities, credentials, errors and the two boundary traits
//! - `idkeep-cache` - [`CredentialCache`] and the refresh policy
//! - `idkeep-verify` - [`ChainValidator`] and [`StaticBundleSource`]

#![doc(html_root_url = "https://docs.rs/idkeep/0.3.0")]

mod config;

pub use config::{IdkeepConfig, RefreshConfig, ValidatorConfig};

// Re-export core types
pub use idkeep_core::*;

// Re-export cache
pub use idkeep_cache::{
    needs_refresh, status_of, CredentialCache, CredentialCacheBuilder, CredentialStatus,
    RefreshOptions,
};

// Re-export validation
pub use idkeep_verify::{ChainValidator, ChainValidatorBuilder, StaticBundleSource};

#[cfg(test)]
mod tests {
    use super::*;
    use idkeep_testkit::{credential_with_window, ScriptedFetcher, SvidSpec, TestPki};
    use std::sync::Arc;

    const API: &str = "spiffe://example.org/ns/prod/sa/api";

    fn config() -> IdkeepConfig {
        IdkeepConfig::from_toml_str(&format!("expected_identity = \"{API}\"")).unwrap()
    }

    #[tokio::test]
    async fn cached_credential_passes_validation() {
        let pki = Arc::new(TestPki::new("example.org"));
        let issuer = Arc::clone(&pki);
        let fetcher = Arc::new(
            ScriptedFetcher::new().generating(move |_| Ok(issuer.issue(&SvidSpec::new(API)))),
        );

        let config = config();
        let cache = config.cache_builder(fetcher.clone()).build();
        let cred = cache.get_credential().await.unwrap();
        assert_eq!(cache.status().await, CredentialStatus::Fresh);

        let bundles =
            StaticBundleSource::new().with_certificates(pki.trust_domain(), pki.bundle());
        let validator = config
            .validator_builder()
            .bundle_source(Arc::new(bundles))
            .build();
        validator
            .validate(&cred, &config.expected_identity)
            .await
            .unwrap();

        cache.close().await.unwrap();
        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(fetcher.close_count(), 1);
    }

    #[tokio::test]
    async fn wrong_identity_from_authority_is_refused() {
        let pki = TestPki::new("example.org");
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_ok(pki.issue_svid("/ns/prod/sa/other"));

        let cache = config().cache_builder(fetcher).build();
        let err = cache.get_credential().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IdentityMismatch);
        assert!(cache.peek().await.is_none());
    }

    #[test]
    fn stale_credential_is_replaced() {
        let now = chrono::Utc::now();
        let stale = credential_with_window(
            API,
            now - chrono::Duration::hours(23),
            now + chrono::Duration::hours(1),
        );
        let fresh = credential_with_window(
            API,
            now - chrono::Duration::hours(1),
            now + chrono::Duration::hours(24),
        );
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_ok(stale);
        fetcher.push_ok(fresh.clone());

        let config = config();
        let cache = config.cache_builder(fetcher.clone()).build();
        tokio_test::block_on(async {
            let first = cache.get_credential().await.unwrap();
            assert!(needs_refresh(Some(first.as_ref()), &config.refresh_options(), now));
            assert_eq!(cache.status().await, CredentialStatus::DueForRefresh);

            let second = cache.get_credential().await.unwrap();
            assert_eq!(second.not_after(), fresh.not_after());
        });
        assert_eq!(fetcher.fetch_count(), 2);
    }
}
