//! Peer credential validation.

use chrono::{DateTime, Utc};
use idkeep_core::{
    system_clock, Certificate, Clock, Credential, Error, Identity, Result, TrustBundleSource,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::path::verify_path;

/// Default clock-skew tolerance for validity checks.
pub const DEFAULT_SKEW_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Checks whether a peer's credential is acceptable for an expected identity.
///
/// Cheap checks run before any cryptography:
///
/// 1. a leaf certificate is present
/// 2. the credential's window holds at `now`, give or take the skew tolerance
/// 3. the claimed identity is the expected one
/// 4. a trust bundle source is configured
/// 5. the chain verifies against the expected trust domain's bundle
/// 6. the identity in the verified leaf is the expected one
pub struct ChainValidator {
    bundles: Option<Arc<dyn TrustBundleSource>>,
    skew: Duration,
    clock: Clock,
}

impl ChainValidator {
    /// Validator backed by `bundles`, with default skew and the system clock
    #[must_use]
    pub fn new(bundles: Arc<dyn TrustBundleSource>) -> Self {
        Self::builder().bundle_source(bundles).build()
    }

    /// Start building a validator
    pub fn builder() -> ChainValidatorBuilder {
        ChainValidatorBuilder::new()
    }

    /// Effective skew tolerance
    #[must_use]
    pub const fn skew_tolerance(&self) -> Duration {
        self.skew
    }

    /// Validate `credential` against `expected`.
    pub async fn validate(&self, credential: &Credential, expected: &Identity) -> Result<()> {
        let now = (self.clock)();

        let leaf = credential.certificate();
        if leaf.is_empty() {
            return Err(Error::InvalidInput("credential has no leaf certificate".into()));
        }

        self.check_window(credential, now)?;

        if credential.identity() != expected {
            debug!(
                expected = %expected,
                claimed = %credential.identity(),
                "Claimed identity rejected before verification"
            );
            return Err(Error::identity_mismatch(expected, credential.identity()));
        }

        let chain: Vec<Certificate> = std::iter::once(leaf.clone())
            .chain(credential.chain().iter().filter(|c| !c.is_empty()).cloned())
            .collect();

        let Some(source) = &self.bundles else {
            return Err(Error::ChainInvalid("no trust bundle source configured".into()));
        };
        let trust_domain = expected.trust_domain();
        let anchors = source.bundle_for(trust_domain).await.map_err(|e| match e {
            Error::ChainInvalid(_) => e,
            other => Error::ChainInvalid(format!("trust bundle for {trust_domain}: {other}")),
        })?;

        let verified = verify_path(&chain, &anchors, now, self.chrono_skew()).inspect_err(|e| {
            warn!(identity = %expected, error = %e, "Chain verification failed");
        })?;

        if &verified != expected {
            warn!(
                expected = %expected,
                verified = %verified,
                "Verified identity does not match"
            );
            return Err(Error::identity_mismatch(expected, &verified));
        }

        debug!(
            identity = %expected,
            depth = chain.len(),
            fingerprint = %leaf.fingerprint(),
            "Peer credential verified"
        );
        Ok(())
    }

    fn check_window(&self, credential: &Credential, now: DateTime<Utc>) -> Result<()> {
        // A skew that overflows the timestamp range leaves that side unbounded.
        let skew = self.chrono_skew();
        if credential
            .not_before()
            .checked_sub_signed(skew)
            .is_some_and(|earliest| now < earliest)
        {
            return Err(Error::NotYetValid {
                not_before: credential.not_before(),
                now,
            });
        }
        if credential
            .not_after()
            .checked_add_signed(skew)
            .is_some_and(|latest| now > latest)
        {
            return Err(Error::Expired {
                not_after: credential.not_after(),
                now,
            });
        }
        Ok(())
    }

    fn chrono_skew(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.skew).unwrap_or_else(|_| chrono::Duration::minutes(5))
    }
}

impl fmt::Debug for ChainValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainValidator")
            .field("has_bundle_source", &self.bundles.is_some())
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ChainValidator`].
#[must_use]
pub struct ChainValidatorBuilder {
    bundles: Option<Arc<dyn TrustBundleSource>>,
    skew: Duration,
    clock: Clock,
}

impl Default for ChainValidatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainValidatorBuilder {
    /// No bundle source, default skew, system clock
    pub fn new() -> Self {
        Self {
            bundles: None,
            skew: DEFAULT_SKEW_TOLERANCE,
            clock: system_clock(),
        }
    }

    /// Where trusted authorities come from
    pub fn bundle_source(mut self, bundles: Arc<dyn TrustBundleSource>) -> Self {
        self.bundles = Some(bundles);
        self
    }

    /// Clock-skew tolerance; zero resets to the default
    pub const fn skew_tolerance(mut self, skew: Duration) -> Self {
        self.skew = if skew.is_zero() {
            DEFAULT_SKEW_TOLERANCE
        } else {
            skew
        };
        self
    }

    /// Time source, for deterministic tests
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Build the validator
    pub fn build(self) -> ChainValidator {
        ChainValidator {
            bundles: self.bundles,
            skew: self.skew,
            clock: self.clock,
        }
    }
}
