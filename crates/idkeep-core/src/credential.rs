//! Short-lived credentials: leaf certificate, key, chain and validity window.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::material::{Certificate, PrivateKey};
use crate::x509;

/// A credential issued to a workload.
///
/// Immutable once constructed. The validity window is stored alongside the
/// certificate so that refresh decisions never need to re-parse DER.
#[derive(Debug, Clone)]
pub struct Credential {
    identity: Identity,
    certificate: Certificate,
    private_key: PrivateKey,
    chain: Arc<[Certificate]>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl Credential {
    /// Assemble a credential from already-known parts.
    ///
    /// No consistency check is made between `identity`, the window and the
    /// certificate; use [`Credential::from_der`] to derive them from the leaf.
    pub fn new(
        identity: Identity,
        certificate: Certificate,
        private_key: PrivateKey,
        chain: Vec<Certificate>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        Self {
            identity,
            certificate,
            private_key,
            chain: chain.into(),
            not_before,
            not_after,
        }
    }

    /// Build a credential from a DER leaf, taking identity (URI SAN) and
    /// validity window from the certificate itself.
    pub fn from_der(
        certificate: Certificate,
        private_key: PrivateKey,
        chain: Vec<Certificate>,
    ) -> Result<Self> {
        let parsed = x509::parse_certificate(certificate.der())?;
        let identity = x509::uri_san_identity(&parsed)?;
        let (not_before, not_after) = x509::validity_window(&parsed)?;

        if private_key.pkcs8_der().is_empty() {
            return Err(Error::InvalidInput("private key is empty".into()));
        }

        Ok(Self::new(
            identity,
            certificate,
            private_key,
            chain,
            not_before,
            not_after,
        ))
    }

    /// Build a credential from a PEM certificate bundle (leaf first, then
    /// intermediates) and a PEM `PRIVATE KEY`.
    ///
    /// Non-certificate blocks in the bundle are skipped.
    pub fn from_pem(chain_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let blocks = pem::parse_many(chain_pem)
            .map_err(|e| Error::InvalidInput(format!("certificate PEM: {e}")))?;
        let total = blocks.len();
        let mut certs: Vec<Certificate> = blocks
            .into_iter()
            .filter(|p| p.tag() == "CERTIFICATE")
            .map(|p| Certificate::from_der(p.into_contents()))
            .collect();
        if certs.len() < total {
            debug!(
                skipped = total - certs.len(),
                "Ignoring non-certificate PEM blocks in chain"
            );
        }
        if certs.is_empty() {
            return Err(Error::InvalidInput("PEM bundle holds no certificate".into()));
        }
        let leaf = certs.remove(0);
        let chain = certs;

        let key = pem::parse(key_pem)
            .map_err(|e| Error::InvalidInput(format!("private key PEM: {e}")))?;
        if key.tag() != "PRIVATE KEY" {
            return Err(Error::InvalidInput(format!(
                "expected a PKCS#8 PRIVATE KEY block, found {}",
                key.tag()
            )));
        }

        Self::from_der(leaf, PrivateKey::from_pkcs8_der(key.into_contents()), chain)
    }

    /// Identity the credential claims
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Leaf certificate
    #[must_use]
    pub const fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Private key matching the leaf
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Intermediate certificates, closest to the leaf first
    #[must_use]
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Start of the validity window
    #[must_use]
    pub const fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window
    #[must_use]
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Total lifetime; zero or negative for a malformed window
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.not_after - self.not_before
    }

    /// True once `now` has reached `not_after`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_after
    }

    /// Fraction of the lifetime still remaining at `now`.
    ///
    /// `None` when the lifetime is not positive. Negative once expired.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn remaining_fraction(&self, now: DateTime<Utc>) -> Option<f64> {
        let lifetime = self.lifetime().num_milliseconds();
        if lifetime <= 0 {
            return None;
        }
        let remaining = (self.not_after - now).num_milliseconds();
        Some(remaining as f64 / lifetime as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::testing::{leaf, root};

    fn sample(not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Credential {
        Credential::new(
            Identity::parse("spiffe://example.org/api").unwrap(),
            Certificate::from_der(vec![0x30]),
            PrivateKey::from_pkcs8_der(vec![1]),
            vec![],
            not_before,
            not_after,
        )
    }

    #[test]
    fn remaining_fraction_tracks_window() {
        let now = Utc::now();
        let cred = sample(now - Duration::hours(1), now + Duration::hours(3));
        let fraction = cred.remaining_fraction(now).unwrap();
        assert!((fraction - 0.75).abs() < 1e-9);
        assert!(!cred.is_expired_at(now));
        assert!(cred.is_expired_at(now + Duration::hours(3)));
    }

    #[test]
    fn remaining_fraction_none_for_empty_lifetime() {
        let now = Utc::now();
        assert!(sample(now, now).remaining_fraction(now).is_none());
        assert!(sample(now, now - Duration::seconds(1))
            .remaining_fraction(now)
            .is_none());
    }

    #[test]
    fn from_der_reads_identity_and_window() {
        let ca = root("Root");
        let svid = leaf(&ca, &["spiffe://example.org/api"]);

        let cred = Credential::from_der(
            Certificate::from_der(svid.cert.der().to_vec()),
            PrivateKey::from_pkcs8_der(svid.key.serialize_der()),
            vec![],
        )
        .unwrap();

        assert_eq!(cred.identity().as_str(), "spiffe://example.org/api");
        assert_eq!(cred.lifetime().num_hours(), 24);
        assert!(cred.chain().is_empty());
    }

    #[test]
    fn from_pem_splits_leaf_and_chain() {
        let ca = root("Root");
        let svid = leaf(&ca, &["spiffe://example.org/api"]);
        let bundle = format!("{}{}", svid.cert.pem(), ca.cert.pem());

        let cred =
            Credential::from_pem(bundle.as_bytes(), svid.key.serialize_pem().as_bytes()).unwrap();

        assert_eq!(cred.chain().len(), 1);
        assert_eq!(cred.chain()[0].der(), &ca.cert.der()[..]);
        assert_eq!(cred.certificate().der(), &svid.cert.der()[..]);
    }

    #[test]
    fn from_pem_rejects_missing_material() {
        let ca = root("Root");
        let svid = leaf(&ca, &["spiffe://example.org/api"]);
        let key = svid.key.serialize_pem();

        let err = Credential::from_pem(b"", key.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);

        let err = Credential::from_pem(svid.cert.pem().as_bytes(), svid.cert.pem().as_bytes())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }
}
