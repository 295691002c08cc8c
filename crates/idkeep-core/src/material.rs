//! Immutable certificate and key material.

use ring::digest::{digest, SHA256};
use std::fmt;
use std::sync::Arc;

/// A DER-encoded X.509 certificate.
///
/// The bytes are shared, never mutated.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate(Arc<[u8]>);

impl Certificate {
    /// Wrap DER bytes. Parsing happens where the certificate is used.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self(der.into().into())
    }

    /// Raw DER bytes
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.0
    }

    /// True if there are no bytes at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SHA-256 of the DER bytes, lowercase hex
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(digest(&SHA256, &self.0).as_ref())
    }

    /// PEM encoding with a `CERTIFICATE` tag
    #[must_use]
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.0.to_vec()))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("len", &self.0.len())
            .field("sha256", &self.fingerprint())
            .finish()
    }
}

/// An opaque private key (PKCS#8 DER).
///
/// `Debug` never prints the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(Arc<[u8]>);

impl PrivateKey {
    /// Wrap PKCS#8 DER bytes
    pub fn from_pkcs8_der(der: impl Into<Vec<u8>>) -> Self {
        Self(der.into().into())
    }

    /// Raw PKCS#8 DER bytes, for handing to a TLS stack
    #[must_use]
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}
