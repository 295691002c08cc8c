//! In-memory trust bundles keyed by trust domain.

use async_trait::async_trait;
use idkeep_core::{x509, Certificate, Error, Result, TrustBundleSource, TrustDomain};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// A fixed set of trusted authorities per trust domain.
///
/// Certificates are deduplicated by SHA-256 fingerprint. Lookups for a trust
/// domain with no bundle fail with [`Error::ChainInvalid`].
#[derive(Debug, Clone, Default)]
pub struct StaticBundleSource {
    bundles: HashMap<TrustDomain, Vec<Certificate>>,
    seen: HashMap<TrustDomain, HashSet<String>>,
}

impl StaticBundleSource {
    /// Empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add certificates for `trust_domain`, builder style
    #[must_use]
    pub fn with_certificates(
        mut self,
        trust_domain: &TrustDomain,
        certs: impl IntoIterator<Item = Certificate>,
    ) -> Self {
        for cert in certs {
            self.insert_der(trust_domain, cert);
        }
        self
    }

    /// Add one DER certificate. Returns false if it was already present.
    pub fn insert_der(&mut self, trust_domain: &TrustDomain, cert: Certificate) -> bool {
        let fingerprint = cert.fingerprint();
        if !self
            .seen
            .entry(trust_domain.clone())
            .or_default()
            .insert(fingerprint.clone())
        {
            debug!(
                trust_domain = %trust_domain,
                %fingerprint,
                "Duplicate bundle certificate skipped"
            );
            return false;
        }
        self.bundles
            .entry(trust_domain.clone())
            .or_default()
            .push(cert);
        true
    }

    /// Add every `CERTIFICATE` block in a PEM document.
    ///
    /// Other block types and certificates that do not parse are skipped.
    /// Returns the number of certificates added.
    pub fn insert_pem(&mut self, trust_domain: &TrustDomain, pem_data: &[u8]) -> Result<usize> {
        let blocks = pem::parse_many(pem_data)
            .map_err(|e| Error::InvalidInput(format!("trust bundle PEM: {e}")))?;

        let mut added = 0;
        for block in blocks {
            if block.tag() != "CERTIFICATE" {
                debug!(tag = block.tag(), "Skipping non-certificate PEM block");
                continue;
            }
            let der = block.into_contents();
            if let Err(e) = x509::parse_certificate(&der) {
                debug!(error = %e, "Skipping unparseable bundle certificate");
                continue;
            }
            if self.insert_der(trust_domain, Certificate::from_der(der)) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Read a PEM file and add its certificates for `trust_domain`.
    pub async fn load_pem_file(
        &mut self,
        trust_domain: &TrustDomain,
        path: impl AsRef<Path>,
    ) -> Result<usize> {
        let path = path.as_ref();
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Config(format!("read trust bundle {}: {e}", path.display())))?;
        let added = self.insert_pem(trust_domain, &content)?;
        if added == 0 {
            warn!(
                path = %path.display(),
                trust_domain = %trust_domain,
                "Trust bundle file added no certificates"
            );
        } else {
            debug!(
                path = %path.display(),
                trust_domain = %trust_domain,
                added,
                "Loaded trust bundle"
            );
        }
        Ok(added)
    }

    /// Certificates currently trusted for `trust_domain`
    #[must_use]
    pub fn certificates(&self, trust_domain: &TrustDomain) -> &[Certificate] {
        self.bundles.get(trust_domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Trust domains with at least one certificate
    pub fn trust_domains(&self) -> impl Iterator<Item = &TrustDomain> {
        self.bundles.keys()
    }
}

#[async_trait]
impl TrustBundleSource for StaticBundleSource {
    async fn bundle_for(&self, trust_domain: &TrustDomain) -> Result<Vec<Certificate>> {
        match self.bundles.get(trust_domain) {
            Some(certs) if !certs.is_empty() => Ok(certs.clone()),
            _ => Err(Error::ChainInvalid(format!(
                "no trust bundle for {trust_domain}"
            ))),
        }
    }
}
