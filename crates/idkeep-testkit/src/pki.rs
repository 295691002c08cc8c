//! Throwaway PKI: root CA, intermediate CA and leaf SVIDs.
//!
//! ```text
//! root (self-signed, in the trust bundle)
//!   └── intermediate (travels in the credential chain)
//!         └── leaf SVID (URI SAN = workload identity)
//! ```

use chrono::{DateTime, Duration, Utc};
use idkeep_core::{Certificate, Credential, Identity, PrivateKey, TrustDomain};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose, SanType,
};
use time::OffsetDateTime;

/// A signing authority: certificate plus its key.
pub struct Authority {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl Authority {
    /// DER certificate
    #[must_use]
    pub fn certificate(&self) -> Certificate {
        Certificate::from_der(self.cert.der().to_vec())
    }

    /// PEM certificate
    #[must_use]
    pub fn pem(&self) -> String {
        self.cert.pem()
    }
}

/// Which authority signs a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signer {
    /// The intermediate; the credential chain carries the intermediate
    Intermediate,
    /// The root directly; the credential chain is empty
    Root,
}

/// What to put in a leaf certificate and the credential wrapping it.
#[derive(Debug, Clone)]
pub struct SvidSpec {
    /// Identity recorded in the credential (what it claims)
    pub claimed: String,
    /// URI SANs written into the certificate (what verification sees)
    pub san_uris: Vec<String>,
    /// Certificate `notBefore`
    pub not_before: DateTime<Utc>,
    /// Certificate `notAfter`
    pub not_after: DateTime<Utc>,
    /// Mark the leaf as a CA
    pub is_ca: bool,
    /// Signing authority
    pub signer: Signer,
}

impl SvidSpec {
    /// A one-hour-old leaf valid for another 23 hours, claiming and carrying `identity`
    #[must_use]
    pub fn new(identity: &str) -> Self {
        let now = Utc::now();
        Self {
            claimed: identity.to_string(),
            san_uris: vec![identity.to_string()],
            not_before: now - Duration::hours(1),
            not_after: now + Duration::hours(23),
            is_ca: false,
            signer: Signer::Intermediate,
        }
    }

    /// Set the validity window
    #[must_use]
    pub const fn window(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    /// Claim a different identity than the certificate carries
    #[must_use]
    pub fn claiming(mut self, identity: &str) -> Self {
        self.claimed = identity.to_string();
        self
    }

    /// Replace the URI SANs
    #[must_use]
    pub fn san_uris(mut self, uris: &[&str]) -> Self {
        self.san_uris = uris.iter().map(|u| (*u).to_string()).collect();
        self
    }

    /// Make the leaf a CA certificate
    #[must_use]
    pub const fn as_ca(mut self) -> Self {
        self.is_ca = true;
        self
    }

    /// Sign with the root instead of the intermediate
    #[must_use]
    pub const fn signed_by_root(mut self) -> Self {
        self.signer = Signer::Root;
        self
    }
}

/// A root and intermediate CA for one trust domain.
pub struct TestPki {
    trust_domain: TrustDomain,
    root: Authority,
    intermediate: Authority,
}

impl TestPki {
    /// Generate a fresh PKI. Both CAs are valid from a day ago for a year.
    #[must_use]
    pub fn new(trust_domain: &str) -> Self {
        let now = Utc::now();
        Self::with_intermediate_window(
            trust_domain,
            now - Duration::days(1),
            now + Duration::days(365),
        )
    }

    /// Generate a PKI whose intermediate has the given validity window.
    #[must_use]
    pub fn with_intermediate_window(
        trust_domain: &str,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        Self::generate(trust_domain, [None, None], (not_before, not_after))
    }

    /// Generate a PKI whose root and intermediate carry the given
    /// `pathLenConstraint`s (`None` leaves that CA unconstrained).
    #[must_use]
    pub fn with_path_len(trust_domain: &str, root: Option<u8>, intermediate: Option<u8>) -> Self {
        let now = Utc::now();
        Self::generate(
            trust_domain,
            [root, intermediate],
            (now - Duration::days(1), now + Duration::days(365)),
        )
    }

    fn generate(
        trust_domain: &str,
        [root_path_len, intermediate_path_len]: [Option<u8>; 2],
        (not_before, not_after): (DateTime<Utc>, DateTime<Utc>),
    ) -> Self {
        let now = Utc::now();
        let root = root_authority(
            &format!("{trust_domain} Root CA"),
            root_path_len,
            now - Duration::days(1),
            now + Duration::days(365),
        );
        let intermediate = intermediate_authority(
            &format!("{trust_domain} Intermediate CA"),
            &root,
            intermediate_path_len,
            not_before,
            not_after,
        );
        Self {
            trust_domain: TrustDomain::new(trust_domain).expect("valid trust domain"),
            root,
            intermediate,
        }
    }

    /// Trust domain the PKI issues for
    #[must_use]
    pub const fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Root authority
    #[must_use]
    pub const fn root(&self) -> &Authority {
        &self.root
    }

    /// Intermediate authority
    #[must_use]
    pub const fn intermediate(&self) -> &Authority {
        &self.intermediate
    }

    /// Trust bundle for this PKI (the root only)
    #[must_use]
    pub fn bundle(&self) -> Vec<Certificate> {
        vec![self.root.certificate()]
    }

    /// Issue a standard SVID for `path` in this trust domain
    #[must_use]
    pub fn issue_svid(&self, path: &str) -> Credential {
        self.issue(&SvidSpec::new(&format!("spiffe://{}{path}", self.trust_domain)))
    }

    /// Issue a leaf as described by `svid`
    #[must_use]
    pub fn issue(&self, svid: &SvidSpec) -> Credential {
        let key = KeyPair::generate().expect("generate leaf key");
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "SVID");
        params.is_ca = if svid.is_ca {
            IsCa::Ca(BasicConstraints::Unconstrained)
        } else {
            IsCa::ExplicitNoCa
        };
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        for uri in &svid.san_uris {
            params
                .subject_alt_names
                .push(SanType::URI(uri.as_str().try_into().expect("ia5 uri")));
        }
        params.not_before = to_offset(svid.not_before);
        params.not_after = to_offset(svid.not_after);

        let (issuer, chain) = match svid.signer {
            Signer::Intermediate => (&self.intermediate, vec![self.intermediate.certificate()]),
            Signer::Root => (&self.root, Vec::new()),
        };
        let cert = params
            .signed_by(&key, &issuer.cert, &issuer.key)
            .expect("sign leaf");

        Credential::new(
            Identity::parse(&svid.claimed).expect("valid claimed identity"),
            Certificate::from_der(cert.der().to_vec()),
            PrivateKey::from_pkcs8_der(key.serialize_der()),
            chain,
            svid.not_before,
            svid.not_after,
        )
    }
}

fn root_authority(
    name: &str,
    path_len: Option<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Authority {
    let key = KeyPair::generate().expect("generate root key");
    let mut params = ca_params(name, path_len, not_before, not_after);
    params.distinguished_name.push(DnType::OrganizationName, "idkeep test");
    let cert = params.self_signed(&key).expect("self-sign root");
    Authority { cert, key }
}

fn intermediate_authority(
    name: &str,
    root: &Authority,
    path_len: Option<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Authority {
    let key = KeyPair::generate().expect("generate intermediate key");
    let params = ca_params(name, path_len, not_before, not_after);
    let cert = params
        .signed_by(&key, &root.cert, &root.key)
        .expect("sign intermediate");
    Authority { cert, key }
}

fn ca_params(
    name: &str,
    path_len: Option<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, name);
    params.is_ca = IsCa::Ca(
        path_len.map_or(BasicConstraints::Unconstrained, BasicConstraints::Constrained),
    );
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.not_before = to_offset(not_before);
    params.not_after = to_offset(not_after);
    params
}

fn to_offset(t: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(t.timestamp()).expect("timestamp in range")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_svid_carries_identity_and_intermediate() {
        let pki = TestPki::new("example.org");
        let cred = pki.issue_svid("/api");

        assert_eq!(cred.identity().as_str(), "spiffe://example.org/api");
        assert_eq!(cred.chain(), &[pki.intermediate().certificate()]);

        let parsed = Credential::from_der(
            cred.certificate().clone(),
            cred.private_key().clone(),
            cred.chain().to_vec(),
        )
        .unwrap();
        assert_eq!(parsed.identity(), cred.identity());
        assert_eq!(parsed.not_after().timestamp(), cred.not_after().timestamp());
    }

    #[test]
    fn path_len_is_written_into_ca_certificates() {
        let pki = TestPki::with_path_len("example.org", Some(0), None);
        let root = pki.root().certificate();
        let parsed = idkeep_core::x509::parse_certificate(root.der()).unwrap();
        let constraints = parsed.basic_constraints().unwrap().unwrap();
        assert_eq!(constraints.value.path_len_constraint, Some(0));
    }

    #[test]
    fn root_signed_svid_has_empty_chain() {
        let pki = TestPki::new("example.org");
        let cred = pki.issue(&SvidSpec::new("spiffe://example.org/api").signed_by_root());
        assert!(cred.chain().is_empty());
    }
}
