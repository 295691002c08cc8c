//! X.509 inspection helpers shared by credential construction and chain validation.

use chrono::{DateTime, Utc};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::time::ASN1Time;

use crate::error::{Error, Result};
use crate::identity::Identity;

/// Parse a single DER-encoded X.509 certificate.
///
/// Trailing bytes after the certificate are rejected.
pub fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>> {
    if der.is_empty() {
        return Err(Error::InvalidInput("certificate is empty".into()));
    }
    let (rest, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| Error::InvalidInput(format!("certificate parse failed: {e}")))?;
    if !rest.is_empty() {
        return Err(Error::InvalidInput(format!(
            "certificate has {} trailing bytes",
            rest.len()
        )));
    }
    Ok(cert)
}

/// Validity window of a certificate as `(not_before, not_after)`.
pub fn validity_window(cert: &X509Certificate<'_>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let validity = cert.validity();
    Ok((
        asn1_to_utc(validity.not_before)?,
        asn1_to_utc(validity.not_after)?,
    ))
}

/// Identity carried in the certificate's URI subject alternative name.
///
/// Exactly one URI SAN is required.
pub fn uri_san_identity(cert: &X509Certificate<'_>) -> Result<Identity> {
    let san = cert
        .subject_alternative_name()
        .map_err(|e| Error::InvalidInput(format!("subject alternative name: {e}")))?
        .ok_or_else(|| Error::InvalidInput("certificate has no subject alternative name".into()))?;

    let mut uris = san.value.general_names.iter().filter_map(|name| match name {
        GeneralName::URI(uri) => Some(*uri),
        _ => None,
    });

    let uri = uris
        .next()
        .ok_or_else(|| Error::InvalidInput("certificate has no URI SAN".into()))?;
    if uris.next().is_some() {
        return Err(Error::InvalidInput(
            "certificate has more than one URI SAN".into(),
        ));
    }
    Identity::parse(uri)
}

/// Convert an ASN.1 `GeneralizedTime` / `UTCTime` to `DateTime<Utc>`.
fn asn1_to_utc(t: ASN1Time) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(t.timestamp(), 0)
        .ok_or_else(|| Error::InvalidInput(format!("timestamp {} out of range", t.timestamp())))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Small rcgen helpers for this crate's own tests.

    use rcgen::{
        BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, SanType,
    };
    use time::OffsetDateTime;

    pub struct Issued {
        pub cert: Certificate,
        pub key: KeyPair,
    }

    fn window(params: &mut CertificateParams, lifetime_hours: i64) {
        let now = OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::hours(1);
        params.not_after = now + time::Duration::hours(lifetime_hours);
    }

    pub fn root(name: &str) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        window(&mut params, 24 * 30);
        let cert = params.self_signed(&key).unwrap();
        Issued { cert, key }
    }

    pub fn leaf(issuer: &Issued, uris: &[&str]) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "workload");
        params.is_ca = IsCa::ExplicitNoCa;
        for uri in uris {
            params
                .subject_alt_names
                .push(SanType::URI((*uri).try_into().unwrap()));
        }
        window(&mut params, 23);
        let cert = params.signed_by(&key, &issuer.cert, &issuer.key).unwrap();
        Issued { cert, key }
    }
}
