//! Certification path verification.
//!
//! Walks from the leaf towards a trust anchor:
//!
//! ```text
//! leaf ── issued by ──> chain[1] ── issued by ──> ... ──> anchor in bundle
//! ```
//!
//! Each link requires a matching issuer/subject name, an issuer that is a CA
//! and a signature that verifies under the issuer's key. An issuer's
//! `pathLenConstraint` bounds the intermediates below it. The walk ends as
//! soon as a chain certificate is itself in the bundle, or is signed by one;
//! certificates after that point are never looked at beyond parsing.

use chrono::{DateTime, Duration, Utc};
use idkeep_core::{x509, Certificate, Error, Identity, Result};
use tracing::{debug, trace};
use x509_parser::certificate::X509Certificate;

/// Longest chain (leaf included) that will be walked.
pub const MAX_CHAIN_DEPTH: usize = 8;

/// Verify `chain` (leaf first) against `anchors` at `now`.
///
/// Returns the identity carried in the leaf's URI SAN. Every failure is
/// reported as [`Error::ChainInvalid`].
pub fn verify_path(
    chain: &[Certificate],
    anchors: &[Certificate],
    now: DateTime<Utc>,
    skew: Duration,
) -> Result<Identity> {
    if chain.is_empty() {
        return Err(Error::ChainInvalid("empty certificate chain".into()));
    }
    if chain.len() > MAX_CHAIN_DEPTH {
        return Err(Error::ChainInvalid(format!(
            "chain of {} certificates exceeds depth limit {MAX_CHAIN_DEPTH}",
            chain.len()
        )));
    }

    let parsed = chain
        .iter()
        .map(|c| x509::parse_certificate(c.der()).map_err(untrusted))
        .collect::<Result<Vec<_>>>()?;

    let roots: Vec<(&Certificate, X509Certificate<'_>)> = anchors
        .iter()
        .filter_map(|c| match x509::parse_certificate(c.der()) {
            Ok(parsed) => Some((c, parsed)),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable trust anchor");
                None
            }
        })
        .collect();
    if roots.is_empty() {
        return Err(Error::ChainInvalid("trust bundle holds no usable certificates".into()));
    }

    let leaf = &parsed[0];
    if leaf.is_ca() {
        return Err(Error::ChainInvalid("leaf certificate is a CA".into()));
    }
    check_window(leaf, now, skew)?;

    // `depth` is also the number of intermediates between the leaf and
    // whoever issued `cert`.
    for (depth, cert) in parsed.iter().enumerate() {
        if depth > 0 && roots.iter().any(|(anchor, _)| anchor.der() == chain[depth].der()) {
            trace!(depth, "Chain reaches a bundle certificate");
            return leaf_identity(leaf);
        }

        if let Some((_, anchor)) = roots.iter().find(|(_, root)| issued_by(cert, root).is_ok()) {
            check_window(anchor, now, skew)?;
            check_path_len(anchor, depth)?;
            trace!(depth, anchor = %anchor.subject(), "Chain anchored");
            return leaf_identity(leaf);
        }

        let Some(issuer) = parsed.get(depth + 1) else {
            break;
        };
        issued_by(cert, issuer)?;
        check_window(issuer, now, skew)?;
        check_path_len(issuer, depth)?;
    }

    Err(Error::ChainInvalid(format!(
        "no path from {} to a trusted authority",
        leaf.subject()
    )))
}

fn issued_by(child: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> Result<()> {
    if child.issuer().as_raw() != issuer.subject().as_raw() {
        return Err(Error::ChainInvalid(format!(
            "issuer '{}' of '{}' does not match '{}'",
            child.issuer(),
            child.subject(),
            issuer.subject()
        )));
    }
    if !issuer.is_ca() {
        return Err(Error::ChainInvalid(format!(
            "'{}' is not a CA certificate",
            issuer.subject()
        )));
    }
    child
        .verify_signature(Some(issuer.public_key()))
        .map_err(|e| {
            Error::ChainInvalid(format!(
                "signature on '{}' does not verify: {e}",
                child.subject()
            ))
        })
}

fn check_window(cert: &X509Certificate<'_>, now: DateTime<Utc>, skew: Duration) -> Result<()> {
    let (not_before, not_after) = x509::validity_window(cert).map_err(untrusted)?;
    // Overflowing the timestamp range leaves that side unbounded.
    let too_early = not_before
        .checked_sub_signed(skew)
        .is_some_and(|earliest| now < earliest);
    let too_late = not_after
        .checked_add_signed(skew)
        .is_some_and(|latest| now > latest);
    if too_early || too_late {
        return Err(Error::ChainInvalid(format!(
            "'{}' is outside its validity window {not_before} .. {not_after}",
            cert.subject()
        )));
    }
    Ok(())
}

fn check_path_len(issuer: &X509Certificate<'_>, below: usize) -> Result<()> {
    let limit = issuer
        .basic_constraints()
        .map_err(|e| {
            Error::ChainInvalid(format!(
                "basic constraints of '{}': {e}",
                issuer.subject()
            ))
        })?
        .and_then(|ext| ext.value.path_len_constraint);
    match limit {
        Some(limit) if usize::try_from(limit).is_ok_and(|limit| below > limit) => {
            Err(Error::ChainInvalid(format!(
                "'{}' allows a path length of {limit}, chain has {below} intermediates below it",
                issuer.subject()
            )))
        }
        _ => Ok(()),
    }
}

fn leaf_identity(leaf: &X509Certificate<'_>) -> Result<Identity> {
    x509::uri_san_identity(leaf).map_err(untrusted)
}

fn untrusted(e: Error) -> Error {
    match e {
        Error::InvalidInput(msg) => Error::ChainInvalid(msg),
        other => other,
    }
}
