//! Workload identities of the form `scheme://trust-domain/path`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use crate::error::{Error, Result};

/// Scheme assumed when none is given to [`Identity::from_parts`].
pub const DEFAULT_SCHEME: &str = "spiffe";

/// Namespace under which identities are issued and validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrustDomain(String);

impl TrustDomain {
    /// Create a trust domain, lower-casing the name.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref().trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(Error::InvalidInput("trust domain is empty".into()));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        {
            return Err(Error::InvalidInput(format!(
                "trust domain {name:?} contains invalid character {bad:?}"
            )));
        }
        Ok(Self(name))
    }

    /// The trust domain name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrustDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrustDomain {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TrustDomain> for String {
    fn from(td: TrustDomain) -> Self {
        td.0
    }
}

/// An immutable workload identity.
///
/// Two identities are equal when their canonical string forms are equal.
/// Cloning is cheap; the canonical form is shared.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    canonical: Arc<str>,
    trust_domain: TrustDomain,
    scheme_len: usize,
    path_start: usize,
}

impl Identity {
    /// Parse an identity URI such as `spiffe://example.org/ns/prod/sa/api`.
    ///
    /// The trust domain is lower-cased. Ports, user-info, queries, fragments,
    /// empty / `.` / `..` path segments and trailing slashes are rejected.
    pub fn parse(input: &str) -> Result<Self> {
        // url strips surrounding spaces and embedded tabs/newlines, which would
        // leave the raw path and the parsed URL disagreeing.
        if input.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidInput(format!(
                "identity {input:?} contains whitespace or control characters"
            )));
        }
        let url = Url::parse(input)
            .map_err(|e| Error::InvalidInput(format!("identity {input:?}: {e}")))?;

        if url.cannot_be_a_base() {
            return Err(Error::InvalidInput(format!(
                "identity {input:?} has no authority"
            )));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::InvalidInput(format!(
                "identity {input:?} must not contain user info"
            )));
        }
        if url.port().is_some() {
            return Err(Error::InvalidInput(format!(
                "identity {input:?} must not contain a port"
            )));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(Error::InvalidInput(format!(
                "identity {input:?} must not contain a query or fragment"
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidInput(format!("identity {input:?} has no trust domain")))?;
        let trust_domain = TrustDomain::new(host)?;

        // url normalizes dot segments away, so validate the raw path.
        let raw_path = raw_path(input);
        validate_path(raw_path)?;

        Ok(Self::assemble(url.scheme(), trust_domain, raw_path))
    }

    /// Build an identity from a trust domain and a path (`/`-prefixed or empty).
    pub fn from_parts(trust_domain: TrustDomain, path: &str) -> Result<Self> {
        if !path.is_empty() && !path.starts_with('/') {
            return Err(Error::InvalidInput(format!(
                "identity path {path:?} must start with '/'"
            )));
        }
        validate_path(path)?;
        Ok(Self::assemble(DEFAULT_SCHEME, trust_domain, path))
    }

    fn assemble(scheme: &str, trust_domain: TrustDomain, path: &str) -> Self {
        let canonical = format!("{scheme}://{trust_domain}{path}");
        let path_start = scheme.len() + 3 + trust_domain.as_str().len();
        Self {
            canonical: canonical.into(),
            trust_domain,
            scheme_len: scheme.len(),
            path_start,
        }
    }

    /// URI scheme, e.g. `spiffe`
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.canonical[..self.scheme_len]
    }

    /// Trust domain the identity belongs to
    #[must_use]
    pub const fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Hierarchical path, empty for the trust domain itself
    #[must_use]
    pub fn path(&self) -> &str {
        &self.canonical[self.path_start..]
    }

    /// Canonical string form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// True if this identity lives in the given trust domain
    #[must_use]
    pub fn is_member_of(&self, trust_domain: &TrustDomain) -> bool {
        &self.trust_domain == trust_domain
    }
}

fn raw_path(input: &str) -> &str {
    let after_scheme = input.split_once("://").map_or("", |(_, rest)| rest);
    after_scheme.find('/').map_or("", |idx| &after_scheme[idx..])
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => {
                return Err(Error::InvalidInput(format!(
                    "identity path {path:?} contains an empty segment or trailing slash"
                )))
            }
            "." | ".." => {
                return Err(Error::InvalidInput(format!(
                    "identity path {path:?} contains a dot segment"
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Identity {}

impl std::hash::Hash for Identity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.canonical.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_components() {
        let id = Identity::parse("spiffe://Example.org/ns/prod/sa/api").unwrap();
        assert_eq!(id.scheme(), "spiffe");
        assert_eq!(id.trust_domain().as_str(), "example.org");
        assert_eq!(id.path(), "/ns/prod/sa/api");
        assert_eq!(id.as_str(), "spiffe://example.org/ns/prod/sa/api");
    }

    #[test]
    fn equality_uses_canonical_form() {
        let a = Identity::parse("spiffe://EXAMPLE.org/svc").unwrap();
        let b = Identity::parse("spiffe://example.org/svc").unwrap();
        let c = Identity::parse("spiffe://example.org/other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn trust_domain_only_identity() {
        let id = Identity::parse("spiffe://example.org").unwrap();
        assert_eq!(id.path(), "");
        assert!(id.is_member_of(&TrustDomain::new("example.org").unwrap()));
    }

    #[test]
    fn rejects_malformed_identities() {
        for bad in [
            "",
            "not a uri",
            "spiffe:///path",
            "spiffe://example.org:8443/svc",
            "spiffe://user@example.org/svc",
            "spiffe://example.org/svc?x=1",
            "spiffe://example.org/svc#frag",
            "spiffe://example.org/svc/",
            "spiffe://example.org//svc",
            "spiffe://example.org/a/../b",
            "spiffe://example.org/./b",
            "mailto:ops@example.org",
        ] {
            let err = Identity::parse(bad).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidInput, "{bad:?}");
        }
    }

    #[test]
    fn rejects_whitespace_and_control_characters() {
        for bad in [
            "spiffe://example.org/a ",
            " spiffe://example.org/a",
            "spiffe://example.org/a\tb",
            "spiffe://example.org/a\nb",
            "spiffe://example.org/a b",
        ] {
            let err = Identity::parse(bad).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidInput, "{bad:?}");
        }
        assert_eq!(
            Identity::parse("spiffe://example.org/a").unwrap().as_str(),
            "spiffe://example.org/a"
        );
    }

    #[test]
    fn from_parts_uses_default_scheme() {
        let td = TrustDomain::new("example.org").unwrap();
        let id = Identity::from_parts(td, "/db").unwrap();
        assert_eq!(id.as_str(), "spiffe://example.org/db");
        assert!(Identity::from_parts(TrustDomain::new("x").unwrap(), "db").is_err());
    }

    #[test]
    fn trust_domain_rejects_bad_characters() {
        assert!(TrustDomain::new("").is_err());
        assert!(TrustDomain::new("exa mple.org").is_err());
        assert_eq!(TrustDomain::new("Prod.Example").unwrap().as_str(), "prod.example");
    }

    #[test]
    fn serde_roundtrips_as_string() {
        let id = Identity::parse("spiffe://example.org/svc").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"spiffe://example.org/svc\"");
        let bad: std::result::Result<Identity, _> = serde_json::from_str("\"spiffe://x/a/\"");
        assert!(bad.is_err());
    }
}
