//! Boundaries to the identity authority and to trust-bundle distribution.
//!
//! Both are external collaborators: this workspace only depends on the
//! narrow contracts below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::identity::TrustDomain;
use crate::material::Certificate;

/// Describes a process on whose behalf a credential is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    /// Process ID
    pub pid: u32,
    /// User ID running the process
    pub uid: u32,
    /// Group ID running the process
    pub gid: u32,
    /// Path to the executable binary, if known
    pub exe_path: Option<String>,
}

impl ProcessDescriptor {
    /// Describe a process by its IDs alone.
    #[must_use]
    pub const fn new(pid: u32, uid: u32, gid: u32) -> Self {
        Self {
            pid,
            uid,
            gid,
            exe_path: None,
        }
    }

    /// Attach the executable path.
    #[must_use]
    pub fn with_exe_path(mut self, path: impl Into<String>) -> Self {
        self.exe_path = Some(path.into());
        self
    }
}

/// Fetches fresh credentials from an identity authority.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    /// Fetch a credential for the current process.
    async fn fetch_credential(&self) -> Result<Credential>;

    /// Fetch a credential for another process.
    ///
    /// Fetchers that only serve their own process keep the default, which
    /// refuses the request.
    async fn fetch_for_process(&self, process: &ProcessDescriptor) -> Result<Credential> {
        Err(Error::InvalidInput(format!(
            "fetcher cannot broker credentials for pid {}",
            process.pid
        )))
    }

    /// Release resources held by the fetcher.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Supplies trusted authorities for a trust domain.
#[async_trait]
pub trait TrustBundleSource: Send + Sync {
    /// Trusted root (and optionally intermediate) certificates for `trust_domain`.
    async fn bundle_for(&self, trust_domain: &TrustDomain) -> Result<Vec<Certificate>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    struct OwnProcessOnly;

    #[async_trait]
    impl CredentialFetcher for OwnProcessOnly {
        async fn fetch_credential(&self) -> Result<Credential> {
            Err(Error::FetchFailure("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn default_methods_refuse_brokering_and_close_cleanly() {
        let fetcher = OwnProcessOnly;
        let err = fetcher
            .fetch_for_process(&ProcessDescriptor::new(42, 1000, 1000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("42"));
        assert!(fetcher.close().await.is_ok());
    }

    #[test]
    fn process_descriptor_serialization() {
        let process = ProcessDescriptor::new(7, 1000, 100).with_exe_path("/usr/bin/api");
        let json = serde_json::to_string(&process).unwrap();
        let parsed: ProcessDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, process);
        assert_eq!(parsed.exe_path.as_deref(), Some("/usr/bin/api"));
    }
}
