//! The credential cache.

use idkeep_core::{
    system_clock, Clock, Credential, CredentialFetcher, Error, Identity, ProcessDescriptor, Result,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, trace, warn};

use crate::policy::{needs_refresh, status_of, CredentialStatus, RefreshOptions};

/// Holds this process's current credential and refreshes it on demand.
///
/// Reads of a fresh credential take only the read lock. A stale read takes
/// the write lock and fetches while holding it, so concurrent stale readers
/// queue behind a single in-flight fetch and then see its result.
///
/// A failed refresh leaves the previous credential in place, even if it has
/// expired; callers that need strict freshness must check `not_after`.
pub struct CredentialCache {
    expected: Identity,
    options: RefreshOptions,
    fetcher: Arc<dyn CredentialFetcher>,
    clock: Clock,
    current: RwLock<Option<Arc<Credential>>>,
    closed: AtomicBool,
    close_result: OnceCell<Result<()>>,
}

impl CredentialCache {
    /// Create a cache with default options and the system clock
    #[must_use]
    pub fn new(expected: Identity, fetcher: Arc<dyn CredentialFetcher>) -> Self {
        CredentialCacheBuilder::new(expected, fetcher).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder(expected: Identity, fetcher: Arc<dyn CredentialFetcher>) -> CredentialCacheBuilder {
        CredentialCacheBuilder::new(expected, fetcher)
    }

    /// The identity every cached credential must carry
    #[must_use]
    pub const fn expected_identity(&self) -> &Identity {
        &self.expected
    }

    /// Effective refresh options
    #[must_use]
    pub const fn options(&self) -> &RefreshOptions {
        &self.options
    }

    /// Return the current credential, refreshing it first if it is stale.
    ///
    /// The returned credential is an immutable shared view; the cache swaps
    /// in a new `Arc` on refresh and never mutates the old one.
    pub async fn get_credential(&self) -> Result<Arc<Credential>> {
        self.ensure_open()?;

        {
            let current = self.current.read().await;
            if let Some(cred) = self.fresh(current.as_ref()) {
                debug!(identity = %self.expected, "serving cached credential");
                return Ok(cred);
            }
        }

        let mut current = self.current.write().await;
        self.ensure_open()?;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(cred) = self.fresh(current.as_ref()) {
            trace!(identity = %self.expected, "credential refreshed by concurrent caller");
            return Ok(cred);
        }

        debug!(
            identity = %self.expected,
            cached = current.is_some(),
            "credential stale, fetching replacement"
        );

        let fetched = self
            .bounded(self.fetcher.fetch_credential())
            .await
            .inspect_err(|e| {
                warn!(
                    identity = %self.expected,
                    error = %e,
                    "credential refresh failed, keeping previous credential"
                );
            })?;

        if fetched.identity() != &self.expected {
            warn!(
                expected = %self.expected,
                actual = %fetched.identity(),
                "fetched credential has unexpected identity, discarding"
            );
            return Err(Error::identity_mismatch(&self.expected, fetched.identity()));
        }

        info!(
            identity = %self.expected,
            not_after = %fetched.not_after(),
            sha256 = %fetched.certificate().fingerprint(),
            "credential refreshed"
        );

        let fetched = Arc::new(fetched);
        *current = Some(Arc::clone(&fetched));
        Ok(fetched)
    }

    /// Fetch a credential for another process, bypassing the cache.
    ///
    /// The result is neither stored nor checked against the expected
    /// identity: brokered processes may hold different identities.
    pub async fn fetch_for_process(&self, process: &ProcessDescriptor) -> Result<Credential> {
        self.ensure_open()?;
        debug!(pid = process.pid, uid = process.uid, "fetching credential for process");
        self.bounded(self.fetcher.fetch_for_process(process))
            .await
            .inspect_err(|e| warn!(pid = process.pid, error = %e, "process credential fetch failed"))
    }

    /// The cached credential, without triggering a refresh.
    pub async fn peek(&self) -> Option<Arc<Credential>> {
        self.current.read().await.clone()
    }

    /// Logical status of the cached credential right now.
    pub async fn status(&self) -> CredentialStatus {
        let current = self.current.read().await;
        status_of(current.as_deref(), &self.options, (self.clock)())
    }

    /// Tear the cache down: drop the cached credential and close the fetcher.
    ///
    /// Only the first call does the work; every call, concurrent or later,
    /// returns that call's result.
    pub async fn close(&self) -> Result<()> {
        self.close_result
            .get_or_init(|| async {
                self.closed.store(true, Ordering::Release);
                self.current.write().await.take();
                let result = self.fetcher.close().await;
                match &result {
                    Ok(()) => info!(identity = %self.expected, "credential cache closed"),
                    Err(e) => warn!(identity = %self.expected, error = %e, "fetcher close failed"),
                }
                result
            })
            .await
            .clone()
    }

    /// True once [`close`](Self::close) has started
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn fresh(&self, current: Option<&Arc<Credential>>) -> Option<Arc<Credential>> {
        let cred = current?;
        if needs_refresh(Some(cred.as_ref()), &self.options, (self.clock)()) {
            None
        } else {
            Some(Arc::clone(cred))
        }
    }

    /// Run a fetch under the configured timeout, folding every failure into
    /// [`Error::FetchFailure`].
    async fn bounded<F>(&self, fetch: F) -> Result<Credential>
    where
        F: Future<Output = Result<Credential>>,
    {
        let timeout = self.options.timeout();
        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(cred)) => Ok(cred),
            Ok(Err(Error::FetchFailure(reason))) => Err(Error::FetchFailure(reason)),
            Ok(Err(other)) => Err(Error::FetchFailure(other.to_string())),
            Err(_) => Err(Error::FetchFailure(format!(
                "no response from identity authority within {timeout:?}"
            ))),
        }
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("expected", &self.expected)
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`CredentialCache`]
pub struct CredentialCacheBuilder {
    expected: Identity,
    fetcher: Arc<dyn CredentialFetcher>,
    options: RefreshOptions,
    clock: Clock,
}

impl CredentialCacheBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new(expected: Identity, fetcher: Arc<dyn CredentialFetcher>) -> Self {
        Self {
            expected,
            fetcher,
            options: RefreshOptions::default(),
            clock: system_clock(),
        }
    }

    /// Set refresh options
    #[must_use]
    pub const fn options(mut self, options: RefreshOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the time source (useful for testing)
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Build the cache
    #[must_use]
    pub fn build(self) -> CredentialCache {
        CredentialCache {
            expected: self.expected,
            options: self.options,
            fetcher: self.fetcher,
            clock: self.clock,
            current: RwLock::new(None),
            closed: AtomicBool::new(false),
            close_result: OnceCell::new(),
        }
    }
}
