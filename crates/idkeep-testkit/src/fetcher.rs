//! Scripted fetchers and counting bundle sources.

use async_trait::async_trait;
use idkeep_core::{
    Certificate, Credential, CredentialFetcher, Error, ProcessDescriptor, Result, TrustBundleSource,
    TrustDomain,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type Generator = Box<dyn Fn(usize) -> Result<Credential> + Send + Sync>;
type ProcessGenerator = Box<dyn Fn(&ProcessDescriptor) -> Result<Credential> + Send + Sync>;

/// A [`CredentialFetcher`] that replays a script.
///
/// Each fetch pops the next scripted result; once the script is empty the
/// generator (if any) is called with the zero-based fetch number, otherwise
/// the fetch fails. Every call is counted, including ones that get cancelled.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Credential>>>,
    generator: Option<Generator>,
    processes: Option<ProcessGenerator>,
    latency: Duration,
    close_result: Result<()>,
    fetches: AtomicUsize,
    process_fetches: AtomicUsize,
    closes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedFetcher {
    /// Empty script, no latency, successful close
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            generator: None,
            processes: None,
            latency: Duration::ZERO,
            close_result: Ok(()),
            fetches: AtomicUsize::new(0),
            process_fetches: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Serve `cred` whenever the script is empty
    #[must_use]
    pub fn repeat(self, cred: Credential) -> Self {
        self.generating(move |_| Ok(cred.clone()))
    }

    /// Build a response from the fetch number whenever the script is empty
    #[must_use]
    pub fn generating<F>(mut self, generator: F) -> Self
    where
        F: Fn(usize) -> Result<Credential> + Send + Sync + 'static,
    {
        self.generator = Some(Box::new(generator));
        self
    }

    /// Answer `fetch_for_process` calls with `generator`
    #[must_use]
    pub fn serving_processes<F>(mut self, generator: F) -> Self
    where
        F: Fn(&ProcessDescriptor) -> Result<Credential> + Send + Sync + 'static,
    {
        self.processes = Some(Box::new(generator));
        self
    }

    /// Sleep this long inside every fetch
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Result returned by `close`
    #[must_use]
    pub fn with_close_result(mut self, result: Result<()>) -> Self {
        self.close_result = result;
        self
    }

    /// Queue a successful fetch
    pub fn push_ok(&self, cred: Credential) {
        self.lock_script().push_back(Ok(cred));
    }

    /// Queue a failed fetch
    pub fn push_err(&self, err: Error) {
        self.lock_script().push_back(Err(err));
    }

    /// Number of `fetch_credential` calls started
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of `fetch_for_process` calls started
    pub fn process_fetch_count(&self) -> usize {
        self.process_fetches.load(Ordering::SeqCst)
    }

    /// Number of `close` calls
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Zero the fetch counters (not the close counter)
    pub fn reset_counters(&self) {
        self.fetches.store(0, Ordering::SeqCst);
        self.process_fetches.store(0, Ordering::SeqCst);
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Credential>>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks concurrent fetches; decrements on drop so cancelled fetches count out.
struct InFlight<'a>(&'a ScriptedFetcher);

impl<'a> InFlight<'a> {
    fn enter(fetcher: &'a ScriptedFetcher) -> Self {
        let now = fetcher.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        fetcher.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(fetcher)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialFetcher for ScriptedFetcher {
    async fn fetch_credential(&self) -> Result<Credential> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(self);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.lock_script().pop_front();
        match (scripted, &self.generator) {
            (Some(result), _) => result,
            (None, Some(generate)) => generate(n),
            (None, None) => Err(Error::FetchFailure(format!(
                "script exhausted at fetch {n}"
            ))),
        }
    }

    async fn fetch_for_process(&self, process: &ProcessDescriptor) -> Result<Credential> {
        self.process_fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.processes {
            Some(generate) => generate(process),
            None => Err(Error::InvalidInput(format!(
                "no credentials scripted for pid {}",
                process.pid
            ))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        // Give concurrent closers a chance to race.
        tokio::task::yield_now().await;
        self.close_result.clone()
    }
}

/// Wraps a [`TrustBundleSource`] and counts lookups.
pub struct CountingBundleSource {
    inner: Option<Arc<dyn TrustBundleSource>>,
    lookups: AtomicUsize,
}

impl CountingBundleSource {
    /// Count lookups made against `inner`
    #[must_use]
    pub fn wrap(inner: Arc<dyn TrustBundleSource>) -> Self {
        Self {
            inner: Some(inner),
            lookups: AtomicUsize::new(0),
        }
    }

    /// A source that fails every lookup
    #[must_use]
    pub const fn failing() -> Self {
        Self {
            inner: None,
            lookups: AtomicUsize::new(0),
        }
    }

    /// Number of `bundle_for` calls
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrustBundleSource for CountingBundleSource {
    async fn bundle_for(&self, trust_domain: &TrustDomain) -> Result<Vec<Certificate>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match &self.inner {
            Some(inner) => inner.bundle_for(trust_domain).await,
            None => Err(Error::ChainInvalid(format!(
                "bundle distribution unavailable for {trust_domain}"
            ))),
        }
    }
}
